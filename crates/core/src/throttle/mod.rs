//! Concurrency throttling primitives: a resizable FIFO counting gate and a
//! circuit breaker.

pub mod breaker;
pub mod semaphore;

pub use breaker::{BreakerError, BreakerState, BreakerStatus, CircuitBreaker};
pub use semaphore::{AcquireError, Permit, Semaphore, SemaphoreStatus};
