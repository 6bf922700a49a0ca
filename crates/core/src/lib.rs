//! Adaptive performance throttling for resource-constrained devices.
//!
//! kairo observes device health (battery, thermal, network, power mode),
//! folds it into a throttling [`Policy`], and gates caller operations against
//! that policy. Three subsystems do the work:
//!
//! - [`health`] — a monitor producing a debounced stream of validated
//!   [`HealthSnapshot`]s from a [`DeviceProbe`].
//! - [`policy`] — a deterministic reducer with hysteresis, plus per-operation
//!   admission rules.
//! - [`throttle`] + [`client`] — a FIFO counting gate and a circuit breaker,
//!   composed by a retrying [`NetworkClient`].
//!
//! [`Kairo`] wires them together and is the entry point for most callers.
//!
//! [`DeviceProbe`]: health::DeviceProbe
//! [`NetworkClient`]: client::NetworkClient
//! [`HealthSnapshot`]: types::HealthSnapshot
//! [`Policy`]: types::Policy

pub mod client;
pub mod config;
pub mod error;
pub mod health;
mod kairo;
pub mod policy;
pub mod stream;
pub mod throttle;
pub mod types;

pub use client::{ClientMetrics, NetworkClient, NetworkRequest, NetworkResponse};
pub use config::{CircuitBreakerConfig, KairoConfig};
pub use error::{NetworkError, ProbeError};
pub use health::{DeviceProbe, HealthMonitor, MockProbe, SystemProbe};
pub use kairo::Kairo;
pub use stream::{HealthStream, PolicyStream};
pub use types::{
    HealthLevel, HealthSnapshot, ImageSize, ImageVariant, NetReachability, OperationKind, Policy,
    RequestPriority, ThermalState,
};
