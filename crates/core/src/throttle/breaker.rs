use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow; consecutive failures are counted.
    Closed,
    /// Calls fail fast until the cooldown elapses.
    Open,
    /// A bounded number of probe calls decide recovery.
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Observable breaker state and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerStatus {
    pub state: BreakerState,
    pub failure_count: u32,
    pub success_count: u32,
    pub requests_in_half_open: u32,
}

/// Error from a breaker-guarded call.
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// The breaker refused the call without running it.
    #[error("circuit breaker open")]
    Rejected,
    /// The call ran and failed.
    #[error(transparent)]
    Inner(E),
}

/// Failure-isolating state machine.
///
/// Closed → Open after `failure_threshold` consecutive failures;
/// Open → HalfOpen once `timeout` has elapsed since the last failure;
/// HalfOpen → Closed after `success_threshold` successes, or back to Open on
/// any failure. HalfOpen admits at most `max_requests_in_half_open` calls.
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

struct Inner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    requests_in_half_open: u32,
    last_failure_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                requests_in_half_open: 0,
                last_failure_at: None,
            }),
        }
    }

    /// Run `op` under the breaker. The state decision and the bookkeeping
    /// take the lock; the call itself runs without it.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_admit() {
            return Err(BreakerError::Rejected);
        }
        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    fn try_admit(&self) -> bool {
        let mut g = self.lock();
        match g.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let cooled = g
                    .last_failure_at
                    .is_none_or(|at| at.elapsed() >= self.cfg.timeout());
                if !cooled {
                    return false;
                }
                g.state = BreakerState::HalfOpen;
                g.failure_count = 0;
                g.success_count = 0;
                // This call is the first half-open probe.
                g.requests_in_half_open = 1;
                tracing::info!("circuit breaker half-open, probing");
                true
            }
            BreakerState::HalfOpen => {
                if g.requests_in_half_open >= self.cfg.max_requests_in_half_open {
                    return false;
                }
                g.requests_in_half_open += 1;
                true
            }
        }
    }

    fn on_success(&self) {
        let mut g = self.lock();
        match g.state {
            BreakerState::Closed => {
                g.failure_count = 0;
            }
            BreakerState::HalfOpen => {
                g.success_count += 1;
                if g.success_count >= self.cfg.success_threshold {
                    g.state = BreakerState::Closed;
                    g.failure_count = 0;
                    g.success_count = 0;
                    g.requests_in_half_open = 0;
                    tracing::info!("circuit breaker closed after recovery");
                }
            }
            BreakerState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut g = self.lock();
        g.last_failure_at = Some(Instant::now());
        match g.state {
            BreakerState::Closed => {
                g.failure_count += 1;
                if g.failure_count >= self.cfg.failure_threshold {
                    g.state = BreakerState::Open;
                    tracing::warn!(
                        failures = g.failure_count,
                        "circuit breaker opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                g.state = BreakerState::Open;
                tracing::warn!("circuit breaker re-opened from half-open");
            }
            BreakerState::Open => {}
        }
    }

    /// Force Closed and clear all counters.
    pub fn reset(&self) {
        let mut g = self.lock();
        g.state = BreakerState::Closed;
        g.failure_count = 0;
        g.success_count = 0;
        g.requests_in_half_open = 0;
        g.last_failure_at = None;
        tracing::info!("circuit breaker reset");
    }

    /// Force Open as if a failure just occurred.
    pub fn trip(&self) {
        let mut g = self.lock();
        g.state = BreakerState::Open;
        g.last_failure_at = Some(Instant::now());
        tracing::warn!("circuit breaker tripped manually");
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn status(&self) -> BreakerStatus {
        let g = self.lock();
        BreakerStatus {
            state: g.state,
            failure_count: g.failure_count,
            success_count: g.success_count,
            requests_in_half_open: g.requests_in_half_open,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    fn breaker(failure_threshold: u32, timeout_secs: u64, success_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold,
            timeout_secs,
            success_threshold,
            max_requests_in_half_open: 5,
        })
    }

    async fn fail(b: &CircuitBreaker) -> Result<(), BreakerError<Boom>> {
        b.execute(|| async { Err::<(), _>(Boom) }).await.map(|_| ())
    }

    async fn succeed(b: &CircuitBreaker) -> Result<(), BreakerError<Boom>> {
        b.execute(|| async { Ok::<_, Boom>(()) }).await
    }

    #[tokio::test]
    async fn closed_success_resets_failure_count() {
        let b = breaker(3, 60, 2);
        fail(&b).await.unwrap_err();
        fail(&b).await.unwrap_err();
        assert_eq!(b.status().failure_count, 2);

        succeed(&b).await.unwrap();
        assert_eq!(b.status().failure_count, 0);
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_fails_fast() {
        let b = breaker(3, 5, 2);
        for _ in 0..3 {
            fail(&b).await.unwrap_err();
        }
        assert_eq!(b.state(), BreakerState::Open);

        // t+1s: still cooling down, the op must not run.
        tokio::time::advance(Duration::from_secs(1)).await;
        let result: Result<(), BreakerError<Boom>> = b
            .execute(|| async { unreachable!("op must not run while open") })
            .await;
        assert!(matches!(result, Err(BreakerError::Rejected)));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_through_half_open() {
        let b = breaker(3, 5, 2);
        for _ in 0..3 {
            fail(&b).await.unwrap_err();
        }
        assert_eq!(b.state(), BreakerState::Open);

        // t+6s: the next call transitions to HalfOpen and runs.
        tokio::time::advance(Duration::from_secs(6)).await;
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), BreakerState::HalfOpen);
        assert_eq!(b.status().success_count, 1);

        succeed(&b).await.unwrap();
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.status().success_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens() {
        let b = breaker(3, 5, 2);
        for _ in 0..3 {
            fail(&b).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(6)).await;
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), BreakerState::HalfOpen);

        fail(&b).await.unwrap_err();
        assert_eq!(b.state(), BreakerState::Open);

        // The reopened cooldown starts from the new failure.
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(matches!(succeed(&b).await, Err(BreakerError::Rejected)));
        tokio::time::advance(Duration::from_secs(5)).await;
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), BreakerState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_caps_concurrent_probes() {
        let b = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            timeout_secs: 1,
            success_threshold: 10,
            max_requests_in_half_open: 2,
        });
        fail(&b).await.unwrap_err();
        tokio::time::advance(Duration::from_secs(2)).await;

        // Two probes admitted (the transition call counts), the third rejected.
        succeed(&b).await.unwrap();
        succeed(&b).await.unwrap();
        assert_eq!(b.status().requests_in_half_open, 2);
        assert!(matches!(succeed(&b).await, Err(BreakerError::Rejected)));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_reset_and_trip() {
        let b = breaker(1, 60, 1);
        fail(&b).await.unwrap_err();
        assert_eq!(b.state(), BreakerState::Open);

        b.reset();
        assert_eq!(b.state(), BreakerState::Closed);
        succeed(&b).await.unwrap();

        b.trip();
        assert!(matches!(succeed(&b).await, Err(BreakerError::Rejected)));
        // Cooldown counts from the manual trip; with success_threshold 1 the
        // first probe closes the breaker again.
        tokio::time::advance(Duration::from_secs(61)).await;
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), BreakerState::Closed);
    }
}
