//! Request execution: admission check, FIFO concurrency gate, circuit
//! breaker, retry with exponential backoff, and metrics.

pub mod metrics;
pub mod request;

pub use metrics::{ClientMetrics, PriorityStats};
pub use request::{NetworkRequest, NetworkResponse};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::KairoConfig;
use crate::error::NetworkError;
use crate::policy::admission;
use crate::throttle::{
    BreakerError, BreakerStatus, CircuitBreaker, Semaphore, SemaphoreStatus,
};
use crate::types::{HealthSnapshot, OperationKind, Policy};
use kairo_net::{HttpRequest, HttpResponse, Transport};

/// Backoff exponent cap; keeps `2^(attempt-1)` seconds bounded for large
/// retry budgets.
const MAX_BACKOFF_EXP: u32 = 10;

/// Executes requests under the current policy.
///
/// Each request passes admission, takes a gate permit (FIFO), and runs
/// breaker-guarded attempts against the transport. The permit is dropped on
/// every exit path.
pub struct NetworkClient {
    transport: Arc<dyn Transport>,
    gate: Semaphore,
    breaker: CircuitBreaker,
    health_rx: watch::Receiver<HealthSnapshot>,
    policy: Mutex<Policy>,
    metrics: Mutex<ClientMetrics>,
    low_battery_threshold: f64,
    token: CancellationToken,
}

impl NetworkClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        cfg: &KairoConfig,
        health_rx: watch::Receiver<HealthSnapshot>,
        token: CancellationToken,
    ) -> Self {
        Self {
            transport,
            gate: Semaphore::new(cfg.network_max_concurrent),
            breaker: CircuitBreaker::new(cfg.breaker),
            health_rx,
            policy: Mutex::new(Policy::for_level(
                crate::types::HealthLevel::High,
                cfg.network_max_concurrent,
            )),
            metrics: Mutex::new(ClientMetrics::default()),
            low_battery_threshold: cfg.low_battery_threshold,
            token,
        }
    }

    /// Execute a request. Admission denials and shutdown surface as
    /// [`NetworkError::Cancelled`]; a refusing breaker as
    /// [`NetworkError::CircuitOpen`].
    pub async fn request(&self, req: NetworkRequest) -> Result<NetworkResponse, NetworkError> {
        let snapshot = *self.health_rx.borrow();
        let policy = *self.lock_policy();
        let op = OperationKind::NetworkRequest(req.priority);
        let verdict = admission::check(&op, &snapshot, &policy, self.low_battery_threshold);
        if !verdict.allowed() {
            tracing::debug!(
                request = %req.id,
                priority = req.priority.as_str(),
                ?verdict,
                "request gated off"
            );
            return Err(NetworkError::Cancelled);
        }

        let _permit = tokio::select! {
            _ = self.token.cancelled() => return Err(NetworkError::Cancelled),
            permit = self.gate.acquire() => permit.map_err(|_| NetworkError::Cancelled)?,
        };

        let started = Instant::now();
        let result = self.execute_with_retry(&req).await;
        let elapsed = started.elapsed();

        {
            let mut m = self.lock_metrics();
            match &result {
                Ok(_) => m.record_success(req.priority, elapsed),
                Err(_) => m.record_failure(req.priority, elapsed),
            }
        }

        result.map(|(raw, retry_count)| NetworkResponse {
            body: raw.body,
            status: raw.status,
            headers: raw.headers,
            duration: elapsed,
            retry_count,
        })
    }

    async fn execute_with_retry(
        &self,
        req: &NetworkRequest,
    ) -> Result<(HttpResponse, u32), NetworkError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.breaker.execute(|| self.attempt(req)).await {
                Ok(raw) => {
                    // 4xx is terminal: the service answered, the request is
                    // wrong. The breaker already counted a success.
                    if (400..500).contains(&raw.status) {
                        return Err(NetworkError::ClientError(raw.status));
                    }
                    return Ok((raw, attempt - 1));
                }
                Err(BreakerError::Rejected) => {
                    tracing::debug!(request = %req.id, "breaker refused request");
                    return Err(NetworkError::CircuitOpen);
                }
                Err(BreakerError::Inner(e)) => {
                    let may_retry =
                        req.retry_enabled && attempt <= req.max_retries && e.is_retryable();
                    if !may_retry {
                        return Err(e);
                    }
                    let backoff =
                        Duration::from_secs(1u64 << (attempt - 1).min(MAX_BACKOFF_EXP));
                    tracing::debug!(
                        request = %req.id,
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        error = %e,
                        "retrying request"
                    );
                    tokio::select! {
                        _ = self.token.cancelled() => return Err(NetworkError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }

    /// One transport exchange. 5xx and malformed statuses are failures so the
    /// breaker and the retry loop see them; everything below 500 passes
    /// through.
    async fn attempt(&self, req: &NetworkRequest) -> Result<HttpResponse, NetworkError> {
        let http_req = HttpRequest {
            url: req.url.clone(),
            method: req.method,
            headers: req.headers.clone(),
            body: req.body.clone(),
        };
        let raw = tokio::select! {
            _ = self.token.cancelled() => return Err(NetworkError::Cancelled),
            result = self.transport.execute(http_req, req.timeout) => {
                result.map_err(NetworkError::from)?
            }
        };
        if !(100..=599).contains(&raw.status) {
            return Err(NetworkError::InvalidResponse(format!(
                "status {}",
                raw.status
            )));
        }
        if raw.status >= 500 {
            return Err(NetworkError::ServerError(raw.status));
        }
        Ok(raw)
    }

    /// Apply a new policy: resize the gate, then swap the stored policy. Both
    /// happen under the policy lock, so no admission decision can observe the
    /// new policy before the gate matches it.
    pub fn update_policy(&self, policy: Policy) {
        let mut g = self.lock_policy();
        self.gate.resize(policy.max_network_concurrent);
        *g = policy;
        tracing::debug!(
            level = policy.health_level.as_str(),
            max_concurrent = policy.max_network_concurrent,
            "client policy updated"
        );
    }

    pub fn current_policy(&self) -> Policy {
        *self.lock_policy()
    }

    pub fn get_metrics(&self) -> ClientMetrics {
        self.lock_metrics().clone()
    }

    pub fn reset_metrics(&self) {
        *self.lock_metrics() = ClientMetrics::default();
    }

    pub fn gate_status(&self) -> SemaphoreStatus {
        self.gate.status()
    }

    pub fn breaker_status(&self) -> BreakerStatus {
        self.breaker.status()
    }

    /// Manual breaker control (`reset` / `trip`).
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Cancel in-flight waiters and fail all future requests.
    pub fn shutdown(&self) {
        self.token.cancel();
        self.gate.deactivate();
        tracing::debug!("network client shut down");
    }

    fn lock_policy(&self) -> MutexGuard<'_, Policy> {
        self.policy.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_metrics(&self) -> MutexGuard<'_, ClientMetrics> {
        self.metrics.lock().unwrap_or_else(|e| e.into_inner())
    }
}
