use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default network concurrency ceiling for a fully healthy device.
pub const DEFAULT_MAX_CONCURRENT: u32 = 6;

/// Circuit breaker tuning parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed before the breaker opens.
    pub failure_threshold: u32,
    /// Seconds the breaker stays Open before probing HalfOpen.
    pub timeout_secs: u64,
    /// Successes in HalfOpen required to close again.
    pub success_threshold: u32,
    /// Concurrent probe budget while HalfOpen.
    pub max_requests_in_half_open: u32,
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_secs: 60,
            success_threshold: 3,
            max_requests_in_half_open: 5,
        }
    }
}

/// All kairo system parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KairoConfig {
    /// Network concurrency ceiling at full health.
    pub network_max_concurrent: u32,
    /// Battery fraction below which heavy operations are denied.
    pub low_battery_threshold: f64,
    /// Quiet window before a significant health change is published.
    pub debounce_ms: u64,
    /// Periodic probe read interval.
    pub tick_period_ms: u64,
    /// Number of recent health scores retained for trend observability.
    pub trend_window: usize,
    pub breaker: CircuitBreakerConfig,
}

impl KairoConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}

impl Default for KairoConfig {
    fn default() -> Self {
        Self {
            network_max_concurrent: DEFAULT_MAX_CONCURRENT,
            low_battery_threshold: 0.15,
            debounce_ms: 350,
            tick_period_ms: 5000,
            trend_window: 10,
            breaker: CircuitBreakerConfig::default(),
        }
    }
}
