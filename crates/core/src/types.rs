use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Thermal pressure tier reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThermalState {
    Nominal,
    Fair,
    Serious,
    Critical,
}

impl ThermalState {
    /// Scoring factor for this tier.
    fn factor(self) -> f64 {
        match self {
            Self::Nominal => 1.0,
            Self::Fair => 0.8,
            Self::Serious => 0.5,
            Self::Critical => 0.2,
        }
    }
}

/// Network reachability as reported by the path monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetReachability {
    /// Path is up and usable.
    Satisfied,
    /// Path could come up on demand (e.g. VPN, cellular fallback).
    Satisfiable,
    /// No usable path.
    RequiresConnection,
}

impl NetReachability {
    fn reach_score(self) -> f64 {
        match self {
            Self::Satisfied => 1.0,
            Self::Satisfiable => 0.5,
            Self::RequiresConnection => 0.0,
        }
    }
}

/// Coarse health bucket used for policy selection (with hysteresis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthLevel {
    High,
    Medium,
    Low,
    Critical,
}

impl HealthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Critical => "critical",
        }
    }
}

/// Image quality variant a caller should fetch or render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageVariant {
    Original,
    Large,
    Medium,
    Small,
}

/// Workload size of an image-processing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSize {
    Small,
    Medium,
    Large,
}

/// Priority attached to a network request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequestPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl RequestPriority {
    /// Stable index for per-priority metric slots.
    pub fn index(self) -> usize {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// A caller-initiated operation submitted to admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    NetworkRequest(RequestPriority),
    ImageProcessing(ImageSize),
    MlInference,
    BackgroundTask,
    FileDownload(u64),
    VideoProcessing,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkRequest(_) => "network_request",
            Self::ImageProcessing(_) => "image_processing",
            Self::MlInference => "ml_inference",
            Self::BackgroundTask => "background_task",
            Self::FileDownload(_) => "file_download",
            Self::VideoProcessing => "video_processing",
        }
    }
}

// ── Health snapshot ────────────────────────────────────────────

/// Immutable point-in-time record of device health.
///
/// `battery_level` is stored exactly as the probe reported it, including
/// out-of-range values; scoring clamps to [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct HealthSnapshot {
    pub battery_level: f64,
    pub low_power_mode: bool,
    pub thermal: ThermalState,
    pub net_reach: NetReachability,
    pub net_constrained: bool,
    pub net_expensive: bool,
    /// Monotonic instant the reading was taken.
    pub taken_at: Instant,
    /// Wall-clock time of the reading, for logs only.
    pub observed_at: DateTime<Utc>,
}

/// Battery fraction below which a snapshot is critical on its own.
const CRITICAL_BATTERY: f64 = 0.05;

impl HealthSnapshot {
    /// Composite health score in [0, 1].
    ///
    /// Weighted product: each factor is pulled toward 1.0 by its weight so no
    /// single signal can zero the score except through the clamp.
    pub fn health_score(&self) -> f64 {
        let battery_term = self.battery_level.clamp(0.0, 1.0) * 0.4 + 0.6;
        let thermal_term = self.thermal.factor() * 0.3 + 0.7;
        let lpm_term = if self.low_power_mode { 0.85 } else { 1.0 };
        let constrained = if self.net_constrained { 0.7 } else { 1.0 };
        let net_term = self.net_reach.reach_score() * constrained * 0.1 + 0.9;
        let expense_term = if self.net_expensive { 0.95 } else { 1.0 };
        (battery_term * thermal_term * lpm_term * net_term * expense_term).clamp(0.0, 1.0)
    }

    /// Diagnostic alias of [`health_score`](Self::health_score).
    pub fn overall_health_score(&self) -> f64 {
        self.health_score()
    }

    /// True when any single signal forces the critical policy path.
    pub fn is_critical(&self) -> bool {
        self.battery_level < CRITICAL_BATTERY
            || self.thermal == ThermalState::Critical
            || self.net_reach == NetReachability::RequiresConnection
    }
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            battery_level: 1.0,
            low_power_mode: false,
            thermal: ThermalState::Nominal,
            net_reach: NetReachability::Satisfied,
            net_constrained: false,
            net_expensive: false,
            taken_at: Instant::now(),
            observed_at: Utc::now(),
        }
    }
}

// ── Policy ─────────────────────────────────────────────────────

/// Throttling directive derived from a health level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub max_network_concurrent: u32,
    pub allow_background_ml: bool,
    pub image_variant: ImageVariant,
    pub prefer_cache_when_unhealthy: bool,
    pub health_level: HealthLevel,
}

impl Policy {
    /// Map a health level to its policy. `base` is the configured concurrency
    /// ceiling for a fully healthy device; the result is always ≥ 1.
    pub fn for_level(level: HealthLevel, base: u32) -> Self {
        let base = base.max(1);
        match level {
            HealthLevel::High => Self {
                max_network_concurrent: base,
                allow_background_ml: true,
                image_variant: ImageVariant::Original,
                prefer_cache_when_unhealthy: false,
                health_level: level,
            },
            HealthLevel::Medium => Self {
                max_network_concurrent: (base / 2).max(2),
                allow_background_ml: true,
                image_variant: ImageVariant::Large,
                prefer_cache_when_unhealthy: false,
                health_level: level,
            },
            HealthLevel::Low => Self {
                max_network_concurrent: (base / 4).max(1),
                allow_background_ml: false,
                image_variant: ImageVariant::Medium,
                prefer_cache_when_unhealthy: true,
                health_level: level,
            },
            HealthLevel::Critical => Self {
                max_network_concurrent: 1,
                allow_background_ml: false,
                image_variant: ImageVariant::Small,
                prefer_cache_when_unhealthy: true,
                health_level: level,
            },
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::for_level(HealthLevel::High, crate::config::DEFAULT_MAX_CONCURRENT)
    }
}
