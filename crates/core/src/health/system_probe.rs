use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::error::ProbeError;
use crate::health::probe::DeviceProbe;
use crate::types::{HealthSnapshot, NetReachability, ThermalState};

/// Millidegree boundaries for mapping a thermal zone reading to a tier.
const THERMAL_FAIR_MILLIC: i64 = 60_000;
const THERMAL_SERIOUS_MILLIC: i64 = 75_000;
const THERMAL_CRITICAL_MILLIC: i64 = 85_000;

/// Best-effort probe for Linux hosts, assembled from `/sys` and `/proc`.
///
/// Signals that a host cannot express (constrained or expensive networks)
/// read as their benign defaults. Non-Linux targets get a fully healthy
/// snapshot; embedders there should supply their own [`DeviceProbe`].
///
/// This probe has no OS change subscription: registered forwarders are kept
/// but never fired, and the monitor's periodic reads carry the signal.
pub struct SystemProbe {
    forwards: Mutex<Vec<mpsc::Sender<HealthSnapshot>>>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            forwards: Mutex::new(Vec::new()),
        }
    }

    #[cfg(target_os = "linux")]
    fn read_snapshot() -> HealthSnapshot {
        HealthSnapshot {
            battery_level: Self::read_battery_level().unwrap_or(1.0),
            low_power_mode: Self::read_powersave_governor(),
            thermal: Self::read_thermal(),
            net_reach: Self::read_reachability(),
            net_constrained: false,
            net_expensive: false,
            ..HealthSnapshot::default()
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn read_snapshot() -> HealthSnapshot {
        HealthSnapshot::default()
    }

    /// First battery under `/sys/class/power_supply`, as a fraction.
    #[cfg(target_os = "linux")]
    fn read_battery_level() -> Option<f64> {
        let entries = std::fs::read_dir("/sys/class/power_supply").ok()?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with("BAT") {
                continue;
            }
            let capacity = std::fs::read_to_string(entry.path().join("capacity")).ok()?;
            let pct: f64 = capacity.trim().parse().ok()?;
            return Some((pct / 100.0).clamp(0.0, 1.0));
        }
        None
    }

    /// The powersave cpufreq governor is the closest host analogue of a
    /// low-power mode.
    #[cfg(target_os = "linux")]
    fn read_powersave_governor() -> bool {
        std::fs::read_to_string("/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor")
            .map(|s| s.trim() == "powersave")
            .unwrap_or(false)
    }

    /// Hottest thermal zone mapped to a tier.
    #[cfg(target_os = "linux")]
    fn read_thermal() -> ThermalState {
        let Ok(entries) = std::fs::read_dir("/sys/class/thermal") else {
            return ThermalState::Nominal;
        };
        let mut hottest: i64 = 0;
        for entry in entries.flatten() {
            if !entry.file_name().to_string_lossy().starts_with("thermal_zone") {
                continue;
            }
            if let Some(milli) = std::fs::read_to_string(entry.path().join("temp"))
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
            {
                hottest = hottest.max(milli);
            }
        }
        Self::classify_millidegrees(hottest)
    }

    fn classify_millidegrees(milli: i64) -> ThermalState {
        if milli >= THERMAL_CRITICAL_MILLIC {
            ThermalState::Critical
        } else if milli >= THERMAL_SERIOUS_MILLIC {
            ThermalState::Serious
        } else if milli >= THERMAL_FAIR_MILLIC {
            ThermalState::Fair
        } else {
            ThermalState::Nominal
        }
    }

    /// Any non-loopback interface in operstate `up` counts as reachable.
    #[cfg(target_os = "linux")]
    fn read_reachability() -> NetReachability {
        let Ok(entries) = std::fs::read_dir("/sys/class/net") else {
            return NetReachability::Satisfied;
        };
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy() == "lo" {
                continue;
            }
            let up = std::fs::read_to_string(entry.path().join("operstate"))
                .map(|s| s.trim() == "up")
                .unwrap_or(false);
            if up {
                return NetReachability::Satisfied;
            }
        }
        NetReachability::RequiresConnection
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProbe for SystemProbe {
    fn read(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<HealthSnapshot, ProbeError>> + Send + '_>> {
        Box::pin(async { Ok(Self::read_snapshot()) })
    }

    fn on_change(&self, forward: mpsc::Sender<HealthSnapshot>) {
        self.forwards
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(forward);
    }
}
