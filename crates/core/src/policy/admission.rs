use crate::types::{
    HealthSnapshot, ImageSize, NetReachability, OperationKind, Policy, RequestPriority,
    ThermalState,
};

/// Downloads at or above this size are denied on constrained networks.
const LARGE_DOWNLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Why an operation was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    CriticalHealth,
    ThermalPressure,
    LowBattery,
    NetworkUnreachable,
    ConstrainedNetwork,
    PolicyDisallowsMl,
}

/// Admission decision for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied(DenyReason),
}

impl Admission {
    pub fn allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Check whether an operation may run under the current snapshot and policy.
/// Rules are evaluated in order; the first match wins.
pub fn check(
    op: &OperationKind,
    snapshot: &HealthSnapshot,
    policy: &Policy,
    low_battery_threshold: f64,
) -> Admission {
    // 1. Critical-priority network traffic always goes through.
    if matches!(op, OperationKind::NetworkRequest(RequestPriority::Critical)) {
        return Admission::Allowed;
    }

    // 2. A critical device runs nothing else.
    if snapshot.is_critical() {
        return Admission::Denied(DenyReason::CriticalHealth);
    }

    // 3. Thermal gate.
    match snapshot.thermal {
        ThermalState::Serious
            if matches!(
                op,
                OperationKind::MlInference | OperationKind::VideoProcessing
            ) =>
        {
            return Admission::Denied(DenyReason::ThermalPressure);
        }
        ThermalState::Critical => {
            return Admission::Denied(DenyReason::ThermalPressure);
        }
        _ => {}
    }

    // 4. Battery gate.
    if snapshot.battery_level < low_battery_threshold
        && matches!(
            op,
            OperationKind::MlInference
                | OperationKind::VideoProcessing
                | OperationKind::FileDownload(_)
        )
    {
        return Admission::Denied(DenyReason::LowBattery);
    }

    // 5. Network gate.
    if snapshot.net_reach != NetReachability::Satisfied
        && matches!(
            op,
            OperationKind::NetworkRequest(_) | OperationKind::FileDownload(_)
        )
    {
        return Admission::Denied(DenyReason::NetworkUnreachable);
    }
    if snapshot.net_constrained {
        let heavy = match op {
            OperationKind::FileDownload(bytes) => *bytes >= LARGE_DOWNLOAD_BYTES,
            OperationKind::ImageProcessing(ImageSize::Large) => true,
            _ => false,
        };
        if heavy {
            return Admission::Denied(DenyReason::ConstrainedNetwork);
        }
    }

    // 6. Policy gate.
    if *op == OperationKind::MlInference && !policy.allow_background_ml {
        return Admission::Denied(DenyReason::PolicyDisallowsMl);
    }

    // 7. Everything else runs.
    Admission::Allowed
}
