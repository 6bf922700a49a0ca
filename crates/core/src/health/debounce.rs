use std::time::Duration;
use tokio::time::Instant;

use crate::types::HealthSnapshot;

/// Battery delta that counts as a significant change.
const BATTERY_DELTA: f64 = 0.05;
/// Health score delta that counts as a significant change.
const SCORE_DELTA: f64 = 0.1;

/// Whether `next` differs from the last published snapshot enough to be
/// worth publishing.
pub fn significant_change(prev: &HealthSnapshot, next: &HealthSnapshot) -> bool {
    (next.battery_level - prev.battery_level).abs() > BATTERY_DELTA
        || next.thermal != prev.thermal
        || next.low_power_mode != prev.low_power_mode
        || next.net_reach != prev.net_reach
        || next.net_constrained != prev.net_constrained
        || next.net_expensive != prev.net_expensive
        || (next.health_score() - prev.health_score()).abs() > SCORE_DELTA
        || next.is_critical() != prev.is_critical()
}

/// Debounce window — holds a candidate snapshot until the window elapses
/// without further changes. A new candidate inside the window resets the
/// timer; critical candidates bypass the window entirely.
#[derive(Debug)]
pub struct DebounceWindow {
    pending: Option<HealthSnapshot>,
    deadline: Option<Instant>,
    window: Duration,
}

impl DebounceWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: None,
            deadline: None,
            window,
        }
    }

    /// Accept a candidate. Returns `Some` when the snapshot must be published
    /// immediately (critical bypass), `None` when it is held for the window.
    pub fn push(&mut self, snapshot: HealthSnapshot) -> Option<HealthSnapshot> {
        if snapshot.is_critical() {
            self.pending = None;
            self.deadline = None;
            return Some(snapshot);
        }
        self.pending = Some(snapshot);
        self.deadline = Some(Instant::now() + self.window);
        None
    }

    /// The instant the held candidate becomes publishable, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the held candidate once its window has elapsed.
    pub fn take_ready(&mut self) -> Option<HealthSnapshot> {
        let deadline = self.deadline?;
        if Instant::now() < deadline {
            return None;
        }
        self.deadline = None;
        self.pending.take()
    }
}
