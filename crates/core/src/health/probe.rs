use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::ProbeError;
use crate::types::HealthSnapshot;

/// Point-in-time access to the device's health facilities.
///
/// Implementations wrap platform APIs (battery, thermal, network path, disk).
/// `read` should answer within roughly 100 ms; the monitor applies its own
/// deadline and falls back to the previous snapshot for stragglers.
pub trait DeviceProbe: Send + Sync {
    fn read(&self)
    -> Pin<Box<dyn Future<Output = Result<HealthSnapshot, ProbeError>> + Send + '_>>;

    /// Register a change forwarder. Whenever an OS-level transition fires
    /// (network path change, thermal change), the implementation sends a
    /// fresh snapshot through the channel, at-least-once. OS callback threads
    /// must only touch the channel, never monitor state.
    fn on_change(&self, forward: mpsc::Sender<HealthSnapshot>);
}

/// Scripted probe for tests — drives health scenarios deterministically.
pub struct MockProbe {
    inner: Mutex<MockProbeInner>,
}

struct MockProbeInner {
    current: HealthSnapshot,
    read_errors: VecDeque<ProbeError>,
    read_delay: Option<Duration>,
    forwards: Vec<mpsc::Sender<HealthSnapshot>>,
    read_count: u64,
}

impl MockProbe {
    pub fn new(initial: HealthSnapshot) -> Self {
        Self {
            inner: Mutex::new(MockProbeInner {
                current: initial,
                read_errors: VecDeque::new(),
                read_delay: None,
                forwards: Vec::new(),
                read_count: 0,
            }),
        }
    }

    /// Replace the reading returned by subsequent `read` calls.
    pub fn set_reading(&self, snapshot: HealthSnapshot) {
        self.lock().current = snapshot;
    }

    /// Queue an error for the next `read` call.
    pub fn fail_next_read(&self, error: ProbeError) {
        self.lock().read_errors.push_back(error);
    }

    /// Delay every `read` by `dur` (tokio clock).
    pub fn set_read_delay(&self, dur: Duration) {
        self.lock().read_delay = Some(dur);
    }

    /// Update the reading and push it through every registered forwarder,
    /// as an OS change callback would.
    pub fn fire_change(&self, snapshot: HealthSnapshot) {
        let mut g = self.lock();
        g.current = snapshot;
        g.forwards
            .retain(|tx| match tx.try_send(snapshot) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
    }

    pub fn read_count(&self) -> u64 {
        self.lock().read_count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockProbeInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockProbe {
    fn default() -> Self {
        Self::new(HealthSnapshot::default())
    }
}

impl DeviceProbe for MockProbe {
    fn read(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<HealthSnapshot, ProbeError>> + Send + '_>> {
        let (result, delay) = {
            let mut g = self.lock();
            g.read_count += 1;
            let result = match g.read_errors.pop_front() {
                Some(e) => Err(e),
                None => Ok(g.current),
            };
            (result, g.read_delay)
        };
        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            result
        })
    }

    fn on_change(&self, forward: mpsc::Sender<HealthSnapshot>) {
        self.lock().forwards.push(forward);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ThermalState;

    #[tokio::test]
    async fn read_returns_current_reading() {
        let probe = MockProbe::default();
        let snap = probe.read().await.unwrap();
        assert!(!snap.is_critical());
        assert_eq!(probe.read_count(), 1);

        probe.set_reading(HealthSnapshot {
            battery_level: 0.2,
            ..HealthSnapshot::default()
        });
        let snap = probe.read().await.unwrap();
        assert!((snap.battery_level - 0.2).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn queued_error_consumed_once() {
        let probe = MockProbe::default();
        probe.fail_next_read(ProbeError::ReadFailed("sensor offline".into()));
        assert!(probe.read().await.is_err());
        assert!(probe.read().await.is_ok());
    }

    #[tokio::test]
    async fn fire_change_reaches_registered_forwarders() {
        let probe = MockProbe::default();
        let (tx, mut rx) = mpsc::channel(4);
        probe.on_change(tx);

        probe.fire_change(HealthSnapshot {
            thermal: ThermalState::Serious,
            ..HealthSnapshot::default()
        });
        let snap = rx.recv().await.unwrap();
        assert_eq!(snap.thermal, ThermalState::Serious);

        // The same snapshot is now the current reading too.
        assert_eq!(probe.read().await.unwrap().thermal, ThermalState::Serious);
    }

    #[tokio::test]
    async fn dropped_forwarders_are_pruned() {
        let probe = MockProbe::default();
        let (tx, rx) = mpsc::channel(4);
        probe.on_change(tx);
        drop(rx);

        probe.fire_change(HealthSnapshot::default());
        probe.fire_change(HealthSnapshot::default());
        // No panic, no growth: the closed sender was dropped on first fire.
        assert_eq!(probe.lock().forwards.len(), 0);
    }
}
