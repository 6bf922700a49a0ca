//! Multi-consumer subscriptions over broadcast channels.

use tokio::sync::broadcast;

use crate::types::{HealthSnapshot, Policy};

/// A subscription handle: yields the value captured at subscription time
/// first, then every subsequent broadcast. Dropping the handle unregisters
/// the subscriber.
pub struct Subscription<T: Clone> {
    first: Option<T>,
    rx: Option<broadcast::Receiver<T>>,
}

impl<T: Clone + Send> Subscription<T> {
    pub(crate) fn new(first: Option<T>, rx: Option<broadcast::Receiver<T>>) -> Self {
        Self { first, rx }
    }

    /// Next value, or `None` once the channel has closed and all buffered
    /// values were consumed. A subscriber that falls behind the buffer skips
    /// forward to the oldest retained value.
    pub async fn recv(&mut self) -> Option<T> {
        if let Some(v) = self.first.take() {
            return Some(v);
        }
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(v) => return Some(v),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagged, skipping forward");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Stream of published health snapshots.
pub type HealthStream = Subscription<HealthSnapshot>;
/// Stream of recomputed policies.
pub type PolicyStream = Subscription<Policy>;
