use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::KairoConfig;
use crate::health::debounce::{DebounceWindow, significant_change};
use crate::health::probe::DeviceProbe;
use crate::stream::HealthStream;
use crate::types::HealthSnapshot;

/// Broadcast buffer for published snapshots; slow subscribers skip forward.
const STREAM_CAPACITY: usize = 32;
/// Buffer for probe change callbacks before the monitor task drains them.
const CHANGE_CAPACITY: usize = 16;

/// Long-lived observer producing a deduplicated, debounced snapshot stream.
///
/// All monitor state lives on its spawned task; the handle only holds the
/// channels. Probe change callbacks arrive through an mpsc channel so foreign
/// callback threads never touch task state.
pub struct HealthMonitor {
    probe: Arc<dyn DeviceProbe>,
    tick_period: Duration,
    debounce: Duration,
    current_tx: watch::Sender<HealthSnapshot>,
    current_rx: watch::Receiver<HealthSnapshot>,
    stream_tx: Option<broadcast::Sender<HealthSnapshot>>,
    token: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    pub fn new(probe: Arc<dyn DeviceProbe>, cfg: &KairoConfig) -> Self {
        let (current_tx, current_rx) = watch::channel(HealthSnapshot::default());
        Self {
            probe,
            tick_period: cfg.tick_period(),
            debounce: cfg.debounce(),
            current_tx,
            current_rx,
            stream_tx: None,
            token: None,
            task: None,
        }
    }

    /// Start periodic and event-driven probing. An initial snapshot is
    /// published immediately. Idempotent.
    pub async fn start(&mut self) {
        if self.token.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let (stream_tx, _) = broadcast::channel(STREAM_CAPACITY);
        let (change_tx, change_rx) = mpsc::channel(CHANGE_CAPACITY);
        self.probe.on_change(change_tx);

        let initial = match tokio::time::timeout(self.tick_period * 2, self.probe.read()).await {
            Ok(Ok(snap)) => snap,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "initial probe read failed, starting from defaults");
                *self.current_rx.borrow()
            }
            Err(_) => {
                tracing::warn!("initial probe read timed out, starting from defaults");
                *self.current_rx.borrow()
            }
        };
        self.current_tx.send_replace(initial);
        let _ = stream_tx.send(initial);

        let task = MonitorTask {
            probe: Arc::clone(&self.probe),
            tick_period: self.tick_period,
            window: DebounceWindow::new(self.debounce),
            current_tx: self.current_tx.clone(),
            stream_tx: stream_tx.clone(),
            last_published: initial,
            token: token.clone(),
        };
        self.task = Some(tokio::spawn(task.run(change_rx)));
        self.stream_tx = Some(stream_tx);
        self.token = Some(token);
        tracing::info!(
            tick_ms = self.tick_period.as_millis() as u64,
            debounce_ms = self.debounce.as_millis() as u64,
            "health monitor started"
        );
    }

    /// Stop probing and close the snapshot stream. Idempotent.
    pub async fn stop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        // Last sender dropped here: subscribers observe end of stream.
        self.stream_tx = None;
        tracing::info!("health monitor stopped");
    }

    /// Latest snapshot, non-blocking.
    pub fn current(&self) -> HealthSnapshot {
        *self.current_rx.borrow()
    }

    /// Watch handle over the latest snapshot, for in-process composition.
    pub fn watch_current(&self) -> watch::Receiver<HealthSnapshot> {
        self.current_rx.clone()
    }

    /// Subscribe to published snapshots. The current snapshot is delivered
    /// first; after `stop` the stream ends.
    pub fn stream(&self) -> HealthStream {
        HealthStream::new(
            Some(self.current()),
            self.stream_tx.as_ref().map(|tx| tx.subscribe()),
        )
    }
}

struct MonitorTask {
    probe: Arc<dyn DeviceProbe>,
    tick_period: Duration,
    window: DebounceWindow,
    current_tx: watch::Sender<HealthSnapshot>,
    stream_tx: broadcast::Sender<HealthSnapshot>,
    last_published: HealthSnapshot,
    token: CancellationToken,
}

impl MonitorTask {
    async fn run(mut self, mut change_rx: mpsc::Receiver<HealthSnapshot>) {
        let token = self.token.clone();
        let start = tokio::time::Instant::now() + self.tick_period;
        let mut ticker = tokio::time::interval_at(start, self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Some(snap) = self.read_probe().await {
                        self.consider(snap);
                    }
                }
                Some(snap) = change_rx.recv() => {
                    self.consider(snap);
                }
                _ = Self::until(self.window.deadline()), if self.window.is_pending() => {
                    if let Some(snap) = self.window.take_ready() {
                        self.publish(snap);
                    }
                }
            }
        }
    }

    async fn until(deadline: Option<tokio::time::Instant>) {
        match deadline {
            Some(d) => tokio::time::sleep_until(d).await,
            None => std::future::pending().await,
        }
    }

    /// Read the probe under the 2×tick deadline. `None` means keep the
    /// previous snapshot.
    async fn read_probe(&self) -> Option<HealthSnapshot> {
        match tokio::time::timeout(self.tick_period * 2, self.probe.read()).await {
            Ok(Ok(snap)) => Some(snap),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "probe read failed, keeping previous snapshot");
                None
            }
            Err(_) => {
                tracing::warn!("probe read exceeded deadline, keeping previous snapshot");
                None
            }
        }
    }

    fn consider(&mut self, candidate: HealthSnapshot) {
        if !significant_change(&self.last_published, &candidate) {
            tracing::trace!("candidate below significance thresholds, dropped");
            return;
        }
        if let Some(immediate) = self.window.push(candidate) {
            self.publish(immediate);
        }
    }

    fn publish(&mut self, snapshot: HealthSnapshot) {
        self.last_published = snapshot;
        self.current_tx.send_replace(snapshot);
        // No subscribers is fine.
        let _ = self.stream_tx.send(snapshot);
        tracing::debug!(
            score = snapshot.health_score(),
            critical = snapshot.is_critical(),
            "health snapshot published"
        );
    }
}
