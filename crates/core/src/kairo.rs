use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientMetrics, NetworkClient};
use crate::config::KairoConfig;
use crate::health::{DeviceProbe, HealthMonitor};
use crate::policy::{Admission, PolicyEngine, admission};
use crate::stream::{HealthStream, PolicyStream};
use crate::types::{HealthSnapshot, ImageVariant, OperationKind, Policy};
use kairo_net::Transport;

/// Broadcast buffer for recomputed policies.
const POLICY_STREAM_CAPACITY: usize = 16;

/// Top-level runtime: owns the monitor, the policy engine, and the network
/// client, and wires snapshots into policies.
///
/// One spawned task subscribes to the health stream; for every published
/// snapshot it recomputes the policy, pushes it to the client (resizing the
/// gate), and broadcasts it to policy subscribers.
pub struct Kairo {
    cfg: KairoConfig,
    monitor: HealthMonitor,
    engine: Arc<Mutex<PolicyEngine>>,
    client: Arc<NetworkClient>,
    policy_tx: Option<broadcast::Sender<Policy>>,
    policy_current_tx: watch::Sender<Policy>,
    policy_current_rx: watch::Receiver<Policy>,
    client_token: CancellationToken,
    token: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl Kairo {
    pub fn new(cfg: KairoConfig, probe: Arc<dyn DeviceProbe>, transport: Arc<dyn Transport>) -> Self {
        let monitor = HealthMonitor::new(probe, &cfg);
        let client_token = CancellationToken::new();
        let client = Arc::new(NetworkClient::new(
            transport,
            &cfg,
            monitor.watch_current(),
            client_token.clone(),
        ));
        let engine = Arc::new(Mutex::new(PolicyEngine::new(&cfg)));
        let (policy_current_tx, policy_current_rx) =
            watch::channel(Policy::for_level(crate::types::HealthLevel::High, cfg.network_max_concurrent));
        Self {
            cfg,
            monitor,
            engine,
            client,
            policy_tx: None,
            policy_current_tx,
            policy_current_rx,
            client_token,
            token: None,
            task: None,
        }
    }

    /// Start the monitor and the policy recomputation task. Idempotent.
    pub async fn start(&mut self) {
        if self.token.is_some() {
            return;
        }
        self.monitor.start().await;

        let token = CancellationToken::new();
        let (policy_tx, _) = broadcast::channel(POLICY_STREAM_CAPACITY);

        let engine = Arc::clone(&self.engine);
        let client = Arc::clone(&self.client);
        let policy_current = self.policy_current_tx.clone();
        let tx = policy_tx.clone();
        let mut stream = self.monitor.stream();
        let task_token = token.clone();

        self.task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    snapshot = stream.recv() => match snapshot {
                        Some(snapshot) => {
                            let policy = {
                                let mut e = engine.lock().unwrap_or_else(|p| p.into_inner());
                                e.evaluate(&snapshot)
                            };
                            // Gate resize lands before the policy becomes
                            // visible to subscribers.
                            client.update_policy(policy);
                            policy_current.send_replace(policy);
                            let _ = tx.send(policy);
                        }
                        None => break,
                    }
                }
            }
        }));
        self.policy_tx = Some(policy_tx);
        self.token = Some(token);
        tracing::info!("kairo started");
    }

    /// Stop subsystems in reverse start order and close both streams.
    /// Idempotent.
    pub async fn stop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        // Dropping the sender drains the policy stream for subscribers.
        self.policy_tx = None;
        self.client.shutdown();
        self.monitor.stop().await;
        tracing::info!("kairo stopped");
    }

    pub fn current_health(&self) -> HealthSnapshot {
        self.monitor.current()
    }

    pub fn current_policy(&self) -> Policy {
        *self.policy_current_rx.borrow()
    }

    pub fn health_stream(&self) -> HealthStream {
        self.monitor.stream()
    }

    pub fn policy_stream(&self) -> PolicyStream {
        PolicyStream::new(
            Some(self.current_policy()),
            self.policy_tx.as_ref().map(|tx| tx.subscribe()),
        )
    }

    /// May the caller run `op` right now? Never errors; denials are logged.
    pub fn should_allow(&self, op: OperationKind) -> bool {
        let snapshot = self.current_health();
        let policy = self.current_policy();
        match admission::check(&op, &snapshot, &policy, self.cfg.low_battery_threshold) {
            Admission::Allowed => true,
            Admission::Denied(reason) => {
                tracing::debug!(op = op.as_str(), ?reason, "operation denied");
                false
            }
        }
    }

    pub fn recommended_image_quality(&self) -> ImageVariant {
        self.current_policy().image_variant
    }

    pub fn max_concurrent_requests(&self) -> u32 {
        self.current_policy().max_network_concurrent
    }

    pub fn allow_background_ml(&self) -> bool {
        self.current_policy().allow_background_ml
    }

    /// The request execution layer, for submitting traffic directly.
    pub fn client(&self) -> &Arc<NetworkClient> {
        &self.client
    }

    pub fn metrics(&self) -> ClientMetrics {
        self.client.get_metrics()
    }
}

impl Drop for Kairo {
    fn drop(&mut self) {
        // Best-effort teardown for a façade dropped without stop().
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        self.client_token.cancel();
    }
}
