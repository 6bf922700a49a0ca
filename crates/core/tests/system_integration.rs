//! End-to-end tests for the full closed loop without real devices or sockets:
//! MockProbe → HealthMonitor → PolicyEngine → NetworkClient (MockTransport).

use std::sync::Arc;
use std::time::Duration;

use kairo_core::config::KairoConfig;
use kairo_core::health::{DeviceProbe, MockProbe};
use kairo_core::types::{
    HealthLevel, HealthSnapshot, OperationKind, RequestPriority, ThermalState,
};
use kairo_core::{Kairo, NetworkError, NetworkRequest};
use kairo_net::{MockTransport, Transport};

fn rig() -> (Kairo, Arc<MockProbe>, Arc<MockTransport>) {
    let probe = Arc::new(MockProbe::default());
    let transport = Arc::new(MockTransport::new());
    let kairo = Kairo::new(
        KairoConfig::default(),
        Arc::clone(&probe) as Arc<dyn DeviceProbe>,
        Arc::clone(&transport) as Arc<dyn Transport>,
    );
    (kairo, probe, transport)
}

fn snap(battery: f64) -> HealthSnapshot {
    HealthSnapshot {
        battery_level: battery,
        ..HealthSnapshot::default()
    }
}

/// Degradation walks the policy down; recovery climbs one level per
/// published snapshot.
#[tokio::test(start_paused = true)]
async fn degradation_and_staged_recovery() {
    let (mut kairo, probe, _transport) = rig();
    kairo.start().await;
    let mut policies = kairo.policy_stream();
    assert_eq!(policies.recv().await.unwrap().health_level, HealthLevel::High);

    // Battery sag + thermal pressure: score ≈ 0.46, High → Medium.
    probe.fire_change(HealthSnapshot {
        battery_level: 0.10,
        low_power_mode: true,
        thermal: ThermalState::Serious,
        ..HealthSnapshot::default()
    });
    tokio::time::advance(Duration::from_millis(400)).await;
    let policy = policies.recv().await.unwrap();
    assert_eq!(policy.health_level, HealthLevel::Medium);
    assert_eq!(kairo.client().gate_status().max, 3);

    // Thermal runaway: critical bypasses the debounce window.
    probe.fire_change(HealthSnapshot {
        thermal: ThermalState::Critical,
        ..snap(0.10)
    });
    let policy = policies.recv().await.unwrap();
    assert_eq!(policy.health_level, HealthLevel::Critical);
    assert_eq!(policy.max_network_concurrent, 1);
    assert_eq!(kairo.client().gate_status().max, 1);

    // Recovery: each healthy publish climbs exactly one level.
    let mut expected = [HealthLevel::Low, HealthLevel::Medium, HealthLevel::High].into_iter();
    for battery in [1.0, 0.8, 1.0] {
        probe.fire_change(snap(battery));
        tokio::time::advance(Duration::from_millis(400)).await;
        let policy = policies.recv().await.unwrap();
        assert_eq!(policy.health_level, expected.next().unwrap());
    }
    assert_eq!(kairo.max_concurrent_requests(), 6);

    kairo.stop().await;
}

/// Requests honor the live policy: a critical device rejects normal traffic
/// at admission but critical traffic still executes.
#[tokio::test(start_paused = true)]
async fn requests_follow_live_policy() {
    let (mut kairo, probe, transport) = rig();
    kairo.start().await;
    let mut policies = kairo.policy_stream();
    policies.recv().await.unwrap();

    probe.fire_change(HealthSnapshot {
        thermal: ThermalState::Critical,
        ..HealthSnapshot::default()
    });
    assert_eq!(
        policies.recv().await.unwrap().health_level,
        HealthLevel::Critical
    );

    let denied = kairo
        .client()
        .request(NetworkRequest::get("https://device.example/sync"))
        .await;
    assert_eq!(denied.unwrap_err(), NetworkError::Cancelled);
    assert_eq!(transport.calls(), 0);
    assert!(!kairo.should_allow(OperationKind::BackgroundTask));

    transport.respond(200, b"emergency".to_vec());
    let resp = kairo
        .client()
        .request(
            NetworkRequest::get("https://device.example/sos")
                .with_priority(RequestPriority::Critical),
        )
        .await
        .unwrap();
    assert!(resp.is_success());
    assert_eq!(resp.body, b"emergency");

    kairo.stop().await;
}

/// A request retried through the breaker still lands in the façade metrics.
#[tokio::test(start_paused = true)]
async fn request_cycle_with_retries_and_metrics() {
    let (mut kairo, _probe, transport) = rig();
    kairo.start().await;

    transport.respond(503, Vec::new());
    transport.respond(200, b"done".to_vec());

    let resp = kairo
        .client()
        .request(NetworkRequest::get("https://device.example/upload"))
        .await
        .unwrap();
    assert_eq!(resp.retry_count, 1);

    let metrics = kairo.metrics();
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.total_successes, 1);
    assert_eq!(metrics.for_priority(RequestPriority::Normal).successes, 1);

    kairo.client().reset_metrics();
    assert_eq!(kairo.metrics().total_requests, 0);

    kairo.stop().await;
}

/// Rapid changes inside the debounce window collapse into one publish
/// carrying the final state.
#[tokio::test(start_paused = true)]
async fn rapid_changes_publish_once() {
    let (mut kairo, probe, _transport) = rig();
    kairo.start().await;
    let mut health = kairo.health_stream();
    health.recv().await.unwrap();

    for battery in [0.7, 0.5, 0.3] {
        probe.fire_change(snap(battery));
        tokio::time::advance(Duration::from_millis(50)).await;
    }
    tokio::time::advance(Duration::from_millis(351)).await;

    let published = health.recv().await.unwrap();
    assert!((published.battery_level - 0.3).abs() < f64::EPSILON);
    // Nothing else is pending.
    assert!(
        tokio::time::timeout(Duration::ZERO, health.recv())
            .await
            .is_err()
    );

    kairo.stop().await;
}

/// Under a Low policy the gate admits one request at a time; concurrent
/// submissions all complete, serialized.
#[tokio::test(start_paused = true)]
async fn low_policy_serializes_requests() {
    let (mut kairo, _probe, transport) = rig();
    kairo.start().await;

    kairo
        .client()
        .update_policy(kairo_core::types::Policy::for_level(HealthLevel::Low, 6));
    assert_eq!(kairo.client().gate_status().max, 1);

    transport.set_delay(Duration::from_millis(100));
    let mut handles = Vec::new();
    for i in 0..3 {
        let client = Arc::clone(kairo.client());
        handles.push(tokio::spawn(async move {
            client
                .request(NetworkRequest::get(format!("https://device.example/{i}")))
                .await
        }));
    }
    for h in handles {
        assert!(h.await.unwrap().is_ok());
    }
    assert_eq!(transport.calls(), 3);
    assert_eq!(kairo.client().gate_status().in_use, 0);
    assert_eq!(kairo.metrics().total_successes, 3);

    kairo.stop().await;
}

/// Stop ends both streams and cancels the execution layer.
#[tokio::test(start_paused = true)]
async fn stop_tears_everything_down() {
    let (mut kairo, _probe, transport) = rig();
    kairo.start().await;
    let mut health = kairo.health_stream();
    let mut policies = kairo.policy_stream();
    health.recv().await.unwrap();
    policies.recv().await.unwrap();

    kairo.stop().await;

    assert!(health.recv().await.is_none());
    assert!(policies.recv().await.is_none());

    transport.respond(200, Vec::new());
    let err = kairo
        .client()
        .request(NetworkRequest::get("https://device.example/late"))
        .await
        .unwrap_err();
    assert_eq!(err, NetworkError::Cancelled);
    assert_eq!(transport.calls(), 0);
}
