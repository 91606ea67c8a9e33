//! Full supervised sessions against the simulated vehicle.

use std::sync::Arc;
use std::time::Duration;

use vehicle_supervisor::command::Directive;
use vehicle_supervisor::config::Config;
use vehicle_supervisor::heartbeat::LivenessState;
use vehicle_supervisor::supervisor::{EndReason, Supervisor};
use vehicle_supervisor::transport::sim::{SimPose, SimulatedVehicle};
use vehicle_supervisor::transport::{TurnDirection, VehicleCommand};

fn fast_config() -> Config {
    let mut config = Config::default();
    config.session.duration_s = 2;
    config.session.join_timeout_ms = 2000;
    config.workers.poll_interval_ms = 20;
    config.heartbeat.period_ms = 100;
    config.telemetry.cycle_budget_ms = 200;
    config.telemetry.message_timeout_ms = 20;
    config
}

#[test]
fn test_shipped_config_loads() {
    let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml")).unwrap();
    assert_eq!(config.session.duration_s, 100);
    assert_eq!(config.command.count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_level_vehicle_turns_counter_clockwise() {
    let vehicle = Arc::new(SimulatedVehicle::with_telemetry_interval(
        SimPose {
            z: 1.0,
            ..SimPose::default()
        },
        Duration::from_millis(20),
    ));
    let supervisor = Supervisor::new(fast_config(), vehicle.clone());
    supervisor.connect().await.unwrap();

    let report = supervisor.run_until(std::future::pending()).await.unwrap();
    assert_eq!(report.reason, EndReason::DurationElapsed);
    assert!(report.workers.is_clean());

    // Already at altitude: the first correction is a 45° turn to the left
    match vehicle.commands().first() {
        Some(VehicleCommand::ConditionYaw {
            angle_deg,
            direction,
            relative,
        }) => {
            assert!((angle_deg - 45.0).abs() < 1e-9);
            assert_eq!(*direction, TurnDirection::CounterClockwise);
            assert!(*relative);
        }
        other => panic!("unexpected first command {:?}", other),
    }
    assert!(matches!(
        report.last_directive,
        Some(Directive::YawChange { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_silent_vehicle_reported_disconnected() {
    let vehicle = Arc::new(SimulatedVehicle::new(SimPose::default()));
    vehicle.set_heartbeat_enabled(false);
    vehicle.set_telemetry_enabled(false);

    let supervisor = Supervisor::new(fast_config(), vehicle.clone());
    let report = supervisor.run_until(std::future::pending()).await.unwrap();

    assert_eq!(report.last_liveness, Some(LivenessState::Disconnected));
    assert_eq!(report.directives, 0);
    assert!(vehicle.commands().is_empty());
    assert!(vehicle.heartbeats_received() > 0);
    assert!(report.workers.is_clean());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_multiple_workers_per_role() {
    let mut config = fast_config();
    config.session.duration_s = 1;
    config.heartbeat.receiver_count = 2;
    config.telemetry.count = 3;
    config.command.count = 2;
    config.command.queue_size = 0;

    let vehicle = Arc::new(SimulatedVehicle::new(SimPose::default()));
    let supervisor = Supervisor::new(config, vehicle);
    let report = supervisor.run_until(std::future::pending()).await.unwrap();

    assert_eq!(report.workers.finished, 1 + 2 + 3 + 2);
    assert!(report.workers.is_clean());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_vanished_vehicle_ends_session() {
    let vehicle = Arc::new(SimulatedVehicle::new(SimPose::default()));
    let mut config = fast_config();
    config.session.duration_s = 60;
    let supervisor = Supervisor::new(config, vehicle.clone());

    let switch = vehicle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        switch.set_peer_present(false);
    });

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        supervisor.run_until(std::future::pending()),
    )
    .await
    .expect("session should end when the vehicle vanishes")
    .unwrap();
    assert_eq!(report.reason, EndReason::PeerLost);
}
