//! Integration tests for stepping and telemetry
//!
//! These tests validate the poll cycle end to end:
//! - Snapshots are immutable and only replaced by a tick
//! - Subscribers see every published snapshot
//! - Free-running stops cleanly and keeps the last snapshot

mod common;

use canvas_bridge::config::{BridgeConfig, TelemetryPolicy};
use canvas_bridge::registry::BlockKind;
use canvas_bridge::{BlockStatus, Position, Wire};
use common::builders::machine;
use serial_test::serial;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_snapshot_is_stable_between_ticks() {
    let (mut bridge, _engine) = common::simulated_bridge();
    bridge.add_node(BlockKind::Machine, Position::default()).unwrap();

    bridge.scheduler().step_once();
    let first = bridge.telemetry().snapshot();
    let again = bridge.telemetry().snapshot();
    assert!(Arc::ptr_eq(&first, &again));

    bridge.scheduler().step_once();
    let second = bridge.telemetry().snapshot();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.tick, first.tick + 1);
}

#[test]
fn test_subscribers_see_each_tick() {
    let (mut bridge, _engine) = common::simulated_bridge();
    let cpu = bridge.add_node(BlockKind::Machine, Position::default()).unwrap();

    let seen = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&seen);
    let subscription = bridge.telemetry().subscribe(move |snapshot| {
        assert!(snapshot.get(cpu).is_some());
        counter.fetch_add(1, Ordering::SeqCst);
    });

    bridge.scheduler().step_once();
    bridge.scheduler().step_once();
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    assert!(bridge.telemetry().unsubscribe(subscription));
    bridge.scheduler().step_once();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[test]
fn test_invalid_program_is_flagged() {
    let (mut bridge, _engine) = common::simulated_bridge();
    let cpu = bridge
        .add_node_with(machine("jump nowhere"), Position::default())
        .unwrap();

    bridge.scheduler().step_once();
    let indicators = bridge.indicators(cpu).unwrap();
    assert!(indicators.errored);
    assert!(!indicators.halted);
}

#[test]
fn test_backpressure_threshold_from_config() {
    let mut config = BridgeConfig::default();
    config.telemetry = TelemetryPolicy {
        backpressure_threshold: 1,
        emission_threshold: 1,
    };
    let (mut bridge, _engine) = common::simulated_bridge_with(config);

    let source = bridge
        .add_node_with(
            machine("push 1\nsend\npush 2\nsend\npush 3\nsend"),
            Position::default(),
        )
        .unwrap();
    // Halts immediately, so its inbox only grows
    let sink = bridge
        .add_node_with(machine("halt"), Position::default())
        .unwrap();
    assert!(bridge.connect(Wire::new(source, 0, sink, 0)));

    for _ in 0..6 {
        bridge.scheduler().step_once();
    }

    let state = bridge.telemetry().get(sink).unwrap();
    assert_eq!(state.status, BlockStatus::Halted);
    assert_eq!(state.inbox_size, 3);
    assert!(bridge.indicators(sink).unwrap().backpressuring);
    assert!(!bridge.indicators(source).unwrap().backpressuring);
}

#[test]
#[serial]
fn test_free_running_advances_and_stops() {
    let mut config = BridgeConfig::default();
    config.scheduler.step_rate_hz = 200;
    let (mut bridge, engine) = common::simulated_bridge_with(config);
    bridge.add_node(BlockKind::Machine, Position::default()).unwrap();

    assert!(bridge.scheduler().start());
    assert!(!bridge.scheduler().start());
    thread::sleep(common::test_timeout());
    assert!(bridge.scheduler().stop());
    assert!(!bridge.scheduler().is_running());

    let steps = engine.step_count();
    assert!(steps > 0);
    let last = bridge.telemetry().snapshot();

    thread::sleep(Duration::from_millis(30));
    assert_eq!(engine.step_count(), steps);
    assert!(Arc::ptr_eq(&last, &bridge.telemetry().snapshot()));
    assert_eq!(bridge.scheduler().step_count(), steps);
}

#[test]
#[serial]
fn test_dropping_bridge_stops_worker() {
    let (mut bridge, engine) = common::simulated_bridge();
    bridge.add_node(BlockKind::Machine, Position::default()).unwrap();
    bridge.scheduler().start();
    thread::sleep(Duration::from_millis(20));

    drop(bridge);
    let steps = engine.step_count();
    thread::sleep(Duration::from_millis(40));
    assert_eq!(engine.step_count(), steps);
}
