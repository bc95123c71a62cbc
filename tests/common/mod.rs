//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use canvas_bridge::{Bridge, BridgeConfig, SimulatedEngine};
use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(100)
}

/// Bridge over a fresh simulated engine; the engine handle observes the same state
pub fn simulated_bridge() -> (Bridge, SimulatedEngine) {
    let engine = SimulatedEngine::new();
    let bridge = Bridge::with_virtual_midi(BridgeConfig::default(), engine.clone());
    (bridge, engine)
}

/// Bridge with a custom configuration
pub fn simulated_bridge_with(config: BridgeConfig) -> (Bridge, SimulatedEngine) {
    let engine = SimulatedEngine::new();
    let bridge = Bridge::with_virtual_midi(config, engine.clone());
    (bridge, engine)
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    condition()
}
