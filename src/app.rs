//! Application wiring
//!
//! [`Bridge`] builds every component from a [`BridgeConfig`] and owns them
//! for the lifetime of an editor session:
//!
//! ```text
//! EngineClient ─┬─> TelemetryPoller ──> TelemetryStore (Arc, injected)
//!               ├─> Scheduler (Stepper)
//!               ├─> MidiRouter ──> Scheduler
//!               └─> GraphSynchronizer ──> MidiRouter, TelemetryPoller
//! ```
//!
//! UI handlers call into the bridge; the UI renders from
//! [`Bridge::telemetry`] and [`Bridge::graph`].

use crate::commands::{self, CommandContext, Palette, PaletteCommand};
use crate::config::BridgeConfig;
use crate::engine::{Engine, EngineClient};
use crate::error::Result;
use crate::graph::{Graph, GraphSynchronizer};
use crate::midi::{MidiDevice, MidiRouter, VirtualMidiDevice};
use crate::registry::{BlockConfig, BlockKind, BlockPatch};
use crate::telemetry::{Scheduler, TelemetryPoller, TelemetryStore};
use crate::types::{BlockId, BlockIndicators, Position, Wire};
use crate::view::{self, ValueDisplay};
use std::sync::Arc;
use std::time::Duration;

/// One editor session's bridge between UI, engine and MIDI input
pub struct Bridge {
    config: BridgeConfig,
    engine: EngineClient,
    store: Arc<TelemetryStore>,
    scheduler: Arc<Scheduler>,
    router: MidiRouter,
    graph: GraphSynchronizer,
    palette: Palette,
}

impl Bridge {
    /// Build a bridge over `engine` and `device`
    pub fn new(
        config: BridgeConfig,
        engine: impl Engine + 'static,
        device: Arc<dyn MidiDevice>,
    ) -> Self {
        let engine = EngineClient::new(engine);
        let store = Arc::new(TelemetryStore::new());
        let poller = Arc::new(TelemetryPoller::new(engine.clone(), Arc::clone(&store)));
        let scheduler = Arc::new(Scheduler::new(
            engine.clone(),
            Arc::clone(&poller),
            config.scheduler.clone(),
        ));
        let router = MidiRouter::new(engine.clone(), scheduler.clone(), device);
        let graph = GraphSynchronizer::new(engine.clone(), poller, router.clone());

        tracing::info!(
            "Bridge ready (MIDI device: {}, step rate: {} Hz)",
            router.device_name(),
            config.scheduler.step_rate_hz
        );

        Self {
            config,
            engine,
            store,
            scheduler,
            router,
            graph,
            palette: Palette::new(),
        }
    }

    /// Build a bridge with a [`VirtualMidiDevice`] exposing the configured ports
    pub fn with_virtual_midi(config: BridgeConfig, engine: impl Engine + 'static) -> Self {
        let device = VirtualMidiDevice::new(config.midi.ports.iter().copied())
            .with_latency(Duration::from_millis(config.midi.open_latency_ms));
        Self::new(config, engine, Arc::new(device))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn engine(&self) -> &EngineClient {
        &self.engine
    }

    /// Shared telemetry store for UI subscribers
    pub fn telemetry(&self) -> &Arc<TelemetryStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn router(&self) -> &MidiRouter {
        &self.router
    }

    pub fn graph(&self) -> &Graph {
        self.graph.graph()
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn palette_mut(&mut self) -> &mut Palette {
        &mut self.palette
    }

    pub fn add_node(&mut self, kind: BlockKind, position: Position) -> Option<BlockId> {
        self.graph.add_node(kind, position)
    }

    pub fn add_node_with(&mut self, config: BlockConfig, position: Position) -> Option<BlockId> {
        self.graph.add_node_with(config, position)
    }

    pub fn update_node(&mut self, id: BlockId, patch: BlockPatch) -> Result<()> {
        self.graph.update_node(id, patch)
    }

    pub fn remove_node(&mut self, id: BlockId) -> bool {
        self.graph.remove_node(id)
    }

    pub fn connect(&mut self, wire: Wire) -> bool {
        self.graph.connect(wire)
    }

    pub fn disconnect(&mut self, wire: Wire) -> bool {
        self.graph.disconnect(wire)
    }

    pub fn move_node(&mut self, id: BlockId, position: Position) -> Result<()> {
        self.graph.move_node(id, position)
    }

    /// Reload a machine and start free-running (shift+enter in the editor)
    pub fn reload_and_run(&mut self, id: BlockId) -> Result<()> {
        self.graph.reload(id)?;
        self.scheduler.start();
        Ok(())
    }

    pub fn toggle_bit(&self, viewer: BlockId, index: usize, bit: u8) -> Result<u16> {
        self.graph.toggle_bit(viewer, index, bit)
    }

    /// Run a palette command directly
    pub fn run_command(&mut self, command: &PaletteCommand, position: Position) -> bool {
        let mut ctx = CommandContext {
            graph: &mut self.graph,
            scheduler: &self.scheduler,
        };
        commands::run(command, position, &mut ctx)
    }

    /// Confirm the palette's current selection
    pub fn confirm_palette(&mut self, position: Position) -> bool {
        let mut ctx = CommandContext {
            graph: &mut self.graph,
            scheduler: &self.scheduler,
        };
        self.palette.confirm(position, &mut ctx)
    }

    /// Indicators for one block under the configured policy
    pub fn indicators(&self, id: BlockId) -> Option<BlockIndicators> {
        self.store
            .get(id)
            .map(|state| state.indicators(&self.config.telemetry))
    }

    /// Formatted contents of a value viewer
    pub fn value_display(&self, viewer: BlockId) -> Option<ValueDisplay> {
        let node = self.graph.graph().node(viewer)?;
        let BlockConfig::ValueView(config) = &node.config else {
            return None;
        };
        let payload = self
            .store
            .get(viewer)
            .map(|state| state.payload)
            .unwrap_or_default();
        Some(view::format_values(&config.visual, &payload))
    }

    /// Stop the scheduler
    pub fn shutdown(&self) {
        self.scheduler.stop();
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("engine", &self.engine)
            .field("graph", &self.graph)
            .field("router", &self.router)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SimulatedEngine;
    use crate::registry::{ValueViewConfig, VisualMode};

    fn bridge() -> (Bridge, SimulatedEngine) {
        let engine = SimulatedEngine::new();
        (
            Bridge::with_virtual_midi(BridgeConfig::default(), engine.clone()),
            engine,
        )
    }

    #[test]
    fn test_indicators_follow_policy() {
        let (mut bridge, _engine) = bridge();
        let id = bridge.add_node(BlockKind::Machine, Position::default()).unwrap();
        bridge.scheduler().step_once();
        bridge.scheduler().step_once();

        let indicators = bridge.indicators(id).unwrap();
        assert!(indicators.halted);
        assert!(!indicators.errored);
    }

    #[test]
    fn test_value_display_of_machine_memory() {
        let (mut bridge, _engine) = bridge();
        let machine = bridge.add_node(BlockKind::Machine, Position::default()).unwrap();
        bridge.engine().set_memory(machine, 0, &[0xAB]);

        let viewer = bridge
            .add_node_with(
                BlockConfig::ValueView(ValueViewConfig {
                    target: machine,
                    visual: VisualMode::Bytes,
                    ..Default::default()
                }),
                Position::default(),
            )
            .unwrap();

        assert_eq!(bridge.value_display(viewer), Some(ValueDisplay::Missing));
        bridge.scheduler().step_once();
        assert_eq!(
            bridge.value_display(viewer),
            Some(ValueDisplay::Hex(vec!["00AB".to_string()]))
        );
        assert_eq!(bridge.value_display(machine), None);
    }

    #[test]
    fn test_reload_and_run_starts_scheduler() {
        let (mut bridge, engine) = bridge();
        let machine = bridge.add_node(BlockKind::Machine, Position::default()).unwrap();
        bridge.reload_and_run(machine).unwrap();
        assert!(bridge.scheduler().is_running());
        bridge.shutdown();
        assert!(!bridge.scheduler().is_running());
        assert_eq!(
            engine.loaded_source(machine).as_deref(),
            Some(crate::registry::DEFAULT_MACHINE_SOURCE)
        );
    }
}
