//! Graph synchronizer
//!
//! Applies UI graph mutations in engine-first order: the engine is asked
//! first and the local [`Graph`] changes only when it agreed. Side channels
//! (MIDI listeners, telemetry watches and entries) follow the local change.
//!
//! Field edits are merged locally and translated into engine commands only
//! for the fields the engine cares about:
//!
//! | Kind      | Field      | Engine effect                 | Side effect        |
//! |-----------|------------|-------------------------------|--------------------|
//! | MidiIn    | `on`       | `SetMidiInputEvent`           | listener refreshed |
//! | MidiIn    | `port`     | `SetMidiPort`                 | listener refreshed |
//! | MidiIn    | `channels` | `SetMidiChannels`             | listener refreshed |
//! | MidiOut   | `port`     | `SetMidiPort`                 |                    |
//! | MidiOut   | `channels` | `SetMidiChannels`             |                    |
//! | ValueView | any        | none                          | watch refreshed    |
//! | Machine   | `source`   | none until [`GraphSynchronizer::reload`] |         |
//! | others    | any        | none                          |                    |

use crate::engine::{Command, EngineClient};
use crate::error::{BridgeError, Result};
use crate::graph::{Graph, GraphNode};
use crate::midi::{ListenerFilter, MidiRouter};
use crate::registry::{BlockConfig, BlockKind, BlockPatch, VisualMode};
use crate::telemetry::{MemoryWatch, TelemetryPoller};
use crate::types::{BlockId, Position, Wire};
use crate::view;
use std::sync::Arc;

/// What merging a patch requires beyond the local config change
#[derive(Debug, Default, PartialEq)]
struct PatchEffects {
    commands: Vec<Command>,
    listener: Option<ListenerFilter>,
    watch: Option<MemoryWatch>,
}

fn mismatch(id: BlockId, config: &BlockConfig, patch: &BlockPatch) -> BridgeError {
    BridgeError::KindMismatch {
        id,
        expected: patch.kind().to_string(),
        actual: config.kind().to_string(),
    }
}

/// Merge `patch` into `config` and collect the resulting effects
fn merge_patch(id: BlockId, config: &mut BlockConfig, patch: &BlockPatch) -> Result<PatchEffects> {
    let mut effects = PatchEffects::default();

    match (&mut *config, patch) {
        (BlockConfig::Machine(c), BlockPatch::Machine(p)) => {
            if let Some(source) = &p.source {
                c.source = source.clone();
            }
        }
        (BlockConfig::Pixel(c), BlockPatch::Pixel(p)) => {
            if let Some(mode) = p.mode {
                c.mode = mode;
            }
            if let Some(columns) = p.columns {
                c.columns = Some(columns);
            }
            if let Some(palette) = &p.palette {
                c.palette = Some(palette.clone());
            }
        }
        (BlockConfig::Tap(c), BlockPatch::Tap(p)) => {
            if let Some(signal) = &p.signal {
                c.signal = signal.clone();
            }
        }
        (BlockConfig::Oscillator(c), BlockPatch::Oscillator(p)) => {
            if let Some(waveform) = p.waveform {
                c.waveform = waveform;
            }
        }
        (BlockConfig::Clock(c), BlockPatch::Clock(p)) => {
            if let Some(time) = p.time {
                c.time = time;
            }
        }
        (BlockConfig::Plotter(c), BlockPatch::Plotter(p)) => {
            if let Some(size) = p.size {
                c.size = size;
            }
        }
        (BlockConfig::MidiIn(c), BlockPatch::MidiIn(p)) => {
            if let Some(event) = p.on {
                c.on = event;
                effects.commands.push(Command::SetMidiInputEvent { event });
            }
            if let Some(port) = p.port {
                c.port = port;
                effects.commands.push(Command::SetMidiPort { port });
            }
            if let Some(channels) = &p.channels {
                c.channels = channels.clone();
                effects.commands.push(Command::SetMidiChannels {
                    channels: channels.clone(),
                });
            }
            if !effects.commands.is_empty() {
                effects.listener = Some(c.filter());
            }
        }
        (BlockConfig::MidiOut(c), BlockPatch::MidiOut(p)) => {
            if let Some(format) = p.format {
                c.format = format;
            }
            if let Some(port) = p.port {
                c.port = port;
                effects.commands.push(Command::SetMidiPort { port });
            }
            if let Some(channels) = &p.channels {
                c.channels = channels.clone();
                effects.commands.push(Command::SetMidiChannels {
                    channels: channels.clone(),
                });
            }
        }
        (BlockConfig::ValueView(c), BlockPatch::ValueView(p)) => {
            if let Some(target) = p.target {
                c.target = target;
            }
            if let Some(offset) = p.offset {
                c.offset = offset;
            }
            if let Some(size) = p.size {
                c.size = size;
            }
            if let Some(visual) = &p.visual {
                c.visual = visual.clone();
            }
            effects.watch = Some(c.watch());
        }
        (config, patch) => return Err(mismatch(id, config, patch)),
    }

    Ok(effects)
}

/// Keeps the local graph, the engine and the side channels consistent
pub struct GraphSynchronizer {
    engine: EngineClient,
    poller: Arc<TelemetryPoller>,
    router: MidiRouter,
    graph: Graph,
}

impl GraphSynchronizer {
    pub fn new(engine: EngineClient, poller: Arc<TelemetryPoller>, router: MidiRouter) -> Self {
        Self {
            engine,
            poller,
            router,
            graph: Graph::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn router(&self) -> &MidiRouter {
        &self.router
    }

    /// Add a block of `kind` with its default configuration
    pub fn add_node(&mut self, kind: BlockKind, position: Position) -> Option<BlockId> {
        self.add_node_with(kind.default_config(), position)
    }

    /// Add a block with an explicit initial configuration.
    ///
    /// Returns `None`, with the graph untouched, when the engine refuses.
    pub fn add_node_with(&mut self, config: BlockConfig, position: Position) -> Option<BlockId> {
        let id = match &config {
            BlockConfig::Machine(_) => self.engine.add_machine_block(),
            other => self.engine.add_block(other),
        }?;

        match &config {
            BlockConfig::Machine(machine) => self.engine.load(id, &machine.source),
            BlockConfig::MidiIn(midi) => {
                self.router.register(id, midi.filter());
            }
            BlockConfig::ValueView(viewer) => self.poller.watch(id, viewer.watch()),
            _ => {}
        }

        tracing::info!("Added {} block {}", config.kind(), id);
        self.graph.insert(GraphNode {
            id,
            config,
            position,
        });
        Some(id)
    }

    /// Merge a partial edit into a node's configuration
    pub fn update_node(&mut self, id: BlockId, patch: BlockPatch) -> Result<()> {
        let node = self
            .graph
            .node_mut(id)
            .ok_or(BridgeError::UnknownBlock(id))?;
        let effects = merge_patch(id, &mut node.config, &patch)?;

        for command in effects.commands {
            self.engine.send(id, command);
        }
        if let Some(filter) = effects.listener {
            self.router.register(id, filter);
        }
        if let Some(watch) = effects.watch {
            self.poller.watch(id, watch);
        }
        Ok(())
    }

    /// Remove a node; false when the engine refused
    pub fn remove_node(&mut self, id: BlockId) -> bool {
        if !self.graph.contains(id) {
            return false;
        }
        if !self.engine.remove_block(id) {
            return false;
        }

        self.graph.remove(id);
        self.router.revoke(id);
        self.poller.forget(id);
        tracing::info!("Removed block {}", id);
        true
    }

    /// Connect two known nodes; false when either end is unknown, the wire
    /// runs into a source or out of a sink, or the engine refused
    pub fn connect(&mut self, wire: Wire) -> bool {
        if !(self.graph.contains(wire.source) && self.graph.contains(wire.target)) {
            tracing::warn!(
                "Cannot connect {} -> {}: unknown node",
                wire.source,
                wire.target
            );
            return false;
        }
        let (source_kind, target_kind) = match (
            self.graph.node(wire.source),
            self.graph.node(wire.target),
        ) {
            (Some(source), Some(target)) => (source.kind(), target.kind()),
            _ => return false,
        };
        if source_kind.is_sink() || target_kind.is_source() {
            tracing::warn!(
                "Cannot connect {} -> {}: {} has no outputs or {} has no inputs",
                wire.source,
                wire.target,
                source_kind.display_name(),
                target_kind.display_name()
            );
            return false;
        }
        if !self.engine.connect(&wire) {
            return false;
        }
        self.graph.add_edge(wire);
        true
    }

    pub fn disconnect(&mut self, wire: Wire) -> bool {
        if !self.graph.edges().contains(&wire) {
            return false;
        }
        if !self.engine.disconnect(&wire) {
            return false;
        }
        self.graph.remove_edge(&wire)
    }

    /// Load a machine's cached source into the engine again
    pub fn reload(&self, id: BlockId) -> Result<()> {
        let node = self.graph.node(id).ok_or(BridgeError::UnknownBlock(id))?;
        match &node.config {
            BlockConfig::Machine(machine) => {
                self.engine.load(id, &machine.source);
                tracing::debug!("Reloaded machine {}", id);
                Ok(())
            }
            other => Err(BridgeError::KindMismatch {
                id,
                expected: BlockKind::Machine.to_string(),
                actual: other.kind().to_string(),
            }),
        }
    }

    /// Reload every machine
    pub fn reload_all(&self) -> usize {
        let machines = self.graph.ids_of(BlockKind::Machine);
        for id in &machines {
            if let Err(e) = self.reload(*id) {
                tracing::warn!("Failed to reload machine {}: {}", id, e);
            }
        }
        machines.len()
    }

    pub fn move_node(&mut self, id: BlockId, position: Position) -> Result<()> {
        let node = self
            .graph
            .node_mut(id)
            .ok_or(BridgeError::UnknownBlock(id))?;
        node.position = position;
        Ok(())
    }

    /// Flip one bit of a word shown by a ColorGrid value viewer.
    ///
    /// `index` is the word within the viewer's window, `bit` the column
    /// (0 = most significant of the low byte). The new word is written to the
    /// viewer's target memory.
    pub fn toggle_bit(&self, viewer: BlockId, index: usize, bit: u8) -> Result<u16> {
        let node = self
            .graph
            .node(viewer)
            .ok_or(BridgeError::UnknownBlock(viewer))?;
        let config = match &node.config {
            BlockConfig::ValueView(config) if config.visual == VisualMode::ColorGrid => config,
            other => {
                return Err(BridgeError::KindMismatch {
                    id: viewer,
                    expected: "ColorGrid ValueView".to_string(),
                    actual: other.kind().to_string(),
                })
            }
        };

        if index >= config.size as usize || bit >= view::GRID_COLUMNS as u8 {
            return Err(BridgeError::Engine(format!(
                "bit {} of word {} is outside the viewer window",
                bit, index
            )));
        }

        let address = config.offset.checked_add(index as u16).ok_or_else(|| {
            BridgeError::Engine(format!(
                "word {} of the viewer window is past the end of memory",
                index
            ))
        })?;

        let current = self
            .poller
            .store()
            .get(viewer)
            .and_then(|state| state.payload.get(index).copied())
            .unwrap_or(0);
        let next = view::flip_bit(current, bit);

        self.engine.set_memory(config.target, address, &[next]);
        Ok(next)
    }
}

impl std::fmt::Debug for GraphSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphSynchronizer")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edges().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use crate::midi::{ChannelFilter, MidiEventKind, VirtualMidiDevice};
    use crate::registry::{MidiInPatch, MidiOutPatch, PixelMode, PixelPatch, ValueViewPatch};
    use crate::telemetry::{Stepper, TelemetryStore};
    use mockall::predicate::*;

    struct NoStep;

    impl Stepper for NoStep {
        fn is_free_running(&self) -> bool {
            true
        }
        fn step(&self) {}
    }

    fn synchronizer(engine: MockEngine) -> GraphSynchronizer {
        let client = EngineClient::new(engine);
        let poller = Arc::new(TelemetryPoller::new(
            client.clone(),
            Arc::new(TelemetryStore::new()),
        ));
        let router = MidiRouter::new(
            client.clone(),
            Arc::new(NoStep),
            Arc::new(VirtualMidiDevice::default()),
        );
        GraphSynchronizer::new(client, poller, router)
    }

    #[test]
    fn test_failed_allocation_leaves_graph_unchanged() {
        let mut engine = MockEngine::new();
        engine.expect_add_block().returning(|config| {
            Err(BridgeError::Allocation {
                kind: config.kind().to_string(),
            })
        });

        let mut sync = synchronizer(engine);
        assert_eq!(sync.add_node(BlockKind::Pixel, Position::default()), None);
        assert!(sync.graph().is_empty());
    }

    #[test]
    fn test_machine_add_loads_default_source() {
        let mut engine = MockEngine::new();
        engine.expect_add_machine().returning(|| Ok(BlockId(1)));
        engine
            .expect_load()
            .with(eq(BlockId(1)), eq("push 0xAA\n\n\n\n"))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut sync = synchronizer(engine);
        assert_eq!(
            sync.add_node(BlockKind::Machine, Position::new(4.0, 2.0)),
            Some(BlockId(1))
        );
        assert_eq!(sync.graph().node(BlockId(1)).unwrap().position, Position::new(4.0, 2.0));
    }

    #[test]
    fn test_midi_in_patch_sends_each_field() {
        let mut engine = MockEngine::new();
        engine.expect_add_block().returning(|_| Ok(BlockId(7)));
        engine
            .expect_send()
            .with(eq(BlockId(7)), eq(Command::SetMidiInputEvent {
                event: MidiEventKind::ControlChange,
            }))
            .times(1)
            .returning(|_, _| Ok(()));
        engine
            .expect_send()
            .with(eq(BlockId(7)), eq(Command::SetMidiPort { port: 2 }))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut sync = synchronizer(engine);
        let id = sync.add_node(BlockKind::MidiIn, Position::default()).unwrap();
        sync.update_node(
            id,
            BlockPatch::MidiIn(MidiInPatch {
                on: Some(MidiEventKind::ControlChange),
                port: Some(2),
                channels: None,
            }),
        )
        .unwrap();

        let filter = sync.router().filter_of(id).unwrap();
        assert_eq!(filter.kind, MidiEventKind::ControlChange);
        assert_eq!(filter.port, 2);
        assert_eq!(filter.channels, ChannelFilter::Any);
    }

    #[test]
    fn test_midi_out_format_is_local_only() {
        let mut engine = MockEngine::new();
        engine.expect_add_block().returning(|_| Ok(BlockId(3)));
        engine.expect_send().never();

        let mut sync = synchronizer(engine);
        let id = sync.add_node(BlockKind::MidiOut, Position::default()).unwrap();
        sync.update_node(
            id,
            BlockPatch::MidiOut(MidiOutPatch {
                format: Some(crate::registry::MidiOutputFormat::Raw),
                ..Default::default()
            }),
        )
        .unwrap();
    }

    #[test]
    fn test_cosmetic_patch_has_no_engine_call() {
        let mut engine = MockEngine::new();
        engine.expect_add_block().returning(|_| Ok(BlockId(4)));
        engine.expect_send().never();

        let mut sync = synchronizer(engine);
        let id = sync.add_node(BlockKind::Pixel, Position::default()).unwrap();
        sync.update_node(
            id,
            BlockPatch::Pixel(PixelPatch {
                mode: Some(PixelMode::Replace),
                columns: Some(16),
                palette: None,
            }),
        )
        .unwrap();

        match &sync.graph().node(id).unwrap().config {
            BlockConfig::Pixel(config) => {
                assert_eq!(config.mode, PixelMode::Replace);
                assert_eq!(config.columns, Some(16));
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_patch_for_wrong_kind_is_rejected() {
        let mut engine = MockEngine::new();
        engine.expect_add_block().returning(|_| Ok(BlockId(5)));

        let mut sync = synchronizer(engine);
        let id = sync.add_node(BlockKind::Tap, Position::default()).unwrap();
        let err = sync
            .update_node(id, BlockPatch::MidiIn(MidiInPatch::default()))
            .unwrap_err();
        assert!(matches!(err, BridgeError::KindMismatch { .. }));

        let err = sync
            .update_node(BlockId(99), BlockPatch::MidiIn(MidiInPatch::default()))
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownBlock(BlockId(99))));
    }

    #[test]
    fn test_value_view_patch_refreshes_watch() {
        let mut engine = MockEngine::new();
        engine.expect_add_block().returning(|_| Ok(BlockId(8)));

        let mut sync = synchronizer(engine);
        let id = sync.add_node(BlockKind::ValueView, Position::default()).unwrap();
        sync.update_node(
            id,
            BlockPatch::ValueView(ValueViewPatch {
                target: Some(BlockId(2)),
                size: Some(4),
                ..Default::default()
            }),
        )
        .unwrap();

        assert_eq!(
            sync.poller.watch_of(id),
            Some(MemoryWatch {
                target: BlockId(2),
                offset: 0,
                size: 4,
            })
        );
    }

    #[test]
    fn test_refused_removal_keeps_node() {
        let mut engine = MockEngine::new();
        engine.expect_add_block().returning(|_| Ok(BlockId(6)));
        engine
            .expect_remove_block()
            .returning(|_| Err(BridgeError::Engine("busy".into())));

        let mut sync = synchronizer(engine);
        let id = sync.add_node(BlockKind::MidiIn, Position::default()).unwrap();
        assert!(!sync.remove_node(id));
        assert!(sync.graph().contains(id));
        assert!(sync.router().is_registered(id));
    }

    #[test]
    fn test_connect_requires_known_nodes() {
        let mut engine = MockEngine::new();
        engine.expect_connect().never();

        let mut sync = synchronizer(engine);
        assert!(!sync.connect(Wire::new(BlockId(1), 0, BlockId(2), 0)));
    }

    #[test]
    fn test_connect_rejects_reversed_wires() {
        let mut engine = MockEngine::new();
        let mut next = 0;
        engine.expect_add_block().returning(move |_| {
            next += 1;
            Ok(BlockId(next))
        });
        engine.expect_connect().never();

        let mut sync = synchronizer(engine);
        let tap = sync.add_node(BlockKind::Tap, Position::default()).unwrap();
        let pixel = sync.add_node(BlockKind::Pixel, Position::default()).unwrap();

        assert!(!sync.connect(Wire::new(pixel, 0, tap, 0)));
        assert!(!sync.connect(Wire::new(pixel, 0, pixel, 0)));
        assert!(!sync.connect(Wire::new(tap, 0, tap, 0)));
        assert!(sync.graph().edges().is_empty());
    }

    #[test]
    fn test_reload_rejects_non_machine() {
        let mut engine = MockEngine::new();
        engine.expect_add_block().returning(|_| Ok(BlockId(2)));

        let mut sync = synchronizer(engine);
        let id = sync.add_node(BlockKind::Clock, Position::default()).unwrap();
        assert!(matches!(
            sync.reload(id),
            Err(BridgeError::KindMismatch { .. })
        ));
    }
}
