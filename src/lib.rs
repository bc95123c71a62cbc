//! # canvas-bridge: Engine Bridge & Telemetry Layer
//!
//! The layer between a node-graph machine editor and the deterministic block
//! engine it drives. It keeps the editor's graph consistent with the engine's
//! block instances, turns UI edits into typed engine commands, polls block
//! output state after every step and routes MIDI input to listening blocks.
//!
//! ## Architecture
//!
//! - **Engine**: [`engine::Engine`] boundary, wrapped by the
//!   [`engine::EngineClient`] facade that never lets engine errors reach the UI
//! - **Telemetry**: [`telemetry::Scheduler`] steps, [`telemetry::TelemetryPoller`]
//!   reads, [`telemetry::TelemetryStore`] caches and fans out
//! - **MIDI**: [`midi::MidiRouter`] matches inbound events against per-block
//!   listeners and steps the engine once per delivered batch
//! - **Graph**: [`graph::GraphSynchronizer`] applies mutations engine-first
//! - **Commands**: slash-command palette ([`commands`])
//!
//! ## Configuration
//!
//! Settings are read from `bridge.toml` in the platform config directory
//! under `dev.canvas-bridge` (see [`config`]).
//!
//! ## Example
//!
//! ```ignore
//! use canvas_bridge::{Bridge, BridgeConfig, BlockKind, Position, SimulatedEngine};
//!
//! let mut bridge = Bridge::with_virtual_midi(BridgeConfig::default(), SimulatedEngine::new());
//! let machine = bridge.add_node(BlockKind::Machine, Position::new(40.0, 40.0));
//!
//! bridge.scheduler().step_once();
//! let snapshot = bridge.telemetry().snapshot();
//! ```

pub mod app;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod midi;
pub mod registry;
pub mod telemetry;
pub mod types;
pub mod view;

// Re-export commonly used types
pub use app::Bridge;
pub use config::BridgeConfig;
pub use engine::{Command, Engine, EngineClient, SimulatedEngine};
pub use error::{BridgeError, Result};
pub use registry::{BlockConfig, BlockKind, BlockPatch};
pub use telemetry::{TelemetrySnapshot, TelemetryStore};
pub use types::{BlockId, BlockStatus, OutputState, Position, Wire};
