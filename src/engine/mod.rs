//! Execution engine boundary
//!
//! The engine is an external, deterministic block runtime. The bridge talks to
//! it only through the [`Engine`] trait; everything above this module goes
//! through the [`EngineClient`] facade, which turns engine failures into log
//! lines and sentinel values.
//!
//! # Components
//!
//! - [`Engine`] - Trait implemented by engine adapters
//! - [`Command`] - Typed messages addressed to a single block
//! - [`EngineClient`] - Shared, cloneable facade with [`ClientStats`]
//! - [`SimulatedEngine`] - In-process deterministic engine

pub mod client;
pub mod simulated;

pub use client::{ClientStats, EngineClient};
pub use simulated::SimulatedEngine;

use crate::error::Result;
use crate::midi::{ChannelFilter, MidiEventKind};
use crate::registry::BlockConfig;
use crate::types::{BlockId, OutputState, Wire};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A message addressed to one block.
///
/// Serialized externally tagged, e.g. `{"SetMidiPort":{"port":0}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Change the event kind a MIDI input block reacts to
    SetMidiInputEvent { event: MidiEventKind },
    /// Change the device port of a MIDI block
    SetMidiPort { port: u8 },
    /// Change the channel filter of a MIDI block
    SetMidiChannels { channels: ChannelFilter },
    /// A routed MIDI input event
    Midi {
        event: MidiEventKind,
        note: u8,
        value: u8,
        channel: u8,
        port: u8,
    },
    /// Overwrite machine memory starting at `offset`
    SetMachineMemory { offset: u16, values: Vec<u16> },
}

impl Command {
    /// Variant name, for logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetMidiInputEvent { .. } => "SetMidiInputEvent",
            Command::SetMidiPort { .. } => "SetMidiPort",
            Command::SetMidiChannels { .. } => "SetMidiChannels",
            Command::Midi { .. } => "Midi",
            Command::SetMachineMemory { .. } => "SetMachineMemory",
        }
    }
}

/// Interface of an execution engine.
///
/// Implementations must be `Send`; the client serializes access behind a
/// mutex, so methods take `&mut self`.
#[cfg_attr(test, mockall::automock)]
pub trait Engine: Send {
    /// Allocate a machine block
    fn add_machine(&mut self) -> Result<BlockId>;

    /// Allocate a non-machine block with an initial configuration
    fn add_block(&mut self, config: &BlockConfig) -> Result<BlockId>;

    /// Destroy a block and every wire touching it
    fn remove_block(&mut self, id: BlockId) -> Result<()>;

    fn connect(&mut self, wire: &Wire) -> Result<()>;

    fn disconnect(&mut self, wire: &Wire) -> Result<()>;

    /// Deliver a command to one block
    fn send(&mut self, id: BlockId, command: &Command) -> Result<()>;

    /// Write machine memory
    fn set_memory(&mut self, id: BlockId, offset: u16, values: &[u16]) -> Result<()>;

    /// Read `size` words of machine memory starting at `offset`
    fn read_memory(&mut self, id: BlockId, offset: u16, size: u16) -> Result<Vec<u16>>;

    /// Compile and load machine source
    fn load(&mut self, id: BlockId, source: &str) -> Result<()>;

    /// Advance every block by one step
    fn step(&mut self) -> Result<()>;

    /// Output state of every live block
    fn read_outputs(&mut self) -> Result<HashMap<BlockId, OutputState>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_externally_tagged() {
        let json = serde_json::to_string(&Command::SetMidiPort { port: 0 }).unwrap();
        assert_eq!(json, r#"{"SetMidiPort":{"port":0}}"#);
    }

    #[test]
    fn test_midi_command_shape() {
        let command = Command::Midi {
            event: MidiEventKind::NoteOn,
            note: 60,
            value: 100,
            channel: 1,
            port: 0,
        };
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["Midi"]["event"], "NoteOn");
        assert_eq!(json["Midi"]["note"], 60);
        assert_eq!(command.name(), "Midi");
    }

    #[test]
    fn test_channels_serialize_as_list() {
        let command = Command::SetMidiChannels {
            channels: ChannelFilter::from_channels([4, 2]),
        };
        assert_eq!(
            serde_json::to_string(&command).unwrap(),
            r#"{"SetMidiChannels":{"channels":[2,4]}}"#
        );
    }
}
