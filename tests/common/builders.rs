//! Test data builders for block configurations

use canvas_bridge::midi::{ChannelFilter, MidiEventKind};
use canvas_bridge::registry::{BlockConfig, MachineConfig, MidiInConfig, ValueViewConfig, VisualMode};
use canvas_bridge::BlockId;

/// Builder for MIDI input block configurations
pub struct MidiInBuilder {
    on: MidiEventKind,
    port: u8,
    channels: Vec<u8>,
}

impl MidiInBuilder {
    pub fn new() -> Self {
        Self {
            on: MidiEventKind::NoteOn,
            port: 0,
            channels: Vec::new(),
        }
    }

    pub fn on(mut self, kind: MidiEventKind) -> Self {
        self.on = kind;
        self
    }

    pub fn port(mut self, port: u8) -> Self {
        self.port = port;
        self
    }

    pub fn channels(mut self, channels: &[u8]) -> Self {
        self.channels = channels.to_vec();
        self
    }

    pub fn build(self) -> BlockConfig {
        BlockConfig::MidiIn(MidiInConfig {
            on: self.on,
            port: self.port,
            channels: ChannelFilter::from_channels(self.channels),
        })
    }
}

/// Machine configuration running `source`
pub fn machine(source: &str) -> BlockConfig {
    BlockConfig::Machine(MachineConfig {
        source: source.to_string(),
    })
}

/// Value viewer over `size` words of `target` starting at `offset`
pub fn viewer(target: BlockId, offset: u16, size: u16, visual: VisualMode) -> BlockConfig {
    BlockConfig::ValueView(ValueViewConfig {
        target,
        offset,
        size,
        visual,
    })
}
