//! Block kinds and their configuration records.
//!
//! Every block kind has exactly one configuration shape ([`BlockConfig`]
//! variant) and one default. Partial edits are expressed as [`BlockPatch`]es,
//! which the graph synchronizer merges into the cached configuration.

use crate::midi::{ChannelFilter, ListenerFilter, MidiEventKind};
use crate::telemetry::MemoryWatch;
use crate::types::BlockId;
use serde::{Deserialize, Serialize};

/// Source loaded into a freshly added machine
pub const DEFAULT_MACHINE_SOURCE: &str = "push 0xAA\n\n\n\n";

/// Default number of samples a plotter keeps
pub const DEFAULT_PLOT_SIZE: u32 = 250;

/// The closed set of block kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockKind {
    /// A programmable machine running user source
    Machine,
    /// Pixel display sink
    Pixel,
    /// Fixed signal source
    Tap,
    /// Periodic waveform source
    Oscillator,
    /// Time source
    Clock,
    /// Value plotter sink
    Plotter,
    /// MIDI input listener
    MidiIn,
    /// MIDI output
    MidiOut,
    /// Memory inspector for another block
    ValueView,
}

impl BlockKind {
    /// Get the display name for this block kind.
    pub fn display_name(&self) -> &'static str {
        match self {
            BlockKind::Machine => "Machine",
            BlockKind::Pixel => "Pixel",
            BlockKind::Tap => "Tap",
            BlockKind::Oscillator => "Oscillator",
            BlockKind::Clock => "Clock",
            BlockKind::Plotter => "Plotter",
            BlockKind::MidiIn => "MIDI In",
            BlockKind::MidiOut => "MIDI Out",
            BlockKind::ValueView => "Value View",
        }
    }

    /// Get all block kinds.
    pub fn all() -> &'static [BlockKind] {
        &[
            BlockKind::Machine,
            BlockKind::Pixel,
            BlockKind::Tap,
            BlockKind::Oscillator,
            BlockKind::Clock,
            BlockKind::Plotter,
            BlockKind::MidiIn,
            BlockKind::MidiOut,
            BlockKind::ValueView,
        ]
    }

    /// Default configuration for a new block of this kind.
    pub fn default_config(&self) -> BlockConfig {
        match self {
            BlockKind::Machine => BlockConfig::Machine(MachineConfig::default()),
            BlockKind::Pixel => BlockConfig::Pixel(PixelConfig::default()),
            BlockKind::Tap => BlockConfig::Tap(TapConfig::default()),
            BlockKind::Oscillator => BlockConfig::Oscillator(OscillatorConfig::default()),
            BlockKind::Clock => BlockConfig::Clock(ClockConfig::default()),
            BlockKind::Plotter => BlockConfig::Plotter(PlotterConfig::default()),
            BlockKind::MidiIn => BlockConfig::MidiIn(MidiInConfig::default()),
            BlockKind::MidiOut => BlockConfig::MidiOut(MidiOutConfig::default()),
            BlockKind::ValueView => BlockConfig::ValueView(ValueViewConfig::default()),
        }
    }

    /// Whether the block produces messages without receiving any.
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            BlockKind::Tap | BlockKind::Oscillator | BlockKind::Clock | BlockKind::MidiIn
        )
    }

    /// Whether the block only consumes messages.
    pub fn is_sink(&self) -> bool {
        matches!(
            self,
            BlockKind::Pixel | BlockKind::Plotter | BlockKind::MidiOut | BlockKind::ValueView
        )
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// How a pixel display treats incoming words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelMode {
    #[default]
    Append,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// Wire format of a MIDI output block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MidiOutputFormat {
    #[default]
    Note,
    ControlChange,
    Raw,
}

/// How a value viewer renders memory words.
///
/// Unrecognized mode names deserialize into [`VisualMode::Unknown`] so a
/// stale or hand-edited configuration still loads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "VisualRecord", into = "VisualRecord")]
pub enum VisualMode {
    #[default]
    Int,
    Bytes,
    Switches {
        bits: Vec<bool>,
    },
    ColorGrid,
    String,
    Unknown(String),
}

impl VisualMode {
    pub fn name(&self) -> &str {
        match self {
            VisualMode::Int => "Int",
            VisualMode::Bytes => "Bytes",
            VisualMode::Switches { .. } => "Switches",
            VisualMode::ColorGrid => "ColorGrid",
            VisualMode::String => "String",
            VisualMode::Unknown(name) => name,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct VisualRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    bits: Vec<bool>,
}

impl From<VisualRecord> for VisualMode {
    fn from(record: VisualRecord) -> Self {
        match record.kind.as_str() {
            "Int" => VisualMode::Int,
            "Bytes" => VisualMode::Bytes,
            "Switches" => VisualMode::Switches { bits: record.bits },
            "ColorGrid" => VisualMode::ColorGrid,
            "String" => VisualMode::String,
            _ => VisualMode::Unknown(record.kind),
        }
    }
}

impl From<VisualMode> for VisualRecord {
    fn from(mode: VisualMode) -> Self {
        let kind = mode.name().to_string();
        let bits = match mode {
            VisualMode::Switches { bits } => bits,
            _ => Vec::new(),
        };
        VisualRecord { kind, bits }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub source: String,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_MACHINE_SOURCE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelConfig {
    pub pixels: Vec<u16>,
    pub mode: PixelMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub palette: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    pub signal: Vec<u16>,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self { signal: vec![1] }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OscillatorConfig {
    pub waveform: Waveform,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub time: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotterConfig {
    pub values: Vec<u16>,
    pub size: u32,
}

impl Default for PlotterConfig {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            size: DEFAULT_PLOT_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiInConfig {
    pub on: MidiEventKind,
    pub port: u8,
    pub channels: ChannelFilter,
}

impl MidiInConfig {
    /// Listener filter equivalent to this configuration
    pub fn filter(&self) -> ListenerFilter {
        ListenerFilter::new(self.on, self.port, self.channels.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiOutConfig {
    pub format: MidiOutputFormat,
    pub port: u8,
    pub channels: ChannelFilter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueViewConfig {
    pub target: BlockId,
    pub offset: u16,
    pub size: u16,
    pub visual: VisualMode,
}

impl Default for ValueViewConfig {
    fn default() -> Self {
        Self {
            target: BlockId(0),
            offset: 0,
            size: 1,
            visual: VisualMode::Int,
        }
    }
}

impl ValueViewConfig {
    /// Memory window this viewer reads every tick
    pub fn watch(&self) -> MemoryWatch {
        MemoryWatch {
            target: self.target,
            offset: self.offset,
            size: self.size,
        }
    }
}

/// Kind-specific configuration of a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BlockConfig {
    Machine(MachineConfig),
    Pixel(PixelConfig),
    Tap(TapConfig),
    Oscillator(OscillatorConfig),
    Clock(ClockConfig),
    Plotter(PlotterConfig),
    MidiIn(MidiInConfig),
    MidiOut(MidiOutConfig),
    ValueView(ValueViewConfig),
}

impl BlockConfig {
    pub fn kind(&self) -> BlockKind {
        match self {
            BlockConfig::Machine(_) => BlockKind::Machine,
            BlockConfig::Pixel(_) => BlockKind::Pixel,
            BlockConfig::Tap(_) => BlockKind::Tap,
            BlockConfig::Oscillator(_) => BlockKind::Oscillator,
            BlockConfig::Clock(_) => BlockKind::Clock,
            BlockConfig::Plotter(_) => BlockKind::Plotter,
            BlockConfig::MidiIn(_) => BlockKind::MidiIn,
            BlockConfig::MidiOut(_) => BlockKind::MidiOut,
            BlockConfig::ValueView(_) => BlockKind::ValueView,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MachinePatch {
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PixelPatch {
    pub mode: Option<PixelMode>,
    pub columns: Option<u16>,
    pub palette: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TapPatch {
    pub signal: Option<Vec<u16>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OscillatorPatch {
    pub waveform: Option<Waveform>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClockPatch {
    pub time: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlotterPatch {
    pub size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MidiInPatch {
    pub on: Option<MidiEventKind>,
    pub port: Option<u8>,
    pub channels: Option<ChannelFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MidiOutPatch {
    pub format: Option<MidiOutputFormat>,
    pub port: Option<u8>,
    pub channels: Option<ChannelFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValueViewPatch {
    pub target: Option<BlockId>,
    pub offset: Option<u16>,
    pub size: Option<u16>,
    pub visual: Option<VisualMode>,
}

/// A partial configuration edit; `None` fields are left untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockPatch {
    Machine(MachinePatch),
    Pixel(PixelPatch),
    Tap(TapPatch),
    Oscillator(OscillatorPatch),
    Clock(ClockPatch),
    Plotter(PlotterPatch),
    MidiIn(MidiInPatch),
    MidiOut(MidiOutPatch),
    ValueView(ValueViewPatch),
}

impl BlockPatch {
    /// Kind of block this patch applies to
    pub fn kind(&self) -> BlockKind {
        match self {
            BlockPatch::Machine(_) => BlockKind::Machine,
            BlockPatch::Pixel(_) => BlockKind::Pixel,
            BlockPatch::Tap(_) => BlockKind::Tap,
            BlockPatch::Oscillator(_) => BlockKind::Oscillator,
            BlockPatch::Clock(_) => BlockKind::Clock,
            BlockPatch::Plotter(_) => BlockKind::Plotter,
            BlockPatch::MidiIn(_) => BlockKind::MidiIn,
            BlockPatch::MidiOut(_) => BlockKind::MidiOut,
            BlockPatch::ValueView(_) => BlockKind::ValueView,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_kind() {
        for kind in BlockKind::all() {
            assert_eq!(kind.default_config().kind(), *kind);
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(
            BlockKind::Machine.default_config(),
            BlockConfig::Machine(MachineConfig {
                source: "push 0xAA\n\n\n\n".to_string()
            })
        );
        assert_eq!(TapConfig::default().signal, vec![1]);
        assert_eq!(PlotterConfig::default().size, 250);
        assert_eq!(MidiInConfig::default().on, MidiEventKind::NoteOn);
        assert_eq!(MidiInConfig::default().channels, ChannelFilter::Any);
        assert_eq!(MidiOutConfig::default().format, MidiOutputFormat::Note);
        assert_eq!(ValueViewConfig::default().size, 1);
        assert_eq!(ValueViewConfig::default().visual, VisualMode::Int);
    }

    #[test]
    fn test_sources_and_sinks_are_disjoint() {
        for kind in BlockKind::all() {
            assert!(!(kind.is_source() && kind.is_sink()), "{kind}");
        }
    }

    #[test]
    fn test_config_is_tagged_by_kind() {
        let json = serde_json::to_value(BlockKind::Clock.default_config()).unwrap();
        assert_eq!(json["type"], "Clock");
        assert_eq!(json["time"], 0);
    }

    #[test]
    fn test_unknown_visual_mode_survives_deserialization() {
        let config: ValueViewConfig =
            serde_json::from_str(r#"{"target": 3, "visual": {"type": "Waterfall"}}"#).unwrap();
        assert_eq!(config.target, BlockId(3));
        assert_eq!(config.visual, VisualMode::Unknown("Waterfall".to_string()));
        assert_eq!(config.size, 1);
    }

    #[test]
    fn test_switches_keep_bits() {
        let mode: VisualMode =
            serde_json::from_str(r#"{"type": "Switches", "bits": [true, false]}"#).unwrap();
        assert_eq!(
            mode,
            VisualMode::Switches {
                bits: vec![true, false]
            }
        );
        let json = serde_json::to_value(&VisualMode::Bytes).unwrap();
        assert_eq!(json, serde_json::json!({"type": "Bytes"}));
    }

    #[test]
    fn test_midi_in_filter() {
        let config = MidiInConfig {
            on: MidiEventKind::ControlChange,
            port: 2,
            channels: ChannelFilter::from_channels([5]),
        };
        let filter = config.filter();
        assert_eq!(filter.kind, MidiEventKind::ControlChange);
        assert_eq!(filter.port, 2);
        assert!(filter.channels.accepts(5));
    }

    #[test]
    fn test_patch_kind() {
        assert_eq!(
            BlockPatch::MidiIn(MidiInPatch::default()).kind(),
            BlockKind::MidiIn
        );
    }
}
