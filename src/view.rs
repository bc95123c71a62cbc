//! Value viewer formatting
//!
//! Turns the memory words in a ValueView's telemetry payload into a
//! renderer-agnostic [`ValueDisplay`]. Drawing is left to the UI.

use crate::registry::VisualMode;
use serde::Serialize;

/// Bits shown per word in a color grid
pub const GRID_COLUMNS: usize = 8;

/// Rendered form of a value viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValueDisplay {
    /// No payload yet (unknown target, out-of-range window, first tick)
    Missing,
    /// Decimal words
    Numbers(Vec<u16>),
    /// Four-digit upper-case hex words
    Hex(Vec<String>),
    /// One on/off state per word
    Switches(Vec<bool>),
    /// One row of [`GRID_COLUMNS`] bits per word
    Grid(Vec<[bool; GRID_COLUMNS]>),
    /// Words as character codes up to the first zero
    Text(String),
    /// Configuration named a mode this build does not know
    UnknownMode(String),
}

impl ValueDisplay {
    /// Text fallback, as a terminal or log would show it
    pub fn summary(&self) -> String {
        match self {
            ValueDisplay::Missing => "missing value".to_string(),
            ValueDisplay::Numbers(words) => words
                .iter()
                .map(|w| w.to_string())
                .collect::<Vec<_>>()
                .join(" "),
            ValueDisplay::Hex(words) => words.join(" "),
            ValueDisplay::Switches(states) => states
                .iter()
                .map(|on| if *on { "on" } else { "off" })
                .collect::<Vec<_>>()
                .join(" "),
            ValueDisplay::Grid(rows) => rows
                .iter()
                .map(|row| row.iter().map(|b| if *b { '#' } else { '.' }).collect::<String>())
                .collect::<Vec<_>>()
                .join("\n"),
            ValueDisplay::Text(text) => text.clone(),
            ValueDisplay::UnknownMode(name) => format!("unknown visual {}", name),
        }
    }
}

/// Format `values` for display in `mode`
pub fn format_values(mode: &VisualMode, values: &[u16]) -> ValueDisplay {
    if let VisualMode::Unknown(name) = mode {
        return ValueDisplay::UnknownMode(name.clone());
    }
    if values.is_empty() {
        return ValueDisplay::Missing;
    }

    match mode {
        VisualMode::Int => ValueDisplay::Numbers(values.to_vec()),
        VisualMode::Bytes => ValueDisplay::Hex(values.iter().map(|w| format!("{:04X}", w)).collect()),
        VisualMode::Switches { .. } => ValueDisplay::Switches(values.iter().map(|w| *w != 0).collect()),
        VisualMode::ColorGrid => ValueDisplay::Grid(values.iter().map(|w| bits_of(*w)).collect()),
        VisualMode::String => ValueDisplay::Text(
            values
                .iter()
                .take_while(|w| **w != 0)
                .map(|w| char::from_u32(*w as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect(),
        ),
        VisualMode::Unknown(name) => ValueDisplay::UnknownMode(name.clone()),
    }
}

/// Low byte of `word` as grid cells, most significant bit first
pub fn bits_of(word: u16) -> [bool; GRID_COLUMNS] {
    let mut bits = [false; GRID_COLUMNS];
    for (column, bit) in bits.iter_mut().enumerate() {
        *bit = word & mask(column as u8) != 0;
    }
    bits
}

/// Flip the grid cell at `column` (0 = most significant of the low byte)
pub fn flip_bit(word: u16, column: u8) -> u16 {
    word ^ mask(column)
}

fn mask(column: u8) -> u16 {
    1 << (GRID_COLUMNS as u8 - 1 - column)
}
