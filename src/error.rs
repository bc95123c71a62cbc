//! Error handling for the canvas bridge
//!
//! This module defines the crate error type and a Result alias. Engine
//! failures are converted into log lines and sentinel values by the
//! [`EngineClient`](crate::engine::EngineClient) before they reach the UI, so
//! most of these variants only travel between internal layers.

use crate::types::BlockId;
use thiserror::Error;

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The engine rejected an operation
    #[error("Engine error: {0}")]
    Engine(String),

    /// The engine refused to allocate a block
    #[error("Engine refused to allocate a {kind} block")]
    Allocation { kind: String },

    /// No block with this id exists (locally or in the engine)
    #[error("Unknown block {0}")]
    UnknownBlock(BlockId),

    /// A configuration patch does not fit the block's kind
    #[error("Block {id} is a {actual} block, patch targets {expected}")]
    KindMismatch {
        id: BlockId,
        expected: String,
        actual: String,
    },

    /// Errors related to MIDI parsing
    #[error("MIDI parse error: {0}")]
    MidiParse(String),

    /// Errors reported by a MIDI device
    #[error("MIDI device error: {0}")]
    Device(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BridgeError>,
    },
}

impl BridgeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BridgeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a parse error from a midi-msg error
    pub fn from_midi_error(err: midi_msg::ParseError) -> Self {
        BridgeError::MidiParse(format!("{:?}", err))
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, midi_msg::ParseError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| BridgeError::from_midi_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| BridgeError::from_midi_error(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::Engine("block table full".to_string());
        assert_eq!(err.to_string(), "Engine error: block table full");
    }

    #[test]
    fn test_error_with_context() {
        let err = BridgeError::UnknownBlock(BlockId(7));
        let with_ctx = err.with_context("Failed to update node");
        assert!(with_ctx.to_string().contains("Failed to update node"));
        assert!(with_ctx.to_string().contains("Unknown block 7"));
    }

    #[test]
    fn test_kind_mismatch_error() {
        let err = BridgeError::KindMismatch {
            id: BlockId(3),
            expected: "MidiIn".to_string(),
            actual: "Pixel".to_string(),
        };
        assert!(err.to_string().contains("Pixel"));
        assert!(err.to_string().contains("MidiIn"));
    }
}
