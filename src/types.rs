//! Core data types for the canvas bridge
//!
//! This module contains the identity and state types shared by every layer:
//!
//! - [`BlockId`] - Engine-assigned identity of a block instance
//! - [`BlockStatus`] - Execution status reported by the engine
//! - [`OutputState`] - Latest per-block output as seen by the telemetry poll
//! - [`BlockIndicators`] - UI-facing flags derived from an output state
//! - [`Wire`] - A connection between two block ports
//! - [`Position`] - Canvas coordinates of a node

use crate::config::TelemetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a block instance.
///
/// Ids are allocated by the engine and are never reused while the block is
/// alive. The bridge never invents one locally.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl BlockId {
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for BlockId {
    fn from(raw: u32) -> Self {
        BlockId(raw)
    }
}

/// Execution status of a block as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlockStatus {
    /// Loaded and runnable, nothing pending
    #[default]
    Idle,
    /// Blocked waiting for input
    Awaiting,
    /// Execution terminated
    Halted,
    /// Compile or runtime error
    Invalid,
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BlockStatus::Idle => "Idle",
            BlockStatus::Awaiting => "Awaiting",
            BlockStatus::Halted => "Halted",
            BlockStatus::Invalid => "Invalid",
        };
        write!(f, "{}", label)
    }
}

/// Latest output state of one block.
///
/// Replaced wholesale on every poll tick; fields are never merged across
/// ticks so heterogeneous block kinds cannot leak stale values into each
/// other.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputState {
    /// Execution status
    pub status: BlockStatus,
    /// Messages waiting in the block's inbox
    pub inbox_size: u32,
    /// Emitted messages not yet consumed downstream
    pub outbox_size: u32,
    /// Memory words (machines, value viewers); empty for other kinds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payload: Vec<u16>,
}

impl OutputState {
    /// Create an output state without payload
    pub fn new(status: BlockStatus, inbox_size: u32, outbox_size: u32) -> Self {
        Self {
            status,
            inbox_size,
            outbox_size,
            payload: Vec::new(),
        }
    }

    /// Attach a memory payload
    pub fn with_payload(mut self, payload: Vec<u16>) -> Self {
        self.payload = payload;
        self
    }

    /// Derive the UI indicators for this state under the given policy
    pub fn indicators(&self, policy: &TelemetryPolicy) -> BlockIndicators {
        BlockIndicators {
            errored: self.status == BlockStatus::Invalid,
            awaiting: self.status == BlockStatus::Awaiting,
            halted: self.status == BlockStatus::Halted,
            backpressuring: self.inbox_size > policy.backpressure_threshold,
            sending: self.outbox_size >= policy.emission_threshold,
        }
    }
}

/// Visual flags a block renders from its output state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockIndicators {
    pub errored: bool,
    pub awaiting: bool,
    pub halted: bool,
    pub backpressuring: bool,
    pub sending: bool,
}

impl BlockIndicators {
    /// True when nothing needs highlighting
    pub fn is_quiet(&self) -> bool {
        *self == Self::default()
    }
}

/// Canvas position of a node
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A directed connection from an output port to an input port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Wire {
    pub source: BlockId,
    pub source_port: u8,
    pub target: BlockId,
    pub target_port: u8,
}

impl Wire {
    pub fn new(source: BlockId, source_port: u8, target: BlockId, target_port: u8) -> Self {
        Self {
            source,
            source_port,
            target,
            target_port,
        }
    }

    /// Whether this wire touches the given block on either end
    pub fn touches(&self, id: BlockId) -> bool {
        self.source == id || self.target == id
    }
}
