//! Engine client facade
//!
//! [`EngineClient`] is the only path from the bridge to the engine. It owns
//! the engine behind a mutex so the scheduler thread, MIDI callbacks and UI
//! handlers can share it, and it never lets an engine error escape: failures
//! are logged, counted and reported as `None` / `false`.

use crate::engine::{Command, Engine};
use crate::registry::BlockConfig;
use crate::types::{BlockId, OutputState, Wire};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Counters for engine traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    /// Commands accepted by the engine
    pub commands_sent: u64,
    /// Commands the engine rejected
    pub commands_failed: u64,
    /// Successful block allocations
    pub allocations: u64,
    /// Refused block allocations
    pub allocation_failures: u64,
    /// Steps taken
    pub steps: u64,
    /// Failed operations other than commands and allocations
    pub other_failures: u64,
}

impl ClientStats {
    /// Share of accepted commands as a percentage
    pub fn command_success_rate(&self) -> f64 {
        let total = self.commands_sent + self.commands_failed;
        if total == 0 {
            100.0
        } else {
            (self.commands_sent as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Default)]
struct Counters {
    commands_sent: AtomicU64,
    commands_failed: AtomicU64,
    allocations: AtomicU64,
    allocation_failures: AtomicU64,
    steps: AtomicU64,
    other_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Cloneable handle to a shared engine
#[derive(Clone)]
pub struct EngineClient {
    engine: Arc<Mutex<Box<dyn Engine>>>,
    counters: Arc<Counters>,
}

impl EngineClient {
    pub fn new(engine: impl Engine + 'static) -> Self {
        Self::from_boxed(Box::new(engine))
    }

    pub fn from_boxed(engine: Box<dyn Engine>) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            counters: Arc::new(Counters::default()),
        }
    }

    fn engine(&self) -> MutexGuard<'_, Box<dyn Engine>> {
        self.engine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate a machine; `None` when the engine refuses
    pub fn add_machine_block(&self) -> Option<BlockId> {
        let result = self.engine().add_machine();
        self.allocation("Machine", result)
    }

    /// Allocate a block of `config`'s kind; `None` when the engine refuses
    pub fn add_block(&self, config: &BlockConfig) -> Option<BlockId> {
        let result = self.engine().add_block(config);
        self.allocation(config.kind().display_name(), result)
    }

    fn allocation(&self, kind: &str, result: crate::error::Result<BlockId>) -> Option<BlockId> {
        match result {
            Ok(id) => {
                Counters::bump(&self.counters.allocations);
                tracing::debug!("Engine allocated {} block {}", kind, id);
                Some(id)
            }
            Err(e) => {
                Counters::bump(&self.counters.allocation_failures);
                tracing::warn!("Engine refused to allocate {} block: {}", kind, e);
                None
            }
        }
    }

    pub fn remove_block(&self, id: BlockId) -> bool {
        let result = self.engine().remove_block(id);
        self.check(result, || format!("remove block {}", id))
    }

    pub fn connect(&self, wire: &Wire) -> bool {
        let result = self.engine().connect(wire);
        self.check(result, || {
            format!(
                "connect {}:{} -> {}:{}",
                wire.source, wire.source_port, wire.target, wire.target_port
            )
        })
    }

    pub fn disconnect(&self, wire: &Wire) -> bool {
        let result = self.engine().disconnect(wire);
        self.check(result, || {
            format!(
                "disconnect {}:{} -> {}:{}",
                wire.source, wire.source_port, wire.target, wire.target_port
            )
        })
    }

    /// Fire-and-forget delivery of one command
    pub fn send(&self, id: BlockId, command: Command) {
        let result = self.engine().send(id, &command);
        match result {
            Ok(()) => {
                Counters::bump(&self.counters.commands_sent);
                tracing::trace!("Sent {} to block {}", command.name(), id);
            }
            Err(e) => {
                Counters::bump(&self.counters.commands_failed);
                tracing::warn!("Engine rejected {} for block {}: {}", command.name(), id, e);
            }
        }
    }

    pub fn set_memory(&self, id: BlockId, offset: u16, values: &[u16]) {
        let result = self.engine().set_memory(id, offset, values);
        self.check(result, || {
            format!("write {} word(s) at {} of block {}", values.len(), offset, id)
        });
    }

    pub fn read_memory(&self, id: BlockId, offset: u16, size: u16) -> Option<Vec<u16>> {
        let result = self.engine().read_memory(id, offset, size);
        match result {
            Ok(words) => Some(words),
            Err(e) => {
                Counters::bump(&self.counters.other_failures);
                tracing::debug!("Memory read of block {} failed: {}", id, e);
                None
            }
        }
    }

    pub fn load(&self, id: BlockId, source: &str) {
        let result = self.engine().load(id, source);
        self.check(result, || format!("load source into block {}", id));
    }

    pub fn step(&self) {
        let result = self.engine().step();
        if self.check(result, || "step".to_string()) {
            Counters::bump(&self.counters.steps);
        }
    }

    pub fn read_outputs(&self) -> Option<HashMap<BlockId, OutputState>> {
        let result = self.engine().read_outputs();
        match result {
            Ok(outputs) => Some(outputs),
            Err(e) => {
                Counters::bump(&self.counters.other_failures);
                tracing::warn!("Failed to read engine outputs: {}", e);
                None
            }
        }
    }

    fn check<F>(&self, result: crate::error::Result<()>, what: F) -> bool
    where
        F: FnOnce() -> String,
    {
        match result {
            Ok(()) => true,
            Err(e) => {
                Counters::bump(&self.counters.other_failures);
                tracing::warn!("Engine failed to {}: {}", what(), e);
                false
            }
        }
    }

    pub fn stats(&self) -> ClientStats {
        let c = &self.counters;
        ClientStats {
            commands_sent: c.commands_sent.load(Ordering::Relaxed),
            commands_failed: c.commands_failed.load(Ordering::Relaxed),
            allocations: c.allocations.load(Ordering::Relaxed),
            allocation_failures: c.allocation_failures.load(Ordering::Relaxed),
            steps: c.steps.load(Ordering::Relaxed),
            other_failures: c.other_failures.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for EngineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineClient")
            .field("stats", &self.stats())
            .finish()
    }
}
