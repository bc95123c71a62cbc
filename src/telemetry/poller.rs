//! One poll tick: engine output feed plus value-watch memory reads

use crate::engine::EngineClient;
use crate::telemetry::store::{TelemetrySnapshot, TelemetryStore};
use crate::types::{BlockId, OutputState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Memory window a value viewer displays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryWatch {
    pub target: BlockId,
    pub offset: u16,
    pub size: u16,
}

#[derive(Debug, Default)]
struct PollState {
    watches: HashMap<BlockId, MemoryWatch>,
    ticks: u64,
    failed_ticks: u64,
}

/// Reads engine state and publishes it to the [`TelemetryStore`].
///
/// All mutations of the store go through the poller so that ticks, removals
/// and resets are serialized behind one mutex. Subscribers run after it is
/// released and may call back into the poller.
pub struct TelemetryPoller {
    engine: EngineClient,
    store: Arc<TelemetryStore>,
    state: Mutex<PollState>,
}

impl TelemetryPoller {
    pub fn new(engine: EngineClient, store: Arc<TelemetryStore>) -> Self {
        Self {
            engine,
            store,
            state: Mutex::new(PollState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PollState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.store
    }

    /// Start or update the memory watch owned by `viewer`
    pub fn watch(&self, viewer: BlockId, watch: MemoryWatch) {
        self.lock().watches.insert(viewer, watch);
    }

    pub fn unwatch(&self, viewer: BlockId) {
        self.lock().watches.remove(&viewer);
    }

    pub fn watch_of(&self, viewer: BlockId) -> Option<MemoryWatch> {
        self.lock().watches.get(&viewer).copied()
    }

    /// Drop everything the poller knows about a removed block
    pub fn forget(&self, id: BlockId) {
        let forgotten = {
            let mut state = self.lock();
            state.watches.remove(&id);
            self.store.install_without(id)
        };
        if let Some(snapshot) = forgotten {
            self.store.notify(&snapshot);
        }
    }

    /// Publish an empty snapshot; watches stay registered
    pub fn reset(&self) {
        let snapshot = {
            let _state = self.lock();
            self.store.install(HashMap::new())
        };
        self.store.notify(&snapshot);
    }

    /// Perform one tick.
    ///
    /// When the output feed cannot be read the previous snapshot stays in
    /// place and `None` is returned. Subscribers are called after the poll
    /// lock is released.
    pub fn tick(&self) -> Option<Arc<TelemetrySnapshot>> {
        let mut state = self.lock();
        state.ticks += 1;

        let Some(mut outputs) = self.engine.read_outputs() else {
            state.failed_ticks += 1;
            return None;
        };

        for (viewer, watch) in &state.watches {
            let payload = self
                .engine
                .read_memory(watch.target, watch.offset, watch.size)
                .unwrap_or_default();
            outputs
                .entry(*viewer)
                .or_insert_with(OutputState::default)
                .payload = payload;
        }

        tracing::trace!("Poll tick {} with {} block(s)", state.ticks, outputs.len());
        let snapshot = self.store.install(outputs);
        drop(state);

        self.store.notify(&snapshot);
        Some(snapshot)
    }

    /// `(ticks, failed ticks)` since creation
    pub fn tick_counts(&self) -> (u64, u64) {
        let state = self.lock();
        (state.ticks, state.failed_ticks)
    }
}

impl std::fmt::Debug for TelemetryPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryPoller")
            .field("store", &self.store)
            .finish()
    }
}
