//! Latest-value cache of per-block output state
//!
//! The store holds one immutable [`TelemetrySnapshot`] behind an
//! [`ArcSwap`]. Readers get an `Arc` to the current snapshot without taking a
//! lock, and the same `Arc` is returned until the next publish, so render code
//! can compare snapshots by pointer to skip redundant work.
//!
//! Writes replace the whole snapshot. Entries are never merged across ticks.

use crate::types::{BlockId, OutputState};
use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Output state of every known block at one poll tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    /// Monotonic publish counter
    pub tick: u64,
    pub blocks: HashMap<BlockId, OutputState>,
}

impl TelemetrySnapshot {
    pub fn get(&self, id: BlockId) -> Option<&OutputState> {
        self.blocks.get(&id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block ids in ascending order
    pub fn ids(&self) -> Vec<BlockId> {
        let mut ids: Vec<BlockId> = self.blocks.keys().copied().collect();
        ids.sort();
        ids
    }
}

/// Handle returned by [`TelemetryStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&Arc<TelemetrySnapshot>) + Send + Sync>;

/// Process-wide telemetry cache, shared as `Arc<TelemetryStore>`
pub struct TelemetryStore {
    current: ArcSwap<TelemetrySnapshot>,
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(TelemetrySnapshot::default()),
            subscribers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Current snapshot; stable until the next publish
    pub fn snapshot(&self) -> Arc<TelemetrySnapshot> {
        self.current.load_full()
    }

    /// Latest output state of one block
    pub fn get(&self, id: BlockId) -> Option<OutputState> {
        self.current.load().get(id).cloned()
    }

    /// Call `callback` with every newly published snapshot
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Arc<TelemetrySnapshot>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, Arc::new(callback)));
        id
    }

    /// Returns whether the subscription existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .map(|s| s.len())
            .unwrap_or_default()
    }

    /// Replace the snapshot with `blocks` and notify subscribers
    pub fn publish(&self, blocks: HashMap<BlockId, OutputState>) -> Arc<TelemetrySnapshot> {
        let snapshot = self.install(blocks);
        self.notify(&snapshot);
        snapshot
    }

    /// Drop one block's entry
    pub fn forget(&self, id: BlockId) {
        if let Some(snapshot) = self.install_without(id) {
            self.notify(&snapshot);
        }
    }

    /// Publish an empty snapshot
    pub fn clear(&self) {
        self.publish(HashMap::new());
    }

    /// Swap in the next snapshot without running callbacks.
    ///
    /// Writers that serialize behind their own lock install under it and call
    /// [`notify`](Self::notify) after releasing it.
    pub(crate) fn install(&self, blocks: HashMap<BlockId, OutputState>) -> Arc<TelemetrySnapshot> {
        let tick = self.current.load().tick + 1;
        let snapshot = Arc::new(TelemetrySnapshot { tick, blocks });
        self.current.store(Arc::clone(&snapshot));
        snapshot
    }

    /// Swap in a copy without `id`; `None` when it had no entry
    pub(crate) fn install_without(&self, id: BlockId) -> Option<Arc<TelemetrySnapshot>> {
        let current = self.current.load_full();
        if !current.blocks.contains_key(&id) {
            return None;
        }

        let mut next = (*current).clone();
        next.blocks.remove(&id);
        let snapshot = Arc::new(next);
        self.current.store(Arc::clone(&snapshot));
        Some(snapshot)
    }

    pub(crate) fn notify(&self, snapshot: &Arc<TelemetrySnapshot>) {
        // Callbacks run outside the lock so they may (un)subscribe
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in subscribers {
            callback(snapshot);
        }
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TelemetryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryStore")
            .field("tick", &self.current.load().tick)
            .field("blocks", &self.current.load().len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
