//! MIDI listener table and event dispatch
//!
//! Each MidiIn block owns at most one listener. The table is the only
//! structure the router mutates; it lives behind an `RwLock` so that
//! dispatch (read lock, held for the whole delivery) and revocation (write
//! lock) are strictly ordered: once `revoke` returns, no later dispatch can
//! reach the revoked owner.
//!
//! # Registration
//!
//! [`MidiRouter::register`] installs the listener synchronously, so it
//! matches from the very next event. A listener whose port the device does
//! not report is kept but skipped by dispatch until [`MidiRouter::reopen`]
//! confirms the port. Preparing the device port happens in the background;
//! its outcome is discarded when the registration has been superseded in the
//! meantime (see [`ListenerToken`]).
//!
//! # Stepping
//!
//! After delivering an event to one or more listeners the router triggers
//! exactly one manual step, unless the scheduler is free-running.

use crate::engine::{Command, EngineClient};
use crate::error::Result;
use crate::midi::device::MidiDevice;
use crate::midi::event::{DeviceEvent, InboundMidiEvent};
use crate::midi::listener::{ListenerFilter, ListenerToken};
use crate::telemetry::Stepper;
use crate::types::BlockId;
use crossbeam_channel::Receiver;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::JoinHandle;

/// Result of a registration request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Filter identical to the active one, nothing changed
    Unchanged,
    /// A new listener was installed (replacing any previous one)
    Installed(ListenerToken),
}

/// Outcome of waiting for a port to become ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// The registration was replaced or revoked before the port resolved
    Superseded,
    /// The device could not open the port; the listener stays installed
    Unavailable(String),
}

/// Raw bytes received from a device port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMidiInput {
    pub port: u8,
    pub bytes: Vec<u8>,
}

/// Router counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    /// Events classified and matched against the table
    pub events: u64,
    /// Events that matched no listener
    pub unmatched: u64,
    /// Total deliveries (one per matching listener)
    pub deliveries: u64,
    /// Manual steps triggered
    pub steps: u64,
}

/// Device state of a listener's port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortState {
    /// Known to the device, not yet confirmed open
    Pending,
    Ready,
    /// Unknown to the device or failed to open; never matched
    Unavailable,
}

#[derive(Debug)]
struct ListenerEntry {
    filter: ListenerFilter,
    generation: u64,
    port: PortState,
}

#[derive(Default)]
struct Counters {
    events: AtomicU64,
    unmatched: AtomicU64,
    deliveries: AtomicU64,
    steps: AtomicU64,
}

struct RouterInner {
    engine: EngineClient,
    stepper: Arc<dyn Stepper>,
    device: Arc<dyn MidiDevice>,
    listeners: RwLock<BTreeMap<BlockId, ListenerEntry>>,
    generation: AtomicU64,
    counters: Counters,
}

/// Shared handle to the listener table; clones refer to the same router
#[derive(Clone)]
pub struct MidiRouter {
    inner: Arc<RouterInner>,
}

impl MidiRouter {
    pub fn new(
        engine: EngineClient,
        stepper: Arc<dyn Stepper>,
        device: Arc<dyn MidiDevice>,
    ) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                engine,
                stepper,
                device,
                listeners: RwLock::new(BTreeMap::new()),
                generation: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    fn read_table(&self) -> RwLockReadGuard<'_, BTreeMap<BlockId, ListenerEntry>> {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, BTreeMap<BlockId, ListenerEntry>> {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install or replace the listener for `owner` without touching the device
    fn install(&self, owner: BlockId, filter: ListenerFilter) -> Registration {
        let mut table = self.write_table();

        if let Some(existing) = table.get(&owner) {
            if existing.filter == filter {
                return Registration::Unchanged;
            }
        }

        let port = if self.inner.device.ports().contains(&filter.port) {
            PortState::Pending
        } else {
            tracing::warn!(
                "MIDI port {} is unknown to {}, block {} will not receive events",
                filter.port,
                self.inner.device.name(),
                owner
            );
            PortState::Unavailable
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let replaced = table
            .insert(
                owner,
                ListenerEntry {
                    filter: filter.clone(),
                    generation,
                    port,
                },
            )
            .is_some();

        tracing::debug!(
            "{} listener for block {}: {} on port {} channels {:?}",
            if replaced { "Replaced" } else { "Installed" },
            owner,
            filter.kind,
            filter.port,
            filter.channels.to_vec()
        );

        Registration::Installed(ListenerToken { owner, generation })
    }

    /// Register `owner`'s listener.
    ///
    /// The listener is active as soon as this returns. Port readiness is
    /// requested in the background when a tokio runtime is available.
    pub fn register(&self, owner: BlockId, filter: ListenerFilter) -> Registration {
        let port = filter.port;
        let outcome = self.install(owner, filter);

        if let Registration::Installed(token) = outcome {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let router = self.clone();
                    handle.spawn(async move {
                        router.await_ready(token, port).await;
                    });
                }
                Err(_) => {
                    tracing::debug!(
                        "No async runtime, port {} readiness for block {} not tracked",
                        port,
                        owner
                    );
                }
            }
        }

        outcome
    }

    /// Register `owner`'s listener and wait for its port to resolve
    pub async fn register_and_wait(
        &self,
        owner: BlockId,
        filter: ListenerFilter,
    ) -> (Registration, Option<Readiness>) {
        let port = filter.port;
        match self.install(owner, filter) {
            Registration::Unchanged => (Registration::Unchanged, None),
            Registration::Installed(token) => {
                let readiness = self.await_ready(token, port).await;
                (Registration::Installed(token), Some(readiness))
            }
        }
    }

    /// Open the device port for a registration and record the outcome.
    ///
    /// Does nothing when `token` no longer names the active registration.
    pub async fn await_ready(&self, token: ListenerToken, port: u8) -> Readiness {
        let result = self.inner.device.open_port(port).await;

        let mut table = self.write_table();
        let entry = match table.get_mut(&token.owner) {
            Some(entry) if entry.generation == token.generation => entry,
            _ => {
                tracing::debug!(
                    "Discarding stale port readiness for block {} (generation {})",
                    token.owner,
                    token.generation
                );
                return Readiness::Superseded;
            }
        };

        match result {
            Ok(()) => {
                entry.port = PortState::Ready;
                tracing::info!("MIDI port {} ready for block {}", port, token.owner);
                Readiness::Ready
            }
            Err(e) => {
                entry.port = PortState::Unavailable;
                tracing::warn!(
                    "MIDI port {} unavailable for block {}: {}",
                    port,
                    token.owner,
                    e
                );
                Readiness::Unavailable(e.to_string())
            }
        }
    }

    /// Ask the device for `owner`'s port again, e.g. after it was attached.
    ///
    /// `None` when `owner` has no listener.
    pub async fn reopen(&self, owner: BlockId) -> Option<Readiness> {
        let (token, port) = {
            let table = self.read_table();
            let entry = table.get(&owner)?;
            (
                ListenerToken {
                    owner,
                    generation: entry.generation,
                },
                entry.filter.port,
            )
        };
        Some(self.await_ready(token, port).await)
    }

    /// Remove `owner`'s listener; returns whether one was registered
    pub fn revoke(&self, owner: BlockId) -> bool {
        let removed = self.write_table().remove(&owner).is_some();
        if removed {
            tracing::debug!("Revoked listener for block {}", owner);
        }
        removed
    }

    pub fn is_registered(&self, owner: BlockId) -> bool {
        self.read_table().contains_key(&owner)
    }

    /// Whether the device confirmed the listener's port
    pub fn is_ready(&self, owner: BlockId) -> bool {
        self.read_table()
            .get(&owner)
            .is_some_and(|e| e.port == PortState::Ready)
    }

    pub fn filter_of(&self, owner: BlockId) -> Option<ListenerFilter> {
        self.read_table().get(&owner).map(|e| e.filter.clone())
    }

    pub fn listener_count(&self) -> usize {
        self.read_table().len()
    }

    /// Deliver one classified event; returns the number of listeners reached
    pub fn dispatch(&self, event: &InboundMidiEvent) -> usize {
        let counters = &self.inner.counters;
        counters.events.fetch_add(1, Ordering::Relaxed);

        let delivered = {
            let table = self.read_table();
            let mut delivered = 0;
            for (owner, entry) in table.iter() {
                if entry.port == PortState::Unavailable || !entry.filter.matches(event) {
                    continue;
                }
                self.inner.engine.send(
                    *owner,
                    Command::Midi {
                        event: event.kind,
                        note: event.note,
                        value: event.value,
                        channel: event.channel,
                        port: event.port,
                    },
                );
                delivered += 1;
            }
            delivered
        };

        if delivered == 0 {
            counters.unmatched.fetch_add(1, Ordering::Relaxed);
            return 0;
        }

        counters
            .deliveries
            .fetch_add(delivered as u64, Ordering::Relaxed);
        tracing::debug!(
            "{} on port {} channel {} delivered to {} listener(s)",
            event.kind,
            event.port,
            event.channel,
            delivered
        );

        if !self.inner.stepper.is_free_running() {
            self.inner.stepper.step();
            counters.steps.fetch_add(1, Ordering::Relaxed);
        }

        delivered
    }

    /// Classify and deliver a device event; unroutable messages are ignored
    pub fn dispatch_device(&self, event: &DeviceEvent) -> usize {
        match event.classify() {
            Some(classified) => self.dispatch(&classified),
            None => 0,
        }
    }

    /// Parse raw bytes received on `port` and deliver them
    pub fn dispatch_raw(&self, port: u8, bytes: &[u8]) -> Result<usize> {
        let event = DeviceEvent::from_bytes(port, bytes)?;
        Ok(self.dispatch_device(&event))
    }

    /// Spawn a thread that feeds raw device input into the router until the
    /// sending side disconnects
    pub fn spawn_input_pump(&self, input: Receiver<RawMidiInput>) -> JoinHandle<()> {
        let router = self.clone();
        std::thread::spawn(move || {
            tracing::info!("MIDI input pump started");
            for raw in input.iter() {
                if let Err(e) = router.dispatch_raw(raw.port, &raw.bytes) {
                    tracing::warn!("Dropping MIDI input on port {}: {}", raw.port, e);
                }
            }
            tracing::info!("MIDI input pump stopped");
        })
    }

    /// Name of the underlying device
    pub fn device_name(&self) -> &str {
        self.inner.device.name()
    }

    pub fn stats(&self) -> RouterStats {
        let c = &self.inner.counters;
        RouterStats {
            events: c.events.load(Ordering::Relaxed),
            unmatched: c.unmatched.load(Ordering::Relaxed),
            deliveries: c.deliveries.load(Ordering::Relaxed),
            steps: c.steps.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for MidiRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiRouter")
            .field("device", &self.inner.device.name())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
