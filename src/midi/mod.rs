//! MIDI input routing
//!
//! Inbound device events are classified ([`event`]), matched against the
//! per-block listener table ([`router`]) and forwarded to the engine as
//! [`Command::Midi`](crate::engine::Command::Midi).
//!
//! # Components
//!
//! - [`MidiRouter`] - Listener table, dispatch and manual stepping
//! - [`ListenerFilter`] / [`ChannelFilter`] - What a MidiIn block listens for
//! - [`MidiDevice`] - Port readiness boundary, with [`VirtualMidiDevice`] for
//!   in-process use
//! - `MidirDevice` - Hardware input via `midir` (feature `midi-io`)

pub mod device;
pub mod event;
#[cfg(feature = "midi-io")]
pub mod hardware;
pub mod listener;
pub mod router;

pub use device::{MidiDevice, PortFuture, VirtualMidiDevice};
pub use event::{DeviceEvent, DeviceMessage, InboundMidiEvent, MidiEventKind};
#[cfg(feature = "midi-io")]
pub use hardware::MidirDevice;
pub use listener::{ChannelFilter, ListenerFilter, ListenerToken};
pub use router::{MidiRouter, RawMidiInput, Readiness, Registration, RouterStats};
