//! Inbound MIDI event classification.
//!
//! A device delivers [`DeviceEvent`]s, either built directly by a device
//! driver or parsed from raw bytes with `midi-msg`. [`DeviceEvent::classify`]
//! turns them into the flat [`InboundMidiEvent`] the router matches against
//! listener filters.

use crate::error::{Result, ResultExt};
use midi_msg::{ChannelVoiceMsg, ControlChange, MidiMsg};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event kinds a MIDI input block can listen for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum MidiEventKind {
    #[default]
    NoteOn,
    NoteOff,
    ControlChange,
}

impl MidiEventKind {
    /// All listenable kinds
    pub fn all() -> &'static [MidiEventKind] {
        &[
            MidiEventKind::NoteOn,
            MidiEventKind::NoteOff,
            MidiEventKind::ControlChange,
        ]
    }
}

impl fmt::Display for MidiEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MidiEventKind::NoteOn => "NoteOn",
            MidiEventKind::NoteOff => "NoteOff",
            MidiEventKind::ControlChange => "ControlChange",
        };
        write!(f, "{}", label)
    }
}

/// Message body as reported by a device driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMessage {
    NoteOn { number: u8, raw_attack: u8 },
    NoteOff { number: u8, raw_attack: u8 },
    ControlChange { controller: u8, raw_value: Option<u8> },
    /// Anything the router does not route (clock, sysex, pitch bend, ...)
    Other,
}

/// An event as delivered by a MIDI device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceEvent {
    /// Input port the event arrived on
    pub port: u8,
    /// 1-based channel, `None` for messages without one
    pub channel: Option<u8>,
    pub message: DeviceMessage,
}

impl DeviceEvent {
    /// Parse a raw MIDI message received on `port`.
    ///
    /// Channels are reported 1-based (status nibble + 1). A note-on with
    /// velocity 0 is reported as a note-off.
    pub fn from_bytes(port: u8, bytes: &[u8]) -> Result<Self> {
        let (msg, _len) = MidiMsg::from_midi(bytes)
            .with_context(|| format!("Unreadable message on port {}", port))?;

        let (channel, message) = match msg {
            MidiMsg::ChannelVoice { channel, msg } => {
                let message = match msg {
                    ChannelVoiceMsg::NoteOn { note, velocity: 0 } => DeviceMessage::NoteOff {
                        number: note,
                        raw_attack: 0,
                    },
                    ChannelVoiceMsg::NoteOn { note, velocity } => DeviceMessage::NoteOn {
                        number: note,
                        raw_attack: velocity,
                    },
                    ChannelVoiceMsg::NoteOff { note, velocity } => DeviceMessage::NoteOff {
                        number: note,
                        raw_attack: velocity,
                    },
                    ChannelVoiceMsg::ControlChange {
                        control: ControlChange::CC { control, value },
                    } => DeviceMessage::ControlChange {
                        controller: control,
                        raw_value: Some(value),
                    },
                    // Named controllers: take the number and value from the wire
                    ChannelVoiceMsg::ControlChange { .. } if bytes.len() >= 3 => {
                        DeviceMessage::ControlChange {
                            controller: bytes[1] & 0x7F,
                            raw_value: Some(bytes[2] & 0x7F),
                        }
                    }
                    _ => DeviceMessage::Other,
                };
                (Some(channel as u8 + 1), message)
            }
            // Controllers 120-127 decode as channel mode messages
            MidiMsg::ChannelMode { channel, .. } if bytes.len() >= 3 => (
                Some(channel as u8 + 1),
                DeviceMessage::ControlChange {
                    controller: bytes[1] & 0x7F,
                    raw_value: Some(bytes[2] & 0x7F),
                },
            ),
            _ => (None, DeviceMessage::Other),
        };

        Ok(Self {
            port,
            channel,
            message,
        })
    }

    /// Extract `(kind, note, value, channel)`.
    ///
    /// For control changes `note` is the controller number and `value` the raw
    /// controller value (0 when absent). For notes `note` is the note number and
    /// `value` the raw attack velocity. A missing channel becomes 0.
    pub fn classify(&self) -> Option<InboundMidiEvent> {
        let (kind, note, value) = match self.message {
            DeviceMessage::NoteOn { number, raw_attack } => {
                (MidiEventKind::NoteOn, number, raw_attack)
            }
            DeviceMessage::NoteOff { number, raw_attack } => {
                (MidiEventKind::NoteOff, number, raw_attack)
            }
            DeviceMessage::ControlChange {
                controller,
                raw_value,
            } => (
                MidiEventKind::ControlChange,
                controller,
                raw_value.unwrap_or(0),
            ),
            DeviceMessage::Other => return None,
        };

        Some(InboundMidiEvent {
            kind,
            note,
            value,
            channel: self.channel.unwrap_or(0),
            port: self.port,
        })
    }
}

/// A classified event ready for listener matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InboundMidiEvent {
    pub kind: MidiEventKind,
    pub note: u8,
    pub value: u8,
    pub channel: u8,
    pub port: u8,
}

impl InboundMidiEvent {
    pub fn note_on(port: u8, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            kind: MidiEventKind::NoteOn,
            note,
            value: velocity,
            channel,
            port,
        }
    }

    pub fn note_off(port: u8, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            kind: MidiEventKind::NoteOff,
            note,
            value: velocity,
            channel,
            port,
        }
    }

    pub fn control_change(port: u8, channel: u8, controller: u8, value: u8) -> Self {
        Self {
            kind: MidiEventKind::ControlChange,
            note: controller,
            value,
            channel,
            port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_on() {
        let event = DeviceEvent::from_bytes(0, &[0x90, 60, 100]).unwrap();
        assert_eq!(event.channel, Some(1));
        assert_eq!(
            event.classify(),
            Some(InboundMidiEvent::note_on(0, 1, 60, 100))
        );
    }

    #[test]
    fn test_parse_note_on_velocity_zero_is_note_off() {
        let event = DeviceEvent::from_bytes(2, &[0x91, 64, 0]).unwrap();
        let classified = event.classify().unwrap();
        assert_eq!(classified.kind, MidiEventKind::NoteOff);
        assert_eq!(classified.channel, 2);
        assert_eq!(classified.port, 2);
    }

    #[test]
    fn test_parse_control_change() {
        let event = DeviceEvent::from_bytes(0, &[0xB0, 7, 100]).unwrap();
        assert_eq!(
            event.classify(),
            Some(InboundMidiEvent::control_change(0, 1, 7, 100))
        );
    }

    #[test]
    fn test_channel_mode_controllers_are_control_changes() {
        // All sound off, channel 1
        let event = DeviceEvent::from_bytes(0, &[0xB0, 0x78, 0]).unwrap();
        assert_eq!(event.channel, Some(1));
        assert_eq!(
            event.classify(),
            Some(InboundMidiEvent::control_change(0, 1, 0x78, 0))
        );

        // Poly mode on, channel 16
        let event = DeviceEvent::from_bytes(3, &[0xBF, 0x7F, 0]).unwrap();
        assert_eq!(
            event.classify(),
            Some(InboundMidiEvent::control_change(3, 16, 0x7F, 0))
        );
    }

    #[test]
    fn test_pitch_bend_is_not_routed() {
        let event = DeviceEvent::from_bytes(0, &[0xE0, 0, 64]).unwrap();
        assert_eq!(event.message, DeviceMessage::Other);
        assert!(event.classify().is_none());
    }

    #[test]
    fn test_truncated_message_is_error() {
        assert!(DeviceEvent::from_bytes(0, &[0x90, 60]).is_err());
    }

    #[test]
    fn test_missing_channel_defaults_to_zero() {
        let event = DeviceEvent {
            port: 1,
            channel: None,
            message: DeviceMessage::NoteOn {
                number: 60,
                raw_attack: 90,
            },
        };
        assert_eq!(event.classify().unwrap().channel, 0);
    }

    #[test]
    fn test_missing_controller_value_is_zero() {
        let event = DeviceEvent {
            port: 0,
            channel: Some(3),
            message: DeviceMessage::ControlChange {
                controller: 74,
                raw_value: None,
            },
        };
        let classified = event.classify().unwrap();
        assert_eq!(classified.note, 74);
        assert_eq!(classified.value, 0);
    }

    #[test]
    fn test_kind_serializes_as_name() {
        let json = serde_json::to_string(&MidiEventKind::ControlChange).unwrap();
        assert_eq!(json, "\"ControlChange\"");
    }
}
