//! Listener filters and registration tokens

use crate::midi::event::{InboundMidiEvent, MidiEventKind};
use crate::types::BlockId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Channels a listener accepts.
///
/// Serialized as a plain list where the empty list means "any channel".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<u8>", into = "Vec<u8>")]
pub enum ChannelFilter {
    #[default]
    Any,
    Only(BTreeSet<u8>),
}

impl ChannelFilter {
    /// Build a filter from a channel list; an empty list accepts any channel
    pub fn from_channels(channels: impl IntoIterator<Item = u8>) -> Self {
        let set: BTreeSet<u8> = channels.into_iter().collect();
        if set.is_empty() {
            ChannelFilter::Any
        } else {
            ChannelFilter::Only(set)
        }
    }

    pub fn accepts(&self, channel: u8) -> bool {
        match self {
            ChannelFilter::Any => true,
            ChannelFilter::Only(set) => set.contains(&channel),
        }
    }

    /// Channel list as sent to the engine
    pub fn to_vec(&self) -> Vec<u8> {
        match self {
            ChannelFilter::Any => Vec::new(),
            ChannelFilter::Only(set) => set.iter().copied().collect(),
        }
    }
}

impl From<Vec<u8>> for ChannelFilter {
    fn from(channels: Vec<u8>) -> Self {
        ChannelFilter::from_channels(channels)
    }
}

impl From<ChannelFilter> for Vec<u8> {
    fn from(filter: ChannelFilter) -> Self {
        filter.to_vec()
    }
}

/// Which events a MIDI input block wants delivered.
///
/// Two filters are equal when kind, port and channel set are equal; the
/// router uses this to skip redundant re-registrations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListenerFilter {
    pub kind: MidiEventKind,
    pub port: u8,
    pub channels: ChannelFilter,
}

impl ListenerFilter {
    pub fn new(kind: MidiEventKind, port: u8, channels: ChannelFilter) -> Self {
        Self {
            kind,
            port,
            channels,
        }
    }

    pub fn matches(&self, event: &InboundMidiEvent) -> bool {
        self.kind == event.kind && self.port == event.port && self.channels.accepts(event.channel)
    }
}

/// Identifies one installation of a listener.
///
/// Every (re-)registration gets a fresh generation, so work tied to a token
/// that has since been superseded or revoked can detect that and do nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken {
    pub owner: BlockId,
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_channel_list_is_any() {
        assert_eq!(ChannelFilter::from_channels([]), ChannelFilter::Any);
        assert!(ChannelFilter::Any.accepts(0));
        assert!(ChannelFilter::Any.accepts(16));
    }

    #[test]
    fn test_filter_matches() {
        let filter = ListenerFilter::new(
            MidiEventKind::NoteOn,
            0,
            ChannelFilter::from_channels([1]),
        );

        assert!(filter.matches(&InboundMidiEvent::note_on(0, 1, 60, 100)));
        assert!(!filter.matches(&InboundMidiEvent::note_on(0, 2, 60, 100)));
        assert!(!filter.matches(&InboundMidiEvent::note_on(1, 1, 60, 100)));
        assert!(!filter.matches(&InboundMidiEvent::note_off(0, 1, 60, 0)));
    }

    #[test]
    fn test_structural_equality_ignores_channel_order() {
        let a = ListenerFilter::new(MidiEventKind::NoteOn, 0, vec![3, 1].into());
        let b = ListenerFilter::new(MidiEventKind::NoteOn, 0, vec![1, 3, 3].into());
        assert_eq!(a, b);
    }

    #[test]
    fn test_channel_filter_serializes_as_list() {
        let json = serde_json::to_string(&ChannelFilter::from_channels([2, 1])).unwrap();
        assert_eq!(json, "[1,2]");
        let any: ChannelFilter = serde_json::from_str("[]").unwrap();
        assert_eq!(any, ChannelFilter::Any);
    }

    proptest! {
        #[test]
        fn prop_only_listed_channels_accepted(
            channels in proptest::collection::btree_set(1u8..=16, 1..8),
            candidate in 0u8..=16,
        ) {
            let filter = ChannelFilter::from_channels(channels.iter().copied());
            prop_assert_eq!(filter.accepts(candidate), channels.contains(&candidate));
        }
    }
}
