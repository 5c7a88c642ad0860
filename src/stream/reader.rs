//! Decoding of raw stream read replies into batches of entries.
//!
//! `XREADGROUP` returns, per requested stream, an ordered list of
//! (entry id, field mapping) pairs. This module flattens that shape into a
//! single ordered [`Batch`] of [`StreamEntry`] values.

use std::collections::HashMap;
use std::fmt;

// Type alias for the complex Redis response type.
pub(crate) type XReadGroupReply = Option<Vec<(String, Vec<(String, HashMap<String, String>)>)>>;

/// Store-assigned stream entry identifier.
///
/// Redis encodes ids as `millis-sequence`; ids are monotonically increasing
/// within a stream, so the derived ordering matches delivery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId {
    /// Milliseconds part of the id (server clock at append time).
    pub timestamp_ms: u64,
    /// Sequence number distinguishing entries appended in the same millisecond.
    pub sequence: u64,
}

impl EntryId {
    /// Create an entry id from its parts.
    pub fn new(timestamp_ms: u64, sequence: u64) -> Self {
        Self {
            timestamp_ms,
            sequence,
        }
    }

    /// Parse a `millis-sequence` id as returned by the store.
    ///
    /// Returns `None` when the input does not match that shape.
    pub fn parse(id: &str) -> Option<Self> {
        let (ts_str, seq_str) = id.split_once('-')?;
        let timestamp_ms = ts_str.parse().ok()?;
        let sequence = seq_str.parse().ok()?;
        Some(Self {
            timestamp_ms,
            sequence,
        })
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.timestamp_ms, self.sequence)
    }
}

/// One decoded stream entry: a store-assigned id plus its field mapping.
///
/// Never mutated after decoding; consumed by the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Store-assigned identifier.
    pub id: EntryId,
    /// Field name to string value mapping.
    pub fields: HashMap<String, String>,
}

/// An ordered batch of entries flattened from one read reply.
///
/// Entries appear in ascending id order. The design reads exactly one stream
/// per session, so flattening simply concatenates the entries of the single
/// returned stream record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    entries: Vec<StreamEntry>,
}

impl Batch {
    /// Number of entries in the batch.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entries in delivery order.
    pub fn entries(&self) -> &[StreamEntry] {
        &self.entries
    }

    /// Iterate over the entry ids in delivery order.
    pub fn ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    /// The id of the last entry, if any.
    pub fn last_id(&self) -> Option<EntryId> {
        self.entries.last().map(|e| e.id)
    }
}

impl IntoIterator for Batch {
    type Item = StreamEntry;
    type IntoIter = std::vec::IntoIter<StreamEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a StreamEntry;
    type IntoIter = std::slice::Iter<'a, StreamEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Flatten an `XREADGROUP` reply into one batch.
///
/// A nil reply (block timeout with no new entries) yields an empty batch.
/// Entries whose id does not parse are skipped; the store never produces
/// these, but a defect upstream should not abort the loop.
pub(crate) fn flatten_reply(reply: XReadGroupReply) -> Batch {
    let mut entries = Vec::new();
    if let Some(streams) = reply {
        for (_stream_key, stream_entries) in streams {
            for (id, fields) in stream_entries {
                match EntryId::parse(&id) {
                    Some(id) => entries.push(StreamEntry { id, fields }),
                    None => tracing::debug!(id = %id, "skipping entry with malformed id"),
                }
            }
        }
    }
    Batch { entries }
}
