//! Per-peer sequenced buffers.
//!
//! Each peer owns one [`DataBuffer`] for sending and one for receiving. The
//! send side assigns sequence numbers and keeps payloads until they are
//! acknowledged. The receive side holds out-of-order arrivals and releases
//! them strictly in sequence.

use crate::action::Action;
use std::collections::BTreeMap;
use std::time::Instant;

/// A buffered payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Action the payload was sent or received with
    pub action: Action,
    /// Payload bytes
    pub data: Vec<u8>,
    /// Last transmission (send side only)
    pub sent_at: Option<Instant>,
}

impl Payload {
    /// Create a payload that has not been transmitted
    #[must_use]
    pub fn new(action: Action, data: Vec<u8>) -> Self {
        Self {
            action,
            data,
            sent_at: None,
        }
    }
}

/// Position of wire sequence `seq` nearest to `reference`.
///
/// Wire sequences are 32 bits and wrap; positions are 64 bits and never do.
/// A sequence up to 2^31 behind `reference` resolves before it, anything
/// else after it.
fn position(reference: u64, seq: u32) -> Option<u64> {
    let distance = seq.wrapping_sub(reference as u32) as i32;
    reference.checked_add_signed(i64::from(distance))
}

/// Ordered sequence-number buffer.
///
/// Entries are keyed by their unwrapped position, so ordering and duplicate
/// detection survive the 32-bit wire sequence wrapping around.
#[derive(Debug, Default)]
pub struct DataBuffer {
    entries: BTreeMap<u64, Payload>,
    next_pop: u64,
    next_push: u64,
}

impl DataBuffer {
    /// Create an empty buffer starting at sequence 0
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a payload for sending and return its sequence number.
    ///
    /// The payload is stamped as transmitted at `now`; the caller sends it
    /// immediately.
    pub fn push_back(&mut self, action: Action, data: Vec<u8>, now: Instant) -> u32 {
        let pos = self.next_push;
        self.next_push += 1;
        self.entries.insert(
            pos,
            Payload {
                action,
                data,
                sent_at: Some(now),
            },
        );
        pos as u32
    }

    /// Store a received payload at `seq`.
    ///
    /// Returns false if the payload was dropped: already delivered (behind
    /// the next expected sequence) or already held.
    pub fn insert(&mut self, seq: u32, action: Action, data: Vec<u8>) -> bool {
        let Some(pos) = position(self.next_pop, seq) else {
            return false;
        };
        if pos < self.next_pop || self.entries.contains_key(&pos) {
            return false;
        }
        self.entries.insert(pos, Payload::new(action, data));
        true
    }

    /// Release the next payload if it is the one expected
    pub fn pop(&mut self) -> Option<Payload> {
        let entry = self.entries.first_entry()?;
        if *entry.key() != self.next_pop {
            return None;
        }
        self.next_pop += 1;
        Some(entry.remove())
    }

    /// Drop an acknowledged send-side entry.
    ///
    /// Returns whether the entry was still held. Duplicate acks return false.
    pub fn ack(&mut self, seq: u32) -> bool {
        self.sent_position(seq)
            .and_then(|pos| self.entries.remove(&pos))
            .is_some()
    }

    fn sent_position(&self, seq: u32) -> Option<u64> {
        position(self.next_push, seq).filter(|&pos| pos < self.next_push)
    }

    /// Lowest sequence currently held
    #[must_use]
    pub fn earliest_available(&self) -> Option<u32> {
        self.entries.keys().next().map(|&pos| pos as u32)
    }

    /// Sequence [`pop`](Self::pop) is waiting for
    #[must_use]
    pub fn next_expected_pop_seq(&self) -> u32 {
        self.next_pop as u32
    }

    /// Whether [`pop`](Self::pop) has released anything yet
    #[must_use]
    pub fn has_released(&self) -> bool {
        self.next_pop > 0
    }

    /// Sequence the next [`push_back`](Self::push_back) will assign
    #[must_use]
    pub fn next_push_seq(&self) -> u32 {
        self.next_push as u32
    }

    /// Sequences missing before the earliest held entry, oldest first
    pub fn missing(&self) -> impl Iterator<Item = u32> + '_ {
        let end = self
            .entries
            .keys()
            .next()
            .copied()
            .unwrap_or(self.next_pop)
            .max(self.next_pop);
        (self.next_pop..end).map(|pos| pos as u32)
    }

    /// Whether a gap holds back the earliest entry
    #[must_use]
    pub fn has_gap(&self) -> bool {
        self.entries
            .keys()
            .next()
            .is_some_and(|&pos| pos > self.next_pop)
    }

    /// Held payload at `seq`
    #[must_use]
    pub fn get(&self, seq: u32) -> Option<&Payload> {
        self.sent_position(seq).and_then(|pos| self.entries.get(&pos))
    }

    /// Refresh the transmission time of `seq`. Returns false if not held.
    pub fn mark_sent(&mut self, seq: u32, now: Instant) -> bool {
        let Some(pos) = self.sent_position(seq) else {
            return false;
        };
        match self.entries.get_mut(&pos) {
            Some(payload) => {
                payload.sent_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Held entries in sequence order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Payload)> {
        self.entries
            .iter()
            .map(|(&pos, payload)| (pos as u32, payload))
    }

    /// Number of held entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
