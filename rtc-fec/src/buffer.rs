//! Bounded buffers of recently received packets, ordered by sequence number.

use crate::flexfec::FlexFecPacket;
use crate::packet::RawPacket;
use crate::sequence::SequenceUnwrapper;
use bytes::BytesMut;
use shared::error::{Error, Result};
use std::collections::BTreeMap;

/// Initial allocation for a media packet copy; grown when a packet is larger.
pub(crate) const INITIAL_BUFFER_SIZE: usize = 1500;

/// Buffer of media packet copies used as recovery peers.
pub type MediaBuffer = SequenceBuffer<RawPacket>;

/// Buffer of FlexFEC packets waiting for enough media to act on.
pub type FecBuffer = SequenceBuffer<FlexFecPacket>;

/// A bounded map from RTP sequence number to value.
///
/// Entries are kept in wraparound-aware sequence order: keys are unwrapped to
/// 64 bits around the highest sequence number inserted, so the first entry is
/// always the oldest one. Inserting a new sequence number into a full buffer
/// evicts that oldest entry first.
///
/// Lookups by `u16` ([`get`](Self::get), [`contains`](Self::contains),
/// [`remove`](Self::remove)) resolve the sequence number relative to the
/// highest one inserted. An entry more than half the sequence space behind it
/// no longer resolves that way; it stays reachable through
/// [`unwrapped_keys`](Self::unwrapped_keys) until evicted.
#[derive(Debug)]
pub struct SequenceBuffer<T> {
    entries: BTreeMap<i64, T>,
    capacity: usize,
    unwrapper: SequenceUnwrapper,
}

impl<T> SequenceBuffer<T> {
    /// Create a buffer holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::ErrInvalidBufferCapacity);
        }

        Ok(Self {
            entries: BTreeMap::new(),
            capacity,
            unwrapper: SequenceUnwrapper::new(),
        })
    }

    /// Insert `value` under `seq`.
    ///
    /// Returns the value that left the buffer because of this call: the
    /// previous value under `seq` if it was replaced, otherwise the evicted
    /// oldest entry if the buffer was full.
    pub fn insert(&mut self, seq: u16, value: T) -> Option<T> {
        let key = self.unwrapper.unwrap(seq);
        if let Some(slot) = self.entries.get_mut(&key) {
            return Some(std::mem::replace(slot, value));
        }

        let evicted = if self.is_full() {
            self.entries.pop_first().map(|(_, evicted)| evicted)
        } else {
            None
        };
        self.entries.insert(key, value);
        evicted
    }

    pub fn get(&self, seq: u16) -> Option<&T> {
        self.entries.get(&self.unwrapper.peek(seq))
    }

    pub fn contains(&self, seq: u16) -> bool {
        self.entries.contains_key(&self.unwrapper.peek(seq))
    }

    pub fn remove(&mut self, seq: u16) -> Option<T> {
        self.entries.remove(&self.unwrapper.peek(seq))
    }

    /// Remove and return the oldest entry.
    pub fn pop_oldest(&mut self) -> Option<(u16, T)> {
        self.entries
            .pop_first()
            .map(|(key, value)| (key as u16, value))
    }

    /// Sequence number of the oldest entry.
    pub fn oldest(&self) -> Option<u16> {
        self.entries.first_key_value().map(|(&key, _)| key as u16)
    }

    /// Snapshot of the buffered sequence numbers, oldest first.
    pub fn keys(&self) -> Vec<u16> {
        self.entries.keys().map(|&key| key as u16).collect()
    }

    /// Snapshot of the stored 64-bit keys, oldest first.
    pub fn unwrapped_keys(&self) -> Vec<i64> {
        self.entries.keys().copied().collect()
    }

    pub fn get_unwrapped(&self, key: i64) -> Option<&T> {
        self.entries.get(&key)
    }

    pub fn remove_unwrapped(&mut self, key: i64) -> Option<T> {
        self.entries.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }
}

impl SequenceBuffer<RawPacket> {
    /// Store a copy of `packet`, keyed by its sequence number.
    ///
    /// The caller keeps `packet`. When the buffer is full, the storage of the
    /// evicted oldest packet is reused for the copy.
    pub fn insert_copy(&mut self, packet: &RawPacket) {
        let seq = packet.sequence_number();
        let mut storage = match self.remove(seq) {
            Some(previous) => previous.into_inner(),
            None if self.is_full() => self
                .pop_oldest()
                .map(|(_, evicted)| evicted.into_inner())
                .unwrap_or_default(),
            None => BytesMut::with_capacity(INITIAL_BUFFER_SIZE.max(packet.len())),
        };

        storage.clear();
        storage.extend_from_slice(packet.as_bytes());
        self.insert(seq, RawPacket::from_trusted(storage));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_capacity() {
        assert!(matches!(
            SequenceBuffer::<u16>::new(0),
            Err(Error::ErrInvalidBufferCapacity)
        ));
    }

    #[test]
    fn test_insert_get_remove() {
        let mut buf = SequenceBuffer::new(4).unwrap();
        assert!(buf.is_empty());

        assert_eq!(buf.insert(10, "a"), None);
        assert_eq!(buf.insert(11, "b"), None);
        assert_eq!(buf.get(10), Some(&"a"));
        assert!(buf.contains(11));
        assert!(!buf.contains(12));

        assert_eq!(buf.remove(10), Some("a"));
        assert_eq!(buf.get(10), None);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_replace_does_not_evict() {
        let mut buf = SequenceBuffer::new(2).unwrap();
        buf.insert(1, 'x');
        buf.insert(2, 'y');
        assert_eq!(buf.insert(2, 'z'), Some('y'));
        assert_eq!(buf.keys(), vec![1, 2]);
        assert_eq!(buf.get(2), Some(&'z'));
    }

    #[test]
    fn test_eviction_keeps_most_recent() {
        let capacity = 8;
        let mut buf = SequenceBuffer::new(capacity).unwrap();
        for seq in 0..=capacity as u16 {
            buf.insert(seq, seq);
        }

        assert_eq!(buf.len(), capacity);
        assert!(buf.get(0).is_none());
        for seq in 1..=capacity as u16 {
            assert_eq!(buf.get(seq), Some(&seq));
        }
    }

    #[test]
    fn test_eviction_across_wraparound() {
        let mut buf = SequenceBuffer::new(4).unwrap();
        for seq in [65533u16, 65534, 65535, 0] {
            buf.insert(seq, seq);
        }
        assert_eq!(buf.oldest(), Some(65533));

        assert_eq!(buf.insert(1, 1), Some(65533));
        assert_eq!(buf.keys(), vec![65534, 65535, 0, 1]);
    }

    #[test]
    fn test_out_of_order_insert_is_ordered() {
        let mut buf = SequenceBuffer::new(4).unwrap();
        buf.insert(2, ());
        buf.insert(0, ());
        buf.insert(65535, ());
        buf.insert(1, ());
        assert_eq!(buf.keys(), vec![65535, 0, 1, 2]);

        // Full: the oldest entry makes room even for a late packet
        assert_eq!(buf.insert(65534, ()), Some(()));
        assert_eq!(buf.keys(), vec![65534, 0, 1, 2]);
    }

    #[test]
    fn test_far_behind_entry_reachable_by_unwrapped_key() {
        let mut buf = SequenceBuffer::new(8).unwrap();
        buf.insert(100, 'a');
        buf.insert(30100, 'b');
        buf.insert(60100, 'c');

        // 100 is now more than half the sequence space behind 60100
        assert!(!buf.contains(100));
        assert_eq!(buf.keys(), vec![100, 30100, 60100]);

        let keys = buf.unwrapped_keys();
        assert_eq!(keys, vec![100, 30100, 60100]);
        assert_eq!(buf.get_unwrapped(keys[0]), Some(&'a'));
        assert_eq!(buf.remove_unwrapped(keys[0]), Some('a'));
        assert_eq!(buf.keys(), vec![30100, 60100]);
    }

    #[test]
    fn test_pop_oldest() {
        let mut buf = SequenceBuffer::new(3).unwrap();
        buf.insert(65535, 'a');
        buf.insert(0, 'b');
        assert_eq!(buf.pop_oldest(), Some((65535, 'a')));
        assert_eq!(buf.pop_oldest(), Some((0, 'b')));
        assert_eq!(buf.pop_oldest(), None);
    }

    #[test]
    fn test_insert_copy_reuses_evicted_storage() {
        let mut media = MediaBuffer::new(2).unwrap();
        media.insert_copy(&RawPacket::with_payload(1, 1, 0, 96, false, &[1; 100]));
        media.insert_copy(&RawPacket::with_payload(1, 2, 0, 96, false, &[2; 100]));

        let big = RawPacket::with_payload(1, 3, 0, 96, false, &[3; 3000]);
        media.insert_copy(&big);

        assert_eq!(media.len(), 2);
        assert!(media.get(1).is_none());
        assert_eq!(media.get(3), Some(&big));
        assert_eq!(media.get(2).map(|p| p.payload()[0]), Some(2));
    }

    #[test]
    fn test_insert_copy_duplicate_replaces() {
        let mut media = MediaBuffer::new(2).unwrap();
        media.insert_copy(&RawPacket::with_payload(1, 7, 0, 96, false, &[1]));
        media.insert_copy(&RawPacket::with_payload(1, 8, 0, 96, false, &[2]));
        media.insert_copy(&RawPacket::with_payload(1, 8, 0, 96, false, &[9]));

        assert_eq!(media.keys(), vec![7, 8]);
        assert_eq!(media.get(8).map(|p| p.payload()), Some(&[9u8][..]));
    }
}
