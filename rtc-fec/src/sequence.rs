//! Sequence number arithmetic over the 16-bit RTP sequence space.
//!
//! RTP sequence numbers wrap from 65535 back to 0, so ordering is decided by
//! the sign of the 16-bit difference rather than by magnitude: 5 comes after
//! 65530 because `5 - 65530` is a small positive number modulo 2^16.

use std::cmp::Ordering;

/// Half of u16 max value, used for sequence number wraparound detection.
const UINT16_SIZE_HALF: u16 = 1 << 15;

/// Returns `true` if `b` comes after `a` in the wraparound sequence space.
///
/// Two numbers exactly half the space apart are unordered: neither precedes
/// the other.
pub fn precedes(a: u16, b: u16) -> bool {
    let diff = b.wrapping_sub(a);
    diff != 0 && diff < UINT16_SIZE_HALF
}

/// Forward distance from `a` to `b`, i.e. how many increments take `a` to `b`.
pub fn distance(a: u16, b: u16) -> u16 {
    b.wrapping_sub(a)
}

/// Wraparound-aware comparison, consistent with [`precedes`].
pub fn compare(a: u16, b: u16) -> Ordering {
    if a == b {
        Ordering::Equal
    } else if precedes(a, b) {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// Maps 16-bit sequence numbers to monotonic 64-bit keys.
///
/// Keys are computed relative to the highest sequence number seen so far, so
/// any two numbers within half the sequence space of it keep the ordering
/// given by [`precedes`]. The low 16 bits of a key are always the original
/// sequence number.
#[derive(Debug, Default, Clone)]
pub(crate) struct SequenceUnwrapper {
    highest: Option<i64>,
}

impl SequenceUnwrapper {
    pub(crate) fn new() -> Self {
        Self { highest: None }
    }

    /// Unwrap `seq`, advancing the reference point if `seq` is newer.
    pub(crate) fn unwrap(&mut self, seq: u16) -> i64 {
        let unwrapped = self.peek(seq);
        if self.highest.is_none_or(|highest| unwrapped > highest) {
            self.highest = Some(unwrapped);
        }
        unwrapped
    }

    /// Unwrap `seq` without touching the reference point.
    pub(crate) fn peek(&self, seq: u16) -> i64 {
        match self.highest {
            None => seq as i64,
            Some(highest) => {
                let diff = seq.wrapping_sub(highest as u16) as i16;
                highest + diff as i64
            }
        }
    }
}
