//! FlexFEC-03 recursive packet mask.
//!
//! The mask is a run of up to three blocks. Each block starts with a k-bit;
//! a set k-bit means another block follows. The data bits after the k-bits
//! mark which offsets from the sequence number base are protected.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |k|          Mask [0-14]        |k|     Mask [15-45] (optional)
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!                                 |k|                             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+                             |
//! |                   Mask [46-108] (optional)                    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use shared::error::{Error, Result};

/// Largest offset from the base the mask can protect.
pub const MAX_MASK_OFFSET: u16 = 108;

/// Cumulative mask size in bytes after each block.
const MASK_SIZES: [usize; 3] = [2, 6, 14];

/// Cumulative number of offsets covered after each block (15, 31 and 63 data bits).
const MASK_OFFSET_LIMITS: [u16; 3] = [15, 46, 109];

const K_BIT: u8 = 0x80;

/// A decoded (or freshly encoded) FlexFEC-03 packet mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlexFecMask {
    seq_num_base: u16,
    protected_seq_nums: Vec<u16>,
    bytes: Vec<u8>,
}

impl FlexFecMask {
    /// Encode a mask protecting `protected_seq_nums` relative to `seq_num_base`.
    ///
    /// Offsets are taken modulo 2^16, so a protected set may cross the
    /// sequence number wrap. The shortest mask covering the largest offset is
    /// used.
    pub fn new(seq_num_base: u16, protected_seq_nums: &[u16]) -> Result<Self> {
        let mut offsets: Vec<u16> = protected_seq_nums
            .iter()
            .map(|seq| seq.wrapping_sub(seq_num_base))
            .collect();
        offsets.sort_unstable();
        offsets.dedup();

        let max_offset = offsets.last().copied().unwrap_or(0);
        if max_offset > MAX_MASK_OFFSET {
            return Err(Error::ErrFlexFecMaskOffsetTooLarge(max_offset));
        }

        let blocks = MASK_OFFSET_LIMITS
            .iter()
            .position(|&limit| max_offset < limit)
            .map(|i| i + 1)
            .unwrap_or(MASK_SIZES.len());
        let mut bytes = vec![0u8; MASK_SIZES[blocks - 1]];

        // Every block but the last announces a continuation
        for block in 0..blocks - 1 {
            bytes[block_start(block)] |= K_BIT;
        }
        for &offset in &offsets {
            let pos = bit_position(offset);
            bytes[pos / 8] |= K_BIT >> (pos % 8);
        }

        Ok(Self {
            seq_num_base,
            protected_seq_nums: offsets
                .into_iter()
                .map(|offset| seq_num_base.wrapping_add(offset))
                .collect(),
            bytes,
        })
    }

    /// Decode the mask starting at `offset` in `buf`.
    ///
    /// Returns [`Error::ErrFlexFecMalformedMask`] if a block the k-bits call
    /// for does not fit in `buf`.
    pub fn unmarshal(buf: &[u8], offset: usize, seq_num_base: u16) -> Result<Self> {
        let mut blocks = 0;
        for (block, &size) in MASK_SIZES.iter().enumerate() {
            if buf.len() < offset + size {
                return Err(Error::ErrFlexFecMalformedMask);
            }
            blocks = block + 1;
            if buf[offset + block_start(block)] & K_BIT == 0 {
                break;
            }
        }

        let size = MASK_SIZES[blocks - 1];
        let bytes = buf[offset..offset + size].to_vec();
        let protected_seq_nums = (0..MASK_OFFSET_LIMITS[blocks - 1])
            .filter(|&i| {
                let pos = bit_position(i);
                bytes[pos / 8] & (K_BIT >> (pos % 8)) != 0
            })
            .map(|i| seq_num_base.wrapping_add(i))
            .collect();

        Ok(Self {
            seq_num_base,
            protected_seq_nums,
            bytes,
        })
    }

    pub fn seq_num_base(&self) -> u16 {
        self.seq_num_base
    }

    /// Protected sequence numbers, in increasing offset order from the base.
    pub fn protected_seq_nums(&self) -> &[u16] {
        &self.protected_seq_nums
    }

    /// Encoded length of the mask in bytes: 2, 6 or 14.
    pub fn len_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// The mask as it appears on the wire, k-bits included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Byte index of the first byte (and k-bit) of `block`.
fn block_start(block: usize) -> usize {
    if block == 0 { 0 } else { MASK_SIZES[block - 1] }
}

/// Bit position within the mask of the data bit for `offset`, skipping the
/// k-bit of its own block and of every block before it.
fn bit_position(offset: u16) -> usize {
    let k_bits = MASK_OFFSET_LIMITS
        .iter()
        .position(|&limit| offset < limit)
        .unwrap_or(MASK_OFFSET_LIMITS.len() - 1)
        + 1;
    offset as usize + k_bits
}
