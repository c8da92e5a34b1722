//! FlexFEC-03 header parsing and serialization.
//!
//! Based on draft-ietf-payload-flexible-fec-scheme-03, restricted to a
//! single protected SSRC and the flexible (recursive) mask:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |R|F|P|X|  CC   |M| PT recovery |        length recovery        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          TS recovery                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   SSRCCount   |                    reserved                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                             SSRC_i                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           SN base_i           |k|          Mask [0-14]        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |k|                   Mask [15-45] (optional)                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |k|                                                             |
//! +-+                   Mask [46-108] (optional)                  |
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use super::mask::FlexFecMask;
use bytes::{Buf, BufMut};
use shared::error::{Error, Result};

/// One SSRC, one sequence number base and the shortest mask.
pub const FLEXFEC_HEADER_MIN_SIZE: usize = 20;
/// Offset of the mask from the start of the FlexFEC header.
pub const FLEXFEC_MASK_OFFSET: usize = 18;
/// Bytes 0..12 mirror an RTP header and carry the recovery fields.
pub const FLEXFEC_RECOVERY_FIELDS_SIZE: usize = 12;

const RETRANSMISSION_MASK: u8 = 0x80;
const MASK_TYPE_MASK: u8 = 0x40;
const SSRC_COUNT_OFFSET: usize = 8;
const PROTECTED_SSRC_OFFSET: usize = 12;
const SEQ_NUM_BASE_OFFSET: usize = 16;

/// The parsed protection description of a FlexFEC-03 packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlexFecHeader {
    /// SSRC of the media stream this packet protects.
    pub protected_ssrc: u32,
    pub seq_num_base: u16,
    /// Protected sequence numbers in increasing offset order from the base.
    pub protected_seq_nums: Vec<u16>,
    /// Size of the encoded mask in bytes.
    pub mask_size: usize,
    /// Size of the whole FlexFEC header; the repair payload starts here.
    pub header_size: usize,
}

impl FlexFecHeader {
    /// Describe a FEC packet protecting `protected_seq_nums` of `protected_ssrc`.
    pub fn new(protected_ssrc: u32, seq_num_base: u16, protected_seq_nums: &[u16]) -> Result<Self> {
        let mask = FlexFecMask::new(seq_num_base, protected_seq_nums)?;
        Ok(Self::from_mask(protected_ssrc, mask))
    }

    fn from_mask(protected_ssrc: u32, mask: FlexFecMask) -> Self {
        Self {
            protected_ssrc,
            seq_num_base: mask.seq_num_base(),
            protected_seq_nums: mask.protected_seq_nums().to_vec(),
            mask_size: mask.len_bytes(),
            header_size: FLEXFEC_MASK_OFFSET + mask.len_bytes(),
        }
    }

    /// Parse the FlexFEC header found at `offset` in `buf`, where `length`
    /// bytes belong to the FlexFEC part of the packet.
    ///
    /// Retransmission packets, the fixed mask type and multi-SSRC protection
    /// are rejected.
    pub fn unmarshal(buf: &[u8], offset: usize, length: usize) -> Result<Self> {
        if length < FLEXFEC_HEADER_MIN_SIZE || buf.len() < offset + FLEXFEC_HEADER_MIN_SIZE {
            return Err(Error::ErrFlexFecHeaderTooSmall);
        }
        let header = &buf[offset..buf.len().min(offset + length)];

        if header[0] & RETRANSMISSION_MASK != 0 {
            return Err(Error::ErrFlexFecRetransmissionUnsupported);
        }
        if header[0] & MASK_TYPE_MASK != 0 {
            return Err(Error::ErrFlexFecFixedMaskUnsupported);
        }
        let ssrc_count = header[SSRC_COUNT_OFFSET];
        if ssrc_count > 1 {
            return Err(Error::ErrFlexFecMultipleSsrcUnsupported(ssrc_count));
        }

        let reader = &mut &header[PROTECTED_SSRC_OFFSET..];
        let protected_ssrc = reader.get_u32();
        let seq_num_base = reader.get_u16();

        let mask = FlexFecMask::unmarshal(header, FLEXFEC_MASK_OFFSET, seq_num_base)?;

        Ok(Self::from_mask(protected_ssrc, mask))
    }

    /// Write the protection part of the header (bytes 8 onward: SSRC count,
    /// reserved, SSRC, base, mask). The recovery fields in bytes 0..8 are
    /// the encoder's business.
    pub fn marshal_protection_to<B: BufMut>(&self, buf: &mut B) -> Result<usize> {
        let mask = FlexFecMask::new(self.seq_num_base, &self.protected_seq_nums)?;
        buf.put_u8(1);
        buf.put_slice(&[0u8; 3]);
        buf.put_u32(self.protected_ssrc);
        buf.put_u16(self.seq_num_base);
        buf.put_slice(mask.as_bytes());
        Ok(self.header_size - SSRC_COUNT_OFFSET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn raw_header(byte0: u8, ssrc_count: u8, ssrc: u32, base: u16, mask: &[u8]) -> Vec<u8> {
        let mut buf = vec![byte0, 0x60, 0x00, 0x10, 0, 0, 0x12, 0x34, ssrc_count, 0, 0, 0];
        buf.extend_from_slice(&ssrc.to_be_bytes());
        buf.extend_from_slice(&base.to_be_bytes());
        buf.extend_from_slice(mask);
        buf
    }

    #[test]
    fn test_unmarshal_short_mask() {
        let mask = FlexFecMask::new(100, &[100, 101, 102]).unwrap();
        let mut buf = raw_header(0x00, 1, 0xcafebabe, 100, mask.as_bytes());
        buf.extend_from_slice(&[0xaa; 8]);

        let header = FlexFecHeader::unmarshal(&buf, 0, buf.len()).unwrap();
        assert_eq!(header.protected_ssrc, 0xcafebabe);
        assert_eq!(header.seq_num_base, 100);
        assert_eq!(header.protected_seq_nums, vec![100, 101, 102]);
        assert_eq!(header.mask_size, 2);
        assert_eq!(header.header_size, 20);
    }

    #[test]
    fn test_unmarshal_long_mask_at_offset() {
        let mask = FlexFecMask::new(7, &[7, 60, 115]).unwrap();
        let mut buf = vec![0u8; 12];
        buf.extend(raw_header(0x00, 1, 42, 7, mask.as_bytes()));

        let header = FlexFecHeader::unmarshal(&buf, 12, buf.len() - 12).unwrap();
        assert_eq!(header.protected_seq_nums, vec![7, 60, 115]);
        assert_eq!(header.mask_size, 14);
        assert_eq!(header.header_size, 32);
    }

    #[test]
    fn test_unmarshal_too_small() {
        let buf = [0u8; 19];
        assert_eq!(
            FlexFecHeader::unmarshal(&buf, 0, buf.len()),
            Err(Error::ErrFlexFecHeaderTooSmall)
        );
        let buf = [0u8; 24];
        assert_eq!(
            FlexFecHeader::unmarshal(&buf, 0, 19),
            Err(Error::ErrFlexFecHeaderTooSmall)
        );
    }

    #[test]
    fn test_unmarshal_rejects_unsupported() {
        let mask = [0x40u8, 0x00];
        let buf = raw_header(0x80, 1, 1, 0, &mask);
        assert_eq!(
            FlexFecHeader::unmarshal(&buf, 0, buf.len()),
            Err(Error::ErrFlexFecRetransmissionUnsupported)
        );

        let buf = raw_header(0x40, 1, 1, 0, &mask);
        assert_eq!(
            FlexFecHeader::unmarshal(&buf, 0, buf.len()),
            Err(Error::ErrFlexFecFixedMaskUnsupported)
        );

        let buf = raw_header(0x00, 2, 1, 0, &mask);
        assert_eq!(
            FlexFecHeader::unmarshal(&buf, 0, buf.len()),
            Err(Error::ErrFlexFecMultipleSsrcUnsupported(2))
        );
    }

    #[test]
    fn test_unmarshal_checks_in_order() {
        // Retransmission wins over the other problems
        let buf = raw_header(0xc0, 3, 1, 0, &[0x40, 0x00]);
        assert_eq!(
            FlexFecHeader::unmarshal(&buf, 0, buf.len()),
            Err(Error::ErrFlexFecRetransmissionUnsupported)
        );
    }

    #[test]
    fn test_unmarshal_mask_bounded_by_length() {
        // k-bit asks for a second block that lies past the declared length
        let mut buf = raw_header(0x00, 1, 1, 0, &[0xc0, 0x00]);
        buf.extend_from_slice(&[0u8; 8]);
        assert_eq!(
            FlexFecHeader::unmarshal(&buf, 0, 20),
            Err(Error::ErrFlexFecMalformedMask)
        );
    }

    #[test]
    fn test_marshal_protection_round_trip() {
        let header = FlexFecHeader::new(0x11223344, 65530, &[65530, 65535, 5]).unwrap();
        assert_eq!(header.header_size, 20);

        let mut buf = BytesMut::new();
        buf.put_slice(&[0u8; 8]);
        let n = header.marshal_protection_to(&mut buf).unwrap();
        assert_eq!(n, 12);
        assert_eq!(buf.len(), header.header_size);

        let parsed = FlexFecHeader::unmarshal(&buf, 0, buf.len()).unwrap();
        assert_eq!(parsed, header);
    }
}
