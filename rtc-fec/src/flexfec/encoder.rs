//! FlexFEC-03 repair packet generation.

use super::{FLEXFEC_RECOVERY_FIELDS_SIZE, FlexFecHeader};
use crate::packet::{RTP_HEADER_SIZE, RTP_VERSION, RawPacket, VERSION_SHIFT};
use crate::sequence::precedes;
use bytes::{BufMut, BytesMut};
use shared::error::{Error, Result};

/// R and F bits: cleared, the only combination the receiver accepts.
const RECOVERY_FIELDS_BYTE0_MASK: u8 = 0x3f;

/// Builds FlexFEC-03 repair packets for one protected stream.
///
/// Each call to [`encode`](FlexFecEncoder::encode) protects the given media
/// packets with one repair packet on the FEC stream, numbered consecutively.
pub struct FlexFecEncoder {
    fec_ssrc: u32,
    payload_type: u8,
    sequence_number: u16,
}

impl FlexFecEncoder {
    pub fn new(fec_ssrc: u32, payload_type: u8) -> Self {
        Self {
            fec_ssrc,
            payload_type,
            sequence_number: rand::random(),
        }
    }

    /// Start numbering repair packets at `sequence_number`.
    pub fn with_sequence_number(mut self, sequence_number: u16) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    /// Build one repair packet protecting all of `media`.
    ///
    /// The media packets must share an SSRC and span at most
    /// [`MAX_MASK_OFFSET`](super::MAX_MASK_OFFSET) sequence numbers.
    pub fn encode(&mut self, media: &[RawPacket]) -> Result<RawPacket> {
        let first = media.first().ok_or(Error::ErrFlexFecNoMediaPackets)?;
        let protected_ssrc = first.ssrc();
        if media.iter().any(|p| p.ssrc() != protected_ssrc) {
            return Err(Error::ErrFlexFecMixedSsrc);
        }

        let seq_num_base = media
            .iter()
            .map(|p| p.sequence_number())
            .fold(first.sequence_number(), |oldest, seq| {
                if precedes(seq, oldest) { seq } else { oldest }
            });
        let protected: Vec<u16> = media.iter().map(|p| p.sequence_number()).collect();
        let header = FlexFecHeader::new(protected_ssrc, seq_num_base, &protected)?;

        let mut recovery_fields = [0u8; FLEXFEC_RECOVERY_FIELDS_SIZE];
        let repair_len = media
            .iter()
            .map(|p| p.len() - RTP_HEADER_SIZE)
            .max()
            .unwrap_or(0);
        let mut repair_payload = vec![0u8; repair_len];
        let mut length_recovery = 0u16;

        for packet in media {
            let raw = packet.as_bytes();
            recovery_fields[0] ^= raw[0];
            recovery_fields[1] ^= raw[1];
            length_recovery ^= (raw.len() - RTP_HEADER_SIZE) as u16;
            for (dst, src) in recovery_fields[4..8].iter_mut().zip(&raw[4..8]) {
                *dst ^= *src;
            }
            for (dst, src) in repair_payload.iter_mut().zip(&raw[RTP_HEADER_SIZE..]) {
                *dst ^= *src;
            }
        }
        recovery_fields[0] &= RECOVERY_FIELDS_BYTE0_MASK;
        recovery_fields[2..4].copy_from_slice(&length_recovery.to_be_bytes());

        let timestamp = media
            .last()
            .map(|p| p.timestamp())
            .unwrap_or_default();

        let mut buffer =
            BytesMut::with_capacity(RTP_HEADER_SIZE + header.header_size + repair_payload.len());
        buffer.put_u8(RTP_VERSION << VERSION_SHIFT);
        buffer.put_u8(self.payload_type);
        buffer.put_u16(self.sequence_number);
        buffer.put_u32(timestamp);
        buffer.put_u32(self.fec_ssrc);
        buffer.put_slice(&recovery_fields[..8]);
        header.marshal_protection_to(&mut buffer)?;
        buffer.put_slice(&repair_payload);

        self.sequence_number = self.sequence_number.wrapping_add(1);

        RawPacket::new(buffer)
    }
}
