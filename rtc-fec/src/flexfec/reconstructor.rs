//! XOR reconstruction of a single lost media packet.

use super::{FLEXFEC_RECOVERY_FIELDS_SIZE, FlexFecHeader, FlexFecPacket};
use crate::buffer::MediaBuffer;
use crate::packet::{RTP_HEADER_SIZE, RTP_VERSION, RawPacket, VERSION_MASK, VERSION_SHIFT};
use bytes::BytesMut;
use shared::error::{Error, Result};

/// Size of the scratch buffer a recovered packet is rebuilt in.
pub const MAX_RECOVERED_PACKET_SIZE: usize = 1500;

const LENGTH_RECOVERY_OFFSET: usize = 2;
const TIMESTAMP_OFFSET: usize = 4;
const SSRC_OFFSET: usize = 8;

/// How many of a FEC packet's protected packets are missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    /// Every protected packet has been received; the FEC packet is useless.
    Complete,
    /// Exactly one protected packet is missing and can be rebuilt.
    Recoverable(u16),
    /// Two or more protected packets are missing; wait for more media.
    Unrecoverable { missing: usize },
}

/// Rebuilds lost media packets from the buffered media and a FlexFEC packet.
///
/// For the purpose of FEC, a packet's body is everything after its 12-byte
/// fixed header, so CSRCs and header extensions are protected along with the
/// payload. The recovery fields of a FlexFEC packet hold the XOR of the
/// protected packets' first two header bytes, body lengths and timestamps;
/// its repair payload holds the XOR of their bodies.
pub struct Reconstructor<'a> {
    media_packets: &'a MediaBuffer,
}

impl<'a> Reconstructor<'a> {
    pub fn new(media_packets: &'a MediaBuffer) -> Self {
        Self { media_packets }
    }

    /// Count the protected packets of `header` absent from the media buffer.
    pub fn recovery_state(&self, header: &FlexFecHeader) -> RecoveryState {
        let mut missing = header
            .protected_seq_nums
            .iter()
            .copied()
            .filter(|&seq| !self.media_packets.contains(seq));

        match (missing.next(), missing.count()) {
            (None, _) => RecoveryState::Complete,
            (Some(seq), 0) => RecoveryState::Recoverable(seq),
            (Some(_), rest) => RecoveryState::Unrecoverable { missing: rest + 1 },
        }
    }

    /// Rebuild `missing` from `fec_packet` and the other protected packets.
    ///
    /// The packet is assembled in a scratch buffer owned by this call; buffered
    /// packets are only read.
    pub fn recover(&self, fec_packet: &FlexFecPacket, missing: u16) -> Result<RawPacket> {
        let repair_payload = fec_packet.repair_payload();
        if RTP_HEADER_SIZE + repair_payload.len() > MAX_RECOVERED_PACKET_SIZE {
            return Err(Error::ErrPacketTooBig);
        }

        let mut recovered = BytesMut::zeroed(MAX_RECOVERED_PACKET_SIZE);
        Self::start_recovery(fec_packet, &mut recovered);

        let body_end = RTP_HEADER_SIZE + repair_payload.len();
        for &seq in &fec_packet.header().protected_seq_nums {
            if seq == missing {
                continue;
            }
            let peer = self
                .media_packets
                .get(seq)
                .ok_or(Error::ErrFlexFecBufferInconsistency(seq))?;

            Self::xor_headers(peer, &mut recovered);
            Self::xor_bodies(peer, &mut recovered[RTP_HEADER_SIZE..body_end])?;
        }

        Self::finish_recovery(fec_packet.header(), missing, repair_payload.len(), recovered)
    }

    /// Seed the scratch buffer with the recovery fields and repair payload.
    fn start_recovery(fec_packet: &FlexFecPacket, recovered: &mut [u8]) {
        let repair_payload = fec_packet.repair_payload();
        recovered[..FLEXFEC_RECOVERY_FIELDS_SIZE].copy_from_slice(fec_packet.recovery_fields());
        recovered[RTP_HEADER_SIZE..RTP_HEADER_SIZE + repair_payload.len()]
            .copy_from_slice(repair_payload);
    }

    fn xor_headers(peer: &RawPacket, recovered: &mut [u8]) {
        let header = peer.as_bytes();

        // V, P, X, CC, M, PT
        recovered[0] ^= header[0];
        recovered[1] ^= header[1];

        // Length recovery holds body lengths, not the peer's sequence number
        let body_len = (peer.len() - RTP_HEADER_SIZE) as u16;
        recovered[LENGTH_RECOVERY_OFFSET] ^= (body_len >> 8) as u8;
        recovered[LENGTH_RECOVERY_OFFSET + 1] ^= body_len as u8;

        // Timestamp
        for (dst, src) in recovered[TIMESTAMP_OFFSET..SSRC_OFFSET]
            .iter_mut()
            .zip(&header[TIMESTAMP_OFFSET..SSRC_OFFSET])
        {
            *dst ^= *src;
        }

        // SSRC is written explicitly when finishing
    }

    fn xor_bodies(peer: &RawPacket, recovered_body: &mut [u8]) -> Result<()> {
        let body = &peer.as_bytes()[RTP_HEADER_SIZE..];
        if body.len() > recovered_body.len() {
            return Err(Error::ErrFlexFecRepairPayloadTooShort(body.len()));
        }
        for (dst, src) in recovered_body.iter_mut().zip(body) {
            *dst ^= *src;
        }
        Ok(())
    }

    fn finish_recovery(
        header: &FlexFecHeader,
        missing: u16,
        repair_len: usize,
        mut recovered: BytesMut,
    ) -> Result<RawPacket> {
        // Version 2, whatever the R and F bits left behind
        recovered[0] =
            (recovered[0] & !(VERSION_MASK << VERSION_SHIFT)) | (RTP_VERSION << VERSION_SHIFT);

        let body_len = u16::from_be_bytes([
            recovered[LENGTH_RECOVERY_OFFSET],
            recovered[LENGTH_RECOVERY_OFFSET + 1],
        ]) as usize;
        if body_len > repair_len {
            return Err(Error::ErrFlexFecRecoveredLengthInvalid(body_len));
        }

        recovered[LENGTH_RECOVERY_OFFSET..LENGTH_RECOVERY_OFFSET + 2]
            .copy_from_slice(&missing.to_be_bytes());
        recovered[SSRC_OFFSET..RTP_HEADER_SIZE].copy_from_slice(&header.protected_ssrc.to_be_bytes());
        recovered.truncate(RTP_HEADER_SIZE + body_len);

        RawPacket::new(recovered)
    }
}
