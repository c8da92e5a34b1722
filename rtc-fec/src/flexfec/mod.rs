//! FlexFEC-03 forward error correction.
//!
//! A FlexFEC stream carries repair packets on its own SSRC. Each repair
//! packet protects a set of media packets of one source stream, listed by a
//! recursive bitmask relative to a sequence number base. Header fields and
//! payloads of the protected packets are XORed together, so any single lost
//! packet of the set can be rebuilt from the repair packet and the others.
//!
//! # Components
//!
//! - [`FlexFecMask`]: the recursive protection bitmask.
//! - [`FlexFecHeader`]: header validation and parsing.
//! - [`FlexFecEncoder`]: builds repair packets from media packets.
//! - [`Reconstructor`]: decides recoverability and rebuilds a lost packet.
//! - [`FlexFecReceiver`]: drives the above over batches of received packets.
//!
//! # Limitations
//!
//! Retransmitted FEC packets (R bit), the fixed mask type (F bit) and repair
//! packets protecting more than one SSRC are rejected at parse time.
//!
//! # References
//!
//! - [draft-ietf-payload-flexible-fec-scheme-03](https://tools.ietf.org/html/draft-ietf-payload-flexible-fec-scheme-03)

pub(crate) mod encoder;
pub(crate) mod header;
pub(crate) mod mask;
pub(crate) mod receiver;
pub(crate) mod reconstructor;

use crate::packet::RawPacket;
use shared::error::Result;

pub use encoder::FlexFecEncoder;
pub use header::{
    FLEXFEC_HEADER_MIN_SIZE, FLEXFEC_MASK_OFFSET, FLEXFEC_RECOVERY_FIELDS_SIZE, FlexFecHeader,
};
pub use mask::{FlexFecMask, MAX_MASK_OFFSET};
pub use receiver::{FecStatistics, FlexFecReceiver, FlexFecReceiverBuilder};
pub use reconstructor::{MAX_RECOVERED_PACKET_SIZE, Reconstructor, RecoveryState};

/// A received FlexFEC repair packet together with its parsed header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlexFecPacket {
    packet: RawPacket,
    header: FlexFecHeader,
}

impl FlexFecPacket {
    /// Parse the FlexFEC header carried in the payload of `packet`.
    pub fn new(packet: RawPacket) -> Result<Self> {
        let header =
            FlexFecHeader::unmarshal(packet.as_bytes(), packet.payload_offset(), packet.payload_len())?;
        Ok(Self { packet, header })
    }

    pub fn header(&self) -> &FlexFecHeader {
        &self.header
    }

    pub fn sequence_number(&self) -> u16 {
        self.packet.sequence_number()
    }

    pub fn packet(&self) -> &RawPacket {
        &self.packet
    }

    /// The RTP-header-shaped recovery fields at the start of the FlexFEC header.
    pub fn recovery_fields(&self) -> &[u8] {
        let start = self.packet.payload_offset();
        &self.packet.as_bytes()[start..start + FLEXFEC_RECOVERY_FIELDS_SIZE]
    }

    /// The XOR of the protected packets' bodies, following the FlexFEC header.
    pub fn repair_payload(&self) -> &[u8] {
        let start = self.packet.payload_offset() + self.header.header_size;
        &self.packet.as_bytes()[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::error::Error;

    #[test]
    fn test_flexfec_packet_views() {
        let header = FlexFecHeader::new(0xabcd, 10, &[10, 11]).unwrap();
        let mut payload = vec![0x00, 0x60, 0x00, 0x03, 0, 0, 0, 9];
        header.marshal_protection_to(&mut payload).unwrap();
        payload.extend_from_slice(&[7, 8, 9]);
        let pkt = RawPacket::with_payload(0x5555, 1, 0, 49, false, &payload);

        let fec = FlexFecPacket::new(pkt).unwrap();
        assert_eq!(fec.sequence_number(), 1);
        assert_eq!(fec.header().protected_ssrc, 0xabcd);
        assert_eq!(fec.recovery_fields(), &payload[..12]);
        assert_eq!(fec.repair_payload(), &[7, 8, 9]);
    }

    #[test]
    fn test_flexfec_packet_rejects_short_payload() {
        let pkt = RawPacket::with_payload(0x5555, 1, 0, 49, false, &[0u8; 10]);
        assert_eq!(FlexFecPacket::new(pkt), Err(Error::ErrFlexFecHeaderTooSmall));
    }
}
