//! Minimal owned view over a serialized RTP packet.

use bytes::{Buf, BufMut, BytesMut};
use shared::error::{Error, Result};

/// Size of the fixed RTP header, without CSRCs or extensions.
pub const RTP_HEADER_SIZE: usize = 12;
/// The only RTP version this crate accepts or produces.
pub const RTP_VERSION: u8 = 2;

pub(crate) const VERSION_SHIFT: u8 = 6;
pub(crate) const VERSION_MASK: u8 = 0x3;
pub(crate) const PADDING_MASK: u8 = 0x20;
pub(crate) const EXTENSION_MASK: u8 = 0x10;
pub(crate) const CC_MASK: u8 = 0x0f;
pub(crate) const MARKER_MASK: u8 = 0x80;
pub(crate) const PT_MASK: u8 = 0x7f;

const SEQ_NUM_OFFSET: usize = 2;
const TIMESTAMP_OFFSET: usize = 4;
const SSRC_OFFSET: usize = 8;
const CSRC_LENGTH: usize = 4;
const EXTENSION_HEADER_SIZE: usize = 4;

/// An RTP packet held as its wire bytes.
///
/// Header fields are read in place, so a packet can be forwarded or copied
/// without a marshal round trip. Construction validates that the fixed
/// header, the CSRC list and the extension header all fit in the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    buffer: BytesMut,
}

impl RawPacket {
    /// Wrap serialized RTP bytes, validating the header layout.
    pub fn new(buffer: BytesMut) -> Result<Self> {
        Self::validate(&buffer)?;
        Ok(Self { buffer })
    }

    /// Copy serialized RTP bytes into a new packet.
    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        Self::new(BytesMut::from(raw))
    }

    /// Serialize a packet with a plain 12-byte header and the given payload.
    pub fn with_payload(
        ssrc: u32,
        sequence_number: u16,
        timestamp: u32,
        payload_type: u8,
        marker: bool,
        payload: &[u8],
    ) -> Self {
        let mut buffer = BytesMut::with_capacity(RTP_HEADER_SIZE + payload.len());
        buffer.put_u8(RTP_VERSION << VERSION_SHIFT);
        let marker = if marker { MARKER_MASK } else { 0 };
        buffer.put_u8(marker | (payload_type & PT_MASK));
        buffer.put_u16(sequence_number);
        buffer.put_u32(timestamp);
        buffer.put_u32(ssrc);
        buffer.put_slice(payload);
        Self { buffer }
    }

    /// Wrap bytes already known to hold a valid packet.
    pub(crate) fn from_trusted(buffer: BytesMut) -> Self {
        Self { buffer }
    }

    fn validate(raw: &[u8]) -> Result<()> {
        if raw.len() < RTP_HEADER_SIZE {
            return Err(Error::ErrHeaderSizeInsufficient);
        }
        if (raw[0] >> VERSION_SHIFT) & VERSION_MASK != RTP_VERSION {
            return Err(Error::ErrInvalidRtpVersion);
        }
        Self::header_len(raw).map(|_| ())
    }

    fn header_len(raw: &[u8]) -> Result<usize> {
        let cc = (raw[0] & CC_MASK) as usize;
        let mut len = RTP_HEADER_SIZE + cc * CSRC_LENGTH;
        if raw.len() < len {
            return Err(Error::ErrHeaderSizeInsufficientForCsrc);
        }

        if raw[0] & EXTENSION_MASK != 0 {
            if raw.len() < len + EXTENSION_HEADER_SIZE {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }
            let mut reader = &raw[len + 2..len + EXTENSION_HEADER_SIZE];
            let extension_words = reader.get_u16() as usize;
            len += EXTENSION_HEADER_SIZE + extension_words * 4;
            if raw.len() < len {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }
        }

        Ok(len)
    }

    pub fn version(&self) -> u8 {
        (self.buffer[0] >> VERSION_SHIFT) & VERSION_MASK
    }

    pub fn padding(&self) -> bool {
        self.buffer[0] & PADDING_MASK != 0
    }

    pub fn extension(&self) -> bool {
        self.buffer[0] & EXTENSION_MASK != 0
    }

    pub fn csrc_count(&self) -> u8 {
        self.buffer[0] & CC_MASK
    }

    pub fn marker(&self) -> bool {
        self.buffer[1] & MARKER_MASK != 0
    }

    pub fn payload_type(&self) -> u8 {
        self.buffer[1] & PT_MASK
    }

    pub fn sequence_number(&self) -> u16 {
        let mut reader = &self.buffer[SEQ_NUM_OFFSET..];
        reader.get_u16()
    }

    pub fn timestamp(&self) -> u32 {
        let mut reader = &self.buffer[TIMESTAMP_OFFSET..];
        reader.get_u32()
    }

    /// The stream identifier of this packet.
    pub fn ssrc(&self) -> u32 {
        let mut reader = &self.buffer[SSRC_OFFSET..];
        reader.get_u32()
    }

    pub fn set_sequence_number(&mut self, sequence_number: u16) {
        self.buffer[SEQ_NUM_OFFSET..TIMESTAMP_OFFSET].copy_from_slice(&sequence_number.to_be_bytes());
    }

    pub fn set_ssrc(&mut self, ssrc: u32) {
        self.buffer[SSRC_OFFSET..RTP_HEADER_SIZE].copy_from_slice(&ssrc.to_be_bytes());
    }

    /// Offset of the payload: fixed header, CSRCs and header extension.
    pub fn payload_offset(&self) -> usize {
        // Validated at construction
        Self::header_len(&self.buffer).unwrap_or(RTP_HEADER_SIZE)
    }

    /// Length of everything after the header, padding included.
    pub fn payload_len(&self) -> usize {
        self.buffer.len() - self.payload_offset()
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.payload_offset()..]
    }

    /// Total length of the packet in bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> BytesMut {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_payload_accessors() {
        let pkt = RawPacket::with_payload(0xdeadbeef, 4321, 90000, 96, true, &[1, 2, 3]);

        assert_eq!(pkt.version(), 2);
        assert!(!pkt.padding());
        assert!(!pkt.extension());
        assert_eq!(pkt.csrc_count(), 0);
        assert!(pkt.marker());
        assert_eq!(pkt.payload_type(), 96);
        assert_eq!(pkt.sequence_number(), 4321);
        assert_eq!(pkt.timestamp(), 90000);
        assert_eq!(pkt.ssrc(), 0xdeadbeef);
        assert_eq!(pkt.payload_offset(), RTP_HEADER_SIZE);
        assert_eq!(pkt.payload_len(), 3);
        assert_eq!(pkt.payload(), &[1, 2, 3]);
        assert_eq!(pkt.len(), 15);
    }

    #[test]
    fn test_mutators() {
        let mut pkt = RawPacket::with_payload(1, 2, 3, 0, false, &[]);
        pkt.set_sequence_number(65535);
        pkt.set_ssrc(0x01020304);
        assert_eq!(pkt.sequence_number(), 65535);
        assert_eq!(pkt.ssrc(), 0x01020304);
        assert_eq!(pkt.timestamp(), 3);
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            RawPacket::from_slice(&[0x80, 0x60, 0x00]),
            Err(Error::ErrHeaderSizeInsufficient)
        );
    }

    #[test]
    fn test_bad_version() {
        let raw = [0x40u8, 0x60, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1];
        assert_eq!(RawPacket::from_slice(&raw), Err(Error::ErrInvalidRtpVersion));
    }

    #[test]
    fn test_csrc_and_extension_offset() {
        let raw = [
            0x91u8, 0x60, 0x00, 0x01, // V=2, X=1, CC=1
            0x00, 0x00, 0x00, 0x02, // timestamp
            0x00, 0x00, 0x00, 0x03, // ssrc
            0x00, 0x00, 0x00, 0x04, // csrc
            0xbe, 0xde, 0x00, 0x01, // extension header, one word
            0x10, 0xaa, 0x00, 0x00, // extension word
            0x42, 0x43, // payload
        ];
        let pkt = RawPacket::from_slice(&raw).unwrap();
        assert_eq!(pkt.csrc_count(), 1);
        assert!(pkt.extension());
        assert_eq!(pkt.payload_offset(), 24);
        assert_eq!(pkt.payload(), &[0x42, 0x43]);
    }

    #[test]
    fn test_truncated_csrc_and_extension() {
        let raw = [0x82u8, 0x60, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 4];
        assert_eq!(
            RawPacket::from_slice(&raw),
            Err(Error::ErrHeaderSizeInsufficientForCsrc)
        );

        let raw = [0x90u8, 0x60, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0xbe, 0xde, 0, 2, 0, 0, 0, 0];
        assert_eq!(
            RawPacket::from_slice(&raw),
            Err(Error::ErrHeaderSizeInsufficientForExtension)
        );
    }
}
