//! RTC FEC - receive-side loss recovery for RTP streams protected by FlexFEC.
//!
//! The crate works on serialized RTP packets ([`RawPacket`]) and is Sans-IO:
//! the caller feeds batches of received packets to a [`FlexFecReceiver`] and
//! gets back the batch with FEC packets removed and recovered media packets
//! appended.
//!
//! # Example
//!
//! ```ignore
//! use rtc_fec::{FlexFecReceiverBuilder, PacketTransformer, RawPacket};
//!
//! let mut receiver = FlexFecReceiverBuilder::new().build(media_ssrc, fec_ssrc)?;
//!
//! let received: Vec<RawPacket> = read_batch();
//! for packet in receiver.reverse_transform(received) {
//!     // media packets, both received and recovered
//! }
//!
//! receiver.close();
//! ```

#![warn(rust_2018_idioms)]

pub mod buffer;
pub mod flexfec;
pub mod packet;
pub mod sequence;

pub use buffer::{FecBuffer, MediaBuffer, SequenceBuffer};
pub use flexfec::{
    FecStatistics, FlexFecEncoder, FlexFecHeader, FlexFecMask, FlexFecPacket, FlexFecReceiver,
    FlexFecReceiverBuilder, Reconstructor, RecoveryState,
};
pub use packet::RawPacket;

/// A stage that processes batches of RTP packets in both directions.
///
/// `transform` is applied to packets on their way out, `reverse_transform`
/// to packets that were received. Either may consume, modify or add packets.
pub trait PacketTransformer {
    fn transform(&mut self, packets: Vec<RawPacket>) -> Vec<RawPacket>;

    fn reverse_transform(&mut self, packets: Vec<RawPacket>) -> Vec<RawPacket>;

    /// Release resources held by the stage.
    fn close(&mut self);
}
