//! FlexFEC Receiver - recovers lost media packets from a FlexFEC stream.

use super::{FlexFecPacket, Reconstructor, RecoveryState};
use crate::PacketTransformer;
use crate::buffer::{FecBuffer, MediaBuffer};
use crate::packet::RawPacket;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use shared::error::Result;

/// Builder for the FlexFecReceiver.
///
/// # Example
///
/// ```ignore
/// use rtc_fec::FlexFecReceiverBuilder;
///
/// let mut receiver = FlexFecReceiverBuilder::new()
///     .with_media_buffer_size(128)
///     .with_fec_buffer_size(64)
///     .build(media_ssrc, fec_ssrc)?;
///
/// let packets = receiver.reverse_transform(packets);
/// ```
#[derive(Debug, Clone)]
pub struct FlexFecReceiverBuilder {
    /// Number of media packets kept as recovery peers.
    media_buffer_size: usize,
    /// Number of FEC packets kept while waiting for media.
    fec_buffer_size: usize,
}

impl Default for FlexFecReceiverBuilder {
    fn default() -> Self {
        Self {
            media_buffer_size: 64,
            fec_buffer_size: 32,
        }
    }
}

impl FlexFecReceiverBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of media packets to keep.
    pub fn with_media_buffer_size(mut self, size: usize) -> Self {
        self.media_buffer_size = size;
        self
    }

    /// Set the maximum number of FEC packets to keep.
    pub fn with_fec_buffer_size(mut self, size: usize) -> Self {
        self.fec_buffer_size = size;
        self
    }

    /// Build a receiver recovering `media_ssrc` from the FlexFEC stream `fec_ssrc`.
    pub fn build(self, media_ssrc: u32, fec_ssrc: u32) -> Result<FlexFecReceiver> {
        Ok(FlexFecReceiver {
            media_ssrc,
            fec_ssrc,
            media_packets: MediaBuffer::new(self.media_buffer_size)?,
            fec_packets: FecBuffer::new(self.fec_buffer_size)?,
            statistics: FecStatistics::default(),
        })
    }
}

/// FEC-related counters of one receiver.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FecStatistics {
    /// FlexFEC packets seen on the FEC stream.
    pub fec_packets_received: u64,
    /// Media packets rebuilt and handed back to the caller.
    pub packets_recovered: u64,
    /// FlexFEC packets dropped because their header was rejected or they
    /// protect another stream.
    pub fec_packets_discarded: u64,
    /// Recovery attempts that were aborted.
    pub recovery_failures: u64,
}

/// Recovers lost packets of one media stream from its FlexFEC stream.
///
/// Incoming packets of the FEC stream are consumed and buffered, packets of
/// the media stream are copied into a buffer of recovery peers and passed on,
/// and everything else passes through untouched. After every batch, each
/// buffered FEC packet missing exactly one protected packet is used to
/// rebuild it; rebuilt packets are appended to the batch.
///
/// All state is mutated through `&mut self`; share a receiver between
/// threads by wrapping it in a `Mutex`.
#[derive(Debug)]
pub struct FlexFecReceiver {
    media_ssrc: u32,
    fec_ssrc: u32,
    media_packets: MediaBuffer,
    fec_packets: FecBuffer,
    statistics: FecStatistics,
}

impl FlexFecReceiver {
    pub fn media_ssrc(&self) -> u32 {
        self.media_ssrc
    }

    pub fn fec_ssrc(&self) -> u32 {
        self.fec_ssrc
    }

    /// Snapshot of the FEC counters.
    pub fn statistics(&self) -> FecStatistics {
        self.statistics
    }

    /// Number of FEC packets still waiting for media.
    pub fn pending_fec_packets(&self) -> usize {
        self.fec_packets.len()
    }

    /// Number of media packets available as recovery peers.
    pub fn buffered_media_packets(&self) -> usize {
        self.media_packets.len()
    }

    fn save_fec(&mut self, packet: RawPacket) {
        let seq = packet.sequence_number();
        match FlexFecPacket::new(packet) {
            Ok(fec_packet) if fec_packet.header().protected_ssrc != self.media_ssrc => {
                debug!(
                    "flexfec {}: discarding fec packet {} protecting foreign ssrc {}",
                    self.fec_ssrc,
                    seq,
                    fec_packet.header().protected_ssrc
                );
                self.statistics.fec_packets_discarded += 1;
            }
            Ok(fec_packet) => {
                trace!(
                    "flexfec {}: buffered fec packet {} protecting {:?}",
                    self.fec_ssrc,
                    seq,
                    fec_packet.header().protected_seq_nums
                );
                if let Some(evicted) = self.fec_packets.insert(seq, fec_packet) {
                    trace!(
                        "flexfec {}: dropped fec packet {}",
                        self.fec_ssrc,
                        evicted.sequence_number()
                    );
                }
            }
            Err(err) => {
                debug!("flexfec {}: discarding fec packet {}: {}", self.fec_ssrc, seq, err);
                self.statistics.fec_packets_discarded += 1;
            }
        }
    }

    /// Run every buffered FEC packet through the reconstructor.
    fn recover_missing(&mut self) -> Vec<RawPacket> {
        let mut recovered = Vec::new();
        let mut done = Vec::new();

        for key in self.fec_packets.unwrapped_keys() {
            let Some(fec_packet) = self.fec_packets.get_unwrapped(key) else {
                continue;
            };
            let seq = fec_packet.sequence_number();

            let state = Reconstructor::new(&self.media_packets).recovery_state(fec_packet.header());
            match state {
                RecoveryState::Complete => {
                    trace!("flexfec {}: fec packet {} not needed", self.fec_ssrc, seq);
                    done.push(key);
                }
                RecoveryState::Recoverable(missing) => {
                    done.push(key);
                    match Reconstructor::new(&self.media_packets).recover(fec_packet, missing) {
                        Ok(packet) => {
                            debug!(
                                "flexfec {}: recovered media packet {} from fec packet {}",
                                self.fec_ssrc, missing, seq
                            );
                            self.statistics.packets_recovered += 1;
                            self.media_packets.insert_copy(&packet);
                            recovered.push(packet);
                        }
                        Err(err) => {
                            warn!(
                                "flexfec {}: failed to recover media packet {} from fec packet {}: {}",
                                self.fec_ssrc, missing, seq, err
                            );
                            self.statistics.recovery_failures += 1;
                        }
                    }
                }
                RecoveryState::Unrecoverable { missing } => {
                    trace!(
                        "flexfec {}: fec packet {} missing {} packets, waiting",
                        self.fec_ssrc, seq, missing
                    );
                }
            }
        }

        for key in done {
            self.fec_packets.remove_unwrapped(key);
        }

        recovered
    }
}

impl PacketTransformer for FlexFecReceiver {
    /// Outgoing packets are not touched.
    fn transform(&mut self, packets: Vec<RawPacket>) -> Vec<RawPacket> {
        packets
    }

    fn reverse_transform(&mut self, packets: Vec<RawPacket>) -> Vec<RawPacket> {
        let mut outgoing = Vec::with_capacity(packets.len());
        for packet in packets {
            let ssrc = packet.ssrc();
            if ssrc == self.fec_ssrc {
                // Consumed here, never forwarded
                self.statistics.fec_packets_received += 1;
                self.save_fec(packet);
            } else {
                if ssrc == self.media_ssrc {
                    self.media_packets.insert_copy(&packet);
                }
                outgoing.push(packet);
            }
        }

        outgoing.extend(self.recover_missing());
        outgoing
    }

    fn close(&mut self) {
        info!(
            "Closing FlexFecReceiver stream {} (protecting {}). Recovered {} media packets",
            self.fec_ssrc, self.media_ssrc, self.statistics.packets_recovered
        );
    }
}
