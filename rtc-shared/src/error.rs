use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("packet too big")]
    ErrPacketTooBig,
    #[error("buffer capacity must be greater than zero")]
    ErrInvalidBufferCapacity,

    //RTP errors
    #[error("RTP header size insufficient")]
    ErrHeaderSizeInsufficient,
    #[error("RTP header size insufficient for extension")]
    ErrHeaderSizeInsufficientForExtension,
    #[error("RTP header size insufficient for CSRC list")]
    ErrHeaderSizeInsufficientForCsrc,
    #[error("RTP version must be 2")]
    ErrInvalidRtpVersion,

    //FlexFEC errors
    /// The mask declares a block the buffer does not hold.
    #[error("flexfec: malformed mask, buffer too short for declared block")]
    ErrFlexFecMalformedMask,
    /// Protected offset cannot be represented by the recursive mask.
    #[error("flexfec: protected offset {0} exceeds the maximum mask offset")]
    ErrFlexFecMaskOffsetTooLarge(u16),
    #[error("flexfec: header size insufficient")]
    ErrFlexFecHeaderTooSmall,
    #[error("flexfec: retransmission packets are not supported")]
    ErrFlexFecRetransmissionUnsupported,
    #[error("flexfec: fixed mask type is not supported")]
    ErrFlexFecFixedMaskUnsupported,
    #[error("flexfec: protecting {0} ssrcs is not supported")]
    ErrFlexFecMultipleSsrcUnsupported(u8),
    /// A protected packet counted as present was gone at recovery time.
    #[error("flexfec: protected packet {0} missing from media buffer")]
    ErrFlexFecBufferInconsistency(u16),
    #[error("flexfec: repair payload shorter than protected body of {0} bytes")]
    ErrFlexFecRepairPayloadTooShort(usize),
    #[error("flexfec: recovered length {0} is invalid")]
    ErrFlexFecRecoveredLengthInvalid(usize),
    #[error("flexfec: no media packets to protect")]
    ErrFlexFecNoMediaPackets,
    #[error("flexfec: media packets belong to more than one ssrc")]
    ErrFlexFecMixedSsrc,
}
