//! Error taxonomy for the ELPP gateway.
//!
//! Every public error enum implements [`ErrorCode`] in addition to
//! [`std::error::Error`] so that the HTTP layer and structured logs can
//! surface a stable, machine-readable identifier alongside the
//! human-readable message.

use thiserror::Error;

use crate::ids::ChainId;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors raised by the bit buffer / primitive codec / schema engine layer.
///
/// None of these panic on malformed input; they always bubble up to the
/// request handler as a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecoderError {
    /// The channel selector byte did not match any entry in the channel map.
    #[error("channel {0:#04x} not found in channel map")]
    ChannelNotFound(u8),
    /// The buffer ended before a primitive could finish reading.
    #[error("short buffer: needed {needed} more bits, had {available} remaining")]
    ShortBuffer {
        /// Bits the primitive still needed.
        needed: usize,
        /// Bits actually remaining in the buffer.
        available: usize,
    },
    /// A byte-aligned primitive was asked to read or write at a non-aligned bit offset.
    #[error("primitive requires byte alignment, got bit offset {0}")]
    NotAligned(usize),
    /// A `varuint32`/`varint32` ran past its 5-byte maximum without a terminator.
    #[error("varint exceeded 5-byte maximum without a terminating byte")]
    VarintTooLong,
    /// An encoder was handed a [`crate::ids`]-adjacent value that does not match
    /// the primitive kind it was asked to encode (a programming error at the
    /// call site, surfaced as a value rather than a panic).
    #[error("value does not match primitive kind: {0}")]
    EncodeMismatch(String),
    /// A channel processor received a decoded output vector whose shape did
    /// not match what its schema should have produced (a programming error
    /// in the channel map's schema/processor pairing, surfaced as a value).
    #[error("decoded output did not match expected schema shape: {0}")]
    SchemaMismatch(String),
}

impl ErrorCode for DecoderError {
    fn code(&self) -> &'static str {
        match self {
            Self::ChannelNotFound(_) => "DECODER_CHANNEL_NOT_FOUND",
            Self::ShortBuffer { .. } => "DECODER_SHORT_BUFFER",
            Self::NotAligned(_) => "DECODER_NOT_ALIGNED",
            Self::VarintTooLong => "DECODER_VARINT_TOO_LONG",
            Self::EncodeMismatch(_) => "DECODER_ENCODE_MISMATCH",
            Self::SchemaMismatch(_) => "DECODER_SCHEMA_MISMATCH",
        }
    }
}

/// Errors raised by the TAPOS manager, either while answering a device's
/// TAPOS request or while polling a chain's API pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaposError {
    /// A device asked for TAPOS on a chain the gateway holds no fresh value for.
    #[error("no TAPOS currently held for chain {0}")]
    Unavailable(ChainId),
    /// Every member of the chain's API pool is quarantined.
    #[error("API pool exhausted for chain {0}: all entries quarantined")]
    PoolExhausted(ChainId),
    /// The polled host's `chain_id` did not match the chain's expected hash.
    #[error("chain id mismatch for chain {chain}: expected {expected}, got {got}")]
    ChainIdMismatch {
        /// The chain being polled.
        chain: ChainId,
        /// The expected chain-id hash, from configuration.
        expected: String,
        /// The chain-id hash actually returned by the host.
        got: String,
    },
    /// The outbound request to `/v1/chain/get_info` failed at the transport level.
    #[error("get_info request failed: {0}")]
    Transport(String),
    /// The host responded but the body could not be parsed as the expected JSON shape.
    #[error("get_info response was not valid: {0}")]
    InvalidResponse(String),
}

impl ErrorCode for TaposError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "TAPOS_UNAVAILABLE",
            Self::PoolExhausted(_) => "TAPOS_POOL_EXHAUSTED",
            Self::ChainIdMismatch { .. } => "TAPOS_CHAIN_ID_MISMATCH",
            Self::Transport(_) => "TAPOS_TRANSPORT_ERROR",
            Self::InvalidResponse(_) => "TAPOS_INVALID_RESPONSE",
        }
    }
}

/// Errors raised while dispatching a completed transaction to the chain.
///
/// Per the dispatch fire-and-forget semantics, these are always terminal:
/// the item is removed from the queue regardless of which variant occurs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The outbound POST failed at the transport level (connect/read timeout, DNS, etc).
    #[error("send_transaction transport error: {0}")]
    Transport(String),
    /// The remote host responded with a non-2xx status.
    #[error("send_transaction rejected with status {0}")]
    Rejected(u16),
    /// There was no `api_last` configured for the chain to dispatch to.
    #[error("no known-good API host for chain {0}")]
    NoApiHost(ChainId),
}

impl ErrorCode for DispatchError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "DISPATCH_TRANSPORT_ERROR",
            Self::Rejected(_) => "DISPATCH_REJECTED",
            Self::NoApiHost(_) => "DISPATCH_NO_API_HOST",
        }
    }
}

/// The top-level error type returned to the HTTP layer, unifying every
/// subsystem error behind a single `ErrorCode` + `Display` surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// A malformed ingress request (bad base64, missing field, wrong port).
    #[error("bad request: {0}")]
    BadRequest(String),
    /// The wire codec failed to decode the uplink payload.
    #[error(transparent)]
    Decoder(#[from] DecoderError),
    /// TAPOS lookup or polling failed.
    #[error(transparent)]
    Tapos(#[from] TaposError),
    /// Dispatch to the blockchain API failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl ErrorCode for GatewayError {
    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "GATEWAY_BAD_REQUEST",
            Self::Decoder(e) => e.code(),
            Self::Tapos(e) => e.code(),
            Self::Dispatch(e) => e.code(),
        }
    }
}
