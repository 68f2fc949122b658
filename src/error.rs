//! Failure taxonomy for the streaming gzip codec.

use crate::codec::{CodecState, Direction};
use thiserror::Error;

/// Errors surfaced by [`GzipCodec`](crate::codec::GzipCodec).
///
/// Apart from [`Closed`](GzipError::Closed) and
/// [`Direction`](GzipError::Direction), every variant is fatal to the logical
/// stream: the codec moves to the `Error` state, releases the underlying
/// engine, and rejects all further calls.
#[derive(Debug, Error)]
pub enum GzipError {
    /// The stream already reached a terminal state.
    #[error("gzip stream is {state:?} and accepts no further calls")]
    Closed {
        /// Terminal state the stream is parked in.
        state: CodecState,
    },

    /// An engine was invoked against a stream created for the other direction.
    #[error("gzip stream runs {have:?}, not {want:?}")]
    Direction {
        /// Direction the stream was created with.
        have: Direction,
        /// Direction the caller asked for.
        want: Direction,
    },

    /// The underlying deflate engine failed.
    #[error("deflate failed: {0}")]
    Compress(#[from] flate2::CompressError),

    /// The underlying inflate engine rejected its input.
    #[error("inflate failed: {0}")]
    Decompress(#[from] flate2::DecompressError),

    /// The engine stopped consuming input and producing output.
    #[error("compression engine stalled without consuming input or producing output")]
    Stalled,

    /// End of stream was declared before the 10-byte gzip header arrived.
    #[error("gzip header truncated: {have} of 10 bytes arrived")]
    TruncatedHeader {
        /// Bytes that had arrived when the stream was finalized.
        have: usize,
    },

    /// End of stream was declared before the 8-byte gzip trailer arrived.
    #[error("gzip trailer truncated: {have} of 8 bytes arrived")]
    TruncatedTrailer {
        /// Trailer bytes that had arrived when the stream was finalized.
        have: usize,
    },

    /// The trailer crc32 does not match the decompressed bytes.
    #[error("crc32 mismatch: trailer has {stored:#010x}, stream hashes to {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum recorded in the trailer.
        stored: u32,
        /// Checksum accumulated over the decompressed bytes.
        actual: u32,
    },

    /// The trailer length does not match the decompressed byte count.
    #[error("length mismatch: trailer has {stored}, stream produced {actual}")]
    LengthMismatch {
        /// Length recorded in the trailer.
        stored: u32,
        /// Length accumulated over the decompressed bytes, mod 2^32.
        actual: u32,
    },
}
