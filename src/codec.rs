//! Streaming gzip codec: incremental compression and decompression of a
//! single gzip member across arbitrarily fragmented input.
//!
//! [`GzipCodec`] owns all per-stream state: the raw-DEFLATE engine, the
//! running crc32 and byte count over the uncompressed side of the stream,
//! and the lifecycle flags. Both engines are resumable: a call consumes
//! whatever input is queued, appends whatever output the engine yields, and
//! returns, so a driver can invoke them once per delivery without ever
//! holding a whole body in memory.
//!
//! The decoder never feeds the last 8 available bytes to the inflate engine;
//! until the stream is finalized those bytes might be the member trailer, and
//! the trailer must be compared against the running checksum and length
//! rather than decompressed.

use crate::buffer::{SegmentQueue, SegmentSink};
use crate::error::GzipError;
use crc32fast::Hasher;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

/// Fixed gzip member header: magic, DEFLATE method, no flags, zero mtime,
/// no extra flags, unspecified OS.
pub const GZIP_HEADER: [u8; 10] = [
    0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03,
];

/// Size of the crc32 + length trailer that closes a gzip member.
pub const GZIP_TRAILER_LEN: usize = 8;

/// Deflate level used for compression, zlib's speed/ratio default.
const COMPRESSION_LEVEL: u32 = 6;

/// Which way a codec transforms bytes. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Plain bytes in, gzip member out.
    Compress,
    /// Gzip member in, plain bytes out.
    Decompress,
}

/// Lifecycle state of a codec.
///
/// Transitions are one-way: once `Done` or `Error`, a codec rejects every
/// further call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecState {
    /// The stream is open and accepting input.
    Active,
    /// The member completed and, for decompression, its trailer validated.
    Done,
    /// A fatal error occurred; the stream is poisoned.
    Error,
}

/// Outcome of a successful [`GzipCodec::decompress`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflateStatus {
    /// Too little input was buffered to make progress; nothing beyond the
    /// header was consumed. Deliver more bytes and call again.
    NeedMore,
    /// Some input was decompressed; the stream is still open.
    Progress,
    /// The member ended and its trailer validated; the stream is complete.
    Done,
}

enum Engine {
    Deflate(Compress),
    Inflate(Decompress),
}

/// Per-stream codec context for one logical compress or decompress session.
///
/// Create one per transformed body and drive it with
/// [`compress`](Self::compress) or [`decompress`](Self::decompress) as input
/// arrives. The underlying engine is released exactly once: inline when the
/// stream reaches `Done`, through [`release`](Self::release), or on drop for
/// mid-stream aborts.
pub struct GzipCodec {
    engine: Option<Engine>,
    crc: Hasher,
    total: u32,
    state: CodecState,
    direction: Direction,
    header_done: bool,
}

impl GzipCodec {
    /// Creates a codec for one logical stream in the given direction.
    pub fn new(direction: Direction) -> Self {
        let engine = match direction {
            Direction::Compress => {
                Engine::Deflate(Compress::new(Compression::new(COMPRESSION_LEVEL), false))
            }
            Direction::Decompress => Engine::Inflate(Decompress::new(false)),
        };
        Self {
            engine: Some(engine),
            crc: Hasher::new(),
            total: 0,
            state: CodecState::Active,
            direction,
            header_done: false,
        }
    }

    /// Direction this codec was created with.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CodecState {
        self.state
    }

    /// Releases the underlying engine. Safe to call repeatedly: the engine
    /// is dropped at most once, whether through this call, the `Done`
    /// transition, or the codec being dropped mid-stream.
    pub fn release(&mut self) {
        self.engine = None;
    }

    /// Compresses all queued input into `output`.
    ///
    /// On the first call the fixed 10-byte gzip header is appended before any
    /// payload. Every call consumes the entire queue; compressed bytes appear
    /// in `output` as the engine emits them. When `end` is true the deflate
    /// stream is finished, the 8-byte trailer (little-endian crc32, then
    /// little-endian length mod 2^32 of the input bytes) is appended, and the
    /// codec moves to `Done`.
    pub fn compress(
        &mut self,
        input: &mut SegmentQueue,
        output: &mut SegmentSink,
        end: bool,
    ) -> Result<(), GzipError> {
        self.ensure(Direction::Compress)?;
        match self.compress_inner(input, output, end) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.poison();
                Err(err)
            }
        }
    }

    /// Decompresses queued input into `output`.
    ///
    /// The 10-byte header is skipped without inspection, once; while fewer
    /// than 10 bytes are buffered nothing is consumed and `NeedMore` is
    /// returned. The last 8 buffered bytes are always withheld from the
    /// engine as the prospective trailer. When the engine reports the end of
    /// the deflate stream, or when `end` is true, the trailer is consumed and
    /// checked against the running crc32 and length; only then does the codec
    /// move to `Done`.
    pub fn decompress(
        &mut self,
        input: &mut SegmentQueue,
        output: &mut SegmentSink,
        end: bool,
    ) -> Result<InflateStatus, GzipError> {
        self.ensure(Direction::Decompress)?;
        match self.decompress_inner(input, output, end) {
            Ok(status) => Ok(status),
            Err(err) => {
                self.poison();
                Err(err)
            }
        }
    }

    fn ensure(&self, want: Direction) -> Result<(), GzipError> {
        match self.state {
            CodecState::Active => {}
            state => return Err(GzipError::Closed { state }),
        }
        if self.direction != want {
            return Err(GzipError::Direction {
                have: self.direction,
                want,
            });
        }
        Ok(())
    }

    fn poison(&mut self) {
        self.state = CodecState::Error;
        self.release();
    }

    fn compress_inner(
        &mut self,
        input: &mut SegmentQueue,
        output: &mut SegmentSink,
        end: bool,
    ) -> Result<(), GzipError> {
        if !self.header_done {
            output.put_slice(&GZIP_HEADER);
            self.header_done = true;
        }

        while let Some(segment) = input.pop() {
            self.crc.update(&segment);
            self.total = self.total.wrapping_add(segment.len() as u32);
            self.deflate_slice(&segment, output)?;
        }

        if end {
            self.deflate_finish(output)?;
            self.release();
            let mut trailer = [0u8; GZIP_TRAILER_LEN];
            trailer[..4].copy_from_slice(&self.crc.clone().finalize().to_le_bytes());
            trailer[4..].copy_from_slice(&self.total.to_le_bytes());
            output.put_slice(&trailer);
            self.state = CodecState::Done;
        }

        Ok(())
    }

    /// Feeds one contiguous slice to the deflater, draining output until the
    /// slice is fully consumed.
    fn deflate_slice(&mut self, data: &[u8], output: &mut SegmentSink) -> Result<(), GzipError> {
        let engine = match self.engine.as_mut() {
            Some(Engine::Deflate(engine)) => engine,
            _ => return Err(GzipError::Closed { state: self.state }),
        };

        let mut offset = 0;
        while offset < data.len() {
            let block = output.write_start();
            let before_in = engine.total_in();
            let before_out = engine.total_out();
            engine.compress(&data[offset..], block, FlushCompress::None)?;
            let consumed = (engine.total_in() - before_in) as usize;
            let produced = (engine.total_out() - before_out) as usize;
            output.produce(produced);
            offset += consumed;
            if consumed == 0 && produced == 0 {
                return Err(GzipError::Stalled);
            }
        }
        Ok(())
    }

    /// Finishes the deflate stream, draining until the engine signals end.
    fn deflate_finish(&mut self, output: &mut SegmentSink) -> Result<(), GzipError> {
        let engine = match self.engine.as_mut() {
            Some(Engine::Deflate(engine)) => engine,
            _ => return Err(GzipError::Closed { state: self.state }),
        };

        loop {
            let block = output.write_start();
            let before_out = engine.total_out();
            let status = engine.compress(&[], block, FlushCompress::Finish)?;
            let produced = (engine.total_out() - before_out) as usize;
            output.produce(produced);
            if let Status::StreamEnd = status {
                return Ok(());
            }
            if produced == 0 {
                return Err(GzipError::Stalled);
            }
        }
    }

    fn decompress_inner(
        &mut self,
        input: &mut SegmentQueue,
        output: &mut SegmentSink,
        end: bool,
    ) -> Result<InflateStatus, GzipError> {
        if !self.header_done {
            if input.available() < GZIP_HEADER.len() {
                if end {
                    return Err(GzipError::TruncatedHeader {
                        have: input.available(),
                    });
                }
                return Ok(InflateStatus::NeedMore);
            }
            input.consume(GZIP_HEADER.len());
            self.header_done = true;
        }

        // The last 8 available bytes may be the trailer; never inflate them.
        let mut finished = false;
        if input.available() > GZIP_TRAILER_LEN {
            let mut usable = input.available() - GZIP_TRAILER_LEN;
            while usable > 0 && !finished {
                let Some(segment) = input.front().cloned() else {
                    break;
                };
                let take = segment.len().min(usable);
                let (consumed, at_end) = self.inflate_slice(&segment[..take], output)?;
                input.consume(consumed);
                usable -= consumed;
                finished = at_end;
            }
        } else if !end {
            return Ok(InflateStatus::NeedMore);
        }

        if end && !finished {
            finished = self.inflate_finish(output)?;
        }

        if finished || end {
            self.release();
            self.check_trailer(input)?;
            self.state = CodecState::Done;
            return Ok(InflateStatus::Done);
        }

        Ok(InflateStatus::Progress)
    }

    /// Feeds one contiguous slice to the inflater, draining and hashing
    /// output, until the slice is consumed or the stream ends.
    ///
    /// Returns the bytes consumed from `data` and whether the deflate stream
    /// reached its logical end.
    fn inflate_slice(
        &mut self,
        data: &[u8],
        output: &mut SegmentSink,
    ) -> Result<(usize, bool), GzipError> {
        let engine = match self.engine.as_mut() {
            Some(Engine::Inflate(engine)) => engine,
            _ => return Err(GzipError::Closed { state: self.state }),
        };

        let mut offset = 0;
        while offset < data.len() {
            let block = output.write_start();
            let before_in = engine.total_in();
            let before_out = engine.total_out();
            let status = engine.decompress(&data[offset..], block, FlushDecompress::None)?;
            let consumed = (engine.total_in() - before_in) as usize;
            let produced = (engine.total_out() - before_out) as usize;
            self.crc.update(&block[..produced]);
            self.total = self.total.wrapping_add(produced as u32);
            output.produce(produced);
            offset += consumed;
            match status {
                Status::StreamEnd => return Ok((offset, true)),
                Status::Ok | Status::BufError => {
                    if consumed == 0 && produced == 0 {
                        return Err(GzipError::Stalled);
                    }
                }
            }
        }
        Ok((offset, false))
    }

    /// Drains any output the inflater still holds after the final delivery.
    ///
    /// Returns true if the engine reached the logical end of the stream.
    fn inflate_finish(&mut self, output: &mut SegmentSink) -> Result<bool, GzipError> {
        let engine = match self.engine.as_mut() {
            Some(Engine::Inflate(engine)) => engine,
            _ => return Err(GzipError::Closed { state: self.state }),
        };

        loop {
            let block = output.write_start();
            let before_out = engine.total_out();
            let status = engine.decompress(&[], block, FlushDecompress::Finish)?;
            let produced = (engine.total_out() - before_out) as usize;
            self.crc.update(&block[..produced]);
            self.total = self.total.wrapping_add(produced as u32);
            output.produce(produced);
            match status {
                Status::StreamEnd => return Ok(true),
                Status::Ok | Status::BufError => {
                    if produced == 0 {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Consumes the buffered trailer and compares it against the running
    /// checksum and length. Anything queued past the trailer is discarded.
    fn check_trailer(&mut self, input: &mut SegmentQueue) -> Result<(), GzipError> {
        if input.available() < GZIP_TRAILER_LEN {
            return Err(GzipError::TruncatedTrailer {
                have: input.available(),
            });
        }
        let mut raw = [0u8; GZIP_TRAILER_LEN];
        input.copy_to_slice(&mut raw);
        input.clear();

        let stored_crc = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let stored_len = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let actual_crc = self.crc.clone().finalize();
        if stored_crc != actual_crc {
            return Err(GzipError::ChecksumMismatch {
                stored: stored_crc,
                actual: actual_crc,
            });
        }
        if stored_len != self.total {
            return Err(GzipError::LengthMismatch {
                stored: stored_len,
                actual: self.total,
            });
        }
        Ok(())
    }
}
