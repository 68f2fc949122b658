//! Chunked byte buffers shared by the codec engines and their driver.
//!
//! Bodies reach the codec as an ordered run of [`Bytes`] segments, never as
//! one contiguous slice. [`SegmentQueue`] walks those segments with an
//! explicit remaining-byte count, which is what lets the decoder withhold a
//! prospective trailer without copying or reassembling input. [`SegmentSink`]
//! is the matching append-only output side: engines fill a fixed scratch
//! block and sealed chunks are handed to the driver in production order.

use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;

/// Scratch block size for sink output, sealed into one chunk when full.
pub(crate) const DEFAULT_BLOCK_SIZE: usize = 8 * 1024;

/// An ordered, read-once queue of input segments.
///
/// Bytes are appended at the back and consumed from the front; a consumed
/// byte is gone. The queue tracks the total number of unconsumed bytes so
/// callers can reason about availability without walking segments.
#[derive(Debug, Default)]
pub struct SegmentQueue {
    segments: VecDeque<Bytes>,
    available: usize,
}

impl SegmentQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a segment to the back of the queue. Empty segments are ignored.
    pub fn push(&mut self, segment: impl Into<Bytes>) {
        let segment = segment.into();
        if segment.is_empty() {
            return;
        }
        self.available += segment.len();
        self.segments.push_back(segment);
    }

    /// Number of bytes not yet consumed.
    pub fn available(&self) -> usize {
        self.available
    }

    /// Returns true when no bytes remain.
    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// Borrows the front segment without consuming it.
    pub(crate) fn front(&self) -> Option<&Bytes> {
        self.segments.front()
    }

    /// Removes and returns the front segment.
    pub(crate) fn pop(&mut self) -> Option<Bytes> {
        let segment = self.segments.pop_front()?;
        self.available -= segment.len();
        Some(segment)
    }

    /// Drops `n` bytes from the front of the queue, crossing segment
    /// boundaries as needed.
    pub(crate) fn consume(&mut self, mut n: usize) {
        debug_assert!(n <= self.available);
        while n > 0 {
            let Some(front) = self.segments.front_mut() else {
                return;
            };
            if front.len() > n {
                front.advance(n);
                self.available -= n;
                return;
            }
            n -= front.len();
            self.available -= front.len();
            self.segments.pop_front();
        }
    }

    /// Consumes exactly `dst.len()` bytes into `dst`. The caller must check
    /// `available()` first.
    pub(crate) fn copy_to_slice(&mut self, dst: &mut [u8]) {
        debug_assert!(dst.len() <= self.available);
        let mut filled = 0;
        while filled < dst.len() {
            let Some(front) = self.segments.front_mut() else {
                return;
            };
            let n = front.len().min(dst.len() - filled);
            dst[filled..filled + n].copy_from_slice(&front[..n]);
            front.advance(n);
            if front.is_empty() {
                self.segments.pop_front();
            }
            self.available -= n;
            filled += n;
        }
    }

    /// Discards everything still queued.
    pub(crate) fn clear(&mut self) {
        self.segments.clear();
        self.available = 0;
    }
}

/// An append-only chunked output sink.
///
/// Engines write into the spare capacity of a fixed scratch block; whenever
/// the block fills, it is sealed into an immutable chunk and a fresh block is
/// started. The driver drains sealed chunks in the order they were produced.
#[derive(Debug)]
pub struct SegmentSink {
    sealed: VecDeque<Bytes>,
    block: Vec<u8>,
    filled: usize,
    pending: usize,
}

impl SegmentSink {
    /// Creates a sink with the default block size.
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    /// Creates a sink that seals chunks of at most `block_size` bytes.
    pub fn with_block_size(block_size: usize) -> Self {
        assert!(block_size > 0);
        Self {
            sealed: VecDeque::new(),
            block: vec![0u8; block_size],
            filled: 0,
            pending: 0,
        }
    }

    /// Writable spare capacity of the current block. Never empty: a full
    /// block is sealed first and a fresh one handed out.
    pub(crate) fn write_start(&mut self) -> &mut [u8] {
        if self.filled == self.block.len() {
            self.seal();
        }
        &mut self.block[self.filled..]
    }

    /// Commits `n` bytes written through [`write_start`](Self::write_start).
    pub(crate) fn produce(&mut self, n: usize) {
        debug_assert!(self.filled + n <= self.block.len());
        self.filled += n;
        self.pending += n;
    }

    /// Appends literal bytes, keeping order with engine-produced output.
    pub(crate) fn put_slice(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let spare = self.write_start();
            let n = spare.len().min(data.len());
            spare[..n].copy_from_slice(&data[..n]);
            self.produce(n);
            data = &data[n..];
        }
    }

    fn seal(&mut self) {
        if self.filled > 0 {
            self.sealed
                .push_back(Bytes::copy_from_slice(&self.block[..self.filled]));
            self.filled = 0;
        }
    }

    /// Bytes produced and not yet taken.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Returns true when nothing is waiting to be taken.
    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }

    /// Takes the next produced chunk, oldest first.
    pub fn pop(&mut self) -> Option<Bytes> {
        if self.sealed.is_empty() {
            self.seal();
        }
        let chunk = self.sealed.pop_front()?;
        self.pending -= chunk.len();
        Some(chunk)
    }

    /// Takes everything produced so far as one contiguous chunk.
    pub fn take_all(&mut self) -> Bytes {
        self.seal();
        self.pending = 0;
        match self.sealed.len() {
            0 => Bytes::new(),
            1 => self.sealed.pop_front().unwrap_or_default(),
            _ => {
                let total = self.sealed.iter().map(Bytes::len).sum();
                let mut all = BytesMut::with_capacity(total);
                for chunk in self.sealed.drain(..) {
                    all.extend_from_slice(&chunk);
                }
                all.freeze()
            }
        }
    }
}

impl Default for SegmentSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_counts_across_segments() {
        let mut queue = SegmentQueue::new();
        queue.push(Bytes::from_static(b"abc"));
        queue.push(Bytes::from_static(b"defg"));
        assert_eq!(queue.available(), 7);

        queue.consume(2);
        assert_eq!(queue.available(), 5);
        assert_eq!(queue.front().unwrap().as_ref(), b"c");

        // Crosses the segment boundary
        queue.consume(3);
        assert_eq!(queue.available(), 2);
        assert_eq!(queue.front().unwrap().as_ref(), b"fg");
    }

    #[test]
    fn queue_ignores_empty_segments() {
        let mut queue = SegmentQueue::new();
        queue.push(Bytes::new());
        assert!(queue.is_empty());
        assert!(queue.front().is_none());
    }

    #[test]
    fn queue_copy_to_slice_spans_segments() {
        let mut queue = SegmentQueue::new();
        queue.push(Bytes::from_static(b"12"));
        queue.push(Bytes::from_static(b"34"));
        queue.push(Bytes::from_static(b"5678"));

        let mut out = [0u8; 5];
        queue.copy_to_slice(&mut out);
        assert_eq!(&out, b"12345");
        assert_eq!(queue.available(), 3);
        assert_eq!(queue.front().unwrap().as_ref(), b"678");
    }

    #[test]
    fn queue_clear_discards_everything() {
        let mut queue = SegmentQueue::new();
        queue.push(Bytes::from_static(b"leftover"));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn sink_seals_full_blocks_in_order() {
        let mut sink = SegmentSink::with_block_size(4);
        sink.put_slice(b"abcdefghij");
        assert_eq!(sink.pending(), 10);

        assert_eq!(sink.pop().unwrap().as_ref(), b"abcd");
        assert_eq!(sink.pop().unwrap().as_ref(), b"efgh");
        assert_eq!(sink.pop().unwrap().as_ref(), b"ij");
        assert!(sink.pop().is_none());
        assert!(sink.is_empty());
    }

    #[test]
    fn sink_interleaves_writes_and_literals() {
        let mut sink = SegmentSink::with_block_size(8);
        let spare = sink.write_start();
        spare[..3].copy_from_slice(b"one");
        sink.produce(3);
        sink.put_slice(b"two");
        assert_eq!(sink.take_all().as_ref(), b"onetwo");
    }

    #[test]
    fn sink_take_all_concatenates() {
        let mut sink = SegmentSink::with_block_size(2);
        sink.put_slice(b"hello world");
        let all = sink.take_all();
        assert_eq!(all.as_ref(), b"hello world");
        assert!(sink.is_empty());
        assert_eq!(sink.take_all().len(), 0);
    }

    #[test]
    fn sink_write_start_never_empty() {
        let mut sink = SegmentSink::with_block_size(2);
        sink.put_slice(b"xx");
        let spare = sink.write_start();
        assert!(!spare.is_empty());
    }
}
