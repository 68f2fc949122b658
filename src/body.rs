use crate::buffer::{SegmentQueue, SegmentSink};
use crate::codec::{CodecState, Direction, GzipCodec, InflateStatus};
use bytes::{Buf, Bytes, BytesMut};
use http_body::{Body, Frame};
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// A response body that may be transformed through the gzip codec.
    ///
    /// This type wraps an inner body and either runs its data frames through
    /// a [`GzipCodec`] in one direction or passes them through unchanged.
    #[project = GzipBodyProj]
    #[allow(missing_docs)]
    pub enum GzipBody<B> {
        /// Body routed through the codec.
        Transformed {
            #[pin]
            inner: B,
            state: TransformedBody,
        },
        /// Passthrough body without transformation.
        Passthrough {
            #[pin]
            inner: B,
        },
    }
}

/// State and buffers for an actively transformed body.
pub(crate) struct TransformedBody {
    codec: GzipCodec,
    input: SegmentQueue,
    output: SegmentSink,
    phase: Phase,
    pending_trailers: Option<http::HeaderMap>,
}

/// State machine for the transform driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Reading frames from the inner body and feeding the codec.
    Reading,
    /// Finalizing the codec after the inner body is done.
    Finishing,
    /// Emitting buffered trailers.
    Trailers,
    /// The transform is complete.
    Done,
}

impl TransformedBody {
    fn new(direction: Direction) -> Self {
        Self {
            codec: GzipCodec::new(direction),
            input: SegmentQueue::new(),
            output: SegmentSink::new(),
            phase: Phase::Reading,
            pending_trailers: None,
        }
    }

    /// Returns the current driver phase.
    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    /// Runs one codec call over whatever input is queued.
    ///
    /// Returns true once the codec has completed its stream. A decoder can
    /// complete before the inner body does; after that, queued input is
    /// surplus past the gzip member and is discarded.
    fn step(&mut self, end: bool) -> io::Result<bool> {
        if self.codec.state() == CodecState::Done {
            self.input.clear();
            return Ok(true);
        }
        match self.codec.direction() {
            Direction::Compress => {
                self.codec
                    .compress(&mut self.input, &mut self.output, end)
                    .map_err(io::Error::other)?;
                Ok(end)
            }
            Direction::Decompress => {
                let status = self
                    .codec
                    .decompress(&mut self.input, &mut self.output, end)
                    .map_err(io::Error::other)?;
                Ok(status == InflateStatus::Done)
            }
        }
    }

    /// Polls the inner body and drives the codec.
    fn poll_transformed<B>(
        &mut self,
        cx: &mut Context<'_>,
        mut inner: Pin<&mut B>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>>
    where
        B: Body,
        B::Data: Buf,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        loop {
            match self.phase {
                Phase::Done => return Poll::Ready(None),

                Phase::Trailers => {
                    self.phase = Phase::Done;
                    return match self.pending_trailers.take() {
                        Some(trailers) => Poll::Ready(Some(Ok(Frame::trailers(trailers)))),
                        None => Poll::Ready(None),
                    };
                }

                Phase::Finishing => {
                    // Finalize the codec: flush the deflater and trailer, or
                    // validate the decoder's buffered trailer.
                    if let Err(e) = self.step(true) {
                        self.phase = Phase::Done;
                        return Poll::Ready(Some(Err(e)));
                    }
                    self.phase = Phase::Trailers;
                    let data = self.output.take_all();
                    if !data.is_empty() {
                        return Poll::Ready(Some(Ok(Frame::data(data))));
                    }
                }

                Phase::Reading => {
                    match inner.as_mut().poll_frame(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(None) => {
                            self.phase = Phase::Finishing;
                        }
                        Poll::Ready(Some(Err(e))) => {
                            self.phase = Phase::Done;
                            return Poll::Ready(Some(Err(io::Error::other(e.into()))));
                        }
                        Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                            Ok(mut data) => {
                                self.input.push(data.copy_to_bytes(data.remaining()));
                                if let Err(e) = self.step(false) {
                                    self.phase = Phase::Done;
                                    return Poll::Ready(Some(Err(e)));
                                }
                                // A call can make no output (trailer margin,
                                // engine buffering); keep polling instead of
                                // parking without a wakeup.
                                let data = self.output.take_all();
                                if !data.is_empty() {
                                    return Poll::Ready(Some(Ok(Frame::data(data))));
                                }
                            }
                            Err(frame) => {
                                // Buffer trailers and finalize the codec first
                                if let Ok(trailers) = frame.into_trailers() {
                                    self.pending_trailers = Some(trailers);
                                    self.phase = Phase::Finishing;
                                }
                            }
                        },
                    }
                }
            }
        }
    }
}

impl<B> GzipBody<B> {
    /// Creates a body that compresses the inner body into a gzip member.
    pub fn encode(inner: B) -> Self {
        Self::Transformed {
            inner,
            state: TransformedBody::new(Direction::Compress),
        }
    }

    /// Creates a body that decompresses an inner gzip-encoded body.
    pub fn decode(inner: B) -> Self {
        Self::Transformed {
            inner,
            state: TransformedBody::new(Direction::Decompress),
        }
    }

    /// Creates a passthrough body without transformation.
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }
}

impl<B> Body for GzipBody<B>
where
    B: Body,
    B::Data: Buf,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            GzipBodyProj::Passthrough { inner } => {
                // Pass through frames, converting data to Bytes
                match inner.poll_frame(cx) {
                    Poll::Pending => Poll::Pending,
                    Poll::Ready(None) => Poll::Ready(None),
                    Poll::Ready(Some(Ok(frame))) => {
                        let frame = frame.map_data(|data| {
                            let mut bytes = BytesMut::with_capacity(data.remaining());
                            let mut chunk = data;
                            while chunk.has_remaining() {
                                let slice = chunk.chunk();
                                bytes.extend_from_slice(slice);
                                chunk.advance(slice.len());
                            }
                            bytes.freeze()
                        });
                        Poll::Ready(Some(Ok(frame)))
                    }
                    Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(io::Error::other(e.into())))),
                }
            }
            GzipBodyProj::Transformed { inner, state } => state.poll_transformed(cx, inner),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            GzipBody::Passthrough { inner } => inner.is_end_stream(),
            GzipBody::Transformed { state, .. } => state.phase() == Phase::Done,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            GzipBody::Passthrough { inner } => inner.size_hint(),
            // Transformed size is unknown
            GzipBody::Transformed { .. } => http_body::SizeHint::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::GZIP_HEADER;
    use http::HeaderMap;
    use http_body_util::Full;
    use std::collections::VecDeque;
    use std::io::Read;

    /// A test body that yields predefined frames.
    struct TestBody {
        frames: VecDeque<Frame<Bytes>>,
    }

    impl TestBody {
        fn new(frames: Vec<Frame<Bytes>>) -> Self {
            Self {
                frames: frames.into(),
            }
        }
    }

    impl Body for TestBody {
        type Data = Bytes;
        type Error = std::convert::Infallible;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            match self.frames.pop_front() {
                Some(frame) => Poll::Ready(Some(Ok(frame))),
                None => Poll::Ready(None),
            }
        }
    }

    fn poll_body<B: Body + Unpin>(body: &mut B) -> Option<Result<Frame<B::Data>, B::Error>> {
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        match Pin::new(body).poll_frame(&mut cx) {
            Poll::Ready(result) => result,
            Poll::Pending => None,
        }
    }

    fn collect_data<B>(body: &mut B) -> Result<(Vec<u8>, Option<HeaderMap>), B::Error>
    where
        B: Body<Data = Bytes> + Unpin,
    {
        let mut data = Vec::new();
        let mut trailers = None;
        while let Some(result) = poll_body(body) {
            let frame = result?;
            match frame.into_data() {
                Ok(bytes) => data.extend_from_slice(&bytes),
                Err(frame) => trailers = frame.into_trailers().ok(),
            }
        }
        Ok((data, trailers))
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        use std::io::Write;
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(6));
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn passthrough_data() {
        let inner = TestBody::new(vec![Frame::data(Bytes::from("hello world"))]);
        let mut body = GzipBody::passthrough(inner);

        let frame = poll_body(&mut body).unwrap().unwrap();
        assert!(frame.is_data());
        assert_eq!(frame.into_data().unwrap(), Bytes::from("hello world"));

        assert!(poll_body(&mut body).is_none());
    }

    #[test]
    fn passthrough_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc123".parse().unwrap());

        let inner = TestBody::new(vec![
            Frame::data(Bytes::from("data")),
            Frame::trailers(trailers.clone()),
        ]);
        let mut body = GzipBody::passthrough(inner);

        // First frame is data
        let frame = poll_body(&mut body).unwrap().unwrap();
        assert!(frame.is_data());

        // Second frame is trailers
        let frame = poll_body(&mut body).unwrap().unwrap();
        assert!(frame.is_trailers());
        let received_trailers = frame.into_trailers().unwrap();
        assert_eq!(received_trailers.get("x-checksum").unwrap(), "abc123");

        assert!(poll_body(&mut body).is_none());
    }

    #[test]
    fn encode_produces_a_valid_gzip_member() {
        let inner = TestBody::new(vec![
            Frame::data(Bytes::from("hello ")),
            Frame::data(Bytes::from("world")),
        ]);
        let mut body = GzipBody::encode(inner);

        let (stream, trailers) = collect_data(&mut body).unwrap();
        assert!(trailers.is_none());
        assert_eq!(&stream[..10], &GZIP_HEADER);

        let mut decoder = flate2::read::GzDecoder::new(&stream[..]);
        let mut back = Vec::new();
        decoder.read_to_end(&mut back).unwrap();
        assert_eq!(back, b"hello world");
    }

    #[test]
    fn encode_preserves_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc123".parse().unwrap());

        let inner = TestBody::new(vec![
            Frame::data(Bytes::from("hello world")),
            Frame::trailers(trailers),
        ]);
        let mut body = GzipBody::encode(inner);

        let (stream, trailers) = collect_data(&mut body).unwrap();
        assert!(!stream.is_empty());
        let trailers = trailers.expect("trailers frame");
        assert_eq!(trailers.get("x-checksum").unwrap(), "abc123");
        assert!(body.is_end_stream());
    }

    #[test]
    fn encode_empty_body() {
        let mut body = GzipBody::encode(TestBody::new(vec![]));
        let (stream, _) = collect_data(&mut body).unwrap();

        // A well-formed empty member: header, empty deflate stream, trailer.
        let mut decoder = flate2::read::GzDecoder::new(&stream[..]);
        let mut back = Vec::new();
        decoder.read_to_end(&mut back).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn encode_full_body() {
        let mut body = GzipBody::encode(Full::new(Bytes::from("one shot payload")));
        let (stream, _) = collect_data(&mut body).unwrap();

        let mut decoder = flate2::read::GzDecoder::new(&stream[..]);
        let mut back = Vec::new();
        decoder.read_to_end(&mut back).unwrap();
        assert_eq!(back, b"one shot payload");
    }

    #[test]
    fn decode_reassembles_fragmented_stream() {
        let stream = gzip(b"fragmented across many frames");
        let frames = stream
            .chunks(3)
            .map(|piece| Frame::data(Bytes::copy_from_slice(piece)))
            .collect();
        let mut body = GzipBody::decode(TestBody::new(frames));

        let (data, _) = collect_data(&mut body).unwrap();
        assert_eq!(data, b"fragmented across many frames");
        assert!(body.is_end_stream());
    }

    #[test]
    fn decode_preserves_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc123".parse().unwrap());

        let stream = gzip(b"payload");
        let inner = TestBody::new(vec![
            Frame::data(Bytes::from(stream)),
            Frame::trailers(trailers),
        ]);
        let mut body = GzipBody::decode(inner);

        let (data, trailers) = collect_data(&mut body).unwrap();
        assert_eq!(data, b"payload");
        let trailers = trailers.expect("trailers frame");
        assert_eq!(trailers.get("x-checksum").unwrap(), "abc123");
    }

    #[test]
    fn decode_surfaces_corruption_as_io_error() {
        let mut stream = gzip(b"about to be damaged");
        let len = stream.len();
        stream[len - 8] ^= 0x01;
        let inner = TestBody::new(vec![Frame::data(Bytes::from(stream))]);
        let mut body = GzipBody::decode(inner);

        let mut err = None;
        while let Some(result) = poll_body(&mut body) {
            match result {
                Ok(_) => {}
                Err(e) => {
                    err = Some(e);
                    break;
                }
            }
        }
        assert!(err.is_some());
        assert!(body.is_end_stream());
    }

    #[test]
    fn decode_truncated_stream_is_an_error() {
        let stream = gzip(b"cut off early");
        let inner = TestBody::new(vec![Frame::data(Bytes::copy_from_slice(
            &stream[..stream.len() - 4],
        ))]);
        let mut body = GzipBody::decode(inner);

        assert!(collect_data(&mut body).is_err());
    }
}
