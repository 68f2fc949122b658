use crate::codec::Direction;
use crate::service::GzipService;
use tower::Layer;

/// Default minimum body size for compression (approximately 1 MTU).
pub const DEFAULT_MIN_SIZE: usize = 860;

/// A Tower layer that runs HTTP response bodies through the gzip codec.
///
/// In compress mode it gzips response bodies for clients that accept the
/// encoding; in decompress mode it unwraps gzip-encoded response bodies
/// before they reach the caller.
#[derive(Debug, Clone)]
pub struct GzipLayer {
    direction: Direction,
    min_size: usize,
}

impl GzipLayer {
    /// Creates a layer that compresses response bodies.
    ///
    /// The default minimum size for compression is 860 bytes.
    pub fn compress() -> Self {
        Self {
            direction: Direction::Compress,
            min_size: DEFAULT_MIN_SIZE,
        }
    }

    /// Creates a layer that decompresses gzip-encoded response bodies.
    pub fn decompress() -> Self {
        Self {
            direction: Direction::Decompress,
            min_size: 0,
        }
    }

    /// Sets the minimum body size required for compression.
    ///
    /// Responses with a known Content-Length smaller than this value
    /// will not be compressed. Has no effect in decompress mode.
    pub fn min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }
}

impl<S> Layer<S> for GzipLayer {
    type Service = GzipService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GzipService::new(inner, self.direction, self.min_size)
    }
}
