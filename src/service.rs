use crate::accept;
use crate::codec::Direction;
use crate::future::ResponseFuture;
use http::Request;
use std::task::{Context, Poll};
use tower::Service;

/// A Tower service that runs HTTP response bodies through the gzip codec.
#[derive(Debug, Clone)]
pub struct GzipService<S> {
    inner: S,
    direction: Direction,
    min_size: usize,
}

impl<S> GzipService<S> {
    /// Creates a new gzip service wrapping the given inner service.
    pub fn new(inner: S, direction: Direction, min_size: usize) -> Self {
        Self {
            inner,
            direction,
            min_size,
        }
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for GzipService<S>
where
    S: Service<Request<ReqBody>, Response = http::Response<ResBody>>,
{
    type Response = http::Response<crate::body::GzipBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // Only compress mode consults the request's Accept-Encoding header
        let accepts_gzip = self.direction == Direction::Compress
            && req
                .headers()
                .get(http::header::ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .is_some_and(accept::accepts_gzip);

        let inner = self.inner.call(req);

        ResponseFuture::new(inner, self.direction, accepts_gzip, self.min_size)
    }
}
