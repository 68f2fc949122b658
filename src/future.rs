use crate::body::GzipBody;
use crate::codec::Direction;
use http::{Response, header};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// Future for gzip transform service responses.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        direction: Direction,
        accepts_gzip: bool,
        min_size: usize,
    }
}

impl<F> ResponseFuture<F> {
    pub(crate) fn new(inner: F, direction: Direction, accepts_gzip: bool, min_size: usize) -> Self {
        Self {
            inner,
            direction,
            accepts_gzip,
            min_size,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<GzipBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.inner.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Ready(Ok(response)) => {
                let response = match this.direction {
                    Direction::Compress => {
                        encode_response(response, *this.accepts_gzip, *this.min_size)
                    }
                    Direction::Decompress => decode_response(response),
                };
                Poll::Ready(Ok(response))
            }
        }
    }
}

/// Wraps the response body with compression if appropriate.
fn encode_response<B>(
    response: Response<B>,
    accepts_gzip: bool,
    min_size: usize,
) -> Response<GzipBody<B>> {
    let (mut parts, body) = response.into_parts();

    let should_compress = accepts_gzip
        && !has_content_encoding(&parts.headers)
        && !has_content_range(&parts.headers)
        && !is_uncompressible_content_type(&parts.headers)
        && !is_below_min_size(&parts.headers, min_size);

    let body = if should_compress {
        parts.headers.insert(
            header::CONTENT_ENCODING,
            header::HeaderValue::from_static("gzip"),
        );

        // Remove Content-Length since compressed size is unknown
        parts.headers.remove(header::CONTENT_LENGTH);

        // Remove Accept-Ranges since we can't support ranges on compressed content
        parts.headers.remove(header::ACCEPT_RANGES);

        // Add Accept-Encoding to Vary header if not present
        add_vary_accept_encoding(&mut parts.headers);

        GzipBody::encode(body)
    } else {
        GzipBody::passthrough(body)
    };

    Response::from_parts(parts, body)
}

/// Unwraps a gzip-encoded response body if one is present.
fn decode_response<B>(response: Response<B>) -> Response<GzipBody<B>> {
    let (mut parts, body) = response.into_parts();

    let body = if is_gzip_encoded(&parts.headers) {
        parts.headers.remove(header::CONTENT_ENCODING);

        // The decompressed size is unknown until the trailer arrives
        parts.headers.remove(header::CONTENT_LENGTH);
        parts.headers.remove(header::ACCEPT_RANGES);

        GzipBody::decode(body)
    } else {
        GzipBody::passthrough(body)
    };

    Response::from_parts(parts, body)
}

/// Checks if Content-Encoding header is already present.
fn has_content_encoding(headers: &header::HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_ENCODING)
}

/// Checks if the response carries a single gzip Content-Encoding.
fn is_gzip_encoded(headers: &header::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            let v = v.trim();
            v.eq_ignore_ascii_case("gzip") || v.eq_ignore_ascii_case("x-gzip")
        })
}

/// Checks if Content-Range header is present (range response).
fn has_content_range(headers: &header::HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_RANGE)
}

/// Adds Accept-Encoding to the Vary header if not already present.
fn add_vary_accept_encoding(headers: &mut header::HeaderMap) {
    // Check all Vary headers to see if Accept-Encoding is already present
    for vary in headers.get_all(header::VARY) {
        if let Ok(vary_str) = vary.to_str() {
            let present = vary_str.split(',').any(|v| {
                let v = v.trim();
                v.eq_ignore_ascii_case("*") || v.eq_ignore_ascii_case("accept-encoding")
            });
            if present {
                return;
            }
        }
    }

    // Append Accept-Encoding to Vary header
    headers.append(
        header::VARY,
        header::HeaderValue::from_static("accept-encoding"),
    );
}

/// Checks if the content type should not be compressed.
fn is_uncompressible_content_type(headers: &header::HeaderMap) -> bool {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };

    // Skip all images except SVG
    if content_type.starts_with("image/") {
        return !content_type.starts_with("image/svg+xml");
    }

    // Skip gRPC except grpc-web
    if content_type.starts_with("application/grpc") {
        return !content_type.starts_with("application/grpc-web");
    }

    false
}

/// Checks if Content-Length is below the minimum size.
fn is_below_min_size(headers: &header::HeaderMap, min_size: usize) -> bool {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .is_some_and(|len| len < min_size)
}
