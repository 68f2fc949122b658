//! Streaming gzip transform middleware for Tower.
//!
//! This crate provides a Tower layer that runs HTTP response bodies through a
//! streaming gzip codec without ever buffering a whole body: compress mode
//! gzips responses for clients that accept the encoding, and decompress mode
//! unwraps gzip-encoded responses, validating the trailer checksum and length
//! as the stream completes.
//!
//! # Example
//!
//! ```ignore
//! use http_gzip_transform::GzipLayer;
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(GzipLayer::compress())
//!     .service(my_service);
//! ```
//!
//! # Compression Rules
//!
//! In compress mode, the middleware will **not** compress responses when:
//! - The request carries no `Accept-Encoding` that allows gzip
//! - `Content-Encoding` header is already set
//! - `Content-Range` header is present (range responses)
//! - `Content-Type` starts with `image/` (except `image/svg+xml`)
//! - `Content-Type` starts with `application/grpc` (except `application/grpc-web`)
//! - `Content-Length` is below the minimum size threshold (default: 860 bytes)
//!
//! In decompress mode, only responses carrying `Content-Encoding: gzip` (or
//! `x-gzip`) are transformed; anything else passes through untouched.
//!
//! # Response Modifications
//!
//! When a body is transformed:
//! - `Content-Encoding` is set to `gzip` (compress) or removed (decompress)
//! - `Content-Length` header is removed (transformed size is unknown)
//! - `Accept-Ranges` header is removed
//! - `Vary` header includes `Accept-Encoding` (compress mode)
//!
//! The codec itself is exposed as [`GzipCodec`] for callers that need to
//! drive compression or decompression over their own transport.

#![deny(missing_docs)]

mod accept;
mod body;
mod buffer;
mod codec;
mod error;
mod future;
mod layer;
mod service;

pub use body::GzipBody;
pub use buffer::{SegmentQueue, SegmentSink};
pub use codec::{CodecState, Direction, GZIP_HEADER, GZIP_TRAILER_LEN, GzipCodec, InflateStatus};
pub use error::GzipError;
pub use future::ResponseFuture;
pub use layer::{DEFAULT_MIN_SIZE, GzipLayer};
pub use service::GzipService;
