//! Capture subsystem.
//!
//! # Data Flow
//! ```text
//! Request<B>
//!     → interceptor.rs (allocate head sink, dump request head)
//!     → tee.rs RequestTee (request body frames → head sink)
//!     → Transport::send
//!     → interceptor.rs (dump response head, allocate body sink)
//!     → tee.rs ResponseTee (response body frames → head sink + body sink)
//!     → Response<DumpBody> handed back to the caller
//!
//! sink.rs: SinkProvider → DirSinkProvider (files) | MemorySinkProvider
//! ```
//!
//! # Design Decisions
//! - Bodies are never buffered whole; each frame is written as it passes
//! - Capture is best effort; the transport's result is authoritative
//! - One exchange's sinks belong to that exchange alone

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;

pub mod interceptor;
pub mod sink;
pub mod tee;

pub use interceptor::{Recorder, Transport};
pub use sink::{DirSinkProvider, MemorySinkProvider, Sink, SinkProvider, StorageError};
pub use tee::{CaptureError, RequestTee, ResponseTee, SharedSink, TeeState};

/// Boxed error type carried by dumped bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type flowing through a [`Recorder`].
pub type DumpBody = UnsyncBoxBody<Bytes, BoxError>;
