//! Streaming tees over HTTP bodies.
//!
//! # Responsibilities
//! - Mirror every request body frame into the exchange's head sink
//! - Mirror every response body frame into the head sink and the body sink
//! - Close both sinks exactly once, whether the body ends, fails, or is
//!   dropped unread
//!
//! # Design Decisions
//! - Writes happen inline in `poll_frame`; nothing is buffered beyond the
//!   frame in flight
//! - A request-side write failure fails the request body: a body is single
//!   use, so a partial capture cannot be recovered by retrying the read
//! - A response-side write failure only stops that sink; the caller still
//!   gets every byte the transport produced

use std::fmt::Display;
use std::io::{self, Write};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use hyper::body::{Body, Frame, SizeHint};
use thiserror::Error;

use super::sink::Sink;
use super::{BoxError, DumpBody};
use crate::observability::metrics;

/// Errors surfaced by a tee to whoever is reading the body.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture write failed: {0}")]
    Write(#[from] io::Error),
}

/// The head sink of one exchange.
///
/// Shared between the interceptor, the request tee, and finally the response
/// tee. Closing takes the sink out, so later writes fail and a second close is
/// a no-op.
#[derive(Clone)]
pub struct SharedSink {
    inner: Arc<Mutex<Option<Sink>>>,
}

impl SharedSink {
    pub fn new(sink: Sink) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(sink))),
        }
    }

    pub fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        match self.lock()?.as_mut() {
            Some(sink) => sink.write_all(buf),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "dump sink already closed",
            )),
        }
    }

    /// Write `buf`, recording the failure inline when the write fails.
    pub fn write_or_note(&self, buf: &[u8]) {
        if let Err(e) = self.write_all(buf) {
            metrics::record_capture_write_error("head");
            tracing::warn!(error = %e, "Failed to write dump head");
            self.note(&e);
        }
    }

    /// Append a diagnostic line to the dump.
    pub fn note(&self, message: &dyn Display) {
        let text = format!("{}\r\n\r\n", message);
        if let Err(e) = self.write_all(text.as_bytes()) {
            tracing::warn!(error = %e, "Failed to record capture diagnostic");
        }
    }

    /// Flush and release the sink. Returns `false` when it was already closed.
    pub fn close(&self) -> io::Result<bool> {
        let sink = self.lock()?.take();
        match sink {
            Some(mut sink) => {
                sink.flush()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().map(|sink| sink.is_none()).unwrap_or(true)
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, Option<Sink>>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::other("dump sink lock poisoned"))
    }
}

/// Request body wrapper that copies every data frame into the head sink.
pub struct RequestTee {
    inner: DumpBody,
    sink: SharedSink,
}

impl RequestTee {
    pub fn new(inner: DumpBody, sink: SharedSink) -> Self {
        Self { inner, sink }
    }
}

impl Body for RequestTee {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        let frame = match ready!(Pin::new(&mut self.inner).poll_frame(cx)) {
            Some(Ok(frame)) => frame,
            other => return Poll::Ready(other),
        };

        if let Some(data) = frame.data_ref() {
            if let Err(e) = self.sink.write_all(data) {
                metrics::record_capture_write_error("request");
                tracing::warn!(error = %e, "Failed to tee request body");
                return Poll::Ready(Some(Err(CaptureError::Write(e).into())));
            }
        }
        Poll::Ready(Some(Ok(frame)))
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Lifecycle of a [`ResponseTee`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeeState {
    Open,
    Closing,
    Closed,
}

/// Response body wrapper that fans every data frame out to two sinks.
///
/// Owns both sinks. Either may be absent. They are closed on end of stream,
/// on a read error, or when the tee is dropped, whichever comes first.
pub struct ResponseTee {
    inner: DumpBody,
    head: Option<SharedSink>,
    body: Option<Sink>,
    state: TeeState,
}

impl ResponseTee {
    pub fn new(inner: DumpBody, head: Option<SharedSink>, body: Option<Sink>) -> Self {
        Self {
            inner,
            head,
            body,
            state: TeeState::Open,
        }
    }

    pub fn state(&self) -> TeeState {
        self.state
    }

    fn mirror(&mut self, data: &[u8]) {
        let head_failed = match &self.head {
            Some(head) => head.write_all(data).err(),
            None => None,
        };
        if let Some(e) = head_failed {
            metrics::record_capture_write_error("head");
            tracing::warn!(error = %e, "Failed to tee response body into dump, dropping head sink");
            if let Some(head) = self.head.take() {
                let _ = head.close();
            }
        }

        let body_failed = match self.body.as_mut() {
            Some(body) => body.write_all(data).err(),
            None => None,
        };
        if let Some(e) = body_failed {
            metrics::record_capture_write_error("body");
            tracing::warn!(error = %e, "Failed to tee response body into body dump, dropping body sink");
            self.body = None;
        }
    }

    /// Close both sinks. Idempotent.
    pub fn close(&mut self) {
        if self.state != TeeState::Open {
            return;
        }
        self.state = TeeState::Closing;

        if let Some(head) = self.head.take() {
            if let Err(e) = head.close() {
                tracing::warn!(error = %e, "Failed to close dump sink");
            }
        }
        if let Some(mut body) = self.body.take() {
            if let Err(e) = body.flush() {
                tracing::warn!(error = %e, "Failed to close body dump sink");
            }
        }

        self.state = TeeState::Closed;
    }
}

impl Body for ResponseTee {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        let this = self.get_mut();
        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.mirror(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(e)) => {
                tracing::debug!(error = %e, "Response body failed, closing capture");
                this.close();
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.close();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for ResponseTee {
    fn drop(&mut self) {
        self.close();
    }
}
