//! The capture interceptor.
//!
//! # Responsibilities
//! - Wrap one outgoing request execution without changing its outcome
//! - Dump the request head, tee the request body, dump the response head
//! - Hand the response back with a body that tees into both sinks
//!
//! # Design Decisions
//! - The sink provider is an explicit value owned by the [`Recorder`], so
//!   independently configured recorders can coexist and tests stay isolated
//! - Capture failures never replace the transport's real result
//! - The head sink is guarded until ownership moves into the response tee,
//!   so every exit path (including a cancelled call) closes it

use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{Request, Response};
use http_body_util::BodyExt;
use hyper::body::Body;

use super::sink::SinkProvider;
use super::tee::{RequestTee, ResponseTee, SharedSink};
use super::{BoxError, DumpBody};
use crate::dump::writer;
use crate::observability::metrics;

/// Something that can execute an HTTP request.
pub trait Transport: Send + Sync {
    type Error: Display + Send + 'static;

    fn send(
        &self,
        request: Request<DumpBody>,
    ) -> BoxFuture<'_, Result<Response<DumpBody>, Self::Error>>;
}

/// Executes requests through a [`Transport`], dumping each exchange.
#[derive(Clone, Default)]
pub struct Recorder {
    provider: Option<Arc<dyn SinkProvider>>,
}

impl Recorder {
    /// A recorder that dumps through `provider`.
    pub fn new(provider: impl SinkProvider + 'static) -> Self {
        Self::from_shared(Arc::new(provider))
    }

    pub fn from_shared(provider: Arc<dyn SinkProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// A recorder that calls straight through.
    pub fn disabled() -> Self {
        Self { provider: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Execute `request` on `client`, capturing the exchange when enabled.
    ///
    /// Returns exactly what the transport returned; the response body (when
    /// there is one) streams into the dump as the caller reads it.
    pub async fn execute<T, B>(
        &self,
        client: &T,
        request: Request<B>,
    ) -> Result<Response<DumpBody>, T::Error>
    where
        T: Transport + ?Sized,
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let request: Request<DumpBody> = request.map(|body| body.map_err(Into::into).boxed_unsync());

        let Some(provider) = self.provider.as_deref() else {
            return client.send(request).await;
        };

        let head = match provider.exchange_sink() {
            Ok(sink) => HeadGuard::new(SharedSink::new(sink)),
            Err(e) => {
                metrics::record_capture("unavailable");
                tracing::warn!(error = %e, "Failed to allocate dump sink, exchange not captured");
                return client.send(request).await;
            }
        };

        let path = request.uri().path().to_string();
        let (parts, body) = request.into_parts();
        head.sink().write_or_note(&writer::request_head(&parts));

        let body = if body.is_end_stream() {
            body
        } else {
            RequestTee::new(body, head.sink().clone()).boxed_unsync()
        };

        let response = match client.send(Request::from_parts(parts, body)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "Captured request failed");
                head.sink().note(&e);
                metrics::record_capture("transport_error");
                return Err(e);
            }
        };

        let (parts, body) = response.into_parts();
        head.sink().write_or_note(&writer::response_head(&parts));
        metrics::record_capture("ok");

        if body.is_end_stream() {
            return Ok(Response::from_parts(parts, body));
        }

        let body_sink = match provider.body_sink(&path) {
            Ok(sink) => Some(sink),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Failed to allocate body dump sink");
                None
            }
        };

        let tee = ResponseTee::new(body, Some(head.release()), body_sink);
        Ok(Response::from_parts(parts, tee.boxed_unsync()))
    }
}

/// Closes the head sink on drop unless it was released to a response tee.
struct HeadGuard {
    sink: SharedSink,
    armed: bool,
}

impl HeadGuard {
    fn new(sink: SharedSink) -> Self {
        Self { sink, armed: true }
    }

    fn sink(&self) -> &SharedSink {
        &self.sink
    }

    fn release(mut self) -> SharedSink {
        self.armed = false;
        self.sink.clone()
    }
}

impl Drop for HeadGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.sink.close() {
            tracing::warn!(error = %e, "Failed to close dump sink");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::sink::MemorySinkProvider;
    use crate::dump;
    use futures_util::stream;
    use http::StatusCode;
    use http_body_util::{Empty, Full, StreamBody};
    use hyper::body::Frame;

    fn stream_body(chunks: &[&'static str]) -> DumpBody {
        let frames = chunks
            .iter()
            .map(|chunk| Ok::<_, BoxError>(Frame::data(Bytes::from_static(chunk.as_bytes()))))
            .collect::<Vec<_>>();
        StreamBody::new(stream::iter(frames)).boxed_unsync()
    }

    /// Drains the request body, then answers with a chunked response.
    struct MockTransport {
        chunks: Vec<&'static str>,
    }

    impl Transport for MockTransport {
        type Error = BoxError;

        fn send(
            &self,
            request: Request<DumpBody>,
        ) -> BoxFuture<'_, Result<Response<DumpBody>, BoxError>> {
            Box::pin(async move {
                let received = request.into_body().collect().await?.to_bytes();
                let body = if self.chunks.is_empty() {
                    Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
                } else {
                    stream_body(&self.chunks)
                };
                let response = Response::builder()
                    .status(StatusCode::OK)
                    .header("content-type", "application/json")
                    .header("x-received", received.len())
                    .body(body)?;
                Ok(response)
            })
        }
    }

    struct FailingTransport;

    impl Transport for FailingTransport {
        type Error = BoxError;

        fn send(
            &self,
            _request: Request<DumpBody>,
        ) -> BoxFuture<'_, Result<Response<DumpBody>, BoxError>> {
            Box::pin(async { Err(BoxError::from("connection refused")) })
        }
    }

    fn post(body: DumpBody) -> Request<DumpBody> {
        Request::post("http://www.abc.com/rest/")
            .body(body)
            .unwrap()
    }

    #[tokio::test]
    async fn test_disabled_recorder_is_transparent() {
        let recorder = Recorder::disabled();
        let transport = MockTransport { chunks: vec!["{}"] };

        let request = Request::get("http://www.abc.com/api").body(Empty::<Bytes>::new()).unwrap();
        let response = recorder.execute(&transport, request).await.unwrap();

        assert!(!recorder.is_enabled());
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), b"{}");
    }

    #[tokio::test]
    async fn test_captures_both_sides_exactly() {
        let provider = MemorySinkProvider::new();
        let recorder = Recorder::new(provider.clone());
        let transport = MockTransport {
            chunks: vec!["{\"status", "_code\":200,", "\"error_code\":0}"],
        };

        let response = recorder
            .execute(&transport, post(stream_body(&["[28", "14]"])))
            .await
            .unwrap();
        assert_eq!(response.headers()["x-received"], "6");
        let body = response.into_body().collect().await.unwrap().to_bytes();

        let expected_body = b"{\"status_code\":200,\"error_code\":0}";
        assert_eq!(body.as_ref(), expected_body);
        assert_eq!(provider.body("/rest/").unwrap(), expected_body);
        assert_eq!(provider.closed_count(), 2);

        let head = provider.exchange(1).unwrap();
        assert_eq!(
            String::from_utf8(head.clone()).unwrap(),
            "POST /rest/ HTTP/1.1\r\nHost: www.abc.com\r\n\r\n[2814]\
             HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nX-Received: 6\r\n\r\n\
             {\"status_code\":200,\"error_code\":0}"
        );

        let (request, response) = dump::parse(&head).unwrap();
        assert_eq!(request.body().as_ref(), b"[2814]");
        assert_eq!(response.body().as_ref(), expected_body);
    }

    #[tokio::test]
    async fn test_transport_error_is_recorded_and_returned() {
        let provider = MemorySinkProvider::new();
        let recorder = Recorder::new(provider.clone());

        let request = post(Full::new(Bytes::from_static(b"[1]")).map_err(|never| match never {}).boxed_unsync());
        let err = recorder.execute(&FailingTransport, request).await.unwrap_err();

        assert_eq!(err.to_string(), "connection refused");
        assert_eq!(provider.closed_count(), 1);
        let head = String::from_utf8(provider.exchange(1).unwrap()).unwrap();
        assert!(head.starts_with("POST /rest/ HTTP/1.1\r\n"));
        assert!(head.ends_with("connection refused\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_empty_response_closes_head_immediately() {
        let provider = MemorySinkProvider::new();
        let recorder = Recorder::new(provider.clone());
        let transport = MockTransport { chunks: Vec::new() };

        let request = Request::delete("http://www.abc.com/items/1").body(Empty::<Bytes>::new()).unwrap();
        let response = recorder.execute(&transport, request).await.unwrap();

        assert_eq!(provider.closed_count(), 1);
        assert!(provider.body("/items/1").is_none());
        assert!(response.body().is_end_stream());
    }

    #[tokio::test]
    async fn test_body_sink_failure_keeps_response_intact() {
        let provider = MemorySinkProvider::new();
        provider.fail_body_sinks();
        let recorder = Recorder::new(provider.clone());
        let transport = MockTransport { chunks: vec!["a", "b", "c"] };

        let request = Request::get("http://www.abc.com/abc").body(Empty::<Bytes>::new()).unwrap();
        let response = recorder.execute(&transport, request).await.unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        assert_eq!(body.as_ref(), b"abc");
        assert!(provider.exchange(1).unwrap().ends_with(b"\r\n\r\nabc"));
        assert_eq!(provider.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_unread_response_still_closes_sinks() {
        let provider = MemorySinkProvider::new();
        let recorder = Recorder::new(provider.clone());
        let transport = MockTransport { chunks: vec!["ignored"] };

        let request = Request::get("http://www.abc.com/x").body(Empty::<Bytes>::new()).unwrap();
        let response = recorder.execute(&transport, request).await.unwrap();
        assert_eq!(provider.closed_count(), 0);

        drop(response);
        assert_eq!(provider.closed_count(), 2);
    }
}
