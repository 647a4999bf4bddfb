//! Outgoing HTTP client used by the recorder.

use futures_util::future::BoxFuture;
use http::{Request, Response};
use http_body_util::BodyExt;
use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use hyper_util::client::legacy::{Client, Error};
use hyper_util::rt::TokioExecutor;

use crate::capture::{BoxError, DumpBody, Transport};

/// Plain-HTTP client whose bodies can pass through a [`crate::capture::Recorder`].
pub type HttpClient = Client<HttpConnector, DumpBody>;

pub fn build() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

impl<C> Transport for Client<C, DumpBody>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    type Error = Error;

    fn send(&self, request: Request<DumpBody>) -> BoxFuture<'_, Result<Response<DumpBody>, Error>> {
        let response = self.request(request);
        Box::pin(async move {
            let response = response.await?;
            Ok(response.map(|body| body.map_err(BoxError::from).boxed_unsync()))
        })
    }
}
