use crate::error::IterationFailure;
use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::Full;
use http_load_util::drain::DrainBodyFuture;
use http_load_util::empty_body;
use hyper::{Request, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

/// Status and drained body size of one exchange.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub bytes_received: usize,
}

/// Pooled plain-HTTP client. Cheap to clone, clones share the connection pool.
#[derive(Clone)]
pub struct HttpClient {
    client: Client<HttpConnector, Full<Bytes>>,
    request_timeout: Duration,
}

impl HttpClient {
    #[must_use]
    pub fn new(request_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.set_connect_timeout(Some(request_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            request_timeout,
        }
    }

    /// Sends `request` and drains the response body. The body is never inspected.
    pub async fn send_recv(&self, request: Request<Full<Bytes>>) -> Result<HttpResponse> {
        let resp = self
            .client
            .request(request)
            .await
            .context("Failed to send request")?;
        let status = resp.status();
        let bytes_received = DrainBodyFuture::new(resp.into_body())
            .await
            .context("Failed to drain response body")?;
        Ok(HttpResponse {
            status,
            bytes_received,
        })
    }

    /// `GET uri`, bounded by the client's request timeout.
    pub async fn get(&self, uri: &Uri) -> Result<HttpResponse, IterationFailure> {
        let request = Request::get(uri.clone())
            .body(empty_body())
            .context("Failed to build get")?;
        match tokio::time::timeout(self.request_timeout, self.send_recv(request)).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(e)) => Err(IterationFailure::Transport(e)),
            Err(_elapsed) => Err(IterationFailure::Timeout(self.request_timeout)),
        }
    }
}
