//! The load scenario itself: every pass issues one `GET <target>/?load=<x>` and then pauses.

use crate::client::HttpClient;
use crate::error::IterationFailure;
use crate::scheduler::Iteration;
use crate::statistics::{IterationOutcome, IterationResult};
use hyper::Uri;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_THINK_TIME: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct HttpIteration {
    client: HttpClient,
    target: Uri,
    think_time: Duration,
}

impl HttpIteration {
    #[must_use]
    pub fn new(client: HttpClient, target: Uri, think_time: Duration) -> Self {
        Self {
            client,
            target,
            think_time,
        }
    }

    #[inline]
    #[must_use]
    pub fn target(&self) -> &Uri {
        &self.target
    }

    async fn request(&self) -> IterationResult {
        let (rtt, resp) = run_timed(self.client.get(&self.target)).await;
        let resp = resp?;
        if !resp.status.is_success() {
            return Err(IterationFailure::Status(resp.status));
        }
        Ok(IterationOutcome {
            bytes_received: resp.bytes_received,
            request_rtt: Some(rtt),
        })
    }
}

impl Iteration for HttpIteration {
    async fn run(&self, _vu: usize) -> IterationResult {
        let res = self.request().await;
        // Pause even when the request failed.
        tokio::time::sleep(self.think_time).await;
        res
    }
}

#[inline]
async fn run_timed<T, F: Future<Output = T>>(fut: F) -> (Duration, T) {
    let start = Instant::now();
    let res = fut.await;
    (start.elapsed(), res)
}
