//! Synthetic target for load runs. `GET /?load=<seconds>` holds the request for a random time
//! between 0.8 and 1.4 times `load` and answers `OK <seconds slept>`. `GET /metrics` serves the
//! request counter and work-time histogram in Prometheus text format.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::routing::get;
use axum::Router;
use http_load_util::LoadQuery;
use prometheus::{Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use rand::Rng;
use std::time::Duration;
use tokio::net::TcpListener;

const LATENCY_BUCKETS: [f64; 8] = [0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0];

#[derive(Clone)]
pub struct TargetMetrics {
    registry: Registry,
    requests: IntCounter,
    latency: Histogram,
}

impl TargetMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let requests = IntCounter::new("demo_requests_total", "Total requests")?;
        let latency = Histogram::with_opts(
            HistogramOpts::new("demo_request_latency_seconds", "Request latency seconds")
                .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        Ok(Self {
            registry,
            requests,
            latency,
        })
    }

    pub fn encode(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

#[derive(Clone)]
pub struct TargetState {
    metrics: TargetMetrics,
    default_load: f64,
}

impl TargetState {
    pub fn new(default_load: f64) -> prometheus::Result<Self> {
        Ok(Self {
            metrics: TargetMetrics::new()?,
            default_load,
        })
    }

    /// Requests seen by the work endpoint, rejected ones included.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.metrics.requests.get()
    }
}

pub fn router(state: TargetState) -> Router {
    Router::new()
        .route("/", get(do_work))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: TargetState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Time to hold a request asking for `load` seconds of work, `None` when `load` is negative
/// or too large to sleep for.
pub fn work_time<R: Rng>(load: f64, rng: &mut R) -> Option<Duration> {
    let (low, high) = (load * 0.8, load * 1.4);
    if !low.is_finite() || !high.is_finite() || low < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(rng.gen_range(low..=high)).ok()
}

async fn do_work(
    State(state): State<TargetState>,
    Query(query): Query<LoadQuery>,
) -> Result<String, (StatusCode, &'static str)> {
    state.metrics.requests.inc();
    let load = query.load.unwrap_or(state.default_load);
    let t = {
        let mut rng = rand::thread_rng();
        work_time(load, &mut rng)
    };
    let Some(t) = t else {
        return Err((
            StatusCode::BAD_REQUEST,
            "load must be a non-negative number of seconds",
        ));
    };
    let timer = state.metrics.latency.start_timer();
    tokio::time::sleep(t).await;
    timer.observe_duration();
    Ok(format!("OK {:.3}", t.as_secs_f64()))
}

async fn get_metrics(
    State(state): State<TargetState>,
) -> Result<([(header::HeaderName, &'static str); 1], String), (StatusCode, String)> {
    let body = state
        .metrics
        .encode()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}
