use crate::clock::StopReason;
use crate::error::IterationFailure;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// What a successful iteration reports back to its virtual user.
#[derive(Debug, Copy, Clone, Default)]
pub struct IterationOutcome {
    pub bytes_received: usize,
    pub request_rtt: Option<Duration>,
}

pub type IterationResult = Result<IterationOutcome, IterationFailure>;

/// Accumulated by one virtual user, handed back when it exits.
#[derive(Debug, Clone)]
pub struct VirtualUserStatistics {
    pub vu: usize,
    pub successes: u64,
    pub failures: BTreeMap<&'static str, u64>,
    pub bytes_received: u64,
    pub iteration_times: Vec<Duration>,
    pub request_rtts: Vec<Duration>,
}

impl VirtualUserStatistics {
    #[must_use]
    pub fn new(vu: usize) -> Self {
        Self {
            vu,
            successes: 0,
            failures: BTreeMap::new(),
            bytes_received: 0,
            iteration_times: Vec::new(),
            request_rtts: Vec::new(),
        }
    }

    pub fn record(&mut self, iteration_time: Duration, result: &IterationResult) {
        self.iteration_times.push(iteration_time);
        match result {
            Ok(outcome) => {
                self.successes += 1;
                self.bytes_received += outcome.bytes_received as u64;
                if let Some(rtt) = outcome.request_rtt {
                    self.request_rtts.push(rtt);
                }
            }
            Err(failure) => {
                *self.failures.entry(failure.kind()).or_default() += 1;
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.iteration_times.len() as u64
    }

    #[inline]
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failures.values().sum()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct LatencyStats {
    #[serde(serialize_with = "as_micros")]
    pub min: Duration,
    #[serde(serialize_with = "as_micros")]
    pub mean: Duration,
    #[serde(serialize_with = "as_micros")]
    pub p50: Duration,
    #[serde(serialize_with = "as_micros")]
    pub p90: Duration,
    #[serde(serialize_with = "as_micros")]
    pub p95: Duration,
    #[serde(serialize_with = "as_micros")]
    pub p99: Duration,
    #[serde(serialize_with = "as_micros")]
    pub max: Duration,
}

impl LatencyStats {
    /// `None` when there are no samples. Percentiles are nearest-rank.
    #[must_use]
    pub fn from_samples(mut samples: Vec<Duration>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        samples.sort_unstable();
        let total: Duration = samples.iter().sum();
        let len = samples.len();
        let mean_nanos = total.as_nanos() / len as u128;
        let rank = |p: f64| {
            let idx = ((p / 100.0) * len as f64).ceil() as usize;
            samples[idx.clamp(1, len) - 1]
        };
        Some(Self {
            min: samples[0],
            mean: Duration::from_nanos(u64::try_from(mean_nanos).unwrap_or(u64::MAX)),
            p50: rank(50.0),
            p90: rank(90.0),
            p95: rank(95.0),
            p99: rank(99.0),
            max: samples[len - 1],
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualUserSummary {
    pub vu: usize,
    pub iterations: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub virtual_users: usize,
    pub stop_reason: StopReason,
    #[serde(serialize_with = "as_micros")]
    pub elapsed: Duration,
    pub iterations: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub failures_by_kind: BTreeMap<&'static str, u64>,
    pub bytes_received: u64,
    pub iteration_duration: Option<LatencyStats>,
    pub request_duration: Option<LatencyStats>,
    pub per_vu: Vec<VirtualUserSummary>,
}

impl RunSummary {
    #[must_use]
    pub fn collect(
        stop_reason: StopReason,
        elapsed: Duration,
        mut per_vu: Vec<VirtualUserStatistics>,
    ) -> Self {
        per_vu.sort_by_key(|s| s.vu);
        let mut failures_by_kind = BTreeMap::new();
        let mut iteration_times = Vec::new();
        let mut request_rtts = Vec::new();
        let mut success_count = 0;
        let mut bytes_received = 0;
        let mut vu_summaries = Vec::with_capacity(per_vu.len());
        for stats in per_vu {
            vu_summaries.push(VirtualUserSummary {
                vu: stats.vu,
                iterations: stats.iterations(),
                failures: stats.failure_count(),
            });
            success_count += stats.successes;
            bytes_received += stats.bytes_received;
            for (kind, count) in stats.failures {
                *failures_by_kind.entry(kind).or_default() += count;
            }
            iteration_times.extend(stats.iteration_times);
            request_rtts.extend(stats.request_rtts);
        }
        let failure_count = failures_by_kind.values().sum();
        Self {
            virtual_users: vu_summaries.len(),
            stop_reason,
            elapsed,
            iterations: iteration_times.len() as u64,
            success_count,
            failure_count,
            failures_by_kind,
            bytes_received,
            iteration_duration: LatencyStats::from_samples(iteration_times),
            request_duration: LatencyStats::from_samples(request_rtts),
            per_vu: vu_summaries,
        }
    }

    #[must_use]
    pub fn iterations_per_second(&self) -> f64 {
        if self.elapsed.is_zero() {
            return 0.0;
        }
        self.iterations as f64 / self.elapsed.as_secs_f64()
    }
}

fn as_micros<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
}

fn write_latency(f: &mut fmt::Formatter<'_>, name: &str, stats: Option<&LatencyStats>) -> fmt::Result {
    match stats {
        Some(s) => writeln!(
            f,
            "    {name:<20} my s [min, mean, p50, p90, p95, p99, max] = [{}, {}, {}, {}, {}, {}, {}]",
            s.min.as_micros(),
            s.mean.as_micros(),
            s.p50.as_micros(),
            s.p90.as_micros(),
            s.p95.as_micros(),
            s.p99.as_micros(),
            s.max.as_micros()
        ),
        None => writeln!(f, "    {name:<20} no samples"),
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Results:")?;
        writeln!(
            f,
            "    virtual users        {} ({:?} after {:.2}s)",
            self.virtual_users,
            self.stop_reason,
            self.elapsed.as_secs_f64()
        )?;
        writeln!(
            f,
            "    iterations           {} ({:.2}/s)",
            self.iterations,
            self.iterations_per_second()
        )?;
        writeln!(
            f,
            "    checks               {} passed, {} failed",
            self.success_count, self.failure_count
        )?;
        for (kind, count) in &self.failures_by_kind {
            writeln!(f, "      {kind:<18} {count}")?;
        }
        writeln!(f, "    data received        {} B", self.bytes_received)?;
        write_latency(f, "iteration_duration", self.iteration_duration.as_ref())?;
        write_latency(f, "request_duration", self.request_duration.as_ref())
    }
}
