use crate::client::HttpClient;
use crate::scenario::HttpIteration;
use crate::scheduler::ScenarioConfig;
use anyhow::{bail, Context};
use clap::Parser;
use http_load_util::{LoadQuery, DEFAULT_LOAD};
use hyper::Uri;
use std::path::PathBuf;
use std::time::Duration;

/// Runs a fixed number of virtual users against `<url>/?load=<load>` for a fixed duration.
#[derive(Debug, Clone, Parser)]
#[command(name = "load-runner", version)]
pub struct RunnerArgs {
    /// Number of concurrent virtual users.
    #[arg(long, env = "LOAD_VUS", default_value_t = 10)]
    pub vus: usize,

    /// How long the run lasts, e.g. `2m`, `90s`.
    #[arg(long, env = "LOAD_DURATION", default_value = "2m", value_parser = humantime::parse_duration)]
    pub duration: Duration,

    /// Base URL of the target service. Plain `http` only.
    #[arg(long, env = "TARGET_URL", default_value = "http://127.0.0.1:5000")]
    pub url: String,

    /// Synthetic work per request, in seconds, sent as the `load` query parameter.
    #[arg(long, env = "LOAD", default_value_t = DEFAULT_LOAD)]
    pub load: f64,

    /// Pause after each request.
    #[arg(long, env = "LOAD_THINK_TIME", default_value = "1s", value_parser = humantime::parse_duration)]
    pub think_time: Duration,

    /// How often the run clock is checked against the duration.
    #[arg(long, env = "LOAD_POLL_INTERVAL", default_value = "100ms", value_parser = humantime::parse_duration)]
    pub poll_interval: Duration,

    /// Per-request timeout; a request exceeding it counts as a failed iteration.
    #[arg(long, env = "LOAD_REQUEST_TIMEOUT", default_value = "60s", value_parser = humantime::parse_duration)]
    pub request_timeout: Duration,

    /// Also write the run summary as JSON to this path.
    #[arg(long, env = "LOAD_SUMMARY_JSON")]
    pub summary_json: Option<PathBuf>,
}

impl RunnerArgs {
    pub fn target(&self) -> anyhow::Result<Uri> {
        let raw = &self.url;
        if raw.contains('#') {
            bail!("Target url {raw} must not carry a fragment");
        }
        let base: Uri = raw
            .parse()
            .with_context(|| format!("Invalid target url {raw}"))?;
        if base.scheme_str() != Some("http") {
            bail!("Target url {raw} must use plain http");
        }
        if base.host().is_none() {
            bail!("Target url {raw} has no host");
        }
        LoadQuery::new(self.load)
            .to_uri(&base)
            .with_context(|| format!("Target url {raw} must not carry a query, `load` is added"))
    }

    pub fn scenario(&self) -> anyhow::Result<ScenarioConfig<HttpIteration>> {
        if !self.load.is_finite() || self.load < 0.0 {
            bail!("Load must be a non-negative number, got {}", self.load);
        }
        let iteration = HttpIteration::new(
            HttpClient::new(self.request_timeout),
            self.target()?,
            self.think_time,
        );
        Ok(ScenarioConfig::new(self.vus, self.duration, iteration)
            .with_poll_interval(self.poll_interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_match_reference_scenario() {
        let args = RunnerArgs::try_parse_from(["load-runner"]).unwrap();
        let scenario = args.scenario().unwrap();
        assert_eq!(10, scenario.virtual_users);
        assert_eq!(Duration::from_secs(120), scenario.duration);
        assert_eq!(Duration::from_millis(100), scenario.poll_interval);
        assert_eq!(
            "http://127.0.0.1:5000/?load=0.05",
            scenario.iteration.target().to_string()
        );
    }

    #[test]
    fn parses_overrides() {
        let args = RunnerArgs::try_parse_from([
            "load-runner",
            "--vus",
            "3",
            "--duration",
            "90s",
            "--url",
            "http://demo.local:8080/",
            "--load",
            "0.2",
            "--think-time",
            "250ms",
            "--summary-json",
            "out.json",
        ])
        .unwrap();
        assert_eq!(3, args.vus);
        assert_eq!(Duration::from_secs(90), args.duration);
        assert_eq!(Duration::from_millis(250), args.think_time);
        assert_eq!(Some(PathBuf::from("out.json")), args.summary_json);
        assert_eq!(
            "http://demo.local:8080/?load=0.2",
            args.target().unwrap().to_string()
        );
    }

    #[tokio::test]
    async fn rejects_bad_targets() {
        let https = RunnerArgs::try_parse_from(["load-runner", "--url", "https://example.com"])
            .unwrap();
        assert!(https.target().is_err());
        let query = RunnerArgs::try_parse_from(["load-runner", "--url", "http://h:5000/?x=1"])
            .unwrap();
        assert!(query.target().is_err());
        let fragment = RunnerArgs::try_parse_from(["load-runner", "--url", "http://h:5000/#top"])
            .unwrap();
        assert!(fragment.target().is_err());
        let negative = RunnerArgs::try_parse_from(["load-runner", "--load=-1"]).unwrap();
        assert!(negative.scenario().is_err());
        assert!(RunnerArgs::try_parse_from(["load-runner", "--duration", "soon"]).is_err());
    }
}
