use hyper::StatusCode;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid scenario config: {0}")]
    InvalidConfig(&'static str),
    #[error("virtual user {vu} panicked")]
    WorkerPanicked { vu: usize },
}

/// Why a single iteration failed. Recorded in the summary; never stops the run.
#[derive(Debug, thiserror::Error)]
pub enum IterationFailure {
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0:#}")]
    Transport(anyhow::Error),
    #[error("{0:#}")]
    Other(anyhow::Error),
}

impl IterationFailure {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            IterationFailure::Status(_) => "status",
            IterationFailure::Timeout(_) => "timeout",
            IterationFailure::Transport(_) => "transport",
            IterationFailure::Other(_) => "other",
        }
    }
}

impl From<anyhow::Error> for IterationFailure {
    fn from(value: anyhow::Error) -> Self {
        IterationFailure::Other(value)
    }
}
