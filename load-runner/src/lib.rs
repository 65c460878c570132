pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod scenario;
pub mod scheduler;
pub mod statistics;

pub use clock::StopReason;
pub use error::{IterationFailure, SchedulerError};
pub use scheduler::{run, start, CancelHandle, Iteration, RunHandle, ScenarioConfig};
pub use statistics::{IterationOutcome, IterationResult, RunSummary};
