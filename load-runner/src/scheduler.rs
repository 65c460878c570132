//! Constant-concurrency, duration-bounded virtual user scheduler.
//!
//! [`start`] spawns one task per virtual user plus a single arbiter task. Every virtual user
//! runs the scenario's [`Iteration`] back to back and checks the stop flag before each pass.
//! The arbiter compares the run clock to the configured duration on a fixed cadence and sets
//! the flag once; [`RunHandle::cancel`] sets the same flag early. An iteration that is already
//! running is always allowed to finish.

use crate::clock::{RunState, StopObserver, StopReason};
use crate::error::SchedulerError;
use crate::statistics::{IterationResult, RunSummary, VirtualUserStatistics};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The body each virtual user runs once per loop pass. Implemented for any
/// `Fn(usize) -> impl Future<Output = IterationResult>`, the argument being the virtual user's
/// index.
pub trait Iteration: Send + Sync + 'static {
    fn run(&self, vu: usize) -> impl Future<Output = IterationResult> + Send;
}

impl<F, Fut> Iteration for F
where
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = IterationResult> + Send,
{
    #[inline]
    fn run(&self, vu: usize) -> impl Future<Output = IterationResult> + Send {
        self(vu)
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioConfig<I> {
    pub virtual_users: usize,
    pub duration: Duration,
    /// How often the arbiter checks the clock.
    pub poll_interval: Duration,
    pub iteration: I,
}

impl<I> ScenarioConfig<I>
where
    I: Iteration,
{
    #[must_use]
    pub fn new(virtual_users: usize, duration: Duration, iteration: I) -> Self {
        Self {
            virtual_users,
            duration,
            poll_interval: DEFAULT_POLL_INTERVAL,
            iteration,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn validate(&self) -> Result<(), SchedulerError> {
        if self.virtual_users == 0 {
            return Err(SchedulerError::InvalidConfig(
                "virtual user count must be positive",
            ));
        }
        if self.duration.is_zero() {
            return Err(SchedulerError::InvalidConfig("duration must be positive"));
        }
        if self.poll_interval.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "poll interval must be positive",
            ));
        }
        Ok(())
    }
}

/// Stops a run from outside. Does nothing once the run has completed.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    state: Weak<RunState>,
}

impl CancelHandle {
    /// Returns `true` if this call stopped the run.
    pub fn cancel(&self) -> bool {
        let Some(state) = self.state.upgrade() else {
            return false;
        };
        let fired = state.stop().fire(StopReason::Cancelled);
        if fired {
            tracing::info!(
                elapsed = ?state.clock().elapsed(),
                "run cancelled, draining virtual users"
            );
        }
        fired
    }
}

pub struct RunHandle {
    state: Arc<RunState>,
    workers: Vec<JoinHandle<VirtualUserStatistics>>,
    arbiter: JoinHandle<()>,
}

impl RunHandle {
    pub fn cancel(&self) -> bool {
        self.cancel_handle().cancel()
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::downgrade(&self.state),
        }
    }

    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.state.stop().is_set()
    }

    /// Waits for every virtual user to observe the stop flag and finish its last iteration.
    pub async fn await_completion(self) -> Result<RunSummary, SchedulerError> {
        let mut per_vu = Vec::with_capacity(self.workers.len());
        let mut panicked = None;
        for (vu, worker) in self.workers.into_iter().enumerate() {
            match worker.await {
                Ok(stats) => per_vu.push(stats),
                Err(e) => {
                    tracing::error!(vu, error = %e, "virtual user task failed");
                    panicked.get_or_insert(vu);
                }
            }
        }
        if let Some(vu) = panicked {
            self.state.stop().fire(StopReason::Cancelled);
            let _ = self.arbiter.await;
            return Err(SchedulerError::WorkerPanicked { vu });
        }
        // Workers only exit once the flag is set, so this resolves immediately.
        let reason = self.state.stop().fired().await;
        if let Err(e) = self.arbiter.await {
            tracing::warn!(error = %e, "stop arbiter task failed");
        }
        let elapsed = self.state.clock().elapsed();
        let summary = RunSummary::collect(reason, elapsed, per_vu);
        tracing::info!(
            ?reason,
            ?elapsed,
            iterations = summary.iterations,
            failures = summary.failure_count,
            "run complete"
        );
        Ok(summary)
    }
}

/// Validates `config` and starts the run. Must be called from inside a tokio runtime.
pub fn start<I>(config: ScenarioConfig<I>) -> Result<RunHandle, SchedulerError>
where
    I: Iteration,
{
    config.validate()?;
    let ScenarioConfig {
        virtual_users,
        duration,
        poll_interval,
        iteration,
    } = config;
    let state = RunState::begin();
    tracing::info!(virtual_users, ?duration, "starting run");
    let iteration = Arc::new(iteration);
    let mut workers = Vec::with_capacity(virtual_users);
    for vu in 0..virtual_users {
        workers.push(tokio::spawn(virtual_user(
            vu,
            Arc::clone(&iteration),
            state.observer(),
        )));
    }
    let arbiter = tokio::spawn(arbitrate(Arc::clone(&state), duration, poll_interval));
    Ok(RunHandle {
        state,
        workers,
        arbiter,
    })
}

/// [`start`] followed by [`RunHandle::await_completion`].
pub async fn run<I>(config: ScenarioConfig<I>) -> Result<RunSummary, SchedulerError>
where
    I: Iteration,
{
    start(config)?.await_completion().await
}

async fn virtual_user<I>(
    vu: usize,
    iteration: Arc<I>,
    stop: StopObserver,
) -> VirtualUserStatistics
where
    I: Iteration,
{
    let mut stats = VirtualUserStatistics::new(vu);
    while !stop.should_stop() {
        let started = Instant::now();
        let result = iteration.run(vu).await;
        let took = started.elapsed();
        if let Err(e) = &result {
            tracing::debug!(vu, iteration = stats.iterations(), error = %e, "iteration failed");
        }
        stats.record(took, &result);
        // An iteration that never suspends must not starve the arbiter.
        tokio::task::yield_now().await;
    }
    tracing::debug!(
        vu,
        iterations = stats.iterations(),
        elapsed = ?stop.elapsed(),
        "virtual user drained"
    );
    stats
}

async fn arbitrate(state: Arc<RunState>, duration: Duration, poll_interval: Duration) {
    let mut ticker = tokio::time::interval_at(state.clock().started_at(), poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if state.clock().elapsed() >= duration {
                    if state.stop().fire(StopReason::Expired) {
                        tracing::info!(?duration, "duration reached, draining virtual users");
                    }
                    return;
                }
            }
            reason = state.stop().fired() => {
                tracing::debug!(?reason, "arbiter observed stop");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IterationFailure;
    use crate::statistics::IterationOutcome;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ok() -> IterationResult {
        Ok(IterationOutcome::default())
    }

    fn sleeper(pause: Duration) -> impl Iteration {
        move |_vu: usize| async move {
            tokio::time::sleep(pause).await;
            ok()
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let zero_vus = ScenarioConfig::new(0, Duration::from_secs(1), sleeper(Duration::ZERO));
        assert!(matches!(
            start(zero_vus),
            Err(SchedulerError::InvalidConfig(_))
        ));
        let zero_duration = ScenarioConfig::new(1, Duration::ZERO, sleeper(Duration::ZERO));
        assert!(matches!(
            start(zero_duration),
            Err(SchedulerError::InvalidConfig(_))
        ));
        let zero_poll = ScenarioConfig::new(1, Duration::from_secs(1), sleeper(Duration::ZERO))
            .with_poll_interval(Duration::ZERO);
        assert!(matches!(
            start(zero_poll),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn ten_users_two_minutes() {
        let duration = Duration::from_secs(120);
        let config = ScenarioConfig::new(10, duration, sleeper(Duration::from_secs(1)));
        let summary = run(config).await.unwrap();

        assert_eq!(StopReason::Expired, summary.stop_reason);
        assert_eq!(10, summary.virtual_users);
        assert!(summary.elapsed >= duration);
        assert!(summary.elapsed <= duration + DEFAULT_POLL_INTERVAL + Duration::from_secs(1));
        for vu in &summary.per_vu {
            assert!(
                (120..=121).contains(&vu.iterations),
                "vu {} ran {} iterations",
                vu.vu,
                vu.iterations
            );
        }
        assert!((1200..=1210).contains(&summary.iterations));
        assert_eq!(summary.iterations, summary.success_count);
    }

    #[tokio::test(start_paused = true)]
    async fn every_user_stays_active_for_the_whole_run() {
        let active = Arc::new(AtomicUsize::new(0));
        let iteration = {
            let active = Arc::clone(&active);
            move |_vu: usize| {
                let active = Arc::clone(&active);
                async move {
                    active.fetch_add(1, Ordering::AcqRel);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    active.fetch_sub(1, Ordering::AcqRel);
                    ok()
                }
            }
        };
        let handle = start(ScenarioConfig::new(7, Duration::from_secs(20), iteration)).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        for _ in 0..18 {
            assert_eq!(7, active.load(Ordering::Acquire));
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        handle.await_completion().await.unwrap();
        assert_eq!(0, active.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_iterations_still_complete() {
        let iteration = |_vu: usize| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let failed: IterationResult = Err(IterationFailure::Timeout(Duration::from_secs(1)));
            failed
        };
        let summary = run(ScenarioConfig::new(3, Duration::from_secs(10), iteration))
            .await
            .unwrap();
        assert_eq!(0, summary.success_count);
        assert_eq!(summary.iterations, summary.failure_count);
        assert!(summary.failure_count >= 30);
        assert_eq!(
            Some(&summary.failure_count),
            summary.failures_by_kind.get("timeout")
        );
        assert!(summary.request_duration.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_early() {
        let config = ScenarioConfig::new(10, Duration::from_secs(120), sleeper(Duration::from_secs(1)));
        let handle = start(config).unwrap();
        let cancel = handle.cancel_handle();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!handle.is_stopping());
        assert!(cancel.cancel());
        assert!(!handle.cancel());
        assert!(handle.is_stopping());

        let summary = handle.await_completion().await.unwrap();
        assert_eq!(StopReason::Cancelled, summary.stop_reason);
        assert!(summary.elapsed >= Duration::from_secs(30));
        assert!(summary.elapsed <= Duration::from_secs(31));
        for vu in &summary.per_vu {
            assert!((30..=31).contains(&vu.iterations));
        }
        // Run state is gone once the run has drained.
        assert!(!cancel.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_iteration_is_not_interrupted() {
        let finished = Arc::new(AtomicUsize::new(0));
        let iteration = {
            let finished = Arc::clone(&finished);
            move |_vu: usize| {
                let finished = Arc::clone(&finished);
                async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    finished.fetch_add(1, Ordering::AcqRel);
                    ok()
                }
            }
        };
        let summary = run(ScenarioConfig::new(2, Duration::from_secs(7), iteration))
            .await
            .unwrap();
        // Second pass starts at 5s and is allowed to end at 10s.
        assert_eq!(Duration::from_secs(10), summary.elapsed);
        assert_eq!(4, summary.iterations);
        assert_eq!(4, finished.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn panicking_user_reports_error_after_drain() {
        let iteration = |vu: usize| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert_ne!(vu, 1, "boom");
            ok()
        };
        let res = run(
            ScenarioConfig::new(3, Duration::from_millis(50), iteration)
                .with_poll_interval(Duration::from_millis(10)),
        )
        .await;
        assert!(matches!(res, Err(SchedulerError::WorkerPanicked { vu: 1 })));
    }
}
