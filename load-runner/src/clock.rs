//! Run-scoped clock and stop flag.
//!
//! Both live inside a [`RunState`] that `scheduler::start` creates and drops once the run has
//! drained. Workers only ever see a [`StopObserver`], which can read the flag but not set it.

use serde::Serialize;
use std::pin::pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

const RUNNING: u8 = 0;
const EXPIRED: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The configured duration elapsed.
    Expired,
    /// Someone outside the run asked it to stop.
    Cancelled,
}

impl StopReason {
    #[inline]
    fn as_raw(self) -> u8 {
        match self {
            StopReason::Expired => EXPIRED,
            StopReason::Cancelled => CANCELLED,
        }
    }

    #[inline]
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            EXPIRED => Some(StopReason::Expired),
            CANCELLED => Some(StopReason::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct RunClock {
    started_at: Instant,
}

impl RunClock {
    #[must_use]
    pub fn start() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    #[inline]
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Set-once stop flag. The first [`StopSignal::fire`] wins and its reason sticks.
#[derive(Debug, Default)]
pub struct StopSignal {
    state: AtomicU8,
    notify: Notify,
}

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this call was the one that set the flag.
    pub fn fire(&self, reason: StopReason) -> bool {
        let won = self
            .state
            .compare_exchange(RUNNING, reason.as_raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.notify.notify_waiters();
        }
        won
    }

    #[inline]
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.state.load(Ordering::Acquire) != RUNNING
    }

    #[inline]
    #[must_use]
    pub fn reason(&self) -> Option<StopReason> {
        StopReason::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Resolves once the flag is set, immediately if it already is.
    pub async fn fired(&self) -> StopReason {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            if let Some(reason) = self.reason() {
                return reason;
            }
            notified.await;
        }
    }
}

/// Clock and stop flag for one run.
#[derive(Debug)]
pub struct RunState {
    clock: RunClock,
    stop: StopSignal,
}

impl RunState {
    #[must_use]
    pub fn begin() -> Arc<Self> {
        Arc::new(Self {
            clock: RunClock::start(),
            stop: StopSignal::new(),
        })
    }

    #[inline]
    #[must_use]
    pub fn clock(&self) -> &RunClock {
        &self.clock
    }

    #[inline]
    #[must_use]
    pub fn stop(&self) -> &StopSignal {
        &self.stop
    }

    #[must_use]
    pub fn observer(self: &Arc<Self>) -> StopObserver {
        StopObserver {
            state: Arc::clone(self),
        }
    }
}

/// Read-only view handed to virtual users.
#[derive(Debug, Clone)]
pub struct StopObserver {
    state: Arc<RunState>,
}

impl StopObserver {
    #[inline]
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.state.stop.is_set()
    }

    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.state.clock.elapsed()
    }
}
