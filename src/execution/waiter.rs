//! Job waiter - a named, deadline-bounded wait on a condition set

use crate::core::{ConditionSet, ProbeExecutor};
use crate::execution::poller::{ConditionPoller, PollOutcome, Resolution};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

/// Horizon used when a wait has no deadline
pub const UNBOUNDED_HORIZON: Duration = Duration::from_secs(999 * 24 * 60 * 60);

/// When a wait gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deadline {
    /// Relative to the start of the wait
    After(Duration),
    /// Absolute point in time
    At(Instant),
    /// Effectively never ([`UNBOUNDED_HORIZON`])
    #[default]
    Unbounded,
}

impl Deadline {
    /// `After(d)` when a timeout is configured, `Unbounded` otherwise
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map(Deadline::After).unwrap_or_default()
    }

    /// Timeouts too large to represent fall back to the unbounded horizon
    fn resolve(&self, start: Instant) -> Instant {
        let unbounded = start + UNBOUNDED_HORIZON;
        match self {
            Deadline::After(duration) => start.checked_add(*duration).unwrap_or(unbounded),
            Deadline::At(instant) => *instant,
            Deadline::Unbounded => unbounded,
        }
    }
}

/// One wait phase: conditions, poll interval and deadline
#[derive(Debug, Clone)]
pub struct WaitSpec {
    pub conditions: ConditionSet,
    pub interval: Duration,
    pub deadline: Deadline,
}

impl WaitSpec {
    pub fn new(conditions: ConditionSet, interval: Duration) -> Self {
        Self {
            conditions,
            interval,
            deadline: Deadline::Unbounded,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.deadline = Deadline::from_timeout(timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WaitError {
    #[error("Timed out waiting for {purpose} after {}s ({ticks} checks)", .waited.as_secs())]
    TimedOut {
        purpose: String,
        waited: Duration,
        ticks: u32,
    },
}

/// Waits for a job through its on-disk artifacts
pub struct JobWaiter<'a, P: ?Sized> {
    purpose: String,
    probes: &'a P,
    workdir: &'a Path,
}

impl<'a, P: ProbeExecutor + ?Sized> JobWaiter<'a, P> {
    pub fn new(purpose: impl Into<String>, probes: &'a P, workdir: &'a Path) -> Self {
        Self {
            purpose: purpose.into(),
            probes,
            workdir,
        }
    }

    /// Block until a condition matches, or fail with [`WaitError::TimedOut`]
    pub async fn wait(&self, spec: &WaitSpec) -> Result<Resolution, WaitError> {
        let start = Instant::now();
        let deadline = spec.deadline.resolve(start);
        info!(
            "Waiting for {} (checking every {}s)",
            self.purpose,
            spec.interval.as_secs()
        );

        let poller = ConditionPoller::new(self.probes, self.workdir);
        match poller.poll(&spec.conditions, spec.interval, deadline).await {
            PollOutcome::Matched(resolution) => {
                info!(
                    "{} resolved {:?} after {} checks",
                    self.purpose, resolution.verdict, resolution.ticks
                );
                Ok(resolution)
            }
            PollOutcome::Expired { ticks } => {
                let waited = start.elapsed();
                warn!("Gave up waiting for {} after {}s", self.purpose, waited.as_secs());
                Err(WaitError::TimedOut {
                    purpose: self.purpose.clone(),
                    waited,
                    ticks,
                })
            }
        }
    }
}
