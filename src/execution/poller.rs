//! Condition poller - evaluates a condition set once per tick until a match or the deadline

use crate::core::{ConditionSet, ProbeExecutor, Verdict};
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

/// A condition that matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub verdict: Verdict,
    /// Position of the matching condition in its set
    pub condition_index: usize,
    /// Probe output the rule matched against
    pub output: String,
    /// Tick on which the match happened (1-based)
    pub ticks: u32,
}

/// Result of a polling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Matched(Resolution),
    /// The deadline passed before any condition matched
    Expired { ticks: u32 },
}

/// Runs the probes of a [`ConditionSet`] in a working directory
pub struct ConditionPoller<'a, P: ?Sized> {
    probes: &'a P,
    workdir: &'a Path,
}

impl<'a, P: ProbeExecutor + ?Sized> ConditionPoller<'a, P> {
    pub fn new(probes: &'a P, workdir: &'a Path) -> Self {
        Self { probes, workdir }
    }

    /// Evaluate every condition in order once; the first match wins
    pub async fn tick(&self, conditions: &ConditionSet, tick: u32) -> Option<Resolution> {
        for (index, condition) in conditions.iter().enumerate() {
            let output = match self.probes.run(condition.probe(), self.workdir).await {
                Ok(output) => output,
                Err(e) => {
                    // No verdict from a failed read; try again next tick
                    warn!("Probe [{}] failed: {}", condition.probe(), e);
                    continue;
                }
            };
            trace!("Probe [{}] returned {:?}", condition.probe(), output);

            if let Some(verdict) = condition.evaluate(&output) {
                debug!("Condition {} matched on tick {}", condition, tick);
                return Some(Resolution {
                    verdict,
                    condition_index: index,
                    output,
                    ticks: tick,
                });
            }
        }
        None
    }

    /// Tick until a condition matches or `deadline` passes.
    ///
    /// The deadline is checked before every tick, so a deadline already in the
    /// past resolves to [`PollOutcome::Expired`] without probing or sleeping.
    pub async fn poll(
        &self,
        conditions: &ConditionSet,
        interval: Duration,
        deadline: Instant,
    ) -> PollOutcome {
        let mut ticks = 0;
        loop {
            if Instant::now() >= deadline {
                return PollOutcome::Expired { ticks };
            }

            ticks += 1;
            if let Some(resolution) = self.tick(conditions, ticks).await {
                return PollOutcome::Matched(resolution);
            }

            sleep(interval).await;
        }
    }
}
