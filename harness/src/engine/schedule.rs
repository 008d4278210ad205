//! Rate and ramp scheduling
//!
//! A schedule is a pure function of elapsed run time; it owns no clock. The
//! dispatcher asks "when does arrival `i` happen" or "what is the target
//! concurrency at `t`" and does the waiting itself. Keeping the arithmetic
//! out of the timing loop is what lets arrival cadence hold steady no matter
//! how long individual iterations take.

use crate::config::{Interpolation, Stage};
use std::time::Duration;

/// Arrival instants for constant-arrival-rate mode: `t_i = i / rate` for as
/// long as `t_i` falls inside the run.
#[derive(Debug, Clone)]
pub struct ArrivalSchedule {
    rate_per_second: f64,
    duration: Duration,
}

impl ArrivalSchedule {
    pub fn new(rate_per_second: f64, duration: Duration) -> Self {
        Self {
            rate_per_second,
            duration,
        }
    }

    /// Arrival instant of iteration `index`, or `None` once past the end of
    /// the run. Computed from the index rather than by repeated addition so
    /// long runs accumulate no drift.
    pub fn arrival(&self, index: u64) -> Option<Duration> {
        let at = Duration::from_secs_f64(index as f64 / self.rate_per_second);
        (at < self.duration).then_some(at)
    }

    /// Number of instants the schedule will emit.
    pub fn expected_total(&self) -> u64 {
        (self.rate_per_second * self.duration.as_secs_f64()).ceil() as u64
    }
}

/// Piecewise concurrency target for staged mode.
#[derive(Debug, Clone)]
pub struct RampSchedule {
    stages: Vec<Stage>,
    interpolation: Interpolation,
}

impl RampSchedule {
    pub fn new(stages: Vec<Stage>, interpolation: Interpolation) -> Self {
        Self {
            stages,
            interpolation,
        }
    }

    /// Target concurrency at `elapsed`, or `None` past the final stage.
    ///
    /// Linear interpolation ramps from the previous stage's target (zero
    /// before the first stage); step interpolation holds the stage target
    /// for the whole stage.
    pub fn target_at(&self, elapsed: Duration) -> Option<usize> {
        let mut stage_start = Duration::ZERO;
        let mut previous_target = 0usize;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                return Some(match self.interpolation {
                    Interpolation::Step => stage.target_concurrency,
                    Interpolation::Linear => {
                        let progress = (elapsed - stage_start).as_secs_f64()
                            / stage.duration.as_secs_f64();
                        let from = previous_target as f64;
                        let to = stage.target_concurrency as f64;
                        (from + (to - from) * progress).round() as usize
                    }
                });
            }
            stage_start = stage_end;
            previous_target = stage.target_concurrency;
        }

        None
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }
}
