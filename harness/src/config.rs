//! Scenario configuration
//!
//! A scenario is validated once at construction and immutable for the
//! lifetime of a run. Invalid combinations are rejected here, never mid-run.
//! The binary loads its configuration from environment variables; embedders
//! construct configs directly.

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors. Fatal before any iteration is scheduled.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("rate_per_second must be positive (got {0})")]
    NonPositiveRate(f64),

    #[error("duration must be positive")]
    ZeroDuration,

    #[error("max_workers must be at least 1")]
    ZeroMaxWorkers,

    #[error("max_workers ({max}) must be >= preallocated_workers ({preallocated})")]
    WorkerBoundsInverted { preallocated: usize, max: usize },

    #[error("staged executor requires at least one stage")]
    EmptyStages,

    #[error("stage {index} has zero duration")]
    ZeroStageDuration { index: usize },

    #[error("tick_interval must be positive")]
    ZeroTickInterval,

    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("{name} must be set for this executor")]
    MissingEnv { name: &'static str },
}

/// One step of a staged concurrency ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    /// How long the transition to `target_concurrency` takes.
    pub duration: Duration,
    /// Concurrency to reach by the end of the stage. Zero ramps to idle:
    /// nothing new starts, in-flight iterations drain.
    pub target_concurrency: usize,
}

impl Stage {
    pub fn new(duration: Duration, target_concurrency: usize) -> Self {
        Self {
            duration,
            target_concurrency,
        }
    }
}

/// How the concurrency target moves between stage boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Ramp linearly from the previous stage's target.
    #[default]
    Linear,
    /// Jump to the stage target at the stage boundary.
    Step,
}

/// Load profile driving the dispatcher.
#[derive(Debug, Clone)]
pub enum Executor {
    /// Issue iterations at a fixed arrival rate, independent of how long
    /// each takes to complete.
    ConstantArrivalRate {
        rate_per_second: f64,
        duration: Duration,
        preallocated_workers: usize,
        max_workers: usize,
    },
    /// Track a time-varying concurrency target across ordered stages.
    Staged {
        stages: Vec<Stage>,
        max_workers: usize,
        interpolation: Interpolation,
    },
}

/// Immutable, validated run configuration.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    executor: Executor,
    per_iteration_timeout: Option<Duration>,
    tick_interval: Duration,
}

/// Control-loop resolution for staged mode.
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

impl ScenarioConfig {
    /// Constant-arrival-rate scenario: `rate_per_second` new iterations per
    /// second for `duration`, on a pool growing lazily from
    /// `preallocated_workers` up to `max_workers`.
    pub fn constant_arrival_rate(
        rate_per_second: f64,
        duration: Duration,
        preallocated_workers: usize,
        max_workers: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            executor: Executor::ConstantArrivalRate {
                rate_per_second,
                duration,
                preallocated_workers,
                max_workers,
            },
            per_iteration_timeout: None,
            tick_interval: DEFAULT_TICK_INTERVAL,
        };
        config.validate()?;
        Ok(config)
    }

    /// Staged scenario: ramp active concurrency through the ordered stage
    /// list (linear interpolation by default), capped at `max_workers`.
    pub fn staged(stages: Vec<Stage>, max_workers: usize) -> Result<Self, ConfigError> {
        let config = Self {
            executor: Executor::Staged {
                stages,
                max_workers,
                interpolation: Interpolation::default(),
            },
            per_iteration_timeout: None,
            tick_interval: DEFAULT_TICK_INTERVAL,
        };
        config.validate()?;
        Ok(config)
    }

    /// Abandon iterations that run longer than `timeout`; their worker is
    /// reclaimed and the outcome is recorded as a timeout.
    pub fn with_per_iteration_timeout(mut self, timeout: Duration) -> Self {
        self.per_iteration_timeout = Some(timeout);
        self
    }

    /// Staged-mode interpolation. No effect on constant-arrival-rate runs.
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        if let Executor::Staged {
            interpolation: current,
            ..
        } = &mut self.executor
        {
            *current = interpolation;
        }
        self
    }

    /// Staged-mode control-loop resolution.
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Result<Self, ConfigError> {
        if tick_interval.is_zero() {
            return Err(ConfigError::ZeroTickInterval);
        }
        self.tick_interval = tick_interval;
        Ok(self)
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn per_iteration_timeout(&self) -> Option<Duration> {
        self.per_iteration_timeout
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn max_workers(&self) -> usize {
        match &self.executor {
            Executor::ConstantArrivalRate { max_workers, .. } => *max_workers,
            Executor::Staged { max_workers, .. } => *max_workers,
        }
    }

    /// Workers created up-front at pool initialization. Staged runs start
    /// from zero and grow on demand.
    pub fn preallocated_workers(&self) -> usize {
        match &self.executor {
            Executor::ConstantArrivalRate {
                preallocated_workers,
                ..
            } => *preallocated_workers,
            Executor::Staged { .. } => 0,
        }
    }

    /// Nominal run length: no new iterations are scheduled past this point.
    pub fn total_duration(&self) -> Duration {
        match &self.executor {
            Executor::ConstantArrivalRate { duration, .. } => *duration,
            Executor::Staged { stages, .. } => stages.iter().map(|s| s.duration).sum(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers() == 0 {
            return Err(ConfigError::ZeroMaxWorkers);
        }

        match &self.executor {
            Executor::ConstantArrivalRate {
                rate_per_second,
                duration,
                preallocated_workers,
                max_workers,
            } => {
                if !rate_per_second.is_finite() || *rate_per_second <= 0.0 {
                    return Err(ConfigError::NonPositiveRate(*rate_per_second));
                }
                if duration.is_zero() {
                    return Err(ConfigError::ZeroDuration);
                }
                if max_workers < preallocated_workers {
                    return Err(ConfigError::WorkerBoundsInverted {
                        preallocated: *preallocated_workers,
                        max: *max_workers,
                    });
                }
            }
            Executor::Staged { stages, .. } => {
                if stages.is_empty() {
                    return Err(ConfigError::EmptyStages);
                }
                for (index, stage) in stages.iter().enumerate() {
                    if stage.duration.is_zero() {
                        return Err(ConfigError::ZeroStageDuration { index });
                    }
                }
            }
        }

        if self.total_duration().is_zero() {
            return Err(ConfigError::ZeroDuration);
        }

        Ok(())
    }

    /// Load a scenario from `SURGE_*` environment variables.
    ///
    /// `SURGE_EXECUTOR` selects the mode (`constant-arrival-rate`, the
    /// default, or `staged`). Constant mode reads `SURGE_RATE`,
    /// `SURGE_DURATION`, `SURGE_PREALLOCATED_WORKERS` and
    /// `SURGE_MAX_WORKERS`; staged mode reads `SURGE_STAGES` as a
    /// comma-separated `duration:target` list (e.g. `30s:5000,1m:10000`).
    /// `SURGE_ITERATION_TIMEOUT` and `SURGE_TICK_INTERVAL` apply to both.
    pub fn from_env() -> Result<Self, ConfigError> {
        let executor = env::var("SURGE_EXECUTOR").unwrap_or_default();

        let mut config = if executor == "staged" {
            let raw = env::var("SURGE_STAGES").map_err(|_| ConfigError::MissingEnv {
                name: "SURGE_STAGES",
            })?;
            let stages = parse_stages(&raw)?;
            let max_workers = env_parse("SURGE_MAX_WORKERS")?.unwrap_or_else(|| {
                stages
                    .iter()
                    .map(|s| s.target_concurrency)
                    .max()
                    .unwrap_or(1)
            });
            let mut config = Self::staged(stages, max_workers)?;
            if let Ok(value) = env::var("SURGE_INTERPOLATION") {
                config = match value.as_str() {
                    "linear" => config.with_interpolation(Interpolation::Linear),
                    "step" => config.with_interpolation(Interpolation::Step),
                    _ => {
                        return Err(ConfigError::InvalidEnv {
                            name: "SURGE_INTERPOLATION",
                            value,
                        });
                    }
                };
            }
            config
        } else if executor.is_empty() || executor == "constant-arrival-rate" {
            let rate = env_parse("SURGE_RATE")?.unwrap_or(1000.0);
            let duration = env_parse_duration("SURGE_DURATION")?
                .unwrap_or_else(|| Duration::from_secs(60));
            let preallocated = env_parse("SURGE_PREALLOCATED_WORKERS")?.unwrap_or(100);
            let max = env_parse("SURGE_MAX_WORKERS")?.unwrap_or(1000);
            Self::constant_arrival_rate(rate, duration, preallocated, max)?
        } else {
            return Err(ConfigError::InvalidEnv {
                name: "SURGE_EXECUTOR",
                value: executor,
            });
        };

        if let Some(timeout) = env_parse_duration("SURGE_ITERATION_TIMEOUT")? {
            config = config.with_per_iteration_timeout(timeout);
        }
        if let Some(tick) = env_parse_duration("SURGE_TICK_INTERVAL")? {
            config = config.with_tick_interval(tick)?;
        }

        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

fn env_parse_duration(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    match env::var(name) {
        Ok(value) => parse_duration(&value)
            .map(Some)
            .ok_or(ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

/// Parse durations written as `90s`, `4m` or `250ms`.
fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    let (number, unit) = input.split_at(input.find(|c: char| c.is_ascii_alphabetic())?);
    let number: f64 = number.parse().ok()?;
    if number < 0.0 {
        return None;
    }
    match unit {
        "ms" => Some(Duration::from_secs_f64(number / 1000.0)),
        "s" => Some(Duration::from_secs_f64(number)),
        "m" => Some(Duration::from_secs_f64(number * 60.0)),
        _ => None,
    }
}

/// Parse a stage list written as `30s:5000,1m:10000,30s:0`.
fn parse_stages(input: &str) -> Result<Vec<Stage>, ConfigError> {
    let invalid = || ConfigError::InvalidEnv {
        name: "SURGE_STAGES",
        value: input.to_string(),
    };

    input
        .split(',')
        .map(|part| {
            let (duration, target) = part.trim().split_once(':').ok_or_else(invalid)?;
            let duration = parse_duration(duration).ok_or_else(invalid)?;
            let target = target.trim().parse().map_err(|_| invalid())?;
            Ok(Stage::new(duration, target))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_arrival_rate_valid() {
        let config =
            ScenarioConfig::constant_arrival_rate(20_000.0, Duration::from_secs(240), 2000, 10_000)
                .unwrap();
        assert_eq!(config.preallocated_workers(), 2000);
        assert_eq!(config.max_workers(), 10_000);
        assert_eq!(config.total_duration(), Duration::from_secs(240));
    }

    #[test]
    fn test_rejects_inverted_worker_bounds() {
        let err = ScenarioConfig::constant_arrival_rate(100.0, Duration::from_secs(1), 10, 5)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::WorkerBoundsInverted {
                preallocated: 10,
                max: 5
            }
        ));
    }

    #[test]
    fn test_rejects_non_positive_rate() {
        assert!(matches!(
            ScenarioConfig::constant_arrival_rate(0.0, Duration::from_secs(1), 1, 1),
            Err(ConfigError::NonPositiveRate(_))
        ));
        assert!(matches!(
            ScenarioConfig::constant_arrival_rate(f64::NAN, Duration::from_secs(1), 1, 1),
            Err(ConfigError::NonPositiveRate(_))
        ));
    }

    #[test]
    fn test_rejects_zero_duration() {
        assert!(matches!(
            ScenarioConfig::constant_arrival_rate(100.0, Duration::ZERO, 1, 1),
            Err(ConfigError::ZeroDuration)
        ));
    }

    #[test]
    fn test_rejects_empty_stages() {
        assert!(matches!(
            ScenarioConfig::staged(Vec::new(), 10),
            Err(ConfigError::EmptyStages)
        ));
    }

    #[test]
    fn test_staged_total_duration() {
        let config = ScenarioConfig::staged(
            vec![
                Stage::new(Duration::from_secs(30), 5000),
                Stage::new(Duration::from_secs(60), 10_000),
                Stage::new(Duration::from_secs(60), 15_000),
                Stage::new(Duration::from_secs(30), 0),
            ],
            15_000,
        )
        .unwrap();
        assert_eq!(config.total_duration(), Duration::from_secs(180));
        assert_eq!(config.preallocated_workers(), 0);
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("4m"), Some(Duration::from_secs(240)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("10h"), None);
    }

    #[test]
    fn test_parse_stage_list() {
        let stages = parse_stages("30s:5000, 1m:10000, 30s:0").unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0], Stage::new(Duration::from_secs(30), 5000));
        assert_eq!(stages[1], Stage::new(Duration::from_secs(60), 10_000));
        assert_eq!(stages[2], Stage::new(Duration::from_secs(30), 0));

        assert!(parse_stages("30s-5000").is_err());
        assert!(parse_stages("30s:x").is_err());
    }
}
