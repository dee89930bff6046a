//! Benchmark run configuration
//!
//! Supplied by an external configuration collaborator (who owns file
//! loading); this module owns the shape, defaults, and validation. A
//! configuration error is the only fatal error class; it surfaces before
//! any network activity starts.

use crate::error::{BenchError, BenchResult};
use crate::load::LoadSettings;
use crate::stats::WinnerPolicy;
use crate::types::GenerationRequest;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Simulated users per backend during a load test
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Load-test window length
    #[serde(with = "humantime_serde", default = "default_duration")]
    pub duration: Duration,

    /// Staggered-start window for simulated users
    #[serde(with = "humantime_serde", default = "default_ramp_up")]
    pub ramp_up: Duration,

    /// Idle interval range between a user's consecutive requests;
    /// `None` disables think time
    #[serde(with = "humantime_serde", default)]
    pub think_time_min: Option<Duration>,
    #[serde(with = "humantime_serde", default)]
    pub think_time_max: Option<Duration>,

    /// Iterations for TTFT-only probe passes
    #[serde(default = "default_ttft_iterations")]
    pub ttft_iterations: usize,

    /// TTFT threshold for the target-achievement ratio
    #[serde(with = "humantime_serde", default = "default_ttft_target")]
    pub ttft_target: Duration,

    /// Minimum success rate for winner eligibility
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,

    /// Connection-establishment timeout for the shared HTTP client
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Overall run deadline; expiry cancels all in-flight work and the run
    /// completes with whatever was recorded
    #[serde(with = "humantime_serde", default)]
    pub max_run_duration: Option<Duration>,

    /// Request template every attempt is built from
    #[serde(default)]
    pub request: GenerationRequest,
}

fn default_concurrency() -> usize {
    5
}
fn default_duration() -> Duration {
    Duration::from_secs(60)
}
fn default_ramp_up() -> Duration {
    Duration::from_secs(1)
}
fn default_ttft_iterations() -> usize {
    10
}
fn default_ttft_target() -> Duration {
    Duration::from_millis(100)
}
fn default_min_success_rate() -> f64 {
    0.5
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            duration: default_duration(),
            ramp_up: default_ramp_up(),
            think_time_min: None,
            think_time_max: None,
            ttft_iterations: default_ttft_iterations(),
            ttft_target: default_ttft_target(),
            min_success_rate: default_min_success_rate(),
            connect_timeout: default_connect_timeout(),
            max_run_duration: None,
            request: GenerationRequest::default(),
        }
    }
}

impl BenchmarkConfig {
    /// Validate the configuration. Called by the orchestrator before any
    /// network activity.
    pub fn validate(&self) -> BenchResult<()> {
        if self.concurrency == 0 {
            return Err(BenchError::config("concurrency must be greater than 0"));
        }
        if self.duration.is_zero() {
            return Err(BenchError::config("duration must be greater than 0"));
        }
        if self.ttft_iterations == 0 {
            return Err(BenchError::config(
                "ttft_iterations must be greater than 0",
            ));
        }
        if self.ttft_target.is_zero() {
            return Err(BenchError::config("ttft_target must be greater than 0"));
        }
        // A NaN rate also fails the range check.
        if !(0.0..=1.0).contains(&self.min_success_rate) {
            return Err(BenchError::config(
                "min_success_rate must be within [0.0, 1.0]",
            ));
        }
        match (self.think_time_min, self.think_time_max) {
            (Some(min), Some(max)) if min > max => {
                return Err(BenchError::config(
                    "think_time_min must not exceed think_time_max",
                ));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(BenchError::config(
                    "think_time_min and think_time_max must be set together",
                ));
            }
            _ => {}
        }
        if self.request.prompt.is_empty() {
            return Err(BenchError::config("request prompt must not be empty"));
        }
        Ok(())
    }

    /// Load shape derived from this configuration
    pub fn load_settings(&self) -> LoadSettings {
        LoadSettings {
            concurrency: self.concurrency,
            duration: self.duration,
            ramp_up: self.ramp_up,
            think_time: self.think_time_min.zip(self.think_time_max),
        }
    }

    /// Winner policy derived from this configuration
    pub fn winner_policy(&self) -> WinnerPolicy {
        WinnerPolicy {
            min_success_rate: self.min_success_rate,
            ttft_target: self.ttft_target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(BenchmarkConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = BenchmarkConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BenchError::Config(_))));
    }

    #[test]
    fn out_of_range_success_rate_is_rejected() {
        let config = BenchmarkConfig {
            min_success_rate: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn nan_success_rate_is_rejected() {
        let config = BenchmarkConfig {
            min_success_rate: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn half_open_think_time_is_rejected() {
        let config = BenchmarkConfig {
            think_time_min: Some(Duration::from_millis(100)),
            think_time_max: None,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_think_time_is_rejected() {
        let config = BenchmarkConfig {
            think_time_min: Some(Duration::from_millis(500)),
            think_time_max: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_human_durations() {
        let config: BenchmarkConfig = serde_json::from_str(
            r#"{
                "concurrency": 8,
                "duration": "30s",
                "ttft_target": "150ms",
                "think_time_min": "100ms",
                "think_time_max": "1s"
            }"#,
        )
        .unwrap();
        assert_eq!(config.duration, Duration::from_secs(30));
        assert_eq!(config.ttft_target, Duration::from_millis(150));
        assert_eq!(
            config.load_settings().think_time,
            Some((Duration::from_millis(100), Duration::from_secs(1)))
        );
        assert!(config.validate().is_ok());
    }
}
