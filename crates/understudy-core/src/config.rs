//! Harness configuration.
//!
//! Loaded from YAML or the environment. Every field has a default, so an empty
//! document is a valid configuration.
//!
//! ```yaml
//! performance_mode: true
//! poll_interval_ms: 5
//! completion_timeout_ms: 10000
//! report_dir: target/understudy
//! sampler:
//!   samples: 30
//!   sample_budget_ms: 200
//!   max_trials_per_sample: 100
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Enables performance mode when set to `1`.
pub const PERF_ENV: &str = "UNDERSTUDY_PERF";

/// Directory for persisted performance reports.
pub const REPORT_DIR_ENV: &str = "UNDERSTUDY_REPORT_DIR";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Settings for the performance sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Number of samples to collect.
    pub samples: usize,

    /// Wall-clock budget for each sample.
    pub sample_budget_ms: u64,

    /// Upper bound on trials within one sample.
    pub max_trials_per_sample: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            samples: 20,
            sample_budget_ms: 100,
            max_trials_per_sample: 50,
        }
    }
}

impl SamplerConfig {
    pub fn sample_budget(&self) -> Duration {
        Duration::from_millis(self.sample_budget_ms)
    }

    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_sample_budget(mut self, budget: Duration) -> Self {
        self.sample_budget_ms = budget.as_millis() as u64;
        self
    }

    pub fn with_max_trials(mut self, max: usize) -> Self {
        self.max_trials_per_sample = max.max(1);
        self
    }
}

/// Configuration for the host harness running scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Run flagged scenarios through the performance sampler.
    pub performance_mode: bool,

    /// Interval between completion-signal checks.
    pub poll_interval_ms: u64,

    /// Upper bound on waiting for completion. `None` waits forever.
    pub completion_timeout_ms: Option<u64>,

    /// Where performance reports are appended, if anywhere.
    pub report_dir: Option<PathBuf>,

    pub sampler: SamplerConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            performance_mode: false,
            poll_interval_ms: 10,
            completion_timeout_ms: Some(30_000),
            report_dir: None,
            sampler: SamplerConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Defaults adjusted by `UNDERSTUDY_PERF` and `UNDERSTUDY_REPORT_DIR`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.performance_mode = std::env::var(PERF_ENV)
            .map(|v| v == "1")
            .unwrap_or(false);
        config.report_dir = std::env::var_os(REPORT_DIR_ENV).map(PathBuf::from);
        config
    }

    pub fn with_performance_mode(mut self, enabled: bool) -> Self {
        self.performance_mode = enabled;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.completion_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerConfig) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn completion_timeout(&self) -> Option<Duration> {
        self.completion_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = HarnessConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.completion_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = r"
performance_mode: true
completion_timeout_ms: null
sampler:
  samples: 3
";
        let config = HarnessConfig::from_yaml_str(yaml).unwrap();
        assert!(config.performance_mode);
        assert_eq!(config.completion_timeout(), None);
        assert_eq!(config.sampler.samples, 3);
        assert_eq!(config.sampler.max_trials_per_sample, 50);
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        let err = HarnessConfig::from_yaml_str("poll_interval_ms: [oops]").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("understudy.yml");
        std::fs::write(&path, "poll_interval_ms: 25\n").unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(25));

        let missing = HarnessConfig::load(temp.path().join("nope.yml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let config = HarnessConfig::default().with_poll_interval(Duration::ZERO);
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }
}
