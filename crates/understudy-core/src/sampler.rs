//! Performance sampling.
//!
//! A trial is one timed run of a runnable; a sample is a group of trials
//! bounded by a wall-clock budget and a trial cap. Trial times from all samples
//! are pooled and summarized for elapsed time and throughput, with outliers
//! beyond 1.645 standard deviations trimmed first.

use crate::config::SamplerConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use understudy_proto::Result;

/// One-tailed 90% cutoff, in standard deviations.
pub const OUTLIER_Z: f64 = 1.645;

/// Summary of one metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub mean: f64,
    pub median: f64,
    pub standard_deviation: f64,
    pub variance: f64,
    /// Standard error of the mean divided by the mean.
    pub standard_error: f64,
    /// Values trimmed as outliers before computing the other fields.
    pub dropped: usize,
}

impl MetricStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let (mean, sd) = mean_and_deviation(values);
        let kept: Vec<f64> = if sd > 0.0 {
            values
                .iter()
                .copied()
                .filter(|v| (v - mean).abs() <= OUTLIER_Z * sd)
                .collect()
        } else {
            values.to_vec()
        };
        let dropped = values.len() - kept.len();

        let (mean, standard_deviation) = mean_and_deviation(&kept);
        let standard_error = if mean == 0.0 {
            0.0
        } else {
            standard_deviation / (kept.len() as f64).sqrt() / mean
        };

        Self {
            mean,
            median: median(&kept),
            standard_deviation,
            variance: standard_deviation * standard_deviation,
            standard_error,
            dropped,
        }
    }
}

/// Statistics for one scenario, keyed by its title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub total_sample_size: usize,
    /// Elapsed milliseconds per trial.
    pub time: MetricStats,
    /// Trials per second.
    pub throughput: MetricStats,
}

/// Summarizes pooled trial times (milliseconds).
///
/// Trials below clock resolution (zero or negative) have no finite
/// throughput and are left out of the throughput pool.
pub fn compute_statistics(title: &str, times_ms: &[f64]) -> PerformanceReport {
    let throughput: Vec<f64> = times_ms
        .iter()
        .filter(|ms| **ms > 0.0)
        .map(|ms| 1000.0 / ms)
        .collect();

    PerformanceReport {
        title: title.to_string(),
        timestamp: Utc::now(),
        total_sample_size: times_ms.len(),
        time: MetricStats::from_values(times_ms),
        throughput: MetricStats::from_values(&throughput),
    }
}

/// Repeatedly times a runnable.
#[derive(Debug, Clone, Default)]
pub struct PerformanceSampler {
    config: SamplerConfig,
}

impl PerformanceSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Runs trials until `budget` elapses or the trial cap is hit.
    ///
    /// At least one trial always runs. Returns elapsed milliseconds per trial.
    pub async fn run_sample<F, Fut>(&self, runnable: &mut F, budget: Duration) -> Result<Vec<f64>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let max_trials = self.config.max_trials_per_sample.max(1);
        let started = Instant::now();
        let mut times = Vec::new();

        while times.is_empty() || (started.elapsed() < budget && times.len() < max_trials) {
            let trial = Instant::now();
            runnable().await?;
            times.push(trial.elapsed().as_secs_f64() * 1000.0);
            tokio::task::yield_now().await;
        }
        Ok(times)
    }

    /// Collects the configured number of samples into one pool.
    pub async fn run_all_samples<F, Fut>(&self, mut runnable: F) -> Result<Vec<f64>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let budget = self.config.sample_budget();
        let mut pool = Vec::new();
        for sample in 0..self.config.samples {
            let times = self.run_sample(&mut runnable, budget).await?;
            debug!(sample, trials = times.len(), "Collected sample");
            pool.extend(times);
        }
        Ok(pool)
    }

    /// Samples `runnable` and summarizes the result under `title`.
    pub async fn measure<F, Fut>(&self, title: &str, runnable: F) -> Result<PerformanceReport>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let times = self.run_all_samples(runnable).await?;
        Ok(compute_statistics(title, &times))
    }
}

fn mean_and_deviation(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
