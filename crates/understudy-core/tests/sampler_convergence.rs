//! Sampler behaviour against real and paused timers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use understudy_core::{
    JsonlReportWriter, PerformanceReport, PerformanceSampler, REPORT_FILE, ReportWriter,
    SamplerConfig,
};

fn sampler() -> PerformanceSampler {
    PerformanceSampler::new(
        SamplerConfig::default()
            .with_samples(3)
            .with_sample_budget(Duration::from_millis(20))
            .with_max_trials(5),
    )
}

#[tokio::test]
async fn test_sleeping_runnable_converges_above_sleep_time() {
    let report = sampler()
        .measure("sleep 2ms", || async {
            tokio::time::sleep(Duration::from_millis(2)).await;
            Ok(())
        })
        .await
        .unwrap();

    assert!(report.total_sample_size > 0);
    assert!(report.total_sample_size <= 15);
    assert!(report.time.mean >= 2.0, "mean was {}", report.time.mean);
    assert!(report.throughput.mean > 0.0);
    assert!(report.throughput.mean <= 500.0);
}

#[tokio::test]
async fn test_failing_runnable_aborts_sampling() {
    let err = sampler()
        .measure("fails", || async {
            Err(understudy_core::Error::Thrown(serde_json::json!("boom")))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, understudy_core::Error::Thrown(_)));
}

#[tokio::test]
async fn test_reports_append_to_jsonl_file() {
    let dir = tempfile::tempdir().unwrap();
    let report = sampler()
        .measure("noop", || async { Ok(()) })
        .await
        .unwrap();

    {
        let mut writer = JsonlReportWriter::new(dir.path()).unwrap();
        writer.write(&report).unwrap();
        writer.write(&report).unwrap();
    }

    let contents = std::fs::read_to_string(dir.path().join(REPORT_FILE)).unwrap();
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines.len(), 2);

    let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(parsed["title"], "noop");
    assert!(parsed["time"]["mean"].is_number());
}

/// Samples a runnable alternating 4 ms and 6 ms trials (true mean 5 ms).
async fn sample_alternating(samples: usize) -> PerformanceReport {
    let trials = Arc::new(AtomicUsize::new(0));
    let sampler = PerformanceSampler::new(
        SamplerConfig::default()
            .with_samples(samples)
            .with_sample_budget(Duration::from_millis(100))
            .with_max_trials(4),
    );
    sampler
        .measure("alternating", move || {
            let trials = Arc::clone(&trials);
            async move {
                let n = trials.fetch_add(1, Ordering::SeqCst);
                let ms = if n % 2 == 0 { 4 } else { 6 };
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(())
            }
        })
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_mean_converges_as_samples_grow() {
    let small = sample_alternating(1).await;
    let large = sample_alternating(16).await;

    assert_eq!(small.total_sample_size, 4);
    assert_eq!(large.total_sample_size, 64);
    assert!((large.time.mean - 5.0).abs() < 0.5, "mean was {}", large.time.mean);
    assert!(
        large.time.standard_error <= small.time.standard_error,
        "standard error grew from {} to {}",
        small.time.standard_error,
        large.time.standard_error
    );
    assert_eq!(large.time.dropped, 0);
}
