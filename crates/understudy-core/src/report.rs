//! Persistence of performance reports.

use crate::sampler::PerformanceReport;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// File name used by [`JsonlReportWriter`].
pub const REPORT_FILE: &str = "performance.jsonl";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Receives finished performance reports.
pub trait ReportWriter: Send {
    fn write(&mut self, report: &PerformanceReport) -> Result<(), ReportError>;
}

/// Appends one JSON line per report to `<dir>/performance.jsonl`.
pub struct JsonlReportWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlReportWriter {
    pub fn new(dir: &Path) -> Result<Self, ReportError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(REPORT_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportWriter for JsonlReportWriter {
    fn write(&mut self, report: &PerformanceReport) -> Result<(), ReportError> {
        serde_json::to_writer(&mut self.writer, report)?;
        writeln!(&mut self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps reports in memory; clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryReportWriter {
    reports: Arc<Mutex<Vec<PerformanceReport>>>,
}

impl MemoryReportWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<PerformanceReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ReportWriter for MemoryReportWriter {
    fn write(&mut self, report: &PerformanceReport) -> Result<(), ReportError> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());
        Ok(())
    }
}
