//! Per-query and per-batch result reporting.
//!
//! Reports are plain data built from executed records; sinks decide where
//! they go. The default sink emits structured tracing events.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use crate::error::{BenchError, Result};
use crate::query::record::{Batch, QueryRecord};
use crate::query::runner::ExecutionMode;

/// Structured outcome of one executed query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryReport {
    /// Failed query. Timing is left out since it may be partial.
    Failed {
        sequence: usize,
        input: PathBuf,
        error: String,
    },
    Succeeded {
        sequence: usize,
        input: PathBuf,
        output: PathBuf,
        start: Option<DateTime<Local>>,
        end: Option<DateTime<Local>>,
        submission_ms: Option<i64>,
        first_row: Option<DateTime<Local>>,
        last_row: Option<DateTime<Local>>,
        retrieval_ms: Option<i64>,
        rows: u64,
    },
    DryRun {
        sequence: usize,
        input: PathBuf,
        start: Option<DateTime<Local>>,
        end: Option<DateTime<Local>>,
        submission_ms: Option<i64>,
        bytes_processed: Option<i64>,
    },
}

impl QueryReport {
    /// Builds the report for an executed record.
    pub fn from_record(record: &QueryRecord, mode: ExecutionMode) -> Self {
        if let Some(error) = &record.error {
            return Self::Failed {
                sequence: record.sequence,
                input: record.input_path.clone(),
                error: error.to_string(),
            };
        }

        let submission_ms = record.submission_duration().map(|d| d.num_milliseconds());

        match mode {
            ExecutionMode::Live => Self::Succeeded {
                sequence: record.sequence,
                input: record.input_path.clone(),
                output: record.output_path.clone(),
                start: record.start_time,
                end: record.end_time,
                submission_ms,
                first_row: record.first_row_time,
                last_row: record.last_row_time,
                retrieval_ms: record.retrieval_duration().map(|d| d.num_milliseconds()),
                rows: record.row_count,
            },
            ExecutionMode::DryRun => Self::DryRun {
                sequence: record.sequence,
                input: record.input_path.clone(),
                start: record.start_time,
                end: record.end_time,
                submission_ms,
                bytes_processed: record.bytes_processed,
            },
        }
    }

    pub fn sequence(&self) -> usize {
        match self {
            Self::Failed { sequence, .. }
            | Self::Succeeded { sequence, .. }
            | Self::DryRun { sequence, .. } => *sequence,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Destination for query reports.
pub trait ReportSink: Send + Sync {
    fn emit(&self, report: &QueryReport);
}

/// Emits each report as a structured tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn emit(&self, report: &QueryReport) {
        match report {
            QueryReport::Failed {
                sequence,
                input,
                error,
            } => {
                error!(
                    sequence = *sequence,
                    input = %input.display(),
                    error = %error,
                    "Query failed"
                );
            }
            QueryReport::Succeeded {
                sequence,
                input,
                output,
                start,
                end,
                submission_ms,
                first_row,
                last_row,
                retrieval_ms,
                rows,
            } => {
                info!(
                    sequence = *sequence,
                    input = %input.display(),
                    output = %output.display(),
                    start = ?start.map(|t| t.to_rfc3339()),
                    end = ?end.map(|t| t.to_rfc3339()),
                    submission_ms = ?submission_ms,
                    first_row = ?first_row.map(|t| t.to_rfc3339()),
                    last_row = ?last_row.map(|t| t.to_rfc3339()),
                    retrieval_ms = ?retrieval_ms,
                    rows = *rows,
                    "Query executed"
                );
            }
            QueryReport::DryRun {
                sequence,
                input,
                start,
                end,
                submission_ms,
                bytes_processed,
            } => {
                info!(
                    sequence = *sequence,
                    input = %input.display(),
                    start = ?start.map(|t| t.to_rfc3339()),
                    end = ?end.map(|t| t.to_rfc3339()),
                    submission_ms = ?submission_ms,
                    bytes_processed = ?bytes_processed,
                    "Query dry run"
                );
            }
        }
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    reports: Arc<Mutex<Vec<QueryReport>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports received so far, in emission order.
    pub fn reports(&self) -> Vec<QueryReport> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ReportSink for CollectingSink {
    fn emit(&self, report: &QueryReport) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
    }
}

/// Builds reports for executed records and hands them to a sink.
#[derive(Clone)]
pub struct ResultReporter {
    sink: Arc<dyn ReportSink>,
}

impl ResultReporter {
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self { sink }
    }

    /// Reports one executed record and returns what was emitted.
    pub fn report(&self, record: &QueryRecord, mode: ExecutionMode) -> QueryReport {
        let report = QueryReport::from_record(record, mode);
        self.sink.emit(&report);
        report
    }
}

impl Default for ResultReporter {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_directory: PathBuf,
    pub mode: ExecutionMode,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_sequences: Vec<usize>,
    /// Sequence numbers in the order they ran.
    pub execution_order: Vec<usize>,
    /// Reports in discovery order.
    pub reports: Vec<QueryReport>,
}

impl BatchSummary {
    /// Summarises an executed batch.
    pub fn from_batch(batch: &Batch, mode: ExecutionMode) -> Self {
        let reports: Vec<QueryReport> = batch
            .records()
            .iter()
            .map(|r| QueryReport::from_record(r, mode))
            .collect();
        let failed_sequences: Vec<usize> = batch.failed_records().map(|r| r.sequence).collect();

        Self {
            run_directory: batch.run_directory().to_path_buf(),
            mode,
            total: batch.len(),
            succeeded: batch.len() - failed_sequences.len(),
            failed: failed_sequences.len(),
            failed_sequences,
            execution_order: batch
                .execution_order()
                .iter()
                .map(|&i| batch.records()[i].sequence)
                .collect(),
            reports,
        }
    }

    /// Logs the totals.
    pub fn log(&self) {
        if self.failed > 0 {
            error!(
                total = self.total,
                succeeded = self.succeeded,
                failed = self.failed,
                failed_sequences = ?self.failed_sequences,
                "Batch finished with failures"
            );
        } else {
            info!(
                total = self.total,
                succeeded = self.succeeded,
                run_directory = %self.run_directory.display(),
                "Batch finished"
            );
        }
    }

    /// Writes the summary as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| BenchError::io(format!("Failed to create report directory: {e}")))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BenchError::io(format!("Failed to serialize report: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| BenchError::io(format!("Failed to write report {}: {e}", path.display())))
    }
}
