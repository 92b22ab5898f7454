//! Query records and the batch that owns them.

use chrono::{DateTime, Duration, Local};
use rand::Rng;
use std::path::{Path, PathBuf};

use crate::error::BenchError;
use crate::query::planner;

/// One discovered query file and the outcome of its single execution.
///
/// Timing fields start unset and are written at most once. Once `error`
/// is set, no further timing fields change.
#[derive(Debug)]
pub struct QueryRecord {
    /// Query body, immutable after load.
    pub sql: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// 1-based discovery position; the record's stable identity.
    pub sequence: usize,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
    pub first_row_time: Option<DateTime<Local>>,
    pub last_row_time: Option<DateTime<Local>>,
    pub row_count: u64,
    /// Scan estimate reported by a dry run.
    pub bytes_processed: Option<i64>,
    pub error: Option<BenchError>,
}

impl QueryRecord {
    /// Creates an unexecuted record.
    pub fn new(sql: String, input_path: PathBuf, output_path: PathBuf, sequence: usize) -> Self {
        Self {
            sql,
            input_path,
            output_path,
            sequence,
            start_time: None,
            end_time: None,
            first_row_time: None,
            last_row_time: None,
            row_count: 0,
            bytes_processed: None,
            error: None,
        }
    }

    /// Records the failure cause. Later failures are ignored.
    pub fn fail(&mut self, error: BenchError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Returns true if execution failed.
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Returns true once the record has been through an execution pass.
    pub fn is_executed(&self) -> bool {
        self.start_time.is_some() || self.error.is_some()
    }

    /// Time from submission to engine acknowledgement.
    pub fn submission_duration(&self) -> Option<Duration> {
        Some(self.end_time? - self.start_time?)
    }

    /// Time from engine acknowledgement to the last row.
    pub fn retrieval_duration(&self) -> Option<Duration> {
        Some(self.last_row_time? - self.end_time?)
    }
}

/// The loaded queries plus the order they will run in.
#[derive(Debug)]
pub struct Batch {
    records: Vec<QueryRecord>,
    execution_order: Vec<usize>,
    run_directory: PathBuf,
}

impl Batch {
    /// Creates a batch in discovery order.
    pub fn new(records: Vec<QueryRecord>, run_directory: PathBuf) -> Self {
        let execution_order = planner::plan(records.len(), false);
        Self {
            records,
            execution_order,
            run_directory,
        }
    }

    /// Replans the execution order, shuffling if requested.
    pub fn plan_execution_order(&mut self, shuffle: bool) {
        self.execution_order = planner::plan(self.records.len(), shuffle);
    }

    /// Replans the execution order from an explicit random source.
    pub fn plan_execution_order_with<R: Rng + ?Sized>(&mut self, shuffle: bool, rng: &mut R) {
        self.execution_order = planner::plan_with_rng(self.records.len(), shuffle, rng);
    }

    /// Records in discovery order.
    pub fn records(&self) -> &[QueryRecord] {
        &self.records
    }

    /// Indices into `records`, in the order they run.
    pub fn execution_order(&self) -> &[usize] {
        &self.execution_order
    }

    /// Exclusive access to one record for its execution pass.
    pub fn record_mut(&mut self, index: usize) -> Option<&mut QueryRecord> {
        self.records.get_mut(index)
    }

    /// Timestamped directory holding this run's result files.
    pub fn run_directory(&self) -> &Path {
        &self.run_directory
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records whose execution failed, in discovery order.
    pub fn failed_records(&self) -> impl Iterator<Item = &QueryRecord> {
        self.records.iter().filter(|r| r.is_failed())
    }
}
