//! Query file discovery.
//!
//! Expands a glob pattern into an ordered [`Batch`] of query records. Nothing
//! is written to disk here; run directories are created by the runner.

use chrono::{DateTime, Local};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{BenchError, Result};
use crate::query::record::{Batch, QueryRecord};

/// Format of the per-run result directory name.
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y-%m-%d.%H%M%S";

/// Returns the result file name for a discovery sequence number.
pub fn output_file_name(sequence: usize) -> String {
    format!("results-query-{sequence:06}.output")
}

/// Loads every file matching `pattern`, stamping the run directory with the
/// current local time.
pub fn load(pattern: &str, output_root: &Path) -> Result<Batch> {
    load_at(pattern, output_root, Local::now())
}

/// Loads every file matching `pattern` for a run that started at `run_start`.
///
/// Files are taken in the order the glob yields them; directories are
/// skipped. Any unreadable match aborts the whole load.
pub fn load_at(pattern: &str, output_root: &Path, run_start: DateTime<Local>) -> Result<Batch> {
    let run_name = run_start.format(RUN_TIMESTAMP_FORMAT).to_string();
    let run_directory = std::path::absolute(output_root.join(run_name))
        .map_err(|e| BenchError::discovery(format!("Failed to resolve output path: {e}")))?;

    let matches = glob::glob(pattern)
        .map_err(|e| BenchError::discovery(format!("Invalid pattern '{pattern}': {e}")))?;

    let mut records = Vec::new();
    for entry in matches {
        let path = entry.map_err(|e| BenchError::discovery(format!("Failed to list {e}")))?;

        let metadata = fs::metadata(&path).map_err(|e| {
            BenchError::discovery(format!("Failed to get file info for {}: {e}", path.display()))
        })?;
        if metadata.is_dir() {
            continue;
        }

        let input_path = std::path::absolute(&path).map_err(|e| {
            BenchError::discovery(format!("Failed to resolve {}: {e}", path.display()))
        })?;
        let sql = fs::read_to_string(&input_path)
            .map_err(|e| BenchError::read(format!("{}: {e}", input_path.display())))?;

        let sequence = records.len() + 1;
        let output_path = run_directory.join(output_file_name(sequence));

        debug!(
            sequence,
            input = %input_path.display(),
            output = %output_path.display(),
            sql = %sql,
            "Loaded query"
        );

        records.push(QueryRecord::new(sql, input_path, output_path, sequence));
    }

    Ok(Batch::new(records, run_directory))
}
