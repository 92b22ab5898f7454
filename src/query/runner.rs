//! Single-query execution with timing instrumentation.
//!
//! Live runs stream every result row straight to the record's output file;
//! dry runs only ask the engine to validate and plan the query.

use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::config::BenchConfig;
use crate::db::{EngineClient, QueryRequest, RowCursor, Submission};
use crate::error::{BenchError, Result};
use crate::query::record::QueryRecord;

/// How a batch executes its queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Live,
    DryRun,
}

impl ExecutionMode {
    pub fn from_config(config: &BenchConfig) -> Self {
        if config.dry_run {
            Self::DryRun
        } else {
            Self::Live
        }
    }
}

/// Executes individual records against an engine client.
pub struct QueryRunner<'a> {
    client: &'a dyn EngineClient,
    config: &'a BenchConfig,
}

impl<'a> QueryRunner<'a> {
    /// Creates a new query runner.
    pub fn new(client: &'a dyn EngineClient, config: &'a BenchConfig) -> Self {
        Self { client, config }
    }

    /// Executes `record` in the given mode. Failures are stored on the record.
    pub async fn execute(&self, record: &mut QueryRecord, mode: ExecutionMode) {
        match mode {
            ExecutionMode::Live => self.run(record).await,
            ExecutionMode::DryRun => self.run_dry(record).await,
        }
    }

    /// Runs the query and streams its rows to `record.output_path`.
    pub async fn run(&self, record: &mut QueryRecord) {
        if let Err(e) = self.try_run(record).await {
            record.fail(e);
        }
    }

    async fn try_run(&self, record: &mut QueryRecord) -> Result<()> {
        if let Some(dir) = record.output_path.parent() {
            create_output_dir(dir)?;
        }

        let request = QueryRequest::new(&record.sql, self.config, false);

        let start = Local::now();
        let submitted = self.client.submit(&request).await;
        let end = Local::now();
        record.start_time = Some(start);
        record.end_time = Some(end);

        let mut cursor = match submitted? {
            Submission::Rows(cursor) => cursor,
            Submission::DryRun(_) => {
                return Err(BenchError::engine(
                    "Engine returned a dry-run status for a live query",
                ))
            }
        };

        let file = File::create(&record.output_path).map_err(|e| {
            BenchError::io(format!(
                "Failed to create output file {}: {e}",
                record.output_path.display()
            ))
        })?;
        // csv::Writer buffers internally.
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.config.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_writer(file);

        stream_rows(cursor.as_mut(), &mut writer, record).await
    }

    /// Asks the engine to validate and plan the query without running it.
    ///
    /// Never touches row fields or output files.
    pub async fn run_dry(&self, record: &mut QueryRecord) {
        let request = QueryRequest::new(&record.sql, self.config, true);

        let start = Local::now();
        let submitted = self.client.submit(&request).await;
        record.start_time = Some(start);

        match submitted {
            Ok(Submission::DryRun(status)) => match status.error() {
                Some(message) => record.fail(BenchError::engine(message)),
                None => {
                    record.end_time = Some(Local::now());
                    record.bytes_processed = status.total_bytes_processed;
                }
            },
            Ok(Submission::Rows(_)) => record.fail(BenchError::engine(
                "Engine returned rows for a dry-run query",
            )),
            Err(e) => record.fail(e),
        }
    }
}

/// Rows buffered between flushes.
const COMMIT_INTERVAL_ROWS: u64 = 1024;

/// Copies every row from `cursor` to `writer`, updating row timing on `record`.
///
/// Rows only count toward `row_count` once a flush has pushed them to the
/// file, so after a failure `row_count` never exceeds the rows on disk. Rows
/// written before a failure stay written. `last_row_time` is set only after
/// the final flush succeeds.
async fn stream_rows<W: Write>(
    cursor: &mut dyn RowCursor,
    writer: &mut csv::Writer<W>,
    record: &mut QueryRecord,
) -> Result<()> {
    let mut pending = PendingRows::default();

    let fetched = loop {
        let row = match cursor.next().await {
            Ok(Some(row)) => row,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        pending.first_fetch.get_or_insert_with(Local::now);

        if let Err(e) = writer.write_record(row.iter().map(|v| v.to_field().into_owned())) {
            // Buffer contents are unknown now; only committed rows count.
            let _ = writer.flush();
            return Err(BenchError::io(format!(
                "Failed writing to the output file: {e}"
            )));
        }
        pending.rows += 1;

        if pending.rows >= COMMIT_INTERVAL_ROWS {
            pending.commit(writer, record)?;
        }
    };

    let committed = pending.commit(writer, record);
    fetched.and(committed)?;

    record.last_row_time = Some(Local::now());
    Ok(())
}

/// Rows accepted by the writer but not yet flushed to the file.
#[derive(Default)]
struct PendingRows {
    rows: u64,
    first_fetch: Option<DateTime<Local>>,
}

impl PendingRows {
    /// Flushes the writer and moves the pending rows onto `record`.
    fn commit<W: Write>(
        &mut self,
        writer: &mut csv::Writer<W>,
        record: &mut QueryRecord,
    ) -> Result<()> {
        writer
            .flush()
            .map_err(|e| BenchError::io(format!("Failed to flush output file: {e}")))?;

        if self.rows > 0 {
            record.row_count += self.rows;
            self.rows = 0;
            if record.first_row_time.is_none() {
                record.first_row_time = self.first_fetch;
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn create_output_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(|e| output_dir_error(dir, e))
}

#[cfg(not(unix))]
fn create_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| output_dir_error(dir, e))
}

fn output_dir_error(dir: &Path, e: std::io::Error) -> BenchError {
    BenchError::io(format!(
        "Failed to create the output directory {}: {e}",
        dir.display()
    ))
}
