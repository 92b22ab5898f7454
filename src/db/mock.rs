//! Mock query engine for testing.
//!
//! Provides a scripted in-process engine so batches can be exercised
//! without a warehouse.

use super::{EngineClient, JobStatus, QueryRequest, Row, RowCursor, Submission, Value};
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Scripted behaviour for one SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum MockResponse {
    /// Complete successfully with these rows.
    Rows(Vec<Row>),
    /// Fail at submission.
    SubmitError(String),
    /// Yield these rows, then fail the next fetch.
    FailAfter { rows: Vec<Row>, error: String },
    /// Dry runs report this job error; live runs fail at submission.
    DryRunError(String),
}

/// A submission seen by the mock engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedQuery {
    pub sql: String,
    pub dry_run: bool,
    pub disable_cache: bool,
}

/// A mock engine that returns predefined results keyed by SQL text.
#[derive(Debug, Clone, Default)]
pub struct MockEngineClient {
    responses: HashMap<String, MockResponse>,
    submissions: Arc<Mutex<Vec<SubmittedQuery>>>,
    closed: Arc<AtomicBool>,
}

impl MockEngineClient {
    /// Creates a mock engine with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the response for a SQL text (matched after trimming).
    pub fn with_response(mut self, sql: &str, response: MockResponse) -> Self {
        self.responses.insert(sql.trim().to_string(), response);
        self
    }

    /// Returns every submission received so far, in order.
    pub fn submissions(&self) -> Vec<SubmittedQuery> {
        self.submissions
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn response_for(&self, sql: &str) -> MockResponse {
        let key = sql.trim();
        self.responses.get(key).cloned().unwrap_or_else(|| {
            let first_line = key.lines().next().unwrap_or_default().trim();
            MockResponse::Rows(vec![vec![Value::from(first_line)]])
        })
    }
}

#[async_trait]
impl EngineClient for MockEngineClient {
    async fn submit(&self, request: &QueryRequest<'_>) -> Result<Submission> {
        if let Ok(mut submissions) = self.submissions.lock() {
            submissions.push(SubmittedQuery {
                sql: request.sql.to_string(),
                dry_run: request.dry_run,
                disable_cache: request.disable_cache,
            });
        }

        let response = self.response_for(request.sql);

        if request.dry_run {
            return match response {
                MockResponse::SubmitError(msg) => Err(BenchError::engine(msg)),
                MockResponse::DryRunError(msg) => Ok(Submission::DryRun(JobStatus::failed(msg))),
                MockResponse::Rows(rows) | MockResponse::FailAfter { rows, .. } => {
                    Ok(Submission::DryRun(JobStatus::done(Some(scanned_bytes(&rows)))))
                }
            };
        }

        match response {
            MockResponse::SubmitError(msg) | MockResponse::DryRunError(msg) => {
                Err(BenchError::engine(msg))
            }
            MockResponse::Rows(rows) => Ok(Submission::Rows(Box::new(MockRowCursor::new(
                rows, None,
            )))),
            MockResponse::FailAfter { rows, error } => Ok(Submission::Rows(Box::new(
                MockRowCursor::new(rows, Some(error)),
            ))),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Pretend scan size: the bytes of every cell.
fn scanned_bytes(rows: &[Row]) -> i64 {
    rows.iter()
        .flatten()
        .map(|v| v.to_field().len() as i64)
        .sum()
}

/// Cursor over scripted rows.
struct MockRowCursor {
    rows: VecDeque<Row>,
    failure: Option<String>,
    done: bool,
}

impl MockRowCursor {
    fn new(rows: Vec<Row>, failure: Option<String>) -> Self {
        Self {
            rows: rows.into(),
            failure,
            done: false,
        }
    }
}

#[async_trait]
impl RowCursor for MockRowCursor {
    async fn next(&mut self) -> Result<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        if let Some(row) = self.rows.pop_front() {
            return Ok(Some(row));
        }
        self.done = true;
        match self.failure.take() {
            Some(msg) => Err(BenchError::engine(msg)),
            None => Ok(None),
        }
    }
}
