//! Query engine abstraction layer for bq-bench.
//!
//! Provides a trait-based interface for submitting queries, allowing the
//! benchmark core to run against BigQuery or an in-process mock engine.

mod bigquery;
mod mock;
mod types;

pub use bigquery::BigQueryClient;
pub use mock::{MockEngineClient, MockResponse, SubmittedQuery};
pub use types::{JobStatus, Row, Value};

use crate::config::BenchConfig;
use crate::error::{BenchError, Result};
use async_trait::async_trait;

/// Supported query engine backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineBackend {
    #[default]
    BigQuery,
    /// Deterministic in-process engine for smoke tests.
    Mock,
}

impl EngineBackend {
    /// Returns the backend as a string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BigQuery => "bigquery",
            Self::Mock => "mock",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bigquery" | "bq" => Some(Self::BigQuery),
            "mock" => Some(Self::Mock),
            _ => None,
        }
    }
}

/// Creates an engine client for the given backend and configuration.
///
/// This is the central factory function for engine connections.
pub async fn connect(
    backend: EngineBackend,
    config: &BenchConfig,
    access_token: Option<&str>,
) -> Result<Box<dyn EngineClient>> {
    match backend {
        EngineBackend::BigQuery => {
            let token = access_token.filter(|t| !t.is_empty()).ok_or_else(|| {
                BenchError::config(
                    "An access token is required (use --access-token or set BIGQUERY_ACCESS_TOKEN)",
                )
            })?;
            let client = BigQueryClient::connect(config, token)?;
            Ok(Box::new(client))
        }
        EngineBackend::Mock => Ok(Box::new(MockEngineClient::new())),
    }
}

/// Parameters for one query submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest<'a> {
    pub sql: &'a str,
    pub project: Option<&'a str>,
    pub dataset: Option<&'a str>,
    pub location: &'a str,
    pub disable_cache: bool,
    pub dry_run: bool,
}

impl<'a> QueryRequest<'a> {
    /// Builds a request for `sql` using the run configuration.
    pub fn new(sql: &'a str, config: &'a BenchConfig, dry_run: bool) -> Self {
        Self {
            sql,
            project: config.project.as_deref(),
            dataset: config.dataset.as_deref(),
            location: &config.location,
            disable_cache: config.disable_query_cache,
            dry_run,
        }
    }
}

/// What the engine hands back for a submission.
pub enum Submission {
    /// Completed live query; rows are fetched lazily.
    Rows(Box<dyn RowCursor>),
    /// Dry-run job status.
    DryRun(JobStatus),
}

impl std::fmt::Debug for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rows(_) => f.write_str("Submission::Rows(..)"),
            Self::DryRun(status) => f.debug_tuple("Submission::DryRun").field(status).finish(),
        }
    }
}

/// Trait defining the interface for query engine clients.
///
/// All operations are async and return Results with BenchError.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Submits a query.
    ///
    /// Live submissions return once the engine reports the job complete, with a
    /// cursor over the result rows. Dry-run submissions return the job status.
    async fn submit(&self, request: &QueryRequest<'_>) -> Result<Submission>;

    /// Releases the engine connection.
    async fn close(&self) -> Result<()>;
}

/// A lazy, forward-only cursor over result rows.
#[async_trait]
pub trait RowCursor: Send {
    /// Fetches the next row, or `None` once the result is exhausted.
    ///
    /// Calls after exhaustion keep returning `None`.
    async fn next(&mut self) -> Result<Option<Row>>;
}
