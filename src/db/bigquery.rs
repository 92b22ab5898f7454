//! BigQuery engine client implementation.
//!
//! Talks to the BigQuery v2 REST API with reqwest. Live queries go through
//! `jobs.query` and are polled with `jobs.getQueryResults` until complete;
//! dry runs go through `jobs.insert`.

use crate::config::BenchConfig;
use crate::db::{EngineClient, JobStatus, QueryRequest, Row, RowCursor, Submission, Value};
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on how long one request asks the server to wait for job completion.
const MAX_JOB_WAIT_MS: u64 = 10_000;

/// Maximum number of attempts for a result page fetch.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// BigQuery REST client.
#[derive(Debug, Clone)]
pub struct BigQueryClient {
    api: Arc<ApiContext>,
}

/// State shared between the client and its cursors.
#[derive(Debug)]
struct ApiContext {
    http: Client,
    base_url: String,
    access_token: String,
    page_size: u32,
    job_wait_ms: u64,
}

impl BigQueryClient {
    /// Builds a client for the configured project.
    ///
    /// No request is made until the first submission.
    pub fn connect(config: &BenchConfig, access_token: &str) -> Result<Self> {
        config.require_project()?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BenchError::engine(format!("Failed to create HTTP client: {e}")))?;

        // Leave the HTTP timeout room to cover the server-side wait.
        let job_wait_ms =
            (config.request_timeout_secs.saturating_mul(1000) / 2).min(MAX_JOB_WAIT_MS);

        debug!(
            "BigQuery client ready for {} ({})",
            config.project.as_deref().unwrap_or_default(),
            config.api_base_url
        );

        Ok(Self {
            api: Arc::new(ApiContext {
                http,
                base_url: config.api_base_url.clone(),
                access_token: access_token.to_string(),
                page_size: config.page_size,
                job_wait_ms,
            }),
        })
    }

    async fn submit_query(&self, request: &QueryRequest<'_>, project: &str) -> Result<Submission> {
        let body = QueryRequestBody {
            query: request.sql,
            use_legacy_sql: false,
            use_query_cache: !request.disable_cache,
            default_dataset: request.dataset.map(|dataset_id| DatasetReference {
                project_id: project,
                dataset_id,
            }),
            location: request.location,
            max_results: self.api.page_size,
            timeout_ms: self.api.job_wait_ms,
        };

        let url = format!("{}/projects/{}/queries", self.api.base_url, project);
        let mut response: QueryResponse = self.api.send(self.api.post(&url).json(&body)).await?;

        let job = response.job_reference.take();

        if response.job_complete {
            let next_page = first_page_continuation(job.is_some(), response.page_token.take())?;
            return Ok(Submission::Rows(Box::new(BigQueryRowCursor {
                api: Arc::clone(&self.api),
                job,
                buffer: convert_rows(response.rows.take()),
                next_page,
            })));
        }

        let job = job.ok_or_else(|| {
            BenchError::engine("Query did not complete and returned no job reference")
        })?;

        debug!("Waiting for job {} to complete", job.job_id);
        loop {
            let status = self.api.get_query_results(&job, None, Some(0)).await?;
            if status.job_complete {
                break;
            }
        }

        Ok(Submission::Rows(Box::new(BigQueryRowCursor {
            api: Arc::clone(&self.api),
            job: Some(job),
            buffer: VecDeque::new(),
            next_page: NextPage::Start,
        })))
    }

    async fn submit_dry_run(&self, request: &QueryRequest<'_>, project: &str) -> Result<Submission> {
        let body = JobInsertBody {
            job_reference: JobReferenceBody {
                project_id: project,
                location: request.location,
            },
            configuration: JobConfiguration {
                dry_run: true,
                query: JobQueryConfiguration {
                    query: request.sql,
                    use_legacy_sql: false,
                    use_query_cache: !request.disable_cache,
                    default_dataset: request.dataset.map(|dataset_id| DatasetReference {
                        project_id: project,
                        dataset_id,
                    }),
                },
            },
        };

        let url = format!("{}/projects/{}/jobs", self.api.base_url, project);
        let job: JobResource = self.api.send(self.api.post(&url).json(&body)).await?;

        let status = JobStatus {
            state: job.status.state,
            error_message: job.status.error_result.map(|e| e.message),
            total_bytes_processed: job
                .statistics
                .and_then(|s| s.total_bytes_processed)
                .and_then(|b| b.parse().ok()),
        };
        Ok(Submission::DryRun(status))
    }
}

#[async_trait]
impl EngineClient for BigQueryClient {
    async fn submit(&self, request: &QueryRequest<'_>) -> Result<Submission> {
        let project = request
            .project
            .ok_or_else(|| BenchError::config("A project is required for BigQuery"))?;

        if request.dry_run {
            self.submit_dry_run(request, project).await
        } else {
            self.submit_query(request, project).await
        }
    }

    async fn close(&self) -> Result<()> {
        debug!("Closing BigQuery client");
        Ok(())
    }
}

impl ApiContext {
    fn post(&self, url: &str) -> RequestBuilder {
        self.http.post(url).bearer_auth(&self.access_token)
    }

    /// Sends a request and decodes a successful JSON body.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        self.try_send(request).await.map_err(|(e, _)| e)
    }

    /// Like `send`, but also reports whether the failure is worth retrying.
    async fn try_send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, (BenchError, bool)> {
        let response = request.send().await.map_err(|e| {
            let retryable = e.is_timeout() || e.is_connect();
            (BenchError::engine(format!("Request failed: {e}")), retryable)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            (
                BenchError::engine(format!("Failed to read response: {e}")),
                false,
            )
        })?;

        if !status.is_success() {
            return Err(parse_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            (
                BenchError::engine(format!("Failed to parse response: {e}")),
                false,
            )
        })
    }

    /// Calls `jobs.getQueryResults`, retrying transient failures.
    async fn get_query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
        max_results: Option<u32>,
    ) -> Result<QueryResponse> {
        let url = format!(
            "{}/projects/{}/queries/{}",
            self.base_url, job.project_id, job.job_id
        );

        let mut query: Vec<(&str, String)> = vec![("timeoutMs", self.job_wait_ms.to_string())];
        if let Some(location) = &job.location {
            query.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        query.push((
            "maxResults",
            max_results.unwrap_or(self.page_size).to_string(),
        ));

        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;
        loop {
            let request = self
                .http
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&query);

            match self.try_send(request).await {
                Ok(response) => return Ok(response),
                Err((error, retryable)) => {
                    if !retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        return Err(error);
                    }
                    warn!(
                        "Result fetch attempt {} failed (transient error), retrying in {:?}: {}",
                        attempt, delay, error
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
            }
        }
    }
}

/// Maps an API error response to an engine error and a retryable flag.
fn parse_error(status: StatusCode, body: &str) -> (BenchError, bool) {
    if status == StatusCode::UNAUTHORIZED {
        return (
            BenchError::engine("Authentication failed. Check your access token."),
            false,
        );
    }

    let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();

    if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(body) {
        return (
            BenchError::engine(format!(
                "BigQuery API error ({}): {}",
                status.as_u16(),
                error_response.error.message
            )),
            retryable,
        );
    }

    (
        BenchError::engine(format!("BigQuery API error ({status}): {body}")),
        retryable,
    )
}

fn convert_rows(rows: Option<Vec<TableRow>>) -> VecDeque<Row> {
    rows.unwrap_or_default()
        .into_iter()
        .map(|row| row.f.into_iter().map(|cell| Value::from_cell(cell.v)).collect())
        .collect()
}

/// Decides how a cursor continues after the rows inlined in `jobs.query`.
///
/// Later pages can only be fetched through the job, so a page token without
/// a job reference is an error rather than a truncated result.
fn first_page_continuation(has_job: bool, page_token: Option<String>) -> Result<NextPage> {
    match (has_job, page_token) {
        (_, None) => Ok(NextPage::Exhausted),
        (true, Some(token)) => Ok(NextPage::Token(token)),
        (false, Some(_)) => Err(BenchError::engine(
            "Query returned more result pages but no job reference to fetch them",
        )),
    }
}

/// Where the cursor resumes once its buffer is drained.
#[derive(Debug, PartialEq, Eq)]
enum NextPage {
    /// No page fetched yet.
    Start,
    Token(String),
    Exhausted,
}

/// Cursor that pages through a completed query's results.
struct BigQueryRowCursor {
    api: Arc<ApiContext>,
    job: Option<JobReference>,
    buffer: VecDeque<Row>,
    next_page: NextPage,
}

#[async_trait]
impl RowCursor for BigQueryRowCursor {
    async fn next(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Ok(Some(row));
            }

            let token = match std::mem::replace(&mut self.next_page, NextPage::Exhausted) {
                NextPage::Exhausted => return Ok(None),
                NextPage::Start => None,
                NextPage::Token(token) => Some(token),
            };
            let Some(job) = &self.job else {
                return Ok(None);
            };

            let mut page = self
                .api
                .get_query_results(job, token.as_deref(), None)
                .await?;

            self.buffer = convert_rows(page.rows.take());
            if let Some(token) = page.page_token.take() {
                self.next_page = NextPage::Token(token);
            }
        }
    }
}

// === Wire types ===

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference<'a> {
    project_id: &'a str,
    dataset_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequestBody<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    use_query_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_dataset: Option<DatasetReference<'a>>,
    location: &'a str,
    max_results: u32,
    timeout_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobInsertBody<'a> {
    job_reference: JobReferenceBody<'a>,
    configuration: JobConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobReferenceBody<'a> {
    project_id: &'a str,
    location: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobConfiguration<'a> {
    dry_run: bool,
    query: JobQueryConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobQueryConfiguration<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    use_query_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_dataset: Option<DatasetReference<'a>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    rows: Option<Vec<TableRow>>,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JobResource {
    #[serde(default)]
    status: JobStatusBody,
    #[serde(default)]
    statistics: Option<JobStatistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusBody {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatistics {
    #[serde(default)]
    total_bytes_processed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorProto,
}
