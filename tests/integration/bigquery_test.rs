//! Tests against a live BigQuery project.
//!
//! Set `BIGQUERY_TEST_PROJECT` and `BIGQUERY_ACCESS_TOKEN` to run them;
//! otherwise each test prints a note and returns.

use std::fs;

use bq_bench::config::BenchConfig;
use bq_bench::db::{self, EngineBackend, EngineClient};
use bq_bench::error::{BenchError, Result};
use bq_bench::query::{self, BatchExecutor, ExecutionMode};
use tempfile::TempDir;

fn live_settings() -> Option<(BenchConfig, String)> {
    let project = std::env::var("BIGQUERY_TEST_PROJECT").ok()?;
    let token = std::env::var("BIGQUERY_ACCESS_TOKEN").ok()?;
    let config = BenchConfig {
        project: Some(project),
        disable_query_cache: true,
        ..Default::default()
    };
    Some((config, token))
}

async fn connect(config: &BenchConfig, token: &str) -> Result<Box<dyn EngineClient>> {
    db::connect(EngineBackend::BigQuery, config, Some(token)).await
}

#[tokio::test]
async fn test_live_query_writes_rows() {
    let Some((config, token)) = live_settings() else {
        eprintln!("Skipping: BIGQUERY_TEST_PROJECT and BIGQUERY_ACCESS_TOKEN not set");
        return;
    };

    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    fs::write(
        input.path().join("two_rows.sql"),
        "SELECT n, CONCAT('row ', CAST(n AS STRING)) AS label FROM UNNEST([1, 2]) AS n ORDER BY n",
    )
    .unwrap();

    let mut batch = query::load(&format!("{}/*.sql", input.path().display()), output.path()).unwrap();
    BatchExecutor::default()
        .execute(&mut batch, ExecutionMode::Live, &config, connect(&config, &token))
        .await
        .unwrap();

    let record = &batch.records()[0];
    assert_eq!(record.row_count, 2);
    assert!(record.first_row_time.is_some());
    assert!(record.submission_duration().is_some());
    assert_eq!(
        fs::read_to_string(&record.output_path).unwrap(),
        "1,row 1\n2,row 2\n"
    );
}

#[tokio::test]
async fn test_live_dry_run_reports_bytes() {
    let Some((config, token)) = live_settings() else {
        eprintln!("Skipping: BIGQUERY_TEST_PROJECT and BIGQUERY_ACCESS_TOKEN not set");
        return;
    };

    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    fs::write(input.path().join("dry.sql"), "SELECT 1").unwrap();

    let mut batch = query::load(&format!("{}/*.sql", input.path().display()), output.path()).unwrap();
    BatchExecutor::default()
        .execute(&mut batch, ExecutionMode::DryRun, &config, connect(&config, &token))
        .await
        .unwrap();

    let record = &batch.records()[0];
    assert!(record.error.is_none());
    assert!(record.bytes_processed.is_some());
    assert!(!batch.run_directory().exists());
}

#[tokio::test]
async fn test_live_invalid_sql_fails_record() {
    let Some((config, token)) = live_settings() else {
        eprintln!("Skipping: BIGQUERY_TEST_PROJECT and BIGQUERY_ACCESS_TOKEN not set");
        return;
    };

    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    fs::write(input.path().join("bad.sql"), "SELEC nonsense").unwrap();
    fs::write(input.path().join("good.sql"), "SELECT 1").unwrap();

    let mut batch = query::load(&format!("{}/*.sql", input.path().display()), output.path()).unwrap();
    let result = BatchExecutor::default()
        .execute(&mut batch, ExecutionMode::Live, &config, connect(&config, &token))
        .await;

    assert!(matches!(result, Err(BenchError::Batch { failed: 1, total: 2 })));
    assert!(batch.records()[0].is_failed());
    assert_eq!(batch.records()[1].row_count, 1);
}
