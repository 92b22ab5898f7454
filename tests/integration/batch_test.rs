//! End-to-end batch tests: load query files, run them against the mock
//! engine, and inspect the records and result files left behind.

use std::fs;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use bq_bench::config::BenchConfig;
use bq_bench::db::{EngineClient, MockEngineClient, MockResponse, Value};
use bq_bench::error::{BenchError, Result};
use bq_bench::query::{
    self, BatchExecutor, BatchSummary, CollectingSink, ExecutionMode, ResultReporter,
};
use chrono::{Local, TimeZone};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

/// Writes query files into a fresh directory.
fn query_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, sql) in files {
        fs::write(dir.path().join(name), sql).unwrap();
    }
    dir
}

fn pattern(dir: &TempDir) -> String {
    format!("{}/*.sql", dir.path().display())
}

fn connect(client: &MockEngineClient) -> impl Future<Output = Result<Box<dyn EngineClient>>> {
    let client = client.clone();
    async move { Ok(Box::new(client) as Box<dyn EngineClient>) }
}

fn list_dir(path: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(path)
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

const ABC: [(&str, &str); 3] = [
    ("a.sql", "SELECT 'a'"),
    ("b.sql", "SELECT 'b'"),
    ("c.sql", "SELECT 'c'"),
];

/// Scenario: three query files, no shuffle
/// Given a.sql, b.sql and c.sql
/// When the batch is loaded and executed
/// Then the execution order is [0, 1, 2]
/// And each query writes results-query-00000N.output in the run directory
#[tokio::test]
async fn test_three_files_in_discovery_order() {
    let input = query_dir(&ABC);
    let output = TempDir::new().unwrap();
    let client = MockEngineClient::new();

    let mut batch = query::load(&pattern(&input), output.path()).unwrap();
    assert_eq!(batch.execution_order(), &[0, 1, 2]);

    BatchExecutor::default()
        .execute(
            &mut batch,
            ExecutionMode::Live,
            &BenchConfig::default(),
            connect(&client),
        )
        .await
        .unwrap();

    assert_eq!(
        list_dir(batch.run_directory()),
        vec![
            "results-query-000001.output",
            "results-query-000002.output",
            "results-query-000003.output",
        ]
    );
    let first = fs::read_to_string(batch.run_directory().join("results-query-000001.output"))
        .unwrap();
    assert_eq!(first, "SELECT 'a'\n");

    let submitted: Vec<String> = client.submissions().into_iter().map(|s| s.sql).collect();
    assert_eq!(submitted, vec!["SELECT 'a'", "SELECT 'b'", "SELECT 'c'"]);
    assert!(client.is_closed());
}

/// Scenario: one submission fails
/// Given the engine refuses the second query
/// When the batch runs
/// Then queries 1 and 3 still run and write output
/// And the batch fails with exactly one failed record (sequence 2)
#[tokio::test]
async fn test_failed_submission_is_isolated() {
    let input = query_dir(&ABC);
    let output = TempDir::new().unwrap();
    let client = MockEngineClient::new().with_response(
        "SELECT 'b'",
        MockResponse::SubmitError("dial tcp: connection refused".into()),
    );
    let sink = CollectingSink::new();

    let mut batch = query::load(&pattern(&input), output.path()).unwrap();
    let result = BatchExecutor::new(ResultReporter::new(Arc::new(sink.clone())))
        .execute(
            &mut batch,
            ExecutionMode::Live,
            &BenchConfig::default(),
            connect(&client),
        )
        .await;

    assert!(matches!(
        result,
        Err(BenchError::Batch {
            failed: 1,
            total: 3
        })
    ));

    let records = batch.records();
    assert!(records[0].error.is_none());
    assert!(records[0].output_path.exists());
    assert!(matches!(records[1].error, Some(BenchError::Engine(_))));
    assert!(!records[1].output_path.exists());
    assert!(records[2].error.is_none());
    assert!(records[2].output_path.exists());

    let reports = sink.reports();
    assert_eq!(reports.len(), 3);
    assert!(reports[1].is_failure());

    let summary = BatchSummary::from_batch(&batch, ExecutionMode::Live);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failed_sequences, vec![2]);
}

/// Scenario: a live query returns no rows
/// Then the output file exists and is empty
/// And row_count is 0, first_row_time unset, last_row_time set, no error
#[tokio::test]
async fn test_zero_row_query() {
    let input = query_dir(&[("empty.sql", "SELECT * FROM t WHERE FALSE")]);
    let output = TempDir::new().unwrap();
    let client = MockEngineClient::new()
        .with_response("SELECT * FROM t WHERE FALSE", MockResponse::Rows(vec![]));

    let mut batch = query::load(&pattern(&input), output.path()).unwrap();
    BatchExecutor::default()
        .execute(
            &mut batch,
            ExecutionMode::Live,
            &BenchConfig::default(),
            connect(&client),
        )
        .await
        .unwrap();

    let record = &batch.records()[0];
    assert!(record.error.is_none());
    assert_eq!(record.row_count, 0);
    assert!(record.first_row_time.is_none());
    assert!(record.last_row_time.is_some());
    assert_eq!(fs::read_to_string(&record.output_path).unwrap(), "");
}

/// Shuffling reorders execution but never changes output paths.
#[tokio::test]
async fn test_shuffle_preserves_output_paths() {
    let files: Vec<(String, String)> = (1..=12)
        .map(|i| (format!("q{i:02}.sql"), format!("SELECT {i}")))
        .collect();
    let refs: Vec<(&str, &str)> = files
        .iter()
        .map(|(n, s)| (n.as_str(), s.as_str()))
        .collect();
    let input = query_dir(&refs);
    let output = TempDir::new().unwrap();
    let run_start = Local.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();

    let plain = query::load_at(&pattern(&input), output.path(), run_start).unwrap();
    let mut shuffled = query::load_at(&pattern(&input), output.path(), run_start).unwrap();
    shuffled.plan_execution_order_with(true, &mut StdRng::seed_from_u64(99));

    let mut order = shuffled.execution_order().to_vec();
    assert_eq!(order.len(), 12);
    order.sort_unstable();
    assert_eq!(order, (0..12).collect::<Vec<_>>());

    for (a, b) in plain.records().iter().zip(shuffled.records()) {
        assert_eq!(a.sequence, b.sequence);
        assert_eq!(a.output_path, b.output_path);
    }

    let client = MockEngineClient::new();
    BatchExecutor::default()
        .execute(
            &mut shuffled,
            ExecutionMode::Live,
            &BenchConfig::default(),
            connect(&client),
        )
        .await
        .unwrap();

    // Each file still holds its own query's result.
    for record in shuffled.records() {
        let contents = fs::read_to_string(&record.output_path).unwrap();
        assert_eq!(contents.trim_end(), record.sql);
    }
}

/// Dry runs never create or modify result files, however often they run.
#[tokio::test]
async fn test_dry_run_is_idempotent() {
    let input = query_dir(&ABC);
    let output = TempDir::new().unwrap();
    let client = MockEngineClient::new();
    let config = BenchConfig {
        dry_run: true,
        ..Default::default()
    };

    for _ in 0..2 {
        let mut batch = query::load(&pattern(&input), output.path()).unwrap();
        BatchExecutor::default()
            .execute(
                &mut batch,
                ExecutionMode::from_config(&config),
                &config,
                connect(&client),
            )
            .await
            .unwrap();

        for record in batch.records() {
            assert!(record.error.is_none());
            assert_eq!(record.row_count, 0);
            assert!(record.end_time.is_some());
        }
    }

    assert!(list_dir(output.path()).is_empty());
    assert_eq!(client.submissions().len(), 6);
    assert!(client.submissions().iter().all(|s| s.dry_run));
}

/// A dry-run job error fails only that record.
#[tokio::test]
async fn test_dry_run_job_error() {
    let input = query_dir(&ABC);
    let output = TempDir::new().unwrap();
    let client = MockEngineClient::new().with_response(
        "SELECT 'c'",
        MockResponse::DryRunError("Not found: Table proj:ds.c".into()),
    );

    let mut batch = query::load(&pattern(&input), output.path()).unwrap();
    let result = BatchExecutor::default()
        .execute(
            &mut batch,
            ExecutionMode::DryRun,
            &BenchConfig::default(),
            connect(&client),
        )
        .await;

    assert!(matches!(result, Err(BenchError::Batch { failed: 1, .. })));
    let failed: Vec<usize> = batch.failed_records().map(|r| r.sequence).collect();
    assert_eq!(failed, vec![3]);
}

/// The failure count equals the number of records carrying an error, and a
/// mid-stream failure never reports more rows than reached the file.
#[tokio::test]
async fn test_failure_count_and_partial_output() {
    let input = query_dir(&[
        ("1.sql", "SELECT ok"),
        ("2.sql", "SELECT partial"),
        ("3.sql", "SELECT refused"),
        ("4.sql", "SELECT ok_too"),
    ]);
    let output = TempDir::new().unwrap();
    let client = MockEngineClient::new()
        .with_response(
            "SELECT partial",
            MockResponse::FailAfter {
                rows: vec![
                    vec![Value::from("1"), Value::from("x")],
                    vec![Value::from("2"), Value::Null],
                    vec![Value::from("3"), Value::from("z")],
                ],
                error: "Response too large to return".into(),
            },
        )
        .with_response("SELECT refused", MockResponse::SubmitError("quota exceeded".into()));
    let config = BenchConfig {
        delimiter: b'\t',
        ..Default::default()
    };

    let mut batch = query::load(&pattern(&input), output.path()).unwrap();
    let result = BatchExecutor::default()
        .execute(&mut batch, ExecutionMode::Live, &config, connect(&client))
        .await;

    let failed_count = batch.records().iter().filter(|r| r.error.is_some()).count();
    assert_eq!(failed_count, 2);
    assert!(matches!(
        result,
        Err(BenchError::Batch {
            failed: 2,
            total: 4
        })
    ));

    let partial = &batch.records()[1];
    let contents = fs::read_to_string(&partial.output_path).unwrap();
    assert_eq!(contents, "1\tx\n2\t\n3\tz\n");
    assert!(partial.row_count <= contents.lines().count() as u64);
    assert!(partial.first_row_time.is_some());
    assert!(partial.last_row_time.is_none());
}

/// Load errors abort before any connection is made.
#[tokio::test]
async fn test_malformed_pattern_aborts_load() {
    let output = TempDir::new().unwrap();
    let result = query::load("queries/[*.sql", output.path());
    assert!(matches!(result, Err(BenchError::Discovery(_))));
}

/// The JSON batch report lists every query.
#[tokio::test]
async fn test_report_file() {
    let input = query_dir(&ABC);
    let output = TempDir::new().unwrap();
    let client = MockEngineClient::new();

    let mut batch = query::load(&pattern(&input), output.path()).unwrap();
    BatchExecutor::default()
        .execute(
            &mut batch,
            ExecutionMode::Live,
            &BenchConfig::default(),
            connect(&client),
        )
        .await
        .unwrap();

    let report_path = output.path().join("report.json");
    BatchSummary::from_batch(&batch, ExecutionMode::Live)
        .write_json(&report_path)
        .unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(json["total"], 3);
    assert_eq!(json["failed"], 0);
    assert_eq!(json["execution_order"], serde_json::json!([1, 2, 3]));
    assert_eq!(json["reports"].as_array().unwrap().len(), 3);
}
