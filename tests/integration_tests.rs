//! Integration tests for bq-bench.
//!
//! Batch scenarios run against the in-process mock engine. The BigQuery
//! tests need `BIGQUERY_TEST_PROJECT` and `BIGQUERY_ACCESS_TOKEN` and are
//! skipped otherwise.
//!
//! Run with: `cargo test --test integration_tests`

mod integration;
