//! Integration tests for bq-bench.

pub mod batch_test;
pub mod bigquery_test;
