//! bq-bench - sequential SQL benchmark runner for BigQuery.
//!
//! This library exposes the core modules for use by the binary and
//! integration tests.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod query;
