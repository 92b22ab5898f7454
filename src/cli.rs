//! Command-line argument parsing for bq-bench.
//!
//! Uses clap to parse CLI arguments and merges them over the config file.

use crate::config::{BenchConfig, BenchSettings, Config};
use crate::db::EngineBackend;
use crate::error::Result;
use clap::Parser;
use std::path::PathBuf;

/// Runs a directory of SQL queries against BigQuery and records their timings.
#[derive(Parser, Debug)]
#[command(name = "bqbench")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Glob pattern selecting the query files (e.g., "queries/*.sql")
    #[arg(short = 'i', long, value_name = "GLOB")]
    pub input: Option<String>,

    /// Root directory for result files; each run gets a timestamped subdirectory
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Project to run the queries in
    #[arg(short = 'p', long, value_name = "PROJECT")]
    pub project: Option<String>,

    /// Default dataset for unqualified table names
    #[arg(short = 'd', long, value_name = "DATASET")]
    pub dataset: Option<String>,

    /// Processing location (e.g., US, EU)
    #[arg(short = 'l', long, value_name = "LOCATION")]
    pub location: Option<String>,

    /// Bypass the query result cache
    #[arg(long)]
    pub disable_query_cache: bool,

    /// Validate and plan the queries without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Result file field delimiter (a single character, or "\t" / "tab")
    #[arg(long, value_name = "CHAR", value_parser = parse_delimiter)]
    pub delimiter: Option<char>,

    /// Run the queries in random order
    #[arg(long)]
    pub shuffle: bool,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// OAuth access token for the BigQuery API
    #[arg(long, value_name = "TOKEN", env = "BIGQUERY_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Use the in-process mock engine (for smoke testing)
    #[arg(long)]
    pub mock_engine: bool,

    /// Write a JSON report of the batch to this file
    #[arg(long, value_name = "PATH")]
    pub report_file: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

/// Parses a delimiter argument, accepting `\t` and `tab` for a tab.
fn parse_delimiter(s: &str) -> std::result::Result<char, String> {
    match s {
        "\\t" | "tab" => return Ok('\t'),
        _ => {}
    }
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(format!("Delimiter must be a single character, got '{s}'")),
    }
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Returns the engine backend selected on the command line.
    pub fn backend(&self) -> EngineBackend {
        if self.mock_engine {
            EngineBackend::Mock
        } else {
            EngineBackend::BigQuery
        }
    }

    /// Returns the access token, falling back to GOOGLE_OAUTH_ACCESS_TOKEN.
    pub fn access_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .or_else(|| std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN").ok())
    }

    /// Converts CLI arguments to a settings layer.
    ///
    /// Boolean switches only override the config file when present.
    pub fn to_settings(&self) -> BenchSettings {
        BenchSettings {
            input: self.input.clone(),
            output: self.output.clone(),
            project: self.project.clone(),
            dataset: self.dataset.clone(),
            location: self.location.clone(),
            disable_query_cache: self.disable_query_cache.then_some(true),
            dry_run: self.dry_run.then_some(true),
            delimiter: self.delimiter,
            shuffle: self.shuffle.then_some(true),
            ..Default::default()
        }
    }

    /// Resolves the final run configuration with precedence:
    /// 1. CLI arguments (highest)
    /// 2. Config file
    /// 3. Environment variables
    /// 4. Built-in defaults
    pub fn resolve_config(&self, file: &Config) -> Result<BenchConfig> {
        let mut settings = file.bench.clone();
        settings.merge(&self.to_settings());
        settings.apply_env_defaults();

        let config = settings.resolve()?;
        if self.backend() == EngineBackend::BigQuery {
            config.require_project()?;
        }
        Ok(config)
    }
}
