//! Configuration management for bq-bench.
//!
//! Handles loading benchmark settings from TOML files and environment variables,
//! and resolving them into the validated [`BenchConfig`] consumed by the runner.

use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Default BigQuery REST endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

const DEFAULT_INPUT: &str = "*.sql";
const DEFAULT_LOCATION: &str = "US";
const DEFAULT_DELIMITER: char = ',';
const DEFAULT_PAGE_SIZE: u32 = 10_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Main configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Benchmark run settings.
    #[serde(default)]
    pub bench: BenchSettings,
}

/// Unresolved benchmark settings, as read from a config file or the command line.
///
/// Every field is optional so that layers can be merged before defaults apply.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BenchSettings {
    /// Glob pattern selecting the query files.
    pub input: Option<String>,

    /// Root directory for timestamped result directories.
    pub output: Option<PathBuf>,

    /// Project the queries are billed to and resolved against.
    pub project: Option<String>,

    /// Default dataset for unqualified table names.
    pub dataset: Option<String>,

    /// Processing location (e.g., "US", "EU", "australia-southeast1").
    pub location: Option<String>,

    /// Bypass the engine's result cache.
    pub disable_query_cache: Option<bool>,

    /// Validate and plan only, without materializing results.
    pub dry_run: Option<bool>,

    /// Field delimiter for the result files.
    pub delimiter: Option<char>,

    /// Randomize the execution order.
    pub shuffle: Option<bool>,

    /// Rows requested per result page.
    pub page_size: Option<u32>,

    /// HTTP request timeout in seconds.
    pub request_timeout_secs: Option<u64>,

    /// Override for the REST endpoint (useful for emulators).
    pub api_base_url: Option<String>,
}

impl BenchSettings {
    /// Merges another layer into this one, with the other taking precedence.
    pub fn merge(&mut self, other: &BenchSettings) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        take!(
            input,
            output,
            project,
            dataset,
            location,
            disable_query_cache,
            dry_run,
            delimiter,
            shuffle,
            page_size,
            request_timeout_secs,
            api_base_url
        );
    }

    /// Applies environment variables (GOOGLE_CLOUD_PROJECT, etc.) as defaults.
    pub fn apply_env_defaults(&mut self) {
        if self.project.is_none() {
            self.project = std::env::var("GOOGLE_CLOUD_PROJECT").ok();
        }
        if self.dataset.is_none() {
            self.dataset = std::env::var("BIGQUERY_DATASET").ok();
        }
        if self.location.is_none() {
            self.location = std::env::var("BIGQUERY_LOCATION").ok();
        }
    }

    /// Fills in defaults and validates the result.
    pub fn resolve(self) -> Result<BenchConfig> {
        let delimiter = validate_delimiter(self.delimiter.unwrap_or(DEFAULT_DELIMITER))?;

        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(BenchError::config("page_size must be greater than zero"));
        }

        let request_timeout_secs = self
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if request_timeout_secs == 0 {
            return Err(BenchError::config(
                "request_timeout_secs must be greater than zero",
            ));
        }

        let api_base_url = self
            .api_base_url
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        Url::parse(&api_base_url)
            .map_err(|e| BenchError::config(format!("Invalid api_base_url: {e}")))?;

        Ok(BenchConfig {
            input: self.input.unwrap_or_else(|| DEFAULT_INPUT.to_string()),
            output: self.output.unwrap_or_else(|| PathBuf::from(".")),
            project: self.project.filter(|p| !p.is_empty()),
            dataset: self.dataset.filter(|d| !d.is_empty()),
            location: self
                .location
                .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            disable_query_cache: self.disable_query_cache.unwrap_or(false),
            dry_run: self.dry_run.unwrap_or(false),
            delimiter,
            shuffle: self.shuffle.unwrap_or(false),
            page_size,
            request_timeout_secs,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Validated settings for one benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    pub input: String,
    pub output: PathBuf,
    pub project: Option<String>,
    pub dataset: Option<String>,
    pub location: String,
    pub disable_query_cache: bool,
    pub dry_run: bool,
    /// Single-byte field delimiter for the result writer.
    pub delimiter: u8,
    pub shuffle: bool,
    pub page_size: u32,
    pub request_timeout_secs: u64,
    pub api_base_url: String,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            input: DEFAULT_INPUT.to_string(),
            output: PathBuf::from("."),
            project: None,
            dataset: None,
            location: DEFAULT_LOCATION.to_string(),
            disable_query_cache: false,
            dry_run: false,
            delimiter: DEFAULT_DELIMITER as u8,
            shuffle: false,
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

impl BenchConfig {
    /// Returns the project, or a configuration error if none was given.
    pub fn require_project(&self) -> Result<&str> {
        self.project.as_deref().ok_or_else(|| {
            BenchError::config(
                "A project is required (use --project or set GOOGLE_CLOUD_PROJECT)",
            )
        })
    }
}

/// Checks that a delimiter can be written as a single unquoted byte.
fn validate_delimiter(c: char) -> Result<u8> {
    if !c.is_ascii() {
        return Err(BenchError::config(format!(
            "Delimiter '{c}' must be a single ASCII character"
        )));
    }
    if matches!(c, '"' | '\r' | '\n') {
        return Err(BenchError::config(format!(
            "Delimiter {c:?} conflicts with the result file quoting rules"
        )));
    }
    Ok(c as u8)
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bq-bench")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| BenchError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            BenchError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }
}
