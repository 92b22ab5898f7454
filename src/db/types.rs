//! Result and job types shared by all engine backends.

use std::borrow::Cow;
use std::fmt;

/// A row of data from a query result.
pub type Row = Vec<Value>;

/// A single cell returned by the query engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Scalar value in the engine's canonical text form.
    Text(String),

    /// Nested value (ARRAY / STRUCT) kept as raw JSON.
    Nested(serde_json::Value),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the text written to a result file for this cell.
    ///
    /// NULL is written as an empty field.
    pub fn to_field(&self) -> Cow<'_, str> {
        match self {
            Value::Null => Cow::Borrowed(""),
            Value::Text(s) => Cow::Borrowed(s),
            Value::Nested(v) => Cow::Owned(v.to_string()),
        }
    }

    /// Converts a cell from the REST `{"v": ...}` encoding.
    pub fn from_cell(cell: serde_json::Value) -> Self {
        match cell {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Nested(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            other => write!(f, "{}", other.to_field()),
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

/// Final status of a dry-run job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStatus {
    /// Job state as reported by the engine (e.g., "DONE").
    pub state: String,

    /// Job-level error message, if the engine rejected the query.
    pub error_message: Option<String>,

    /// Bytes the query would scan, when the engine reports it.
    pub total_bytes_processed: Option<i64>,
}

impl JobStatus {
    /// Creates a successful status.
    pub fn done(total_bytes_processed: Option<i64>) -> Self {
        Self {
            state: "DONE".to_string(),
            error_message: None,
            total_bytes_processed,
        }
    }

    /// Creates a failed status.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: "DONE".to_string(),
            error_message: Some(message.into()),
            total_bytes_processed: None,
        }
    }

    /// Returns the job-level error, if any.
    pub fn error(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}
