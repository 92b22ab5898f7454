//! Query loading, ordering, execution and reporting for bq-bench.
//!
//! Data flows loader → planner → executor, which drives the runner and the
//! reporter for one record at a time.

pub mod executor;
pub mod loader;
pub mod planner;
pub mod record;
pub mod report;
pub mod runner;

pub use executor::BatchExecutor;
pub use loader::{load, load_at};
pub use record::{Batch, QueryRecord};
pub use report::{BatchSummary, CollectingSink, QueryReport, ReportSink, ResultReporter, TracingSink};
pub use runner::{ExecutionMode, QueryRunner};
