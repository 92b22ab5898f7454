//! Batch execution.
//!
//! Runs every record of a [`Batch`] strictly one after another over a single
//! engine connection, so one query's timings are never skewed by another's.

use std::future::Future;
use tracing::{info, warn};

use crate::config::BenchConfig;
use crate::db::EngineClient;
use crate::error::{BenchError, Result};
use crate::query::record::Batch;
use crate::query::report::ResultReporter;
use crate::query::runner::{ExecutionMode, QueryRunner};

/// Drives a batch through the runner and reporter.
#[derive(Clone, Default)]
pub struct BatchExecutor {
    reporter: ResultReporter,
}

impl BatchExecutor {
    /// Creates an executor that reports through `reporter`.
    pub fn new(reporter: ResultReporter) -> Self {
        Self { reporter }
    }

    /// Executes every record in `batch` in its planned order.
    ///
    /// `connection` is awaited once to open the engine connection, which is
    /// closed again after the last record. A record's failure never stops the
    /// batch; the returned error only says how many records failed.
    pub async fn execute<F>(
        &self,
        batch: &mut Batch,
        mode: ExecutionMode,
        config: &BenchConfig,
        connection: F,
    ) -> Result<()>
    where
        F: Future<Output = Result<Box<dyn EngineClient>>>,
    {
        info!("Establishing query engine connection");
        let client = connection.await?;

        let failed = self.run_all(batch, client.as_ref(), mode, config).await;

        if let Err(e) = client.close().await {
            warn!("Failed to close query engine connection: {e}");
        }

        info!(total = batch.len(), failed, "Query execution complete");
        if failed > 0 {
            return Err(BenchError::Batch {
                failed,
                total: batch.len(),
            });
        }
        Ok(())
    }

    async fn run_all(
        &self,
        batch: &mut Batch,
        client: &dyn EngineClient,
        mode: ExecutionMode,
        config: &BenchConfig,
    ) -> usize {
        let runner = QueryRunner::new(client, config);
        let order = batch.execution_order().to_vec();

        let mut failed = 0;
        for index in order {
            let Some(record) = batch.record_mut(index) else {
                continue;
            };

            runner.execute(record, mode).await;
            self.reporter.report(record, mode);

            if record.is_failed() {
                failed += 1;
            }
        }
        failed
    }
}
