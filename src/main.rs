//! bqbench - run a batch of SQL files against BigQuery and time each one.

use bq_bench::cli::Cli;
use bq_bench::config::Config;
use bq_bench::db;
use bq_bench::error::{BenchError, Result};
use bq_bench::logging;
use bq_bench::query::{self, BatchExecutor, BatchSummary, ExecutionMode};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => logging::init_file_logging(path, &cli.log_level),
        None => logging::init_stderr_logging(&cli.log_level),
    }

    if let Err(e) = run(&cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    // Load configuration file
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let file = Config::load_from_file(&config_path)?;
    let config = cli.resolve_config(&file)?;

    let mut batch = query::load(&config.input, &config.output)?;
    info!(
        queries = batch.len(),
        run_directory = %batch.run_directory().display(),
        "Loaded queries from {}",
        config.input
    );

    if config.shuffle {
        batch.plan_execution_order(true);
        info!("Query execution order shuffle complete");
    }

    let mode = ExecutionMode::from_config(&config);
    let token = cli.access_token();
    let result = BatchExecutor::default()
        .execute(
            &mut batch,
            mode,
            &config,
            db::connect(cli.backend(), &config, token.as_deref()),
        )
        .await;

    // Anything other than per-query failures means nothing useful ran.
    if let Err(e) = &result {
        if !matches!(e, BenchError::Batch { .. }) {
            return result;
        }
    }

    let summary = BatchSummary::from_batch(&batch, mode);
    summary.log();
    if let Some(path) = &cli.report_file {
        summary.write_json(path)?;
        info!("Wrote batch report to {}", path.display());
    }

    result
}
