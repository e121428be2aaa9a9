//! run_perf_tests entry point

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use verifier_bench::cli::{report, Cli};
use verifier_bench::domain::models::mock_evidence;
use verifier_bench::domain::ports::VerifierTransport;
use verifier_bench::infrastructure::database::VerifierFixtures;
use verifier_bench::infrastructure::{logging, HttpTransport};
use verifier_bench::services::worker::{EvidenceFactory, WorkerPool};
use verifier_bench::{ExecutionConfig, TaskManager};

const DATA_DIR: &str = "data";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Also covers --help/--version; either way the run performed no
            // attestations, which callers detect through the exit status.
            let _ = err.print();
            std::process::exit(1);
        }
    };

    let config = cli.into_config()?;
    logging::init(config.verbose)?;

    info!(
        workers = config.worker_count,
        agents = config.agent_count,
        tasks_per_agent = config.tasks_per_agent,
        verifier = %config.verifier_url,
        "starting performance test run"
    );

    let data_dir = Path::new(DATA_DIR);
    let fixtures = VerifierFixtures::connect(&config, data_dir)
        .await
        .context("failed to reach the verifier's database")?;
    fixtures
        .set_up()
        .await
        .context("failed to seed verifier fixtures")?;

    let run_result = run(&config, data_dir.to_path_buf()).await;

    // Fixture rows must not leak into later runs even when this one failed;
    // a teardown failure itself only warns so the report still prints.
    if let Err(err) = fixtures.tear_down().await {
        warn!(error = %err, "failed to remove verifier fixtures");
    }

    let manager = run_result?;
    report::print_summary(manager.stats());
    info!(
        results = %manager.serializer().file_path().display(),
        "task records written"
    );
    Ok(())
}

/// Launch the worker fleet and drive it to completion.
async fn run(config: &ExecutionConfig, data_dir: PathBuf) -> Result<Arc<TaskManager>> {
    let manager = Arc::new(TaskManager::new(config.clone())?);
    let transport: Arc<dyn VerifierTransport> = Arc::new(HttpTransport::new()?);
    let evidence_factory: EvidenceFactory =
        Arc::new(move || mock_evidence::standard_bundle(&data_dir));

    let pool = WorkerPool::spawn(&manager, &transport, &evidence_factory)?;

    // First interrupt closes admissions and lets in-flight tasks conclude;
    // a second one aborts the process with whatever has been flushed so far.
    let signal_manager = Arc::clone(&manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing in-flight tasks (press again to force quit)");
            signal_manager.disallow_new_tasks();
            if tokio::signal::ctrl_c().await.is_ok() {
                error!("second interrupt, terminating immediately");
                std::process::exit(130);
            }
        }
    });

    tokio::task::spawn_blocking(move || pool.join())
        .await
        .context("worker pool join was aborted")??;

    manager.serializer().write_tasks()?;
    Ok(manager)
}
