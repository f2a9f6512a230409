//! `corpus-ingest <job.yaml> [config.yaml]`

use anyhow::{bail, Context};
use corpus_ingest_lib::config::{JobSpec, Settings};
use corpus_ingest_lib::error::IngestError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(job_path) = args.next().map(PathBuf::from) else {
        bail!("usage: corpus-ingest <job.yaml> [config.yaml]");
    };
    let config_path = args.next().map(PathBuf::from);

    let project_dir = std::env::current_dir().context("Failed to resolve working directory")?;
    let settings = Settings::load(config_path.as_deref(), &project_dir)
        .context("Failed to load settings")?;
    let job = JobSpec::load(&job_path)
        .with_context(|| format!("Failed to load job file {}", job_path.display()))?;

    corpus_ingest_lib::preflight(&settings, job.use_ai)
        .await
        .context("Summarization provider is not ready")?;
    let orchestrator = corpus_ingest_lib::build_orchestrator(&settings, job.use_ai)
        .context("Failed to set up pipeline")?;

    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, finishing current window");
            cancel.cancel();
        }
    });

    match orchestrator.run(&job).await {
        Ok(report) if report.cancelled => {
            Err(anyhow::Error::new(IngestError::Cancelled).context("Rerun with resume: true to continue"))
        }
        Ok(report) => {
            if !report.is_clean() {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(aborted) => {
            log::error!(
                "{} ({} items checkpointed, rerun with resume: true)",
                aborted,
                aborted.checkpoint.len()
            );
            std::process::exit(1);
        }
    }
}
