mod batch;
mod cli;
mod config;
mod error;
mod gradio;
mod logging;
mod pacing;
mod pipeline;
mod processor;
mod retry;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Command};
use config::TrellisConfig;
use gradio::GradioConnector;
use pacing::TokioSleeper;
use processor::TrellisProcessor;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = TrellisConfig::load(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);

    let _guard = logging::init(&config.log_level, &config.log_file);

    if let Err(e) = run(&cli, &config).await {
        tracing::error!("Process failed with error: {e:#}");
        return Err(e);
    }
    Ok(())
}

fn apply_overrides(config: &mut TrellisConfig, cli: &Cli) {
    if let Some(space) = &cli.space {
        config.space = space.clone();
    }
    if let Some(max_retries) = cli.max_retries {
        config.retry.max_attempts = max_retries;
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = Some(dir.clone());
    }
    if let Some(log_file) = &cli.log_file {
        config.log_file = log_file.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
}

async fn run(cli: &Cli, config: &TrellisConfig) -> Result<()> {
    let command = cli.effective_command();
    let input_dir = command
        .input_dir()
        .context("failed to resolve the input directory")?;
    let jobs = batch::scan_images(&input_dir)
        .with_context(|| format!("failed to scan {}", input_dir.display()))?;

    if let Command::Scan { .. } = command {
        tracing::info!("{} images in {}", jobs.len(), input_dir.display());
        for job in &jobs {
            tracing::info!("  {} (trial id: {})", job.file_name, job.trial_id);
        }
        return Ok(());
    }

    tracing::info!(space = %config.space, dir = %input_dir.display(), "Starting batch processing...");
    let token = config.token();
    if token.is_none() {
        tracing::warn!("No HF_TOKEN set; calling the Space anonymously");
    }

    let connector = GradioConnector::new(config.space.clone(), token)
        .with_request_timeout(config.request_timeout());
    let mut processor = TrellisProcessor::connect(
        connector,
        TokioSleeper::default(),
        config.processor_settings(),
    )
    .await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after cleanup");
            ctrl_c.cancel();
        }
    });

    let report = batch::run_batch(&mut processor, &jobs, &config.pacing, &cancel).await;
    tracing::info!("Batch processing complete!");
    batch::log_summary(&report);

    if let Some(path) = &cli.report {
        batch::write_report(&report, path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        tracing::info!(report = %path.display(), "Wrote JSON report");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn cli_flags_override_config_file() {
        let cli = Cli::parse_from([
            "trellis-batch",
            "--space",
            "https://my-space.hf.space",
            "--max-retries",
            "2",
            "--output-dir",
            "models",
        ]);
        let mut config = TrellisConfig::default();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.space, "https://my-space.hf.space");
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.output_dir, Some(PathBuf::from("models")));
        assert_eq!(config.log_level, "debug");
    }
}
