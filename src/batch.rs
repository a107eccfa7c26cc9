//! Batch runner: finds the images in a directory and feeds them to the
//! processor one at a time, with pacing between files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::BatchError;
use crate::gradio::Connector;
use crate::pacing::{Sleeper, WaitReason};
use crate::pipeline::{BatchReport, Job};
use crate::processor::TrellisProcessor;
use crate::retry::{secs, uniform};

/// Extensions accepted as input images, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Waits between files, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Uniform wait before every file but the first.
    pub between_files_secs: (f64, f64),
    /// Wait after a file fails.
    pub after_failure_secs: f64,
    /// Pause after the heavy pipeline steps.
    pub step_pause_secs: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            between_files_secs: (150.0, 210.0),
            after_failure_secs: 45.0,
            step_pause_secs: 10.0,
        }
    }
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// List the images directly inside `dir`, sorted by file name.
pub fn scan_images(dir: &Path) -> Result<Vec<Job>, BatchError> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        // Follows symlinks; a dangling link is skipped.
        if !path.is_file() {
            continue;
        }
        if is_image(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths.into_iter().map(Job::new).collect())
}

/// Process `jobs` in order and return what happened.
///
/// Cancelling `cancel` stops the batch: the file in flight is dropped
/// from the report and the partial report is returned.
pub async fn run_batch<C: Connector, S: Sleeper>(
    processor: &mut TrellisProcessor<C, S>,
    jobs: &[Job],
    pacing: &PacingConfig,
    cancel: &CancellationToken,
) -> BatchReport {
    let mut report = BatchReport::new();
    if jobs.is_empty() {
        tracing::warn!("No images found to process");
        report.finish(false);
        return report;
    }
    tracing::info!(run_id = %report.run_id, "Found {} images to process", jobs.len());

    let mut interrupted = false;
    for (idx, job) in jobs.iter().enumerate() {
        if cancel.is_cancelled() {
            interrupted = true;
            break;
        }

        if idx > 0 {
            let wait = secs(uniform(&mut rand::rng(), pacing.between_files_secs));
            tracing::info!("Waiting {:.1}s before next file...", wait.as_secs_f64());
            let cancelled = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = processor.sleeper().sleep(wait, WaitReason::BetweenFiles) => cancel.is_cancelled(),
            };
            if cancelled {
                interrupted = true;
                break;
            }
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = processor.process(job) => Some(outcome),
        };
        let Some(outcome) = outcome else {
            interrupted = true;
            break;
        };

        match outcome {
            Ok(artifact) => {
                tracing::info!(file = %job.file_name, "Successfully processed {}", job.file_name);
                report.record_success(job, artifact);
                continue;
            }
            Err(e) if e.is_exhausted_retries() => {
                tracing::error!(file = %job.file_name, error = %e, "Failed to process {}", job.file_name);
                report.record_failure(job, e.to_string());
            }
            Err(e) => {
                tracing::error!(file = %job.file_name, error = %e, "Unexpected error processing {}", job.file_name);
                report.record_failure(job, e.to_string());
            }
        }

        let pause = secs(pacing.after_failure_secs);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                interrupted = true;
                break;
            }
            _ = processor.sleeper().sleep(pause, WaitReason::AfterFailure) => {}
        }
    }

    if interrupted {
        tracing::info!("Processing interrupted by user");
    }
    report.finish(interrupted);
    report
}

/// Log the final accounting.
pub fn log_summary(report: &BatchReport) {
    tracing::info!("=== Processing Summary ===");
    tracing::info!(
        run_id = %report.run_id,
        duration_ms = report.duration_ms().unwrap_or_default(),
        "Successfully processed: {}/{}",
        report.succeeded.len(),
        report.processed()
    );
    if !report.succeeded.is_empty() {
        tracing::info!("Successful files:");
        for success in &report.succeeded {
            match &success.artifact {
                Some(path) => tracing::info!("✓ {} -> {}", success.file, path.display()),
                None => tracing::info!("✓ {}", success.file),
            }
        }
    }
    if !report.failed.is_empty() {
        tracing::info!("Failed files:");
        for failure in &report.failed {
            tracing::info!("✗ {}: {}", failure.file, failure.error);
        }
    }
    if report.interrupted {
        tracing::info!("Batch was interrupted before all files were processed");
    }
}

/// Write the report as pretty JSON.
pub fn write_report(report: &BatchReport, path: &Path) -> Result<(), BatchError> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}
