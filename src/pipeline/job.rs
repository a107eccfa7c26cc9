use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One input image scheduled for conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub path: PathBuf,
    /// File name as listed in the input directory.
    pub file_name: String,
    /// File name without extension; sent to the generator as `trial_id`.
    pub trial_id: String,
}

impl Job {
    pub fn new(path: PathBuf) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let trial_id = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.clone());
        Self {
            path,
            file_name,
            trial_id,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A job that went through all seven steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSuccess {
    pub file: String,
    /// Where the extracted model was saved, when downloads are enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

/// A job that was abandoned, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub file: String,
    pub error: String,
}

/// Accounting of one batch run, built as jobs finish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub succeeded: Vec<JobSuccess>,
    pub failed: Vec<JobFailure>,
    /// Set when the batch was stopped by the user before every job ran.
    pub interrupted: bool,
}

impl Default for BatchReport {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            succeeded: Vec::new(),
            failed: Vec::new(),
            interrupted: false,
        }
    }

    pub fn record_success(&mut self, job: &Job, artifact: Option<PathBuf>) {
        self.succeeded.push(JobSuccess {
            file: job.file_name.clone(),
            artifact,
        });
    }

    pub fn record_failure(&mut self, job: &Job, error: impl Into<String>) {
        self.failed.push(JobFailure {
            file: job.file_name.clone(),
            error: error.into(),
        });
    }

    pub fn finish(&mut self, interrupted: bool) {
        self.interrupted = interrupted;
        self.finished_at = Some(Utc::now());
    }

    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Whether `file` appears in either list.
    #[allow(dead_code)]
    pub fn contains(&self, file: &str) -> bool {
        self.succeeded.iter().any(|s| s.file == file) || self.failed.iter().any(|f| f.file == file)
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
