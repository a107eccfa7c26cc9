use thiserror::Error;

use crate::gradio::GradioError;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Failed to connect to the Gradio app: {0}")]
    Connect(#[source] GradioError),

    /// A pipeline step failed on every attempt.
    #[error("{endpoint}: All {attempts} attempts failed. Last error: {last_error}")]
    RetriesExhausted {
        endpoint: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Failed to save artifact: {0}")]
    Artifact(#[source] GradioError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BatchError {
    /// Whether the error is the expected outcome of a step running out of
    /// retries, as opposed to anything else going wrong around the pipeline.
    pub fn is_exhausted_retries(&self) -> bool {
        matches!(self, BatchError::RetriesExhausted { .. })
    }
}
