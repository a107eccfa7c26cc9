mod job;
mod step;

pub use job::{BatchReport, Job};
pub use step::{ExtractionSettings, GenerationSettings, PipelineStep};
