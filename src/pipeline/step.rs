use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::gradio::Params;

/// Parameters for the `/image_to_3d` generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub seed: u64,
    pub randomize_seed: bool,
    pub ss_guidance_strength: f64,
    pub ss_sampling_steps: u32,
    pub slat_guidance_strength: f64,
    pub slat_sampling_steps: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            randomize_seed: true,
            ss_guidance_strength: 7.5,
            ss_sampling_steps: 12,
            slat_guidance_strength: 3.0,
            slat_sampling_steps: 12,
        }
    }
}

/// Parameters for the `/extract_glb` calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub mesh_simplify: f64,
    pub texture_size: u32,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            mesh_simplify: 0.9,
            texture_size: 512,
        }
    }
}

/// The seven remote calls made for every image, in execution order.
///
/// PREPROCESS → GENERATE → ACTIVATE → EXTRACT → ACTIVATE_1 → EXTRACT_AGAIN → FINALIZE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStep {
    Preprocess,
    Generate,
    Activate,
    Extract,
    ActivateSecond,
    ExtractAgain,
    Finalize,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 7] = [
        PipelineStep::Preprocess,
        PipelineStep::Generate,
        PipelineStep::Activate,
        PipelineStep::Extract,
        PipelineStep::ActivateSecond,
        PipelineStep::ExtractAgain,
        PipelineStep::Finalize,
    ];

    /// 1-based position in the pipeline.
    pub fn number(self) -> usize {
        Self::ALL
            .iter()
            .position(|s| *s == self)
            .map_or(0, |i| i + 1)
    }

    /// Gradio endpoint the step calls.
    pub fn endpoint(self) -> &'static str {
        match self {
            PipelineStep::Preprocess => "/preprocess_image",
            PipelineStep::Generate => "/image_to_3d",
            PipelineStep::Activate => "/activate_button",
            PipelineStep::Extract | PipelineStep::ExtractAgain => "/extract_glb",
            PipelineStep::ActivateSecond | PipelineStep::Finalize => "/activate_button_1",
        }
    }

    /// Whether the fixed inter-step pause follows this step.
    pub fn pauses_after(self) -> bool {
        matches!(
            self,
            PipelineStep::Preprocess
                | PipelineStep::Generate
                | PipelineStep::Extract
                | PipelineStep::ExtractAgain
        )
    }

    /// Build the named parameters for this step.
    pub fn params(
        self,
        image: &Path,
        trial_id: &str,
        generation: &GenerationSettings,
        extraction: &ExtractionSettings,
    ) -> Params {
        match self {
            PipelineStep::Preprocess => Params::new().with_file("image", image),
            PipelineStep::Generate => Params::new()
                .with("trial_id", trial_id)
                .with("seed", generation.seed)
                .with("randomize_seed", generation.randomize_seed)
                .with("ss_guidance_strength", generation.ss_guidance_strength)
                .with("ss_sampling_steps", generation.ss_sampling_steps)
                .with("slat_guidance_strength", generation.slat_guidance_strength)
                .with("slat_sampling_steps", generation.slat_sampling_steps),
            PipelineStep::Extract | PipelineStep::ExtractAgain => Params::new()
                .with("mesh_simplify", extraction.mesh_simplify)
                .with("texture_size", extraction.texture_size),
            PipelineStep::Activate | PipelineStep::ActivateSecond | PipelineStep::Finalize => {
                Params::new()
            }
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStep::Preprocess => write!(f, "Preprocessing image"),
            PipelineStep::Generate => write!(f, "Generating 3D asset"),
            PipelineStep::Activate => write!(f, "Activating first button"),
            PipelineStep::Extract => write!(f, "First GLB extraction"),
            PipelineStep::ActivateSecond => write!(f, "Second button activation"),
            PipelineStep::ExtractAgain => write!(f, "Second GLB extraction"),
            PipelineStep::Finalize => write!(f, "Final button activation"),
        }
    }
}
