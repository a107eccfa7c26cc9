use std::path::PathBuf;

use crate::error::BatchError;
use crate::gradio::{Connector, RemoteApi};
use crate::pacing::{Sleeper, WaitReason};
use crate::pipeline::{ExtractionSettings, GenerationSettings, Job, PipelineStep};
use crate::retry::{secs, RetryPolicy, Session};

/// Per-run settings the processor needs besides the client.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub retry: RetryPolicy,
    pub generation: GenerationSettings,
    pub extraction: ExtractionSettings,
    /// Pause after steps 1, 2, 4 and 6, in seconds.
    pub step_pause_secs: f64,
    /// Where to save the extracted model; `None` leaves it on the server.
    pub output_dir: Option<PathBuf>,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            generation: GenerationSettings::default(),
            extraction: ExtractionSettings::default(),
            step_pause_secs: 10.0,
            output_dir: None,
        }
    }
}

/// Drives one image at a time through the seven remote steps.
pub struct TrellisProcessor<C: Connector, S: Sleeper> {
    session: Session<C>,
    sleeper: S,
    settings: ProcessorSettings,
}

impl<C: Connector, S: Sleeper> TrellisProcessor<C, S> {
    /// Connect and build a processor. Fails if the first connection fails.
    pub async fn connect(
        connector: C,
        sleeper: S,
        settings: ProcessorSettings,
    ) -> Result<Self, BatchError> {
        let session = Session::open(connector).await?;
        Ok(Self {
            session,
            sleeper,
            settings,
        })
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Run all steps for `job`, returning the saved artifact path if any.
    ///
    /// Stops at the first step that exhausts its retries. Steps already
    /// completed on the remote side are not undone.
    pub async fn process(&mut self, job: &Job) -> Result<Option<PathBuf>, BatchError> {
        tracing::info!(file = %job.file_name, "Processing: {}", job.file_name);

        let mut extracted = None;
        for step in PipelineStep::ALL {
            tracing::info!(file = %job.file_name, "{}. {step}...", step.number());
            let params = step.params(
                job.path(),
                &job.trial_id,
                &self.settings.generation,
                &self.settings.extraction,
            );
            let result = self
                .session
                .call_with_retry(step.endpoint(), &params, &self.settings.retry, &self.sleeper)
                .await?;
            tracing::debug!(file = %job.file_name, step = step.number(), "{step} complete");

            if step == PipelineStep::ExtractAgain {
                extracted = Some(result);
            }
            if step.pauses_after() {
                self.sleeper
                    .sleep(secs(self.settings.step_pause_secs), WaitReason::StepPause)
                    .await;
            }
        }

        match (&self.settings.output_dir, extracted) {
            (Some(dir), Some(result)) => {
                let dest = dir.join(format!("{}.glb", job.trial_id));
                let bytes = self
                    .session
                    .client()
                    .download(&result, &dest)
                    .await
                    .map_err(BatchError::Artifact)?;
                tracing::info!(file = %job.file_name, artifact = %dest.display(), bytes, "Saved model");
                Ok(Some(dest))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::pacing::testing::RecordingSleeper;
    use crate::retry::testing::FakeService;

    fn fast_settings() -> ProcessorSettings {
        ProcessorSettings {
            retry: RetryPolicy {
                max_attempts: 3,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn processor(
        service: &FakeService,
        settings: ProcessorSettings,
    ) -> TrellisProcessor<FakeService, RecordingSleeper> {
        TrellisProcessor::connect(service.clone(), RecordingSleeper::new(), settings)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn runs_seven_steps_in_order() {
        let service = FakeService::new();
        let mut proc = processor(&service, fast_settings()).await;

        let artifact = proc.process(&Job::new("in/chair.png".into())).await.unwrap();

        assert!(artifact.is_none());
        assert_eq!(
            service.endpoints(),
            vec![
                "/preprocess_image",
                "/image_to_3d",
                "/activate_button",
                "/extract_glb",
                "/activate_button_1",
                "/extract_glb",
                "/activate_button_1",
            ]
        );
        assert!(service.calls().iter().all(|(trial, _)| trial == "chair"));
    }

    #[tokio::test]
    async fn waits_cooldown_per_call_and_pause_after_heavy_steps() {
        let service = FakeService::new();
        let mut proc = processor(&service, fast_settings()).await;

        proc.process(&Job::new("a.webp".into())).await.unwrap();

        use WaitReason::{Cooldown as C, StepPause as P};
        assert_eq!(
            proc.sleeper().reasons(),
            vec![C, P, C, P, C, C, P, C, C, P, C]
        );
        let pauses: Vec<_> = proc
            .sleeper()
            .waits()
            .into_iter()
            .filter(|(r, _)| *r == P)
            .map(|(_, d)| d)
            .collect();
        assert_eq!(pauses, vec![Duration::from_secs(10); 4]);
    }

    #[tokio::test]
    async fn exhausted_step_aborts_remaining_steps() {
        let service = FakeService::new();
        service.fail("/activate_button", &["boom 1", "boom 2", "boom 3"]);
        let mut proc = processor(&service, fast_settings()).await;

        let err = proc.process(&Job::new("a.png".into())).await.unwrap_err();

        assert!(err.is_exhausted_retries());
        assert!(err.to_string().contains("boom 3"));
        assert_eq!(
            service.endpoints(),
            vec![
                "/preprocess_image",
                "/image_to_3d",
                "/activate_button",
                "/activate_button",
                "/activate_button",
            ]
        );
    }

    #[tokio::test]
    async fn saves_second_extraction_when_output_dir_set() {
        let service = FakeService::new();
        let settings = ProcessorSettings {
            output_dir: Some(PathBuf::from("models")),
            ..fast_settings()
        };
        let mut proc = processor(&service, settings).await;

        let artifact = proc.process(&Job::new("in/lamp.jpeg".into())).await.unwrap();

        assert_eq!(artifact, Some(PathBuf::from("models/lamp.glb")));
        assert_eq!(service.downloads(), vec![PathBuf::from("models/lamp.glb")]);
    }
}
