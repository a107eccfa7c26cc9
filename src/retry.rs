//! Retry-with-backoff around a single remote call.
//!
//! A call moves through `Idle → Attempting → {Success | BackingOff →
//! Attempting | Exhausted}`. Failures the service reports as its own
//! internal exception get a longer wait and a fresh client handle before
//! the next attempt.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BatchError;
use crate::gradio::{Connector, Params, RemoteApi};
use crate::pacing::{Sleeper, WaitReason};

/// Text the Gradio client puts in errors raised by the app itself.
pub const UPSTREAM_FAULT_SIGNATURE: &str = "upstream Gradio app has raised an exception";

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Ordinary transient failure; plain backoff.
    Transient,
    /// The remote app raised an exception; wait longer and reconnect.
    UpstreamFault,
}

/// Single place where error messages are mapped to a [`FailureClass`].
pub fn classify_failure(message: &str) -> FailureClass {
    if message.contains(UPSTREAM_FAULT_SIGNATURE) {
        FailureClass::UpstreamFault
    } else {
        FailureClass::Transient
    }
}

/// Retry timing. Durations are in seconds in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    pub initial_delay_secs: f64,
    pub max_delay_secs: f64,
    /// Uniform jitter added to every backoff delay.
    pub jitter_secs: (f64, f64),
    /// Uniform wait after an upstream fault, before reconnecting.
    pub upstream_wait_secs: (f64, f64),
    /// Wait after every successful call.
    pub cooldown_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_secs: 4.0,
            max_delay_secs: 60.0,
            jitter_secs: (1.0, 3.0),
            upstream_wait_secs: (20.0, 30.0),
            cooldown_secs: 5.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before 1-based `attempt`. Attempt 1 is immediate; later attempts
    /// wait `min(max, initial * 2^(attempt-1) + jitter)`.
    pub fn backoff_delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1).min(30) as i32;
        let raw = self.initial_delay_secs * 2f64.powi(exponent) + uniform(rng, self.jitter_secs);
        secs(raw.min(self.max_delay_secs))
    }

    pub fn upstream_wait(&self, rng: &mut impl Rng) -> Duration {
        secs(uniform(rng, self.upstream_wait_secs))
    }

    pub fn cooldown(&self) -> Duration {
        secs(self.cooldown_secs)
    }
}

/// Uniform sample from `(low, high)`; tolerates a reversed or empty range.
pub fn uniform(rng: &mut impl Rng, (low, high): (f64, f64)) -> f64 {
    let range: RangeInclusive<f64> = if low <= high { low..=high } else { high..=low };
    if range.start() == range.end() {
        return *range.start();
    }
    rng.random_range(range)
}

pub fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

/// The live client handle plus the means to replace it.
///
/// After an upstream fault the handle is swapped for a freshly connected
/// one; a failed reconnect keeps the old handle.
pub struct Session<C: Connector> {
    connector: C,
    client: C::Client,
    reconnects: u32,
}

impl<C: Connector> Session<C> {
    pub async fn open(connector: C) -> Result<Self, BatchError> {
        let client = connector.connect().await.map_err(BatchError::Connect)?;
        Ok(Self {
            connector,
            client,
            reconnects: 0,
        })
    }

    pub fn client(&self) -> &C::Client {
        &self.client
    }

    /// Number of successful reconnects so far.
    #[allow(dead_code)]
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    async fn reconnect(&mut self) {
        match self.connector.connect().await {
            Ok(client) => {
                self.client = client;
                self.reconnects += 1;
                tracing::info!(reconnects = self.reconnects, "Recreated client after upstream fault");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to recreate client, keeping previous handle");
            }
        }
    }

    /// Run `endpoint` with `params` under `policy`.
    pub async fn call_with_retry(
        &mut self,
        endpoint: &str,
        params: &Params,
        policy: &RetryPolicy,
        sleeper: &impl Sleeper,
    ) -> Result<Value, BatchError> {
        let max_attempts = policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = policy.backoff_delay(attempt, &mut rand::rng());
                tracing::info!(
                    endpoint,
                    "Attempt {attempt}/{max_attempts}: waiting {:.1}s before retry",
                    delay.as_secs_f64()
                );
                sleeper.sleep(delay, WaitReason::Backoff).await;
            }

            match self.client.predict(endpoint, params).await {
                Ok(result) => {
                    sleeper.sleep(policy.cooldown(), WaitReason::Cooldown).await;
                    return Ok(result);
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(endpoint, attempt, error = %last_error, "Attempt {attempt} failed");

                    if classify_failure(&last_error) == FailureClass::UpstreamFault {
                        let wait = policy.upstream_wait(&mut rand::rng());
                        tracing::info!(
                            endpoint,
                            "Upstream error - waiting {:.1}s before retry",
                            wait.as_secs_f64()
                        );
                        sleeper.sleep(wait, WaitReason::UpstreamFault).await;
                        self.reconnect().await;
                    }
                }
            }
        }

        Err(BatchError::RetriesExhausted {
            endpoint: endpoint.to_string(),
            attempts: max_attempts,
            last_error,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeService;
    use super::*;
    use crate::pacing::testing::RecordingSleeper;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const UPSTREAM: &str =
        "The upstream Gradio app has raised an exception: CUDA error: out of memory";

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            ..Default::default()
        }
    }

    #[test]
    fn classify_upstream_signature() {
        assert_eq!(classify_failure(UPSTREAM), FailureClass::UpstreamFault);
        assert_eq!(
            classify_failure("network error: connection reset"),
            FailureClass::Transient
        );
    }

    #[test]
    fn gradio_upstream_errors_classify_as_upstream_fault() {
        let err = crate::gradio::GradioError::Upstream { detail: None };
        assert_eq!(classify_failure(&err.to_string()), FailureClass::UpstreamFault);
    }

    #[test]
    fn first_attempt_has_no_delay() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(RetryPolicy::default().backoff_delay(1, &mut rng), Duration::ZERO);
    }

    #[test]
    fn backoff_doubles_with_jitter_and_caps() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);
        for attempt in 2..=10u32 {
            let base = 4.0 * 2f64.powi(attempt as i32 - 1);
            let delay = policy.backoff_delay(attempt, &mut rng).as_secs_f64();
            assert!(delay <= 60.0, "attempt {attempt}: {delay}");
            if base + 3.0 <= 60.0 {
                assert!(delay >= base + 1.0 && delay <= base + 3.0, "attempt {attempt}: {delay}");
            } else {
                assert!(delay >= 60.0_f64.min(base + 1.0) - 1e-9);
            }
        }
    }

    #[test]
    fn upstream_wait_in_range() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let wait = policy.upstream_wait(&mut rng).as_secs_f64();
            assert!((20.0..=30.0).contains(&wait));
        }
    }

    #[test]
    fn uniform_handles_degenerate_ranges() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(uniform(&mut rng, (10.0, 10.0)), 10.0);
        let v = uniform(&mut rng, (30.0, 20.0));
        assert!((20.0..=30.0).contains(&v));
    }

    #[tokio::test]
    async fn always_failing_call_makes_exactly_max_attempts() {
        let service = FakeService::new();
        service.fail("/extract_glb", &["e1", "e2", "e3", "final failure"]);
        let sleeper = RecordingSleeper::new();
        let mut session = Session::open(service.clone()).await.unwrap();

        let err = session
            .call_with_retry("/extract_glb", &Params::new(), &policy(4), &sleeper)
            .await
            .unwrap_err();

        assert_eq!(service.endpoints().len(), 4);
        assert!(err.to_string().contains("final failure"));
        assert!(err.to_string().contains("All 4 attempts failed"));
        assert_eq!(sleeper.count(WaitReason::Backoff), 3);
        assert_eq!(sleeper.count(WaitReason::Cooldown), 0);
    }

    #[tokio::test]
    async fn fail_once_then_succeed_waits_cooldown() {
        let service = FakeService::new();
        service.fail("/image_to_3d", &["timeout"]);
        let sleeper = RecordingSleeper::new();
        let mut session = Session::open(service.clone()).await.unwrap();

        let result = session
            .call_with_retry("/image_to_3d", &Params::new(), &RetryPolicy::default(), &sleeper)
            .await;

        assert!(result.is_ok());
        assert_eq!(service.endpoints().len(), 2);
        assert_eq!(
            sleeper.reasons(),
            vec![WaitReason::Backoff, WaitReason::Cooldown]
        );
        let waits = sleeper.waits();
        assert!(waits[0].1 >= Duration::from_secs(9) && waits[0].1 <= Duration::from_secs(11));
        assert_eq!(waits[1].1, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn upstream_fault_waits_reconnects_then_backs_off() {
        let service = FakeService::new();
        service.fail("/preprocess_image", &[UPSTREAM]);
        let sleeper = RecordingSleeper::new();
        let mut session = Session::open(service.clone()).await.unwrap();

        session
            .call_with_retry("/preprocess_image", &Params::new(), &policy(3), &sleeper)
            .await
            .unwrap();

        assert_eq!(
            sleeper.reasons(),
            vec![WaitReason::UpstreamFault, WaitReason::Backoff, WaitReason::Cooldown]
        );
        let upstream = sleeper.waits()[0].1.as_secs_f64();
        assert!((20.0..=30.0).contains(&upstream));
        assert_eq!(service.connects(), 2);
        assert_eq!(session.reconnects(), 1);
    }

    #[tokio::test]
    async fn failed_reconnect_is_swallowed() {
        let service = FakeService::new();
        service.fail("/activate_button", &[UPSTREAM, UPSTREAM]);
        let sleeper = RecordingSleeper::new();
        let mut session = Session::open(service.clone()).await.unwrap();
        service.fail_next_connects(1);

        let result = session
            .call_with_retry("/activate_button", &Params::new(), &policy(5), &sleeper)
            .await;

        assert!(result.is_ok());
        assert_eq!(service.endpoints().len(), 3);
        // First reconnect failed, second succeeded.
        assert_eq!(session.reconnects(), 1);
        assert_eq!(sleeper.count(WaitReason::UpstreamFault), 2);
    }

    #[tokio::test]
    async fn zero_max_attempts_still_tries_once() {
        let service = FakeService::new();
        let sleeper = RecordingSleeper::new();
        let mut session = Session::open(service.clone()).await.unwrap();

        session
            .call_with_retry("/activate_button_1", &Params::new(), &policy(0), &sleeper)
            .await
            .unwrap();
        assert_eq!(service.endpoints().len(), 1);
    }
}
