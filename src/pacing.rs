//! Every deliberate wait in a batch run goes through a [`Sleeper`].
//!
//! Waits are labelled with a [`WaitReason`] so they can be logged, shown
//! on the terminal and, in tests, recorded instead of slept.

use std::fmt;
use std::time::Duration;

use crate::ui::Countdown;

/// Why the runner is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Exponential backoff before a retry attempt.
    Backoff,
    /// Extra wait after the service raised an internal exception.
    UpstreamFault,
    /// Fixed wait after every successful call.
    Cooldown,
    /// Fixed wait after selected pipeline steps.
    StepPause,
    /// Randomized wait before starting the next file.
    BetweenFiles,
    /// Wait after a file failed.
    AfterFailure,
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitReason::Backoff => write!(f, "retry backoff"),
            WaitReason::UpstreamFault => write!(f, "upstream fault"),
            WaitReason::Cooldown => write!(f, "cooldown"),
            WaitReason::StepPause => write!(f, "step pause"),
            WaitReason::BetweenFiles => write!(f, "next file"),
            WaitReason::AfterFailure => write!(f, "failure pause"),
        }
    }
}

pub trait Sleeper {
    async fn sleep(&self, duration: Duration, reason: WaitReason);
}

/// Real sleeper backed by the tokio timer.
///
/// Waits at or above `countdown_threshold` show a terminal countdown.
pub struct TokioSleeper {
    countdown_threshold: Duration,
}

impl TokioSleeper {
    pub fn new(countdown_threshold: Duration) -> Self {
        Self {
            countdown_threshold,
        }
    }
}

impl Default for TokioSleeper {
    fn default() -> Self {
        Self::new(Duration::from_secs(20))
    }
}

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration, reason: WaitReason) {
        if duration.is_zero() {
            return;
        }
        if duration < self.countdown_threshold {
            tokio::time::sleep(duration).await;
            return;
        }

        let countdown = Countdown::start(reason, duration);
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                _ = ticker.tick() => {
                    countdown.update(deadline.saturating_duration_since(tokio::time::Instant::now()));
                }
            }
        }
        countdown.finish();
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use tokio_util::sync::CancellationToken;

    use super::*;

    /// Records waits instead of sleeping; can cancel a token when a given
    /// wait starts.
    #[derive(Default)]
    pub struct RecordingSleeper {
        waits: Mutex<Vec<(WaitReason, Duration)>>,
        cancel_on: Option<(WaitReason, CancellationToken)>,
    }

    impl RecordingSleeper {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn cancelling_on(reason: WaitReason, token: CancellationToken) -> Self {
            Self {
                waits: Mutex::new(Vec::new()),
                cancel_on: Some((reason, token)),
            }
        }

        pub fn waits(&self) -> Vec<(WaitReason, Duration)> {
            self.waits.lock().unwrap().clone()
        }

        pub fn reasons(&self) -> Vec<WaitReason> {
            self.waits().into_iter().map(|(r, _)| r).collect()
        }

        pub fn count(&self, reason: WaitReason) -> usize {
            self.waits().iter().filter(|(r, _)| *r == reason).count()
        }
    }

    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration, reason: WaitReason) {
            self.waits.lock().unwrap().push((reason, duration));
            if let Some((on, token)) = &self.cancel_on {
                if *on == reason {
                    token.cancel();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_reason_display() {
        assert_eq!(WaitReason::Backoff.to_string(), "retry backoff");
        assert_eq!(WaitReason::BetweenFiles.to_string(), "next file");
    }

    #[tokio::test]
    async fn short_waits_sleep_without_countdown() {
        let sleeper = TokioSleeper::new(Duration::from_secs(20));
        let start = std::time::Instant::now();
        sleeper.sleep(Duration::from_millis(20), WaitReason::Cooldown).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn zero_wait_returns_immediately() {
        let sleeper = TokioSleeper::default();
        sleeper.sleep(Duration::ZERO, WaitReason::StepPause).await;
    }

    #[tokio::test]
    async fn recording_sleeper_cancels_on_reason() {
        let token = tokio_util::sync::CancellationToken::new();
        let sleeper = testing::RecordingSleeper::cancelling_on(WaitReason::BetweenFiles, token.clone());
        sleeper.sleep(Duration::from_secs(5), WaitReason::Cooldown).await;
        assert!(!token.is_cancelled());
        sleeper.sleep(Duration::from_secs(180), WaitReason::BetweenFiles).await;
        assert!(token.is_cancelled());
        assert_eq!(
            sleeper.reasons(),
            vec![WaitReason::Cooldown, WaitReason::BetweenFiles]
        );
    }
}
