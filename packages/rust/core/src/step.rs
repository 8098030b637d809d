//! Step harness: per-attempt timeout and bounded retry around any [`Stage`].

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tracing::{info, warn};

use crate::stages::Stage;
use crate::state::PipelineState;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// How a step is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPolicy {
    /// Deadline for each attempt.
    pub timeout: Duration,
    /// Attempts after the first one.
    pub max_retries: u32,
}

impl Default for StepPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_STEP_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Why a step did not produce a new state.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StepError {
    #[error("{step} timed out after {timeout:?}")]
    TimedOut {
        step: &'static str,
        timeout: Duration,
    },

    #[error("{step} panicked: {message}")]
    Panicked { step: &'static str, message: String },

    #[error("{step} failed: {message}")]
    Failed { step: &'static str, message: String },

    #[error("{step} gave up after {attempts} attempt(s): {last}")]
    Exhausted {
        step: &'static str,
        attempts: u32,
        last: Box<StepError>,
    },
}

/// Run `stage` against a snapshot of `state`, retrying up to
/// `policy.max_retries` times. A failed attempt leaves nothing behind; the
/// next attempt starts from the same snapshot.
pub async fn run_step(
    stage: Arc<dyn Stage>,
    state: &PipelineState,
    policy: StepPolicy,
) -> Result<PipelineState, StepError> {
    let step = stage.step_name();
    let max_attempts = policy.max_retries.saturating_add(1);
    let mut attempt = 1;

    loop {
        match run_attempt(Arc::clone(&stage), state.clone(), policy.timeout).await {
            Ok(next) => {
                if attempt > 1 {
                    info!(step, attempt, "step succeeded after retry");
                }
                return Ok(next);
            }
            Err(err) => {
                warn!(step, attempt, max_attempts, error = %err, "step attempt failed");
                if attempt >= max_attempts {
                    return Err(StepError::Exhausted {
                        step,
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                attempt += 1;
            }
        }
    }
}

async fn run_attempt(
    stage: Arc<dyn Stage>,
    state: PipelineState,
    timeout: Duration,
) -> Result<PipelineState, StepError> {
    let step = stage.step_name();
    let mut handle = tokio::spawn(async move { stage.run(state).await });

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(next))) => Ok(next),
        Ok(Ok(Err(e))) => Err(StepError::Failed {
            step,
            message: e.to_string(),
        }),
        Ok(Err(join_err)) => Err(join_failure(step, join_err)),
        Err(_) => {
            handle.abort();
            Err(StepError::TimedOut { step, timeout })
        }
    }
}

fn join_failure(step: &'static str, err: JoinError) -> StepError {
    if err.is_panic() {
        StepError::Panicked {
            step,
            message: panic_message(err.into_panic()),
        }
    } else {
        StepError::Failed {
            step,
            message: "task was cancelled".into(),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use supportpilot_shared::{Result, SupportPilotError};

    /// Fails (in the given way) for the first `failures` calls, then
    /// records itself and succeeds.
    struct Flaky {
        failures: u32,
        mode: &'static str,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32, mode: &'static str) -> Arc<Self> {
            Arc::new(Self {
                failures,
                mode,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Stage for Flaky {
        fn agent_name(&self) -> &'static str {
            "FlakyAgent"
        }
        fn step_name(&self) -> &'static str {
            "flaky_step"
        }
        async fn run(&self, mut state: PipelineState) -> Result<PipelineState> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            state.record(
                self.agent_name(),
                self.step_name(),
                serde_json::json!({ "call": call }),
                serde_json::json!({}),
                Duration::ZERO,
            );
            if call <= self.failures {
                match self.mode {
                    "panic" => panic!("stage blew up"),
                    "hang" => tokio::time::sleep(Duration::from_secs(3600)).await,
                    _ => return Err(SupportPilotError::Completion("boom".into())),
                }
            }
            Ok(state)
        }
    }

    fn policy(max_retries: u32) -> StepPolicy {
        StepPolicy {
            timeout: Duration::from_millis(50),
            max_retries,
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let stage = Flaky::new(0, "error");
        let next = run_step(stage.clone(), &PipelineState::new("x"), policy(2))
            .await
            .expect("step");
        assert_eq!(next.trace().len(), 1);
        assert_eq!(stage.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_then_succeed_keeps_one_record() {
        let stage = Flaky::new(2, "error");
        let next = run_step(stage.clone(), &PipelineState::new("x"), policy(2))
            .await
            .expect("third attempt succeeds");
        assert_eq!(stage.calls.load(Ordering::SeqCst), 3);
        assert_eq!(next.trace().len(), 1);
        assert_eq!(next.trace()[0].input["call"], 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempt_count() {
        let stage = Flaky::new(10, "error");
        let err = run_step(stage.clone(), &PipelineState::new("x"), policy(2))
            .await
            .unwrap_err();
        assert_eq!(stage.calls.load(Ordering::SeqCst), 3);
        match err {
            StepError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, StepError::Failed { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let stage = Flaky::new(1, "error");
        assert!(run_step(stage.clone(), &PipelineState::new("x"), policy(0)).await.is_err());
        assert_eq!(stage.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panic_is_captured() {
        let stage = Flaky::new(10, "panic");
        let err = run_step(stage, &PipelineState::new("x"), policy(0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stage blew up"), "{err}");
    }

    #[tokio::test]
    async fn hang_times_out_then_recovers() {
        let stage = Flaky::new(1, "hang");
        let next = run_step(stage.clone(), &PipelineState::new("x"), policy(1))
            .await
            .expect("second attempt succeeds");
        assert_eq!(stage.calls.load(Ordering::SeqCst), 2);
        assert_eq!(next.trace().len(), 1);
    }

    #[tokio::test]
    async fn hang_every_time_is_a_timeout() {
        let stage = Flaky::new(10, "hang");
        let err = run_step(stage, &PipelineState::new("x"), policy(1))
            .await
            .unwrap_err();
        match err {
            StepError::Exhausted { last, .. } => {
                assert!(matches!(*last, StepError::TimedOut { .. }))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn panic_message_extraction() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42u8)), "unknown panic");
    }
}
