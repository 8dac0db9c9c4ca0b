use thiserror::Error;

/// Step-level failures surfaced by controllers and the orchestrator.
///
/// Only `DependencyUnavailable` and an exhausted `Timeout` abort a readiness
/// run; everything else is absorbed and retried at the step that produced it.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("classification inconclusive: {0}")]
    Inconclusive(String),

    #[error("action failed: {0}")]
    ActionFailed(String),

    #[error("timed out after {secs}s waiting for {waiting_for}")]
    Timeout { waiting_for: String, secs: u64 },
}

impl StepError {
    pub fn action(message: impl Into<String>) -> Self {
        StepError::ActionFailed(message.into())
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        StepError::DependencyUnavailable(message.into())
    }

    pub fn timeout(waiting_for: impl Into<String>, secs: u64) -> Self {
        StepError::Timeout {
            waiting_for: waiting_for.into(),
            secs,
        }
    }
}
