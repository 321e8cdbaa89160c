use std::time::Duration;

use thiserror::Error;

/// Failures reported by a host page implementation.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("element is no longer attached to the page: {0}")]
    Detached(String),

    #[error("host page rejected the operation: {0}")]
    Host(String),
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("timed out after {elapsed_ms}ms waiting for {what}")]
    Timeout { what: String, elapsed_ms: u64 },
}

impl WaitError {
    pub(crate) fn timeout(what: &str, elapsed: Duration) -> Self {
        Self::Timeout {
            what: what.to_owned(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Timeout { elapsed_ms, .. } => Duration::from_millis(*elapsed_ms),
        }
    }
}

/// Errors raised inside a single coupon trial. They never escape the trial
/// boundary; [`crate::CouponEngine::apply_coupon`] turns them into a failed
/// result.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Wait(#[from] WaitError),
}
