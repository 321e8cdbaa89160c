//! Retry with exponential back-off and jitter for the coupon-service client.
//!
//! [`retry_with_backoff`] wraps any fallible async operation and retries on
//! transient errors (timeouts, connection failures, 429, 5xx). Everything
//! else is returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::ClientError;

/// Returns `true` for errors that are worth retrying after a back-off delay.
///
/// **Retriable:**
/// - Network-level failures: timeout, connection reset.
/// - [`ClientError::RateLimited`]: the service asked us to back off.
/// - [`ClientError::UnexpectedStatus`] with a 5xx status.
///
/// **Not retriable:** 404, other 4xx, malformed bodies, invalid site lists.
pub(crate) fn is_retriable(err: &ClientError) -> bool {
    match err {
        ClientError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        ClientError::RateLimited { .. } => true,
        ClientError::UnexpectedStatus { status, .. } => *status >= 500,
        ClientError::NotFound { .. }
        | ClientError::Deserialize { .. }
        | ClientError::SiteList { .. }
        | ClientError::InvalidBaseUrl { .. } => false,
    }
}

const MAX_DELAY: Duration = Duration::from_secs(30);

/// Sleep before retry number `attempt` (1-based): `base × 2^(attempt-1)`
/// with ±25 % jitter, never shorter than a server-supplied `Retry-After`,
/// and never longer than 30 s.
fn backoff_delay(attempt: u32, backoff_base_ms: u64, err: &ClientError) -> Duration {
    let exponential = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let jittered = (exponential as f64 * rand::random_range(0.75..1.25)) as u64;
    let floor = match err {
        ClientError::RateLimited {
            retry_after_secs, ..
        } => Duration::from_secs(*retry_after_secs),
        _ => Duration::ZERO,
    };
    Duration::from_millis(jittered).max(floor).min(MAX_DELAY)
}

/// Runs `operation`, retrying transient failures up to `max_retries` times.
///
/// With the default `backoff_base_ms = 500` the sleeps are roughly 0.5 s,
/// 1 s, 2 s, and so on.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut attempt = 0u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !is_retriable(&err) || attempt >= max_retries => return Err(err),
            Err(err) => err,
        };
        attempt += 1;
        let delay = backoff_delay(attempt, backoff_base_ms, &err);
        tracing::warn!(
            attempt,
            max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "transient coupon service error"
        );
        tokio::time::sleep(delay).await;
    }
}
