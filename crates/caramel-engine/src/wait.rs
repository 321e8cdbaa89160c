//! Readiness waiters.
//!
//! Third-party checkouts expose no completion events, so the engine watches
//! for indirect signals: an element appearing, a container's text changing,
//! a network call settling, a button re-enabling. Every waiter is bounded,
//! and every waiter releases what it subscribed to on all exit paths.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::WaitError;
use crate::intercept::NetworkInterceptor;
use crate::page::CheckoutPage;
use crate::timing::Calibration;

/// How a wait settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    FoundImmediately,
    Appeared,
    TextChanged,
    NetworkReply,
    Ready,
    Timeout,
}

impl fmt::Display for WaitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WaitOutcome::FoundImmediately => "found-immediately",
            WaitOutcome::Appeared => "appeared",
            WaitOutcome::TextChanged => "text-changed",
            WaitOutcome::NetworkReply => "network-reply",
            WaitOutcome::Ready => "ready",
            WaitOutcome::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

/// Resolves on the first observation where `predicate` holds, re-checking
/// after every change notification, or fails once `timeout` has elapsed.
///
/// Takes ownership of the subscription so it is dropped, and the observer
/// detached, however the wait ends. Returns the elapsed time on success.
///
/// # Errors
///
/// Returns [`WaitError::Timeout`] if the predicate never held in time. A
/// change source that closes early cannot satisfy the predicate any more,
/// so the wait simply runs out its bound.
pub async fn await_until<F>(
    mut changes: watch::Receiver<u64>,
    timeout: Duration,
    what: &str,
    mut predicate: F,
) -> Result<Duration, WaitError>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    let deadline = start + timeout;
    loop {
        if predicate() {
            return Ok(start.elapsed());
        }
        match tokio::time::timeout_at(deadline, changes.changed()).await {
            Ok(Ok(())) => {}
            Ok(Err(_closed)) => {
                tokio::time::sleep_until(deadline).await;
                return Err(WaitError::timeout(what, start.elapsed()));
            }
            Err(_elapsed) => return Err(WaitError::timeout(what, start.elapsed())),
        }
    }
}

fn bound(base: Duration, calibration: Option<Calibration<'_>>) -> Duration {
    calibration.map_or(base, |c| c.timeout(base))
}

fn settle(calibration: Option<Calibration<'_>>, result: &Result<Duration, WaitError>) {
    if let Some(c) = calibration {
        c.record(match result {
            Ok(elapsed) => *elapsed,
            Err(err) => err.elapsed(),
        });
    }
}

/// Waits until any of `selectors` matches.
///
/// # Errors
///
/// Returns [`WaitError::Timeout`] if none appears within the (calibrated) bound.
pub async fn wait_for_any_element<P: CheckoutPage + ?Sized>(
    page: &P,
    selectors: &[&str],
    base_timeout: Duration,
    calibration: Option<Calibration<'_>>,
) -> Result<WaitOutcome, WaitError> {
    let present = || selectors.iter().any(|s| page.query(s).is_some());
    if present() {
        return Ok(WaitOutcome::FoundImmediately);
    }
    let what = selectors.join(",");
    let result = await_until(
        page.changes(),
        bound(base_timeout, calibration),
        &what,
        present,
    )
    .await;
    settle(calibration, &result);
    result.map(|_| WaitOutcome::Appeared)
}

/// Waits until `selector` matches.
///
/// # Errors
///
/// Returns [`WaitError::Timeout`] if it does not appear within the (calibrated) bound.
pub async fn wait_for_element<P: CheckoutPage + ?Sized>(
    page: &P,
    selector: &str,
    base_timeout: Duration,
    calibration: Option<Calibration<'_>>,
) -> Result<WaitOutcome, WaitError> {
    wait_for_any_element(page, &[selector], base_timeout, calibration).await
}

/// Snapshots `element`'s text and waits until it differs.
///
/// # Errors
///
/// Returns [`WaitError::Timeout`] if the text is unchanged at the (calibrated) bound.
pub async fn wait_for_text_change<P: CheckoutPage + ?Sized>(
    page: &P,
    element: &P::Element,
    base_timeout: Duration,
    calibration: Option<Calibration<'_>>,
) -> Result<WaitOutcome, WaitError> {
    let initial = page.text(element);
    let result = await_until(
        page.changes(),
        bound(base_timeout, calibration),
        "price text change",
        || page.text(element) != initial,
    )
    .await;
    settle(calibration, &result);
    result.map(|_| WaitOutcome::TextChanged)
}

/// Registers a listener for requests containing `url_fragment` now, and
/// returns a future that resolves when one completes.
///
/// The future itself never times out; race it against a timer. Dropping it
/// releases the listener.
pub fn wait_for_network<'a>(
    interceptor: &'a NetworkInterceptor,
    url_fragment: &str,
) -> impl Future<Output = WaitOutcome> + 'a {
    let mut interception = interceptor.acquire(url_fragment);
    async move {
        match interception.completed().await {
            Some(url) => {
                tracing::debug!(url, "network reply observed");
                WaitOutcome::NetworkReply
            }
            None => std::future::pending().await,
        }
    }
}

/// Waits for the submit button to be absent or enabled. Never fails: at the
/// bound the page is assumed ready.
pub async fn wait_until_ready<P: CheckoutPage + ?Sized>(
    page: &P,
    submit_selector: &str,
    timeout: Duration,
) -> WaitOutcome {
    let ready = || {
        page.query(submit_selector)
            .is_none_or(|button| !page.is_disabled(&button))
    };
    match await_until(page.changes(), timeout, "submit button enabled", ready).await {
        Ok(_) => WaitOutcome::Ready,
        Err(err) => {
            tracing::debug!(error = %err, "proceeding without ready signal");
            WaitOutcome::Timeout
        }
    }
}
