//! One-shot listeners on the host page's network traffic.
//!
//! Some retailers update the total only after an API call settles, and mutate
//! the price container in ways that cannot be trusted as a signal. For those
//! the engine registers interest in a URL fragment for the duration of a
//! single wait. The host reports every settled request through
//! [`NetworkInterceptor::request_completed`].
//!
//! A registration is released exactly once: either by the first matching
//! request or when its [`Interception`] guard is dropped, whichever happens
//! first. Nothing stays hooked past the wait that installed it.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

#[derive(Debug, Default)]
pub struct NetworkInterceptor {
    state: Mutex<InterceptState>,
}

#[derive(Debug, Default)]
struct InterceptState {
    next_id: u64,
    listeners: Vec<Listener>,
    restorations: usize,
}

#[derive(Debug)]
struct Listener {
    id: u64,
    url_fragment: String,
    reply: oneshot::Sender<String>,
}

impl NetworkInterceptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a one-shot listener for requests whose URL contains
    /// `url_fragment`. The listener is live from this call on.
    pub fn acquire(&self, url_fragment: &str) -> Interception<'_> {
        let (reply, receiver) = oneshot::channel();
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.push(Listener {
            id,
            url_fragment: url_fragment.to_owned(),
            reply,
        });
        Interception {
            interceptor: self,
            id,
            receiver,
        }
    }

    /// Reports a settled request. Every listener whose fragment matches `url`
    /// fires and is released. Returns how many fired.
    pub fn request_completed(&self, url: &str) -> usize {
        let matched: Vec<Listener> = {
            let mut state = self.lock();
            let (matched, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.listeners)
                .into_iter()
                .partition(|l| url.contains(&l.url_fragment));
            state.listeners = kept;
            state.restorations += matched.len();
            matched
        };
        let fired = matched.len();
        for listener in matched {
            // The waiter may already have lost its race and gone away.
            let _ = listener.reply.send(url.to_owned());
        }
        fired
    }

    /// `true` while at least one listener is registered.
    #[must_use]
    pub fn is_intercepting(&self) -> bool {
        !self.lock().listeners.is_empty()
    }

    /// Number of listeners released so far, by match or by drop.
    #[must_use]
    pub fn restorations(&self) -> usize {
        self.lock().restorations
    }

    fn release(&self, id: u64) {
        let mut state = self.lock();
        if let Some(pos) = state.listeners.iter().position(|l| l.id == id) {
            state.listeners.remove(pos);
            state.restorations += 1;
        }
    }

    fn lock(&self) -> MutexGuard<'_, InterceptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Guard for one registered listener.
#[derive(Debug)]
pub struct Interception<'a> {
    interceptor: &'a NetworkInterceptor,
    id: u64,
    receiver: oneshot::Receiver<String>,
}

impl Interception<'_> {
    /// Resolves with the matching URL once a request completes. Returns
    /// `None` if the listener was released without a match.
    pub async fn completed(&mut self) -> Option<String> {
        (&mut self.receiver).await.ok()
    }
}

impl Drop for Interception<'_> {
    fn drop(&mut self) {
        self.interceptor.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_matching_request_resolves_and_restores_once() {
        let interceptor = NetworkInterceptor::new();
        let mut interception = interceptor.acquire("/apply-discount");
        assert!(interceptor.is_intercepting());

        assert_eq!(interceptor.request_completed("https://shop.com/cart/items"), 0);
        assert_eq!(
            interceptor.request_completed("https://shop.com/apply-discount?code=A"),
            1
        );
        assert_eq!(
            interceptor.request_completed("https://shop.com/apply-discount?code=B"),
            0
        );

        assert_eq!(
            interception.completed().await.as_deref(),
            Some("https://shop.com/apply-discount?code=A")
        );
        drop(interception);

        assert!(!interceptor.is_intercepting());
        assert_eq!(interceptor.restorations(), 1);
    }

    #[test]
    fn dropping_unmatched_guard_restores() {
        let interceptor = NetworkInterceptor::new();
        let interception = interceptor.acquire("/apply-discount");
        drop(interception);
        assert!(!interceptor.is_intercepting());
        assert_eq!(interceptor.restorations(), 1);
        assert_eq!(interceptor.request_completed("/apply-discount"), 0);
        assert_eq!(interceptor.restorations(), 1);
    }

    #[test]
    fn concurrent_listeners_are_independent() {
        let interceptor = NetworkInterceptor::new();
        let discounts = interceptor.acquire("/apply-discount");
        let totals = interceptor.acquire("/totals");
        assert_eq!(interceptor.request_completed("/totals?refresh=1"), 1);
        assert!(interceptor.is_intercepting());
        drop(totals);
        drop(discounts);
        assert!(!interceptor.is_intercepting());
        assert_eq!(interceptor.restorations(), 2);
    }
}
