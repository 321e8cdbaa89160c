use std::time::Duration;

/// Base timings for the engine. Every wait is passed through the domain's
/// adaptive estimate before use, except `dismiss_pause`, the inter-trial
/// pauses, and `checkout_wait`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pause after closing an interstitial popup.
    pub dismiss_pause: Duration,
    /// Bound on the input appearing after the show-input toggle is clicked.
    pub show_input_timeout: Duration,
    /// Fallback branch of the post-submit race.
    pub settle_timeout: Duration,
    /// Bound on the price container text changing after submit.
    pub text_change_timeout: Duration,
    /// Period of the early-success price poll.
    pub early_poll_interval: Duration,
    /// Bound on the submit button becoming enabled between trials.
    pub ready_timeout: Duration,
    /// Inter-trial pause for domains classified fast.
    pub fast_pause: Duration,
    /// Inter-trial pause for every other domain.
    pub pause: Duration,
    /// Bound on the coupon entry point appearing during checkout detection.
    pub checkout_wait: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dismiss_pause: Duration::from_millis(180),
            show_input_timeout: Duration::from_millis(3000),
            settle_timeout: Duration::from_millis(3500),
            text_change_timeout: Duration::from_millis(3000),
            early_poll_interval: Duration::from_millis(200),
            ready_timeout: Duration::from_millis(2000),
            fast_pause: Duration::from_millis(60),
            pause: Duration::from_millis(120),
            checkout_wait: Duration::from_millis(3000),
        }
    }
}
