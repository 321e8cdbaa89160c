//! A single coupon trial.
//!
//! Submitting a code and knowing when the retailer has finished reacting are
//! separate problems. After the submit click the engine races three signals:
//! a calibrated settle timer, a mutation of the price container (or, for
//! network-signalled sites, completion of the discount request), and a price
//! poll that only records how quickly a drop became visible. The first of the
//! first two groups to settle ends the wait; the totals before and after then
//! decide the result.

use std::future::Future;

use caramel_core::{SiteRecord, TrialResult};
use rust_decimal::Decimal;
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::page::{fill_input, resolve_element, CheckoutPage};
use crate::price::{extract_price, PriceMode};
use crate::timing::{Calibration, LatencyModel};
use crate::wait::{await_until, wait_for_element, wait_for_network, WaitOutcome};

/// Applies coupon codes to one checkout page.
pub struct CouponEngine<'a, P: CheckoutPage + ?Sized> {
    page: &'a P,
    timing: &'a dyn LatencyModel,
    config: EngineConfig,
}

impl<'a, P: CheckoutPage + ?Sized> CouponEngine<'a, P> {
    pub fn new(page: &'a P, timing: &'a dyn LatencyModel) -> Self {
        Self::with_config(page, timing, EngineConfig::default())
    }

    pub fn with_config(page: &'a P, timing: &'a dyn LatencyModel, config: EngineConfig) -> Self {
        Self {
            page,
            timing,
            config,
        }
    }

    pub fn page(&self) -> &'a P {
        self.page
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Latency calibration for `record`'s domain.
    pub fn calibration<'r>(&self, record: &'r SiteRecord) -> Calibration<'r>
    where
        'a: 'r,
    {
        Calibration::new(self.timing, &record.domain)
    }

    /// Enters `code`, submits it, and reports whether the total dropped.
    ///
    /// Never fails: any page error is logged and reported as an unsuccessful
    /// trial.
    pub async fn apply_coupon(&self, code: &str, record: &SiteRecord) -> TrialResult {
        match self.run_trial(code, record).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(code, domain = %record.domain, error = %e, "coupon trial failed");
                TrialResult::failed()
            }
        }
    }

    async fn run_trial(&self, code: &str, record: &SiteRecord) -> Result<TrialResult, EngineError> {
        let started = Instant::now();
        let calibration = self.calibration(record);

        self.dismiss_popup(record).await?;

        let input = self.reveal_input(record, calibration).await?;
        let submit = resolve_element(self.page, &record.coupon_submit);
        let (Some(input), Some(submit)) = (input, submit) else {
            tracing::warn!(
                domain = %record.domain,
                "coupon input or submit button not found"
            );
            return Ok(TrialResult::failed());
        };

        let before = extract_price(self.page, &record.price_container, PriceMode::Largest);
        let outcome = self
            .submit_and_wait(code, record, &input, &submit, calibration, before)
            .await?;

        let elapsed = started.elapsed();
        calibration.record(elapsed);

        let after = extract_price(self.page, &record.price_container, PriceMode::Largest);
        let result = TrialResult::from_totals(before, after);
        tracing::debug!(
            code,
            via = %outcome,
            elapsed_ms = elapsed.as_millis(),
            before = ?before,
            after = ?after,
            success = result.success,
            "coupon trial settled"
        );
        Ok(result)
    }

    async fn dismiss_popup(&self, record: &SiteRecord) -> Result<(), EngineError> {
        let Some(button) = record
            .dismiss_button
            .as_deref()
            .and_then(|selector| resolve_element(self.page, selector))
        else {
            return Ok(());
        };
        self.page.click(&button)?;
        tokio::time::sleep(self.config.dismiss_pause).await;
        Ok(())
    }

    /// The coupon input, clicking the show-input toggle first if the input
    /// is collapsed.
    async fn reveal_input(
        &self,
        record: &SiteRecord,
        calibration: Calibration<'_>,
    ) -> Result<Option<P::Element>, EngineError> {
        if let Some(input) = resolve_element(self.page, &record.coupon_input) {
            return Ok(Some(input));
        }
        let Some(toggle) = record
            .show_input
            .as_deref()
            .and_then(|selector| resolve_element(self.page, selector))
        else {
            return Ok(None);
        };
        self.page.click(&toggle)?;
        if let Err(e) = wait_for_element(
            self.page,
            &record.coupon_input,
            self.config.show_input_timeout,
            Some(calibration),
        )
        .await
        {
            tracing::debug!(error = %e, "coupon input did not appear");
        }
        Ok(resolve_element(self.page, &record.coupon_input))
    }

    /// Arms the reaction signals, submits `code`, and waits for the page to
    /// react.
    async fn submit_and_wait(
        &self,
        code: &str,
        record: &SiteRecord,
        input: &P::Element,
        submit: &P::Element,
        calibration: Calibration<'_>,
        before: Option<Decimal>,
    ) -> Result<WaitOutcome, EngineError> {
        let page = self.page;

        // Armed before the click: a host may react synchronously.
        let signal = record.network_signal();
        let network = signal.map(|fragment| wait_for_network(page.network(), fragment));
        let price = if signal.is_none() {
            resolve_element(page, &record.price_container)
        } else {
            None
        };
        let text = price.map(|price| {
            let initial = page.text(&price);
            let changes = page.changes();
            let bound = calibration.timeout(self.config.text_change_timeout);
            async move {
                match await_until(changes, bound, "price text change", || {
                    page.text(&price) != initial
                })
                .await
                {
                    Ok(elapsed) => {
                        calibration.record(elapsed);
                        WaitOutcome::TextChanged
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "price container did not change");
                        WaitOutcome::Timeout
                    }
                }
            }
        });

        fill_input(page, input, code)?;
        page.click(submit)?;

        Ok(self.race(record, text, network, calibration, before).await)
    }

    async fn race<T, N>(
        &self,
        record: &SiteRecord,
        text: Option<T>,
        network: Option<N>,
        calibration: Calibration<'_>,
        before: Option<Decimal>,
    ) -> WaitOutcome
    where
        T: Future<Output = WaitOutcome>,
        N: Future<Output = WaitOutcome>,
    {
        let submitted = Instant::now();
        let watch_text = text.is_some();
        let watch_network = network.is_some();

        let settle = tokio::time::sleep(calibration.timeout(self.config.settle_timeout));
        let text = settle_or_pending(text);
        let network = settle_or_pending(network);
        tokio::pin!(settle, text, network);

        let period = self.config.early_poll_interval;
        let mut poll = tokio::time::interval_at(submitted + period, period);
        let mut early_seen = false;

        loop {
            tokio::select! {
                () = &mut settle => return WaitOutcome::Timeout,
                outcome = &mut text, if watch_text => return outcome,
                outcome = &mut network, if watch_network => return outcome,
                _ = poll.tick(), if !early_seen => {
                    early_seen = self.observe_early_drop(record, before, submitted, calibration);
                }
            }
        }
    }

    fn observe_early_drop(
        &self,
        record: &SiteRecord,
        before: Option<Decimal>,
        submitted: Instant,
        calibration: Calibration<'_>,
    ) -> bool {
        let now = extract_price(self.page, &record.price_container, PriceMode::Largest);
        let dropped = matches!((before, now), (Some(b), Some(n)) if n < b);
        if dropped {
            let latency = submitted.elapsed();
            calibration.record(latency);
            tracing::info!(
                domain = %record.domain,
                latency_ms = latency.as_millis(),
                "early price drop detected"
            );
        }
        dropped
    }
}

async fn settle_or_pending<F: Future<Output = WaitOutcome>>(waiter: Option<F>) -> WaitOutcome {
    match waiter {
        Some(waiter) => waiter.await,
        None => std::future::pending().await,
    }
}

impl<P: CheckoutPage + ?Sized> std::fmt::Debug for CouponEngine<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CouponEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "trial_test.rs"]
mod tests;
