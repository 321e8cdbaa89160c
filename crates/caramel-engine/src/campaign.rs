//! Campaigns: every candidate code tried in order against one checkout.

use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt::Display;

use caramel_core::{normalize_site_domain, CampaignResult, Coupon, SiteRecord, TrialResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::page::{fill_input, resolve_element, CheckoutPage};
use crate::price::{extract_price, PriceMode};
use crate::timing::{Calibration, Pace};
use crate::trial::CouponEngine;
use crate::wait::wait_until_ready;

const NO_COUPONS: &str = "No coupons found.";
const FOUND_SAVINGS: &str = "We found a coupon that saves you money!";
const ALREADY_BEST: &str = "Already the best price.";

const MAX_KEYWORDS: usize = 5;
const WORDS_PER_KEYWORD: usize = 4;

/// Supplies candidate codes for a site.
#[allow(async_fn_in_trait)]
pub trait CouponSource {
    type Error: Display;

    async fn coupons_for(&self, domain: &str, keywords: &[String])
        -> Result<Vec<Coupon>, Self::Error>;
}

/// A fixed candidate list.
#[derive(Debug, Clone, Default)]
pub struct StaticCoupons(pub Vec<Coupon>);

impl CouponSource for StaticCoupons {
    type Error = Infallible;

    async fn coupons_for(&self, _domain: &str, _keywords: &[String]) -> Result<Vec<Coupon>, Infallible> {
        Ok(self.0.clone())
    }
}

/// Receives campaign progress. Every method defaults to doing nothing.
pub trait CampaignObserver {
    fn started(&mut self, _domain: &str, _candidates: usize) {}

    /// Called before trial `index` (zero-based) of `total`.
    fn progress(&mut self, _index: usize, _total: usize, _code: &str) {}

    fn finished(&mut self, _report: &CampaignReport) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SilentObserver;

impl CampaignObserver for SilentObserver {}

/// One trial as it happened during a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRecord {
    pub code: String,
    #[serde(flatten)]
    pub result: TrialResult,
    /// Saving against the original total; only set for successful trials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub savings: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignReport {
    pub campaign_id: Uuid,
    pub domain: String,
    pub original_total: Option<Decimal>,
    #[serde(flatten)]
    pub result: CampaignResult,
    pub message: String,
    pub trials: Vec<TrialRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Best saving seen so far. Ties keep the earlier code.
#[derive(Debug, Clone, Default)]
pub struct BestOffer {
    code: Option<String>,
    savings: Decimal,
}

impl BestOffer {
    /// Offers a candidate; returns `true` if it became the best.
    pub fn observe(&mut self, code: &str, savings: Decimal) -> bool {
        if savings > self.savings {
            self.code = Some(code.to_owned());
            self.savings = savings;
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    #[must_use]
    pub fn into_result(self) -> CampaignResult {
        match self.code {
            Some(code) => CampaignResult {
                best_code: Some(code),
                best_savings: self.savings,
            },
            None => CampaignResult::none(),
        }
    }
}

/// Runs campaigns on the page behind a [`CouponEngine`].
#[derive(Debug)]
pub struct CampaignRunner<'a, P: CheckoutPage + ?Sized> {
    engine: CouponEngine<'a, P>,
}

impl<'a, P: CheckoutPage + ?Sized> CampaignRunner<'a, P> {
    pub fn new(engine: CouponEngine<'a, P>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &CouponEngine<'a, P> {
        &self.engine
    }

    /// Fetches candidates for the page's site and tries them all.
    ///
    /// A failing source is treated as having no candidates.
    pub async fn run<S, O>(&self, record: &SiteRecord, source: &S, observer: &mut O) -> CampaignReport
    where
        S: CouponSource,
        O: CampaignObserver + ?Sized,
    {
        let domain = normalize_site_domain(&self.engine.page().hostname());
        let keywords = self.keyword_hints(record);
        let coupons = match source.coupons_for(&domain, &keywords).await {
            Ok(coupons) => coupons,
            Err(e) => {
                tracing::warn!(domain, error = %e, "coupon lookup failed");
                Vec::new()
            }
        };
        self.run_with_coupons(record, &coupons, observer).await
    }

    /// Tries every coupon in order, then leaves the best one applied.
    pub async fn run_with_coupons<O>(
        &self,
        record: &SiteRecord,
        coupons: &[Coupon],
        observer: &mut O,
    ) -> CampaignReport
    where
        O: CampaignObserver + ?Sized,
    {
        let started_at = Utc::now();
        let page = self.engine.page();
        observer.started(&record.domain, coupons.len());

        if coupons.is_empty() {
            tracing::info!(domain = %record.domain, "no coupons to try");
            let report = CampaignReport {
                campaign_id: Uuid::new_v4(),
                domain: record.domain.clone(),
                original_total: None,
                result: CampaignResult::none(),
                message: NO_COUPONS.to_owned(),
                trials: Vec::new(),
                started_at,
                finished_at: Utc::now(),
            };
            observer.finished(&report);
            return report;
        }

        let original_total = extract_price(page, &record.price_container, PriceMode::Largest);
        tracing::info!(
            domain = %record.domain,
            candidates = coupons.len(),
            original_total = ?original_total,
            "starting coupon campaign"
        );

        let calibration = self.engine.calibration(record);
        let mut best = BestOffer::default();
        let mut trials = Vec::with_capacity(coupons.len());

        for (index, coupon) in coupons.iter().enumerate() {
            observer.progress(index, coupons.len(), &coupon.code);
            let result = self.engine.apply_coupon(&coupon.code, record).await;

            let savings = match (result.success, original_total, result.new_total) {
                (true, Some(original), Some(new_total)) => Some(original - new_total),
                _ => None,
            };
            if let Some(savings) = savings {
                if best.observe(&coupon.code, savings) {
                    tracing::info!(code = %coupon.code, %savings, "new best coupon");
                }
            }
            trials.push(TrialRecord {
                code: coupon.code.clone(),
                result,
                savings,
            });

            self.reset(record, calibration).await;
        }

        let result = best.into_result();
        let message = if let Some(code) = &result.best_code {
            // Leave the winning code applied.
            let reapplied = self.engine.apply_coupon(code, record).await;
            if !reapplied.success {
                tracing::warn!(code, "best coupon did not re-apply cleanly");
            }
            FOUND_SAVINGS
        } else {
            ALREADY_BEST
        };

        let report = CampaignReport {
            campaign_id: Uuid::new_v4(),
            domain: record.domain.clone(),
            original_total,
            result,
            message: message.to_owned(),
            trials,
            started_at,
            finished_at: Utc::now(),
        };
        tracing::info!(
            campaign_id = %report.campaign_id,
            best_code = ?report.result.best_code,
            best_savings = %report.result.best_savings,
            "coupon campaign finished"
        );
        observer.finished(&report);
        report
    }

    /// Clears the input and waits for the page to accept the next code.
    async fn reset(&self, record: &SiteRecord, calibration: Calibration<'_>) {
        let page = self.engine.page();
        let config = self.engine.config();

        if let Some(input) = resolve_element(page, &record.coupon_input) {
            if let Err(e) = fill_input(page, &input, "") {
                tracing::debug!(error = %e, "could not clear coupon input");
            }
        }
        wait_until_ready(
            page,
            &record.coupon_submit,
            calibration.timeout(config.ready_timeout),
        )
        .await;

        let pause = match calibration.pace() {
            Pace::Fast => config.fast_pause,
            Pace::Unknown | Pace::Normal | Pace::Slow => config.pause,
        };
        tokio::time::sleep(pause).await;
    }

    /// Short product names from the cart, sent to the lookup as hints.
    fn keyword_hints(&self, record: &SiteRecord) -> Vec<String> {
        let Some(selector) = record.cart_items.as_deref() else {
            return Vec::new();
        };
        let page = self.engine.page();
        let mut seen = HashSet::new();
        page.query_all(selector)
            .iter()
            .filter_map(|item| page.text(item))
            .map(|text| {
                text.split_whitespace()
                    .take(WORDS_PER_KEYWORD)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|keyword| !keyword.is_empty() && seen.insert(keyword.to_lowercase()))
            .take(MAX_KEYWORDS)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn best_offer_requires_strict_improvement() {
        let mut best = BestOffer::default();
        assert!(!best.observe("ZERO", Decimal::ZERO));
        assert!(best.observe("FIVE", dec("5")));
        assert!(!best.observe("ALSO_FIVE", dec("5.00")));
        assert!(!best.observe("THREE", dec("3")));
        assert_eq!(best.code(), Some("FIVE"));
        let result = best.into_result();
        assert_eq!(result.best_code.as_deref(), Some("FIVE"));
        assert_eq!(result.best_savings, dec("5"));
    }

    #[test]
    fn empty_best_offer_is_no_result() {
        assert_eq!(BestOffer::default().into_result(), CampaignResult::none());
    }

    #[test]
    fn trial_record_serializes_flat() {
        let record = TrialRecord {
            code: "SAVE".to_owned(),
            result: TrialResult {
                success: true,
                new_total: Some(dec("42.50")),
            },
            savings: Some(dec("7.50")),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["code"], "SAVE");
        assert_eq!(json["success"], true);
        assert_eq!(json["newTotal"], "42.50");
        assert_eq!(json["savings"], "7.50");
    }
}
