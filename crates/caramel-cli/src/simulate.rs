//! `simulate`: run a full campaign against a scripted checkout.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use caramel_client::CouponClient;
use caramel_core::{AppConfig, Coupon, SiteRecord};
use caramel_engine::{
    detect_checkout, AdaptiveTiming, CampaignObserver, CampaignReport, CampaignRunner,
    CouponEngine, EngineConfig, SimulatedCheckout, SiteRegistry, StaticCoupons, StaticSites,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::sources::{ConfiguredSites, HttpCouponSource};

/// A scripted checkout, as read from a fixture file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Fixture {
    pub(crate) hostname: String,
    /// Selectors to use; looked up in the configured site list when absent.
    #[serde(default)]
    pub(crate) site: Option<SiteRecord>,
    pub(crate) total: Decimal,
    #[serde(default)]
    pub(crate) discounts: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub(crate) coupons: Vec<String>,
    #[serde(default)]
    pub(crate) cart_items: Vec<String>,
    #[serde(default)]
    pub(crate) latency_ms: u64,
    #[serde(default)]
    pub(crate) network_delay_ms: u64,
    #[serde(default)]
    pub(crate) hidden_input: bool,
    #[serde(default)]
    pub(crate) popup: bool,
    #[serde(default)]
    pub(crate) remove_on_clear: bool,
}

impl Fixture {
    pub(crate) fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid fixture {}", path.display()))
    }

    fn checkout(&self, record: &SiteRecord) -> SimulatedCheckout {
        let mut builder = SimulatedCheckout::builder(&self.hostname, record, self.total)
            .latency(Duration::from_millis(self.latency_ms))
            .network_delay(Duration::from_millis(self.network_delay_ms));
        for (code, amount) in &self.discounts {
            builder = builder.discount(code, *amount);
        }
        for item in &self.cart_items {
            builder = builder.cart_item(item);
        }
        if self.hidden_input {
            builder = builder.hidden_input();
        }
        if self.popup {
            builder = builder.popup();
        }
        if self.remove_on_clear {
            builder = builder.remove_on_clear();
        }
        builder.build()
    }
}

/// Logs campaign progress.
struct LogObserver;

impl CampaignObserver for LogObserver {
    fn started(&mut self, domain: &str, candidates: usize) {
        tracing::info!(domain, candidates, "trying coupons");
    }

    fn progress(&mut self, index: usize, total: usize, code: &str) {
        tracing::info!(code, "trying coupon {} of {total}", index + 1);
    }

    fn finished(&mut self, report: &CampaignReport) {
        tracing::info!(message = %report.message, "campaign complete");
    }
}

pub(crate) async fn run_simulate(
    config: &AppConfig,
    client: &CouponClient,
    fixture_path: &Path,
    coupons_from_api: bool,
) -> anyhow::Result<()> {
    let fixture = Fixture::load(fixture_path)?;

    let record = match fixture.site.clone() {
        Some(record) => record,
        None => SiteRegistry::new(ConfiguredSites::from_config(config, client))
            .lookup(&fixture.hostname)
            .await
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{} is not a supported site", fixture.hostname))?,
    };

    let page = fixture.checkout(&record);
    let engine_config = EngineConfig::default();
    let registry = SiteRegistry::new(StaticSites(vec![record]));
    let record = detect_checkout(&page, &registry, &engine_config)
        .await
        .ok_or_else(|| anyhow::anyhow!("no coupon form found on {}", fixture.hostname))?;

    let timing = AdaptiveTiming::new();
    let runner = CampaignRunner::new(CouponEngine::with_config(&page, &timing, engine_config));
    let mut observer = LogObserver;

    let report = if coupons_from_api {
        let source = HttpCouponSource {
            client,
            limit: config.coupon_limit,
        };
        runner.run(record, &source, &mut observer).await
    } else {
        let coupons = fixture.coupons.iter().map(Coupon::new).collect();
        runner
            .run(record, &StaticCoupons(coupons), &mut observer)
            .await
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
