use std::str::FromStr;
use std::time::Duration;

use caramel_core::{Coupon, SiteRecord};
use caramel_engine::{
    AdaptiveTiming, CampaignObserver, CampaignReport, CampaignRunner, CouponEngine, CouponSource,
    SilentObserver, SimulatedCheckout, StaticCoupons,
};
use rust_decimal::Decimal;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn site() -> SiteRecord {
    SiteRecord {
        domain: "shop.com".to_owned(),
        coupon_input: "#promo".to_owned(),
        coupon_submit: "#promo-apply".to_owned(),
        price_container: ".order-total".to_owned(),
        show_input: None,
        dismiss_button: None,
        apply_endpoint: None,
        cart_items: Some(".cart-line".to_owned()),
    }
}

fn coupons(codes: &[&str]) -> Vec<Coupon> {
    codes.iter().map(|c| Coupon::new(*c)).collect()
}

#[derive(Default)]
struct Recorder {
    started: Option<(String, usize)>,
    progress: Vec<(usize, usize, String)>,
    finished: Option<String>,
}

impl CampaignObserver for Recorder {
    fn started(&mut self, domain: &str, candidates: usize) {
        self.started = Some((domain.to_owned(), candidates));
    }

    fn progress(&mut self, index: usize, total: usize, code: &str) {
        self.progress.push((index, total, code.to_owned()));
    }

    fn finished(&mut self, report: &CampaignReport) {
        self.finished = Some(report.message.clone());
    }
}

#[tokio::test(start_paused = true)]
async fn picks_largest_saving_and_reapplies_it() {
    let record = site();
    let page = SimulatedCheckout::builder("www.shop.com", &record, dec("50.00"))
        .discount("A", Decimal::ZERO)
        .discount("B", dec("5"))
        .discount("C", dec("3"))
        .remove_on_clear()
        .build();
    let timing = AdaptiveTiming::new();
    let runner = CampaignRunner::new(CouponEngine::new(&page, &timing));
    let mut observer = Recorder::default();

    let report = runner
        .run_with_coupons(&record, &coupons(&["A", "B", "C"]), &mut observer)
        .await;

    assert_eq!(report.result.best_code.as_deref(), Some("B"));
    assert_eq!(report.result.best_savings, dec("5"));
    assert_eq!(report.original_total, Some(dec("50.00")));
    assert_eq!(report.message, "We found a coupon that saves you money!");
    assert_eq!(page.submitted_codes(), vec!["A", "B", "C", "B"]);
    assert_eq!(page.total(), dec("45.00"));
    assert_eq!(page.input_value(), "B");

    let savings: Vec<_> = report.trials.iter().map(|t| t.savings).collect();
    assert_eq!(savings, vec![None, Some(dec("5")), Some(dec("3"))]);

    assert_eq!(observer.started, Some(("shop.com".to_owned(), 3)));
    assert_eq!(
        observer.progress,
        vec![
            (0, 3, "A".to_owned()),
            (1, 3, "B".to_owned()),
            (2, 3, "C".to_owned())
        ]
    );
    assert_eq!(observer.finished.as_deref(), Some(report.message.as_str()));
    assert_eq!(page.observer_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn ties_keep_the_first_code() {
    let record = site();
    let page = SimulatedCheckout::builder("www.shop.com", &record, dec("40.00"))
        .discount("FIRST", dec("4"))
        .discount("SECOND", dec("4"))
        .remove_on_clear()
        .build();
    let timing = AdaptiveTiming::new();
    let runner = CampaignRunner::new(CouponEngine::new(&page, &timing));

    let report = runner
        .run_with_coupons(&record, &coupons(&["FIRST", "SECOND"]), &mut SilentObserver)
        .await;

    assert_eq!(report.result.best_code.as_deref(), Some("FIRST"));
    assert_eq!(page.submitted_codes(), vec!["FIRST", "SECOND", "FIRST"]);
}

#[tokio::test(start_paused = true)]
async fn no_winner_means_no_resubmission() {
    let record = site();
    let page = SimulatedCheckout::builder("www.shop.com", &record, dec("50.00")).build();
    let timing = AdaptiveTiming::new();
    let runner = CampaignRunner::new(CouponEngine::new(&page, &timing));

    let report = runner
        .run_with_coupons(&record, &coupons(&["X1", "X2"]), &mut SilentObserver)
        .await;

    assert_eq!(report.result.best_code, None);
    assert_eq!(report.result.best_savings, Decimal::ZERO);
    assert_eq!(report.message, "Already the best price.");
    assert_eq!(page.submitted_codes(), vec!["X1", "X2"]);
    assert_eq!(page.total(), dec("50.00"));
    assert_eq!(page.input_value(), "");
}

#[tokio::test(start_paused = true)]
async fn empty_candidate_list_reports_no_coupons() {
    let record = site();
    let page = SimulatedCheckout::builder("www.shop.com", &record, dec("50.00")).build();
    let timing = AdaptiveTiming::new();
    let runner = CampaignRunner::new(CouponEngine::new(&page, &timing));
    let mut observer = Recorder::default();

    let report = runner.run_with_coupons(&record, &[], &mut observer).await;

    assert_eq!(report.message, "No coupons found.");
    assert!(report.trials.is_empty());
    assert!(page.submitted_codes().is_empty());
    assert_eq!(observer.finished.as_deref(), Some("No coupons found."));
}

#[tokio::test(start_paused = true)]
async fn fast_domains_pause_less_between_trials() {
    let record = site();
    let page = SimulatedCheckout::builder("www.shop.com", &record, dec("50.00"))
        .discount("ONE", dec("1"))
        .discount("TWO", dec("2"))
        .remove_on_clear()
        .build();
    let timing = AdaptiveTiming::new();
    let runner = CampaignRunner::new(CouponEngine::new(&page, &timing));

    let start = tokio::time::Instant::now();
    runner
        .run_with_coupons(&record, &coupons(&["ONE", "TWO"]), &mut SilentObserver)
        .await;

    // Two instant trials, each followed by the 60 ms fast pause, then the re-apply.
    assert_eq!(start.elapsed(), Duration::from_millis(120));
}

struct RecordingSource {
    coupons: Vec<Coupon>,
    seen: std::sync::Mutex<Vec<(String, Vec<String>)>>,
}

impl CouponSource for RecordingSource {
    type Error = String;

    async fn coupons_for(&self, domain: &str, keywords: &[String]) -> Result<Vec<Coupon>, String> {
        self.seen
            .lock()
            .unwrap()
            .push((domain.to_owned(), keywords.to_vec()));
        if self.coupons.is_empty() {
            Err("lookup unavailable".to_owned())
        } else {
            Ok(self.coupons.clone())
        }
    }
}

#[tokio::test(start_paused = true)]
async fn run_sends_domain_and_cart_keywords() {
    let record = site();
    let page = SimulatedCheckout::builder("www.shop.com", &record, dec("50.00"))
        .discount("SAVE", dec("10"))
        .cart_item("  Trail Runner Shoe Size 10 Blue ")
        .cart_item("Wool Socks")
        .cart_item("wool socks")
        .build();
    let timing = AdaptiveTiming::new();
    let runner = CampaignRunner::new(CouponEngine::new(&page, &timing));
    let source = RecordingSource {
        coupons: coupons(&["SAVE"]),
        seen: std::sync::Mutex::default(),
    };

    let report = runner.run(&record, &source, &mut SilentObserver).await;

    assert_eq!(report.result.best_code.as_deref(), Some("SAVE"));
    let seen = source.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "shop.com");
    assert_eq!(
        seen[0].1,
        vec!["Trail Runner Shoe Size".to_owned(), "Wool Socks".to_owned()]
    );
}

#[tokio::test(start_paused = true)]
async fn failing_source_is_treated_as_empty() {
    let record = site();
    let page = SimulatedCheckout::builder("www.shop.com", &record, dec("50.00")).build();
    let timing = AdaptiveTiming::new();
    let runner = CampaignRunner::new(CouponEngine::new(&page, &timing));
    let source = RecordingSource {
        coupons: Vec::new(),
        seen: std::sync::Mutex::default(),
    };

    let report = runner.run(&record, &source, &mut SilentObserver).await;

    assert_eq!(report.message, "No coupons found.");
    assert!(page.submitted_codes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn static_coupons_feed_a_campaign() {
    let record = site();
    let page = SimulatedCheckout::builder("checkout.shop.com", &record, dec("20.00"))
        .discount("TEN", dec("2"))
        .build();
    let timing = AdaptiveTiming::new();
    let runner = CampaignRunner::new(CouponEngine::new(&page, &timing));

    let report = runner
        .run(&record, &StaticCoupons(coupons(&["TEN"])), &mut SilentObserver)
        .await;

    assert_eq!(report.result.best_savings, dec("2"));
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["bestCode"], "TEN");
    assert_eq!(json["bestSavings"], "2.00");
    assert_eq!(json["trials"][0]["newTotal"], "18.00");
}
