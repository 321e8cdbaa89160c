use std::str::FromStr;
use std::time::Duration;

use caramel_core::SiteRecord;
use caramel_engine::{detect_checkout, is_checkout, EngineConfig, SimulatedCheckout, SiteRegistry, StaticSites};
use rust_decimal::Decimal;
use tokio::time::Instant;

fn site(show_input: Option<&str>) -> SiteRecord {
    SiteRecord {
        domain: "shop.com".to_owned(),
        coupon_input: "#promo".to_owned(),
        coupon_submit: "#promo-apply".to_owned(),
        price_container: "#grand-total".to_owned(),
        show_input: show_input.map(str::to_owned),
        dismiss_button: None,
        apply_endpoint: None,
        cart_items: None,
    }
}

fn registry(record: &SiteRecord) -> SiteRegistry<StaticSites> {
    SiteRegistry::new(StaticSites(vec![record.clone()]))
}

fn total() -> Decimal {
    Decimal::from_str("25.00").unwrap()
}

#[tokio::test(start_paused = true)]
async fn visible_input_is_detected_without_waiting() {
    let record = site(None);
    let page = SimulatedCheckout::builder("www.shop.com", &record, total()).build();
    let registry = registry(&record);

    let start = Instant::now();
    let found = detect_checkout(&page, &registry, &EngineConfig::default()).await;

    assert_eq!(found.map(|r| r.domain.as_str()), Some("shop.com"));
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn show_toggle_counts_as_entry_point() {
    let record = site(Some("#have-a-code"));
    let page = SimulatedCheckout::builder("www.shop.com", &record, total())
        .hidden_input()
        .build();
    assert!(is_checkout(&page, &registry(&record), &EngineConfig::default()).await);
}

#[tokio::test(start_paused = true)]
async fn missing_entry_point_gives_up_after_bounded_wait() {
    let record = site(None);
    let page = SimulatedCheckout::builder("www.shop.com", &record, total())
        .hidden_input()
        .build();

    let start = Instant::now();
    let detected = is_checkout(&page, &registry(&record), &EngineConfig::default()).await;

    assert!(!detected);
    assert_eq!(start.elapsed(), Duration::from_millis(3000));
    assert_eq!(page.observer_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn late_rendered_input_is_detected() {
    let record = site(None);
    let page = SimulatedCheckout::builder("www.shop.com", &record, total())
        .hidden_input()
        .build();
    let renderer = page.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1200)).await;
        renderer.insert_element("#promo", "");
    });

    let start = Instant::now();
    let detected = is_checkout(&page, &registry(&record), &EngineConfig::default()).await;

    assert!(detected);
    assert_eq!(start.elapsed(), Duration::from_millis(1200));
}

#[tokio::test(start_paused = true)]
async fn unsupported_host_is_not_a_checkout() {
    let record = site(None);
    let page = SimulatedCheckout::builder("www.elsewhere.org", &record, total()).build();

    let start = Instant::now();
    assert!(detect_checkout(&page, &registry(&record), &EngineConfig::default())
        .await
        .is_none());
    assert_eq!(start.elapsed(), Duration::ZERO);
}
