//! Currency amounts scraped from rendered checkout text.
//!
//! Totals are found by pattern rather than by structure: an optional one to
//! three letter currency prefix (`US`, `CA`), a symbol, then digit groups
//! with optional thousands separators and decimals. Containers often show a
//! struck-through list price next to the payable total, so callers choose
//! between the first amount and the largest.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::page::{resolve_element, CheckoutPage};

static PRICE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[A-Z]{1,3}\s?)?[$£€]\s?\d{1,3}(?:,\d{3})*(?:\.\d+)?")
        .expect("valid price token regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceMode {
    /// First amount in document order.
    First,
    /// Largest amount in the container.
    Largest,
}

/// All currency amounts in `text`, in document order.
#[must_use]
pub fn parse_prices(text: &str) -> Vec<Decimal> {
    PRICE_TOKEN
        .find_iter(text)
        .filter_map(|token| {
            let digits: String = token
                .as_str()
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            Decimal::from_str(&digits).ok()
        })
        .collect()
}

fn pick(prices: &[Decimal], mode: PriceMode) -> Option<Decimal> {
    match mode {
        PriceMode::First => prices.first().copied(),
        PriceMode::Largest => prices.iter().max().copied(),
    }
}

/// Reads the amount shown in the element at `selector`.
///
/// Returns `None` when the element cannot be resolved or its text holds no
/// currency amount; callers must treat that as "unknown", never as zero.
pub fn extract_price<P: CheckoutPage + ?Sized>(
    page: &P,
    selector: &str,
    mode: PriceMode,
) -> Option<Decimal> {
    let Some(element) = resolve_element(page, selector) else {
        tracing::debug!(selector, "price element not found");
        return None;
    };
    let text = page.text(&element)?;
    let price = pick(&parse_prices(&text), mode);
    if price.is_none() {
        tracing::debug!(selector, "no price found in container text");
    }
    price
}
