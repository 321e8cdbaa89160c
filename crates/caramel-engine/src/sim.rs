//! A scripted retailer checkout.
//!
//! [`SimulatedCheckout`] implements [`CheckoutPage`] over an in-memory element
//! table keyed by selector. It reprices the cart from a code → discount table
//! when the submit button is clicked, optionally after a delay and optionally
//! announcing the update over the network instead of trusting the DOM. It
//! keeps enough bookkeeping (submitted codes, input events, live observers)
//! for callers to check what the engine did to it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use caramel_core::SiteRecord;
use rust_decimal::Decimal;
use tokio::sync::watch;

use crate::error::PageError;
use crate::intercept::NetworkInterceptor;
use crate::page::CheckoutPage;

const NO_AMOUNT_TEXT: &str = "Total calculated at next step";
const UPDATING_TEXT: &str = "Updating your order…";

/// Handle to an element of a [`SimulatedCheckout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimHandle(Target);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Keyed(String),
    CartItem(usize),
}

#[derive(Debug, Clone, Default)]
struct SimElement {
    id: Option<String>,
    text: String,
    value: String,
    disabled: bool,
}

impl SimElement {
    fn keyed(key: &str, text: impl Into<String>) -> Self {
        Self {
            id: key.strip_prefix('#').map(str::to_owned),
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct Shop {
    elements: HashMap<String, SimElement>,
    cart_items: Vec<String>,
    input_key: String,
    submit_key: String,
    price_key: String,
    show_key: Option<String>,
    dismiss_key: Option<String>,
    cart_key: Option<String>,
    base_total: Decimal,
    total: Decimal,
    shows_amount: bool,
    discounts: HashMap<String, Decimal>,
    popup_open: bool,
    broken_input: bool,
    remove_on_clear: bool,
    garbles_on: Option<String>,
    submitted: Vec<String>,
    input_events: usize,
}

impl Shop {
    fn render_total(&mut self) {
        let text = if self.shows_amount {
            format!("Order total: ${:.2}", self.total)
        } else {
            NO_AMOUNT_TEXT.to_owned()
        };
        if let Some(price) = self.elements.get_mut(&self.price_key) {
            price.text = text;
        }
    }

    fn reprice(&mut self, code: &str) {
        if let Some(discount) = self.discounts.get(code) {
            self.total = (self.base_total - *discount).max(Decimal::ZERO);
        }
        if self.garbles_on.as_deref() == Some(code) {
            if let Some(price) = self.elements.get_mut(&self.price_key) {
                UPDATING_TEXT.clone_into(&mut price.text);
            }
        } else {
            self.render_total();
        }
        if let Some(submit) = self.elements.get_mut(&self.submit_key) {
            submit.disabled = false;
        }
    }

    fn element(&self, handle: &SimHandle) -> Option<&SimElement> {
        match &handle.0 {
            Target::Keyed(key) => self.elements.get(key),
            Target::CartItem(_) => None,
        }
    }

    fn element_mut(&mut self, handle: &SimHandle) -> Result<&mut SimElement, PageError> {
        match &handle.0 {
            Target::Keyed(key) => self
                .elements
                .get_mut(key)
                .ok_or_else(|| PageError::Detached(key.clone())),
            Target::CartItem(i) => Err(PageError::Host(format!("cart item {i} is not editable"))),
        }
    }
}

#[derive(Debug)]
struct SimState {
    hostname: String,
    shop: Mutex<Shop>,
    changes: watch::Sender<u64>,
    network: NetworkInterceptor,
    latency: Duration,
    network_delay: Duration,
    apply_url: Option<String>,
}

impl SimState {
    fn shop(&self) -> MutexGuard<'_, Shop> {
        self.shop.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }
}

/// An in-memory checkout page. Clones share the same page.
#[derive(Debug, Clone)]
pub struct SimulatedCheckout {
    inner: Arc<SimState>,
}

impl SimulatedCheckout {
    /// Starts a checkout on `hostname` laid out with `record`'s selectors and
    /// showing `total`.
    #[must_use]
    pub fn builder(
        hostname: impl Into<String>,
        record: &SiteRecord,
        total: Decimal,
    ) -> SimCheckoutBuilder {
        SimCheckoutBuilder {
            hostname: hostname.into(),
            record: record.clone(),
            total,
            discounts: HashMap::new(),
            latency: Duration::ZERO,
            network_delay: Duration::ZERO,
            hidden_input: false,
            popup: false,
            price_element_id: None,
            shows_amount: true,
            submit: true,
            cart_items: Vec::new(),
            remove_on_clear: false,
            garbles_on: None,
            broken_input: false,
        }
    }

    /// Codes that reached the retailer, in submission order.
    #[must_use]
    pub fn submitted_codes(&self) -> Vec<String> {
        self.inner.shop().submitted.clone()
    }

    /// The total the retailer currently charges.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.inner.shop().total
    }

    #[must_use]
    pub fn popup_open(&self) -> bool {
        self.inner.shop().popup_open
    }

    /// Current value of the coupon input, empty while it is hidden.
    #[must_use]
    pub fn input_value(&self) -> String {
        let shop = self.inner.shop();
        shop.elements
            .get(&shop.input_key)
            .map(|e| e.value.clone())
            .unwrap_or_default()
    }

    /// Input notifications received so far.
    #[must_use]
    pub fn input_events(&self) -> usize {
        self.inner.shop().input_events
    }

    /// Live change subscriptions.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.changes.receiver_count()
    }

    /// Replaces an element's text, creating the element if needed.
    pub fn set_text(&self, selector: &str, text: &str) {
        self.inner
            .shop()
            .elements
            .entry(selector.to_owned())
            .or_insert_with(|| SimElement::keyed(selector, ""))
            .text = text.to_owned();
        self.inner.bump();
    }

    pub fn insert_element(&self, selector: &str, text: &str) {
        self.inner
            .shop()
            .elements
            .insert(selector.to_owned(), SimElement::keyed(selector, text));
        self.inner.bump();
    }

    pub fn remove_element(&self, selector: &str) {
        let removed = self.inner.shop().elements.remove(selector).is_some();
        if removed {
            self.inner.bump();
        }
    }

    pub fn set_disabled(&self, selector: &str, disabled: bool) {
        if let Some(element) = self.inner.shop().elements.get_mut(selector) {
            element.disabled = disabled;
        }
        self.inner.bump();
    }

    fn submit(&self, shop: &mut Shop) {
        if shop.popup_open {
            tracing::trace!("submit swallowed by open popup");
            return;
        }
        let Some(code) = shop
            .elements
            .get(&shop.input_key)
            .map(|e| e.value.trim().to_owned())
        else {
            return;
        };
        let submit_key = shop.submit_key.clone();
        let Some(submit) = shop.elements.get_mut(&submit_key) else {
            return;
        };
        if submit.disabled || code.is_empty() {
            return;
        }
        submit.disabled = true;
        shop.submitted.push(code.clone());

        let state = &self.inner;
        if state.latency.is_zero() && state.apply_url.is_none() {
            shop.reprice(&code);
            return;
        }
        let state = Arc::clone(state);
        tokio::spawn(async move {
            tokio::time::sleep(state.latency).await;
            state.shop().reprice(&code);
            state.bump();
            if let Some(url) = &state.apply_url {
                tokio::time::sleep(state.network_delay).await;
                state.network.request_completed(url);
            }
        });
    }
}

impl CheckoutPage for SimulatedCheckout {
    type Element = SimHandle;

    fn hostname(&self) -> String {
        self.inner.hostname.clone()
    }

    fn query(&self, selector: &str) -> Option<SimHandle> {
        let shop = self.inner.shop();
        selector.split(',').map(str::trim).find_map(|part| {
            if shop.cart_key.as_deref() == Some(part) {
                return (!shop.cart_items.is_empty()).then_some(SimHandle(Target::CartItem(0)));
            }
            shop.elements
                .contains_key(part)
                .then(|| SimHandle(Target::Keyed(part.to_owned())))
        })
    }

    fn query_all(&self, selector: &str) -> Vec<SimHandle> {
        let shop = self.inner.shop();
        if shop.cart_key.as_deref() == Some(selector.trim()) {
            return (0..shop.cart_items.len())
                .map(|i| SimHandle(Target::CartItem(i)))
                .collect();
        }
        drop(shop);
        self.query(selector).into_iter().collect()
    }

    fn element_by_id(&self, id: &str) -> Option<SimHandle> {
        let shop = self.inner.shop();
        shop.elements
            .iter()
            .find(|(_, e)| e.id.as_deref() == Some(id))
            .map(|(key, _)| SimHandle(Target::Keyed(key.clone())))
    }

    fn text(&self, element: &SimHandle) -> Option<String> {
        let shop = self.inner.shop();
        match &element.0 {
            Target::CartItem(i) => shop.cart_items.get(*i).cloned(),
            Target::Keyed(_) => shop.element(element).map(|e| e.text.clone()),
        }
    }

    fn is_disabled(&self, element: &SimHandle) -> bool {
        self.inner
            .shop()
            .element(element)
            .is_some_and(|e| e.disabled)
    }

    fn set_value(&self, element: &SimHandle, value: &str) -> Result<(), PageError> {
        let mut shop = self.inner.shop();
        if shop.broken_input && element.0 == Target::Keyed(shop.input_key.clone()) {
            return Err(PageError::Host("input rejected programmatic value".to_owned()));
        }
        value.clone_into(&mut shop.element_mut(element)?.value);
        Ok(())
    }

    fn notify_input(&self, element: &SimHandle) -> Result<(), PageError> {
        let mut shop = self.inner.shop();
        let cleared = shop.element_mut(element)?.value.is_empty();
        shop.input_events += 1;
        let is_input = element.0 == Target::Keyed(shop.input_key.clone());
        if is_input && cleared && shop.remove_on_clear && shop.total != shop.base_total {
            shop.total = shop.base_total;
            shop.render_total();
            drop(shop);
            self.inner.bump();
        }
        Ok(())
    }

    fn click(&self, element: &SimHandle) -> Result<(), PageError> {
        let Target::Keyed(key) = &element.0 else {
            return Ok(());
        };
        let mut shop = self.inner.shop();
        if !shop.elements.contains_key(key) {
            return Err(PageError::Detached(key.clone()));
        }
        if shop.dismiss_key.as_ref() == Some(key) {
            shop.elements.remove(key);
            shop.popup_open = false;
        } else if shop.show_key.as_ref() == Some(key) {
            let input_key = shop.input_key.clone();
            shop.elements
                .entry(input_key.clone())
                .or_insert_with(|| SimElement::keyed(&input_key, ""));
        } else if *key == shop.submit_key {
            self.submit(&mut shop);
        } else {
            return Ok(());
        }
        drop(shop);
        self.inner.bump();
        Ok(())
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    fn network(&self) -> &NetworkInterceptor {
        &self.inner.network
    }
}

/// Configures a [`SimulatedCheckout`].
#[derive(Debug, Clone)]
pub struct SimCheckoutBuilder {
    hostname: String,
    record: SiteRecord,
    total: Decimal,
    discounts: HashMap<String, Decimal>,
    latency: Duration,
    network_delay: Duration,
    hidden_input: bool,
    popup: bool,
    price_element_id: Option<String>,
    shows_amount: bool,
    submit: bool,
    cart_items: Vec<String>,
    remove_on_clear: bool,
    garbles_on: Option<String>,
    broken_input: bool,
}

impl SimCheckoutBuilder {
    /// Accepts `code`, taking `amount` off the base total.
    #[must_use]
    pub fn discount(mut self, code: impl Into<String>, amount: Decimal) -> Self {
        self.discounts.insert(code.into(), amount);
        self
    }

    /// Delay between a submission and the repriced total.
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Delay between the repriced total and the network completion, for
    /// sites with a network signal.
    #[must_use]
    pub fn network_delay(mut self, delay: Duration) -> Self {
        self.network_delay = delay;
        self
    }

    /// Keeps the coupon input out of the page until the show toggle is clicked.
    #[must_use]
    pub fn hidden_input(mut self) -> Self {
        self.hidden_input = true;
        self
    }

    /// Opens a popup that swallows submissions until dismissed.
    #[must_use]
    pub fn popup(mut self) -> Self {
        self.popup = true;
        self
    }

    /// Renders the total at `#id` instead of at the record's price selector.
    #[must_use]
    pub fn price_element_id(mut self, id: impl Into<String>) -> Self {
        self.price_element_id = Some(id.into());
        self
    }

    /// Renders the total container without any amount.
    #[must_use]
    pub fn without_price(mut self) -> Self {
        self.shows_amount = false;
        self
    }

    #[must_use]
    pub fn without_submit(mut self) -> Self {
        self.submit = false;
        self
    }

    /// Adds a line item rendered under the record's cart selector.
    #[must_use]
    pub fn cart_item(mut self, text: impl Into<String>) -> Self {
        self.cart_items.push(text.into());
        self
    }

    /// Drops the applied code when the input is cleared.
    #[must_use]
    pub fn remove_on_clear(mut self) -> Self {
        self.remove_on_clear = true;
        self
    }

    /// Leaves the total container without an amount after `code` is applied.
    #[must_use]
    pub fn garbles_total_on(mut self, code: impl Into<String>) -> Self {
        self.garbles_on = Some(code.into());
        self
    }

    /// Makes the coupon input reject programmatic values.
    #[must_use]
    pub fn broken_input(mut self) -> Self {
        self.broken_input = true;
        self
    }

    #[must_use]
    pub fn build(self) -> SimulatedCheckout {
        let record = self.record;
        let price_key = self
            .price_element_id
            .map_or_else(|| record.price_container.clone(), |id| format!("#{id}"));

        let mut elements = HashMap::new();
        let show_key = record.show_input.clone().filter(|_| self.hidden_input);
        if let Some(show) = &show_key {
            elements.insert(show.clone(), SimElement::keyed(show, "Have a promo code?"));
        }
        if !self.hidden_input {
            elements.insert(
                record.coupon_input.clone(),
                SimElement::keyed(&record.coupon_input, ""),
            );
        }
        if self.submit {
            elements.insert(
                record.coupon_submit.clone(),
                SimElement::keyed(&record.coupon_submit, "Apply"),
            );
        }
        elements.insert(price_key.clone(), SimElement::keyed(&price_key, ""));
        let dismiss_key = record.dismiss_button.clone().filter(|_| self.popup);
        if let Some(dismiss) = &dismiss_key {
            elements.insert(dismiss.clone(), SimElement::keyed(dismiss, "No thanks"));
        }

        let apply_url = record
            .network_signal()
            .map(|endpoint| format!("https://{}{endpoint}", self.hostname));

        let mut shop = Shop {
            elements,
            cart_items: self.cart_items,
            input_key: record.coupon_input.clone(),
            submit_key: record.coupon_submit.clone(),
            price_key,
            show_key,
            dismiss_key,
            cart_key: record.cart_items.clone(),
            base_total: self.total,
            total: self.total,
            shows_amount: self.shows_amount,
            discounts: self.discounts,
            popup_open: self.popup,
            broken_input: self.broken_input,
            remove_on_clear: self.remove_on_clear,
            garbles_on: self.garbles_on,
            submitted: Vec::new(),
            input_events: 0,
        };
        shop.render_total();

        let (changes, _) = watch::channel(0);
        SimulatedCheckout {
            inner: Arc::new(SimState {
                hostname: self.hostname,
                shop: Mutex::new(shop),
                changes,
                network: NetworkInterceptor::new(),
                latency: self.latency,
                network_delay: self.network_delay,
                apply_url,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn record() -> SiteRecord {
        SiteRecord {
            domain: "shop.com".to_owned(),
            coupon_input: "#code".to_owned(),
            coupon_submit: "#apply".to_owned(),
            price_container: "#total".to_owned(),
            show_input: Some("#show-code".to_owned()),
            dismiss_button: Some("#no-thanks".to_owned()),
            apply_endpoint: None,
            cart_items: Some(".line-item".to_owned()),
        }
    }

    fn submit(page: &SimulatedCheckout, code: &str) {
        let input = page.query("#code").unwrap();
        page.set_value(&input, code).unwrap();
        page.notify_input(&input).unwrap();
        page.click(&page.query("#apply").unwrap()).unwrap();
    }

    fn total_text(page: &SimulatedCheckout) -> String {
        page.text(&page.query("#total").unwrap()).unwrap()
    }

    #[tokio::test]
    async fn immediate_reprice_on_known_code() {
        let page = SimulatedCheckout::builder("www.shop.com", &record(), dec("50"))
            .discount("SAVE10", dec("7.50"))
            .build();
        assert_eq!(total_text(&page), "Order total: $50.00");
        submit(&page, "SAVE10");
        assert_eq!(total_text(&page), "Order total: $42.50");
        assert_eq!(page.total(), dec("42.50"));
        assert_eq!(page.submitted_codes(), vec!["SAVE10"]);
        assert_eq!(page.input_events(), 1);
    }

    #[tokio::test]
    async fn unknown_code_keeps_total() {
        let page = SimulatedCheckout::builder("www.shop.com", &record(), dec("50")).build();
        submit(&page, "BOGUS");
        assert_eq!(page.total(), dec("50"));
        assert!(!page.is_disabled(&page.query("#apply").unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_reprice_disables_submit_meanwhile() {
        let page = SimulatedCheckout::builder("www.shop.com", &record(), dec("50"))
            .discount("SAVE10", dec("10"))
            .latency(Duration::from_millis(900))
            .build();
        submit(&page, "SAVE10");
        assert!(page.is_disabled(&page.query("#apply").unwrap()));
        assert_eq!(page.total(), dec("50"));
        tokio::time::sleep(Duration::from_millis(901)).await;
        assert_eq!(page.total(), dec("40"));
        assert!(!page.is_disabled(&page.query("#apply").unwrap()));
    }

    #[tokio::test]
    async fn popup_swallows_submission_until_dismissed() {
        let page = SimulatedCheckout::builder("www.shop.com", &record(), dec("50"))
            .discount("SAVE10", dec("10"))
            .popup()
            .build();
        submit(&page, "SAVE10");
        assert!(page.submitted_codes().is_empty());
        page.click(&page.query("#no-thanks").unwrap()).unwrap();
        assert!(!page.popup_open());
        assert!(page.query("#no-thanks").is_none());
        page.click(&page.query("#apply").unwrap()).unwrap();
        assert_eq!(page.submitted_codes(), vec!["SAVE10"]);
    }

    #[tokio::test]
    async fn show_toggle_reveals_input() {
        let page = SimulatedCheckout::builder("www.shop.com", &record(), dec("50"))
            .hidden_input()
            .build();
        assert!(page.query("#code").is_none());
        page.click(&page.query("#show-code").unwrap()).unwrap();
        assert!(page.query("#code").is_some());
    }

    #[tokio::test]
    async fn clearing_input_removes_code_when_configured() {
        let page = SimulatedCheckout::builder("www.shop.com", &record(), dec("50"))
            .discount("SAVE10", dec("10"))
            .remove_on_clear()
            .build();
        submit(&page, "SAVE10");
        let input = page.query("#code").unwrap();
        page.set_value(&input, "").unwrap();
        page.notify_input(&input).unwrap();
        assert_eq!(page.total(), dec("50"));
        assert_eq!(page.input_value(), "");
    }

    #[tokio::test]
    async fn comma_lists_and_cart_items() {
        let page = SimulatedCheckout::builder("www.shop.com", &record(), dec("50"))
            .cart_item("Trail Runner Shoe")
            .cart_item("Wool Socks")
            .build();
        assert!(page.query("#missing, #total").is_some());
        let items = page.query_all(".line-item");
        assert_eq!(items.len(), 2);
        assert_eq!(page.text(&items[1]).as_deref(), Some("Wool Socks"));
    }

    #[tokio::test]
    async fn broken_input_rejects_value() {
        let page = SimulatedCheckout::builder("www.shop.com", &record(), dec("50"))
            .broken_input()
            .build();
        let input = page.query("#code").unwrap();
        assert!(matches!(
            page.set_value(&input, "SAVE10"),
            Err(PageError::Host(_))
        ));
    }

    #[tokio::test]
    async fn subscriptions_are_counted_and_released() {
        let page = SimulatedCheckout::builder("www.shop.com", &record(), dec("50")).build();
        let first = page.changes();
        let second = page.changes();
        assert_eq!(page.observer_count(), 2);
        drop(first);
        drop(second);
        assert_eq!(page.observer_count(), 0);
    }
}
