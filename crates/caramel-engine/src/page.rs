//! The host page seen by the engine.
//!
//! A checkout page is whatever answers CSS selectors: a browser content
//! script binding, a remote-debugging driver, or [`crate::SimulatedCheckout`].
//! All operations are synchronous; the engine only suspends inside waiters.

use std::sync::LazyLock;

use regex::Regex;
use tokio::sync::watch;

use crate::error::PageError;
use crate::intercept::NetworkInterceptor;

static EMBEDDED_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[id=['"]([^'"]+)['"]\]"#).expect("valid id selector regex"));

pub trait CheckoutPage {
    /// Opaque handle to a resolved element.
    type Element: Clone;

    fn hostname(&self) -> String;

    /// First element matching `selector`, if any.
    fn query(&self, selector: &str) -> Option<Self::Element>;

    fn query_all(&self, selector: &str) -> Vec<Self::Element> {
        self.query(selector).into_iter().collect()
    }

    fn element_by_id(&self, id: &str) -> Option<Self::Element>;

    /// Rendered text of the element; `None` once it has been detached.
    fn text(&self, element: &Self::Element) -> Option<String>;

    fn is_disabled(&self, element: &Self::Element) -> bool;

    /// Writes the element's form value.
    ///
    /// # Errors
    ///
    /// Returns [`PageError`] if the element is gone or refuses the value.
    fn set_value(&self, element: &Self::Element, value: &str) -> Result<(), PageError>;

    /// Emits the change notification the host's data-binding layer listens
    /// for after a programmatic value change (an `input` event in a browser).
    ///
    /// # Errors
    ///
    /// Returns [`PageError`] if the element is gone.
    fn notify_input(&self, element: &Self::Element) -> Result<(), PageError>;

    /// # Errors
    ///
    /// Returns [`PageError`] if the element is gone or the host refuses the click.
    fn click(&self, element: &Self::Element) -> Result<(), PageError>;

    /// A fresh subscription to subtree mutations. The value is a generation
    /// counter; only changes after the call are observed. Dropping the
    /// receiver detaches the observer.
    fn changes(&self) -> watch::Receiver<u64>;

    fn network(&self) -> &NetworkInterceptor;
}

/// Resolves `selector`, falling back to an id lookup when the selector embeds
/// `[id='...']`. Checkout pages regenerate wrapper markup often enough that
/// the attribute form stops matching while the id survives.
pub fn resolve_element<P: CheckoutPage + ?Sized>(page: &P, selector: &str) -> Option<P::Element> {
    page.query(selector).or_else(|| {
        let id = EMBEDDED_ID.captures(selector)?.get(1)?.as_str();
        page.element_by_id(id)
    })
}

/// Sets a form value and notifies the host.
///
/// # Errors
///
/// Propagates the first [`PageError`] from the host.
pub fn fill_input<P: CheckoutPage + ?Sized>(
    page: &P,
    element: &P::Element,
    value: &str,
) -> Result<(), PageError> {
    page.set_value(element, value)?;
    page.notify_input(element)
}
