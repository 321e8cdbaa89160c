//! Checkout detection.

use caramel_core::SiteRecord;

use crate::config::EngineConfig;
use crate::page::{resolve_element, CheckoutPage};
use crate::registry::{SiteRegistry, SiteSource};
use crate::wait::wait_for_any_element;

/// The site record for `page`, if the page is a supported checkout.
///
/// A page counts as a checkout once its coupon input, or the toggle that
/// reveals it, is present. Pages that render the coupon form late get up to
/// `config.checkout_wait` to do so.
pub async fn detect_checkout<'r, P, S>(
    page: &P,
    registry: &'r SiteRegistry<S>,
    config: &EngineConfig,
) -> Option<&'r SiteRecord>
where
    P: CheckoutPage + ?Sized,
    S: SiteSource,
{
    let hostname = page.hostname();
    let Some(record) = registry.lookup(&hostname).await else {
        tracing::debug!(hostname, "site not supported");
        return None;
    };

    let mut entry_points = vec![record.coupon_input.as_str()];
    entry_points.extend(record.show_input.as_deref());

    if has_entry_point(page, &entry_points) {
        return Some(record);
    }
    match wait_for_any_element(page, &entry_points, config.checkout_wait, None).await {
        Ok(_) if has_entry_point(page, &entry_points) => Some(record),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(hostname, error = %e, "no coupon entry point on page");
            None
        }
    }
}

/// `true` when `page` is a supported checkout.
pub async fn is_checkout<P, S>(page: &P, registry: &SiteRegistry<S>, config: &EngineConfig) -> bool
where
    P: CheckoutPage + ?Sized,
    S: SiteSource,
{
    detect_checkout(page, registry, config).await.is_some()
}

fn has_entry_point<P: CheckoutPage + ?Sized>(page: &P, selectors: &[&str]) -> bool {
    selectors
        .iter()
        .any(|selector| resolve_element(page, selector).is_some())
}
