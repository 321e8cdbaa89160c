//! Site records: per-retailer checkout selectors.
//!
//! The bundled `supported.json` is either a bare array of records or a
//! `{"supported": [...]}` wrapper; both shapes are accepted.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// URL fragment of the discount call for the one retailer whose price
/// updates arrive over the network rather than through a DOM mutation.
const AMAZON_APPLY_ENDPOINT: &str = "/apply-discount";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteRecord {
    /// Matched by substring containment against the page hostname.
    pub domain: String,
    pub coupon_input: String,
    pub coupon_submit: String,
    pub price_container: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dismiss_button: Option<String>,
    /// URL fragment of the request that settles a coupon submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_endpoint: Option<String>,
    /// Cart line items whose text is sent as keyword hints to the lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart_items: Option<String>,
}

impl SiteRecord {
    /// Returns `true` when this record's domain is contained in `hostname`.
    #[must_use]
    pub fn matches_host(&self, hostname: &str) -> bool {
        hostname
            .to_ascii_lowercase()
            .contains(&self.domain.to_ascii_lowercase())
    }

    /// The network call that signals a price update, if this retailer
    /// cannot be trusted to mutate its price container in place.
    #[must_use]
    pub fn network_signal(&self) -> Option<&str> {
        match self.apply_endpoint.as_deref() {
            Some(endpoint) => Some(endpoint),
            None if self.domain.eq_ignore_ascii_case("amazon.com") => Some(AMAZON_APPLY_ENDPOINT),
            None => None,
        }
    }

    /// Blank optional selectors behave as absent.
    fn normalize(&mut self) {
        for field in [
            &mut self.show_input,
            &mut self.dismiss_button,
            &mut self.apply_endpoint,
            &mut self.cart_items,
        ] {
            if field.as_deref().is_some_and(|s| s.trim().is_empty()) {
                *field = None;
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SiteList {
    Wrapped { supported: Vec<SiteRecord> },
    Bare(Vec<SiteRecord>),
}

/// Parse a site list from its JSON text.
///
/// Records with a blank domain or a blank required selector are skipped, as
/// are later repeats of a domain (compared case-insensitively). Each skip is
/// logged; the remaining records load.
///
/// # Errors
///
/// Returns [`ConfigError::SiteListParse`] if the JSON matches neither accepted
/// shape.
pub fn parse_site_list(json: &str) -> Result<Vec<SiteRecord>, ConfigError> {
    let list: SiteList = serde_json::from_str(json).map_err(ConfigError::SiteListParse)?;
    let mut records = match list {
        SiteList::Wrapped { supported } => supported,
        SiteList::Bare(records) => records,
    };
    for record in &mut records {
        record.normalize();
    }
    Ok(retain_valid_sites(records))
}

/// Load a site list from a JSON file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed.
pub fn load_site_file(path: &Path) -> Result<Vec<SiteRecord>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SiteFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_site_list(&content)
}

fn retain_valid_sites(records: Vec<SiteRecord>) -> Vec<SiteRecord> {
    let mut seen_domains = HashSet::new();

    records
        .into_iter()
        .filter(|record| {
            if record.domain.trim().is_empty() {
                tracing::warn!("skipping site record with an empty domain");
                return false;
            }

            let blank_field = [
                ("couponInput", &record.coupon_input),
                ("couponSubmit", &record.coupon_submit),
                ("priceContainer", &record.price_container),
            ]
            .into_iter()
            .find(|(_, value)| value.trim().is_empty());
            if let Some((field, _)) = blank_field {
                tracing::warn!(
                    domain = %record.domain,
                    field,
                    "skipping site record with an empty selector"
                );
                return false;
            }

            if !seen_domains.insert(record.domain.to_ascii_lowercase()) {
                tracing::warn!(domain = %record.domain, "skipping duplicate site record");
                return false;
            }

            true
        })
        .collect()
}

#[cfg(test)]
#[path = "sites_test.rs"]
mod tests;
