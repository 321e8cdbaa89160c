use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A candidate code as returned by the coupon-lookup endpoint.
///
/// The endpoint returns full database rows; everything beyond these fields
/// is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Coupon {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            title: None,
            description: None,
        }
    }
}

/// Outcome of applying one code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialResult {
    /// A strictly lower total was observed after submission.
    pub success: bool,
    /// Total read after the trial; `None` when no price could be extracted.
    pub new_total: Option<Decimal>,
}

impl TrialResult {
    #[must_use]
    pub fn failed() -> Self {
        Self {
            success: false,
            new_total: None,
        }
    }

    /// Compare the totals read before and after a submission.
    #[must_use]
    pub fn from_totals(before: Option<Decimal>, after: Option<Decimal>) -> Self {
        let success = matches!((before, after), (Some(b), Some(a)) if a < b);
        Self {
            success,
            new_total: after,
        }
    }
}

/// Best code found across a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignResult {
    pub best_code: Option<String>,
    pub best_savings: Decimal,
}

impl CampaignResult {
    #[must_use]
    pub fn none() -> Self {
        Self {
            best_code: None,
            best_savings: Decimal::ZERO,
        }
    }
}

/// Reduce a URL or hostname to the bare site domain used by the lookup
/// endpoint: scheme, `www.`, port, path and query are dropped.
#[must_use]
pub fn normalize_site_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map_or(trimmed, |(_, rest)| rest);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);
    host.to_ascii_lowercase()
}
