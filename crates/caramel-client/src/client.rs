//! HTTP client for the coupon-lookup service.
//!
//! Wraps `reqwest` with typed status handling and retry. The lookup endpoint
//! returns a JSON array of coupon rows ordered newest first; an empty array
//! means the service has no candidates for the site.

use std::time::Duration;

use caramel_core::{AppConfig, Coupon, SiteRecord};
use reqwest::{Client, Url};

use crate::error::ClientError;
use crate::retry::retry_with_backoff;

/// Client for the coupon-lookup service and remote site lists.
///
/// Use [`CouponClient::from_config`] in the binary or
/// [`CouponClient::with_base_url`] to point at a mock server in tests.
pub struct CouponClient {
    client: Client,
    base_url: Url,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl CouponClient {
    /// Creates a client from the application configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`ClientError::InvalidBaseUrl`] if the configured base URL is invalid.
    pub fn from_config(config: &AppConfig) -> Result<Self, ClientError> {
        Self::with_base_url(
            &config.api_base_url,
            config.http_timeout_secs,
            &config.user_agent,
            config.max_retries,
            config.retry_backoff_base_ms,
        )
    }

    /// Creates a client with an explicit base URL and retry policy.
    ///
    /// `max_retries` is the number of additional attempts after the first
    /// failure for retriable errors. Set to `0` to disable retries.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`ClientError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        base_url: &str,
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;

        // Exactly one trailing slash so `join` appends rather than replaces
        // the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| ClientError::InvalidBaseUrl {
            base_url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url,
            max_retries,
            backoff_base_ms,
        })
    }

    /// Fetches candidate coupons for `site`, newest first.
    ///
    /// `keywords` are optional cart hints; they are sent comma-joined as
    /// `key_words` and omitted entirely when empty.
    ///
    /// # Errors
    ///
    /// - [`ClientError::RateLimited`] on HTTP 429 after all retries.
    /// - [`ClientError::NotFound`] on HTTP 404 (not retried).
    /// - [`ClientError::UnexpectedStatus`] for any other non-2xx status.
    /// - [`ClientError::Http`] on network failure after all retries.
    /// - [`ClientError::Deserialize`] if the body is not a coupon array.
    pub async fn fetch_coupons(
        &self,
        site: &str,
        keywords: &[String],
        limit: u32,
    ) -> Result<Vec<Coupon>, ClientError> {
        let url = self.coupons_url(site, keywords, limit)?;
        let body = self.get_text(url.as_str()).await?;
        let coupons =
            serde_json::from_str::<Vec<Coupon>>(&body).map_err(|e| ClientError::Deserialize {
                context: format!("coupons for {site}"),
                source: e,
            })?;
        tracing::debug!(site, count = coupons.len(), "fetched coupons");
        Ok(coupons)
    }

    /// Fetches and validates a site list published at `url`.
    ///
    /// # Errors
    ///
    /// Propagates HTTP errors as in [`Self::fetch_coupons`], and returns
    /// [`ClientError::SiteList`] if the body is not a valid site list.
    pub async fn fetch_site_list(&self, url: &str) -> Result<Vec<SiteRecord>, ClientError> {
        let body = self.get_text(url).await?;
        caramel_core::parse_site_list(&body).map_err(|e| ClientError::SiteList {
            url: url.to_owned(),
            source: e,
        })
    }

    /// Builds the lookup URL for a site, optional keywords and page size.
    fn coupons_url(
        &self,
        site: &str,
        keywords: &[String],
        limit: u32,
    ) -> Result<Url, ClientError> {
        let mut url = self
            .base_url
            .join("api/coupons")
            .map_err(|e| ClientError::InvalidBaseUrl {
                base_url: self.base_url.to_string(),
                reason: e.to_string(),
            })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("site", site);
            if !keywords.is_empty() {
                query.append_pair("key_words", &keywords.join(","));
            }
            query.append_pair("limit", &limit.to_string());
        }

        Ok(url)
    }

    async fn get_text(&self, url: &str) -> Result<String, ClientError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || async move {
            let response = self
                .client
                .get(url)
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await?;
            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);
                return Err(ClientError::RateLimited {
                    url: url.to_owned(),
                    retry_after_secs,
                });
            }

            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ClientError::NotFound {
                    url: url.to_owned(),
                });
            }

            if !status.is_success() {
                return Err(ClientError::UnexpectedStatus {
                    status: status.as_u16(),
                    url: url.to_owned(),
                });
            }

            Ok(response.text().await?)
        })
        .await
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
