//! HTTP-backed sources for the engine, plus the configured site source.

use caramel_client::{ClientError, CouponClient};
use caramel_core::{AppConfig, Coupon, SiteRecord};
use caramel_engine::{CouponSource, FileSiteSource, SiteSource};

/// Site records published at a remote URL.
pub(crate) struct HttpSiteSource<'a> {
    client: &'a CouponClient,
    url: String,
}

impl SiteSource for HttpSiteSource<'_> {
    type Error = ClientError;

    async fn load(&self) -> Result<Vec<SiteRecord>, ClientError> {
        self.client.fetch_site_list(&self.url).await
    }
}

/// Candidates from the coupon-lookup service.
pub(crate) struct HttpCouponSource<'a> {
    pub(crate) client: &'a CouponClient,
    pub(crate) limit: u32,
}

impl CouponSource for HttpCouponSource<'_> {
    type Error = ClientError;

    async fn coupons_for(
        &self,
        domain: &str,
        keywords: &[String],
    ) -> Result<Vec<Coupon>, ClientError> {
        self.client.fetch_coupons(domain, keywords, self.limit).await
    }
}

/// The remote site list when `CARAMEL_SITES_URL` is set, the bundled file
/// otherwise.
pub(crate) enum ConfiguredSites<'a> {
    File(FileSiteSource),
    Remote(HttpSiteSource<'a>),
}

impl<'a> ConfiguredSites<'a> {
    pub(crate) fn from_config(config: &AppConfig, client: &'a CouponClient) -> Self {
        match &config.sites_url {
            Some(url) => Self::Remote(HttpSiteSource {
                client,
                url: url.clone(),
            }),
            None => Self::File(FileSiteSource::new(&config.sites_path)),
        }
    }
}

impl SiteSource for ConfiguredSites<'_> {
    type Error = anyhow::Error;

    async fn load(&self) -> Result<Vec<SiteRecord>, anyhow::Error> {
        match self {
            Self::File(source) => Ok(source.load().await?),
            Self::Remote(source) => Ok(source.load().await?),
        }
    }
}
