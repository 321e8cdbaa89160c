//! Supported-site registry.
//!
//! Site records are loaded from a [`SiteSource`] on first use and memoized
//! for the life of the registry. A failed load is memoized too, as an empty
//! list: the page is then simply unsupported.

use std::convert::Infallible;
use std::fmt::Display;
use std::path::PathBuf;

use caramel_core::{parse_site_list, ConfigError, SiteRecord};
use tokio::sync::OnceCell;

/// Where site records come from.
#[allow(async_fn_in_trait)]
pub trait SiteSource {
    type Error: Display;

    async fn load(&self) -> Result<Vec<SiteRecord>, Self::Error>;
}

/// Site records bundled as a JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileSiteSource {
    path: PathBuf,
}

impl FileSiteSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SiteSource for FileSiteSource {
    type Error = ConfigError;

    async fn load(&self) -> Result<Vec<SiteRecord>, ConfigError> {
        let content =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| ConfigError::SiteFileIo {
                    path: self.path.display().to_string(),
                    source: e,
                })?;
        parse_site_list(&content)
    }
}

/// An in-memory list of site records.
#[derive(Debug, Clone, Default)]
pub struct StaticSites(pub Vec<SiteRecord>);

impl SiteSource for StaticSites {
    type Error = Infallible;

    async fn load(&self) -> Result<Vec<SiteRecord>, Infallible> {
        Ok(self.0.clone())
    }
}

#[derive(Debug)]
pub struct SiteRegistry<S> {
    source: S,
    records: OnceCell<Vec<SiteRecord>>,
}

impl<S: SiteSource> SiteRegistry<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            records: OnceCell::new(),
        }
    }

    /// All known records, loading them on the first call.
    pub async fn records(&self) -> &[SiteRecord] {
        self.records
            .get_or_init(|| async {
                match self.source.load().await {
                    Ok(records) => {
                        tracing::info!(count = records.len(), "loaded supported sites");
                        records
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to load supported sites");
                        Vec::new()
                    }
                }
            })
            .await
    }

    /// The record for `hostname`, if the site is supported.
    pub async fn lookup(&self, hostname: &str) -> Option<&SiteRecord> {
        find_site(self.records().await, hostname)
    }

    pub fn is_loaded(&self) -> bool {
        self.records.initialized()
    }
}

/// First record, in list order, whose domain is contained in `hostname`.
#[must_use]
pub fn find_site<'a>(records: &'a [SiteRecord], hostname: &str) -> Option<&'a SiteRecord> {
    records.iter().find(|r| r.matches_host(hostname))
}
