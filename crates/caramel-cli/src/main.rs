mod simulate;
mod sources;

use std::path::PathBuf;

use caramel_client::CouponClient;
use caramel_core::{normalize_site_domain, AppConfig};
use caramel_engine::{SiteRegistry, SiteSource};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::sources::ConfiguredSites;

#[derive(Debug, Parser)]
#[command(name = "caramel")]
#[command(about = "Coupon discovery and checkout automation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List supported sites, or show the record matching a hostname
    Sites {
        /// Hostname to look up (e.g. www.example.com)
        #[arg(long)]
        host: Option<String>,
    },
    /// Fetch candidate coupons for a site from the lookup service
    Coupons {
        /// Site domain or URL
        #[arg(long)]
        site: String,
        /// Comma-separated cart keywords
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,
        /// Maximum number of coupons (defaults to CARAMEL_COUPON_LIMIT)
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Run a coupon campaign against a simulated checkout fixture
    Simulate {
        /// Path to the fixture JSON file
        fixture: PathBuf,
        /// Fetch candidates from the lookup service instead of the fixture
        #[arg(long)]
        coupons_from_api: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Help and usage errors exit here, before any environment is read.
    let cli = Cli::parse();

    let config = caramel_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let client = CouponClient::from_config(&config)
        .map_err(|e| anyhow::anyhow!("failed to build coupon client: {e}"))?;

    match cli.command {
        Commands::Sites { host } => run_sites(&config, &client, host.as_deref()).await,
        Commands::Coupons {
            site,
            keywords,
            limit,
        } => run_coupons(&config, &client, &site, &keywords, limit).await,
        Commands::Simulate {
            fixture,
            coupons_from_api,
        } => simulate::run_simulate(&config, &client, &fixture, coupons_from_api).await,
    }
}

/// Prints the configured site list, or the single record matching `host`.
///
/// # Errors
///
/// Returns an error if the site list cannot be loaded or `host` is unsupported.
async fn run_sites(
    config: &AppConfig,
    client: &CouponClient,
    host: Option<&str>,
) -> anyhow::Result<()> {
    let source = ConfiguredSites::from_config(config, client);
    let Some(host) = host else {
        let records = source.load().await?;
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    };

    let registry = SiteRegistry::new(source);
    let record = registry
        .lookup(host)
        .await
        .ok_or_else(|| anyhow::anyhow!("{host} is not a supported site"))?;
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

/// Prints the lookup service's candidates for `site`.
///
/// # Errors
///
/// Returns an error if the lookup request fails.
async fn run_coupons(
    config: &AppConfig,
    client: &CouponClient,
    site: &str,
    keywords: &[String],
    limit: Option<u32>,
) -> anyhow::Result<()> {
    let domain = normalize_site_domain(site);
    let limit = limit.unwrap_or(config.coupon_limit);
    let coupons = client.fetch_coupons(&domain, keywords, limit).await?;
    tracing::info!(domain, count = coupons.len(), "fetched coupons");
    println!("{}", serde_json::to_string_pretty(&coupons)?);
    Ok(())
}
