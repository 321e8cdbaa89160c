pub mod app_config;
pub mod config;
pub mod coupons;
pub mod error;
pub mod sites;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use coupons::{normalize_site_domain, CampaignResult, Coupon, TrialResult};
pub use error::ConfigError;
pub use sites::{load_site_file, parse_site_list, SiteRecord};
