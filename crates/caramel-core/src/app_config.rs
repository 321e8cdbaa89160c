use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub log_level: String,
    /// Origin of the coupon-lookup service, without a trailing slash.
    pub api_base_url: String,
    /// Bundled site list used when `sites_url` is not set.
    pub sites_path: PathBuf,
    pub sites_url: Option<String>,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub coupon_limit: u32,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
}
