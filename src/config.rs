use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
pub const DEFAULT_SITE_ORIGIN: &str = "http://localhost:5173";
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_STRIPE_API_VERSION: &str = "2024-11-20.acacia";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Database holding the catalog and order tables
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Storefront origin used for the success/cancel redirects
    #[serde(default)]
    pub site_origin: Option<String>,

    /// Public key browsers send as `Authorization: Bearer <key>` on checkout
    #[serde(default)]
    pub anon_key: Option<String>,

    /// Stripe secret key
    #[serde(default)]
    pub stripe_secret_key: Option<String>,

    #[serde(default = "default_stripe_api_base")]
    #[validate(url)]
    pub stripe_api_base: String,

    #[serde(default = "default_stripe_api_version")]
    pub stripe_api_version: String,

    #[serde(default = "default_stripe_timeout_secs")]
    pub stripe_timeout_secs: u64,

    /// Signing secret for inbound Stripe webhooks
    #[serde(default)]
    pub stripe_webhook_secret: Option<String>,

    /// Maximum age of a signed webhook timestamp
    #[serde(default = "default_webhook_tolerance_secs")]
    pub stripe_webhook_tolerance_secs: u64,

    /// ISO currency code for checkout sessions
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    /// Comma-separated ISO country codes accepted for shipping
    #[serde(default = "default_shipping_allowed_countries")]
    pub shipping_allowed_countries: String,

    /// Per-attempt timeout for the buy-now catalog lookup
    #[serde(default = "default_catalog_timeout_ms")]
    pub catalog_timeout_ms: u64,

    /// Extra attempts for the catalog lookup after the first one fails
    #[serde(default = "default_catalog_retry_attempts")]
    #[validate(range(max = 3))]
    pub catalog_retry_attempts: u32,

    /// Accept the legacy cart payload whose prices come from the browser
    #[serde(default)]
    pub allow_client_priced_items: bool,

    /// Acknowledge verified webhooks even when the order insert fails
    #[serde(default)]
    pub webhook_ack_on_persistence_failure: bool,

    /// Whole-request timeout applied by the HTTP layer
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Checkout notes longer than this are truncated
    #[serde(default = "default_max_customization_length")]
    pub max_customization_length: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            database_url: default_database_url(),
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            site_origin: None,
            anon_key: None,
            stripe_secret_key: None,
            stripe_api_base: default_stripe_api_base(),
            stripe_api_version: default_stripe_api_version(),
            stripe_timeout_secs: default_stripe_timeout_secs(),
            stripe_webhook_secret: None,
            stripe_webhook_tolerance_secs: default_webhook_tolerance_secs(),
            currency: default_currency(),
            shipping_allowed_countries: default_shipping_allowed_countries(),
            catalog_timeout_ms: default_catalog_timeout_ms(),
            catalog_retry_attempts: default_catalog_retry_attempts(),
            allow_client_priced_items: false,
            webhook_ack_on_persistence_failure: false,
            request_timeout_secs: default_request_timeout_secs(),
            max_body_size: default_max_body_size(),
            max_customization_length: default_max_customization_length(),
        }
    }
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Origin used to build redirect URLs, without a trailing slash.
    pub fn site_origin(&self) -> &str {
        self.site_origin
            .as_deref()
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(|origin| origin.trim_end_matches('/'))
            .unwrap_or(DEFAULT_SITE_ORIGIN)
    }

    pub fn shipping_countries(&self) -> Vec<String> {
        self.shipping_allowed_countries
            .split(',')
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .collect()
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_millis(self.catalog_timeout_ms)
    }

    pub fn stripe_timeout(&self) -> Duration {
        Duration::from_secs(self.stripe_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.shipping_countries().is_empty() {
            let mut err = ValidationError::new("shipping_allowed_countries");
            err.message = Some("at least one shipping country is required".into());
            errors.add("shipping_allowed_countries", err);
        }

        if self.is_production() && self.allow_client_priced_items {
            warn!("allow_client_priced_items is enabled in production; cart prices are trusted from the browser");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_database_url() -> String {
    "sqlite://storefront.db?mode=rwc".to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_stripe_api_base() -> String {
    DEFAULT_STRIPE_API_BASE.to_string()
}
fn default_stripe_api_version() -> String {
    DEFAULT_STRIPE_API_VERSION.to_string()
}
fn default_stripe_timeout_secs() -> u64 {
    15
}
fn default_webhook_tolerance_secs() -> u64 {
    300
}
fn default_currency() -> String {
    "usd".to_string()
}
fn default_shipping_allowed_countries() -> String {
    "US".to_string()
}
fn default_catalog_timeout_ms() -> u64 {
    3_000
}
fn default_catalog_retry_attempts() -> u32 {
    1
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_body_size() -> usize {
    1024 * 1024
}
fn default_max_customization_length() -> usize {
    500
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_checkout={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let builder = fmt().with_env_filter(EnvFilter::new(filter_directive));
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Validation(ValidationErrors),
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env.clone())?
        .add_source(File::with_name(&config_dir.join("default").to_string_lossy()).required(false))
        .add_source(File::with_name(&config_dir.join(&run_env).to_string_lossy()).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    if app_config.stripe_secret_key.is_none() {
        warn!("APP__STRIPE_SECRET_KEY is not set; checkout requests will fail");
    }
    if app_config.stripe_webhook_secret.is_none() {
        warn!("APP__STRIPE_WEBHOOK_SECRET is not set; webhook deliveries will be rejected");
    }

    info!("Configuration loaded successfully");
    Ok(app_config)
}
