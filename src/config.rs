use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

use crate::providers::{paypal::PayPalConfig, stripe::StripeConfig};
use crate::services::pricing::PricingPolicy;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "usd";
const DEFAULT_FREE_SHIPPING_THRESHOLD: f64 = 50.0;
const DEFAULT_FLAT_SHIPPING_FEE: f64 = 5.99;
const DEFAULT_TAX_RATE: f64 = 0.0;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_free_shipping_threshold() -> f64 {
    DEFAULT_FREE_SHIPPING_THRESHOLD
}
fn default_flat_shipping_fee() -> f64 {
    DEFAULT_FLAT_SHIPPING_FEE
}
fn default_tax_rate() -> f64 {
    DEFAULT_TAX_RATE
}
fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}
fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
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
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}
fn default_paypal_api_base() -> String {
    "https://api-m.paypal.com".to_string()
}
fn default_checkout_success_url() -> String {
    "http://localhost:3000/checkout/success?session_id={CHECKOUT_SESSION_ID}".to_string()
}
fn default_checkout_cancel_url() -> String {
    "http://localhost:3000/checkout/cancel".to_string()
}

fn validate_tax_rate(rate: f64) -> Result<(), ValidationError> {
    if rate.is_finite() && (0.0..=1.0).contains(&rate) {
        Ok(())
    } else {
        let mut err = ValidationError::new("range");
        err.message = Some("Tax rate must be between 0.0 and 1.0".into());
        Err(err)
    }
}

fn validate_non_negative(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("range");
        err.message = Some("Amount must not be negative".into());
        Err(err)
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Settlement currency (ISO 4217, lower case)
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Orders at or above this subtotal ship free
    #[serde(default = "default_free_shipping_threshold")]
    #[validate(custom = "validate_non_negative")]
    pub free_shipping_threshold: f64,

    /// Flat shipping fee below the free-shipping threshold
    #[serde(default = "default_flat_shipping_fee")]
    #[validate(custom = "validate_non_negative")]
    pub flat_shipping_fee: f64,

    /// Tax rate applied to the subtotal (as decimal, e.g. 0.08 for 8%)
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_tax_rate")]
    pub tax_rate: f64,

    /// Redirect target after a completed provider-hosted checkout
    #[serde(default = "default_checkout_success_url")]
    pub checkout_success_url: String,

    /// Redirect target after an abandoned provider-hosted checkout
    #[serde(default = "default_checkout_cancel_url")]
    pub checkout_cancel_url: String,

    /// Card processor API key (session creation disabled when absent)
    #[serde(default)]
    pub stripe_secret_key: Option<String>,

    /// Card processor webhook signing secret
    #[serde(default)]
    pub stripe_webhook_secret: Option<String>,

    /// Card processor API base URL (overridable for tests)
    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,

    /// Wallet processor OAuth client id (capture disabled when absent)
    #[serde(default)]
    pub paypal_client_id: Option<String>,

    /// Wallet processor OAuth client secret
    #[serde(default)]
    pub paypal_client_secret: Option<String>,

    /// Wallet processor API base URL (overridable for tests)
    #[serde(default = "default_paypal_api_base")]
    pub paypal_api_base: String,

    /// Webhook timestamp tolerance (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub webhook_tolerance_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    /// Creates a minimal configuration, used by tests and tooling.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            currency: default_currency(),
            free_shipping_threshold: default_free_shipping_threshold(),
            flat_shipping_fee: default_flat_shipping_fee(),
            tax_rate: default_tax_rate(),
            checkout_success_url: default_checkout_success_url(),
            checkout_cancel_url: default_checkout_cancel_url(),
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            stripe_api_base: default_stripe_api_base(),
            paypal_client_id: None,
            paypal_client_secret: None,
            paypal_api_base: default_paypal_api_base(),
            webhook_tolerance_secs: default_webhook_tolerance_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// The single authoritative fee policy used by every provider flow.
    pub fn pricing_policy(&self) -> Result<PricingPolicy, crate::errors::ServiceError> {
        let threshold = decimal_from_config("free_shipping_threshold", self.free_shipping_threshold)?;
        let fee = decimal_from_config("flat_shipping_fee", self.flat_shipping_fee)?;
        let rate = decimal_from_config("tax_rate", self.tax_rate)?;
        Ok(PricingPolicy::new(
            threshold.round_dp(2),
            fee.round_dp(2),
            rate,
            self.currency.clone(),
        ))
    }

    /// Card processor configuration, when credentials are present.
    pub fn stripe_config(&self) -> Option<StripeConfig> {
        self.stripe_secret_key.as_ref().map(|key| {
            StripeConfig::new(
                key.clone(),
                self.stripe_webhook_secret.clone(),
                self.stripe_api_base.clone(),
                self.webhook_tolerance_secs,
            )
        })
    }

    /// Wallet processor configuration, when credentials are present.
    pub fn paypal_config(&self) -> Option<PayPalConfig> {
        match (&self.paypal_client_id, &self.paypal_client_secret) {
            (Some(id), Some(secret)) => Some(PayPalConfig::new(
                id.clone(),
                secret.clone(),
                self.paypal_api_base.clone(),
            )),
            _ => None,
        }
    }
}

fn decimal_from_config(
    field: &str,
    value: f64,
) -> Result<Decimal, crate::errors::ServiceError> {
    Decimal::try_from(value).map_err(|e| {
        crate::errors::ServiceError::ConfigurationError(format!("{field} is not a valid amount: {e}"))
    })
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (STOREFRONT__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("STOREFRONT").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18080,
            "test".to_string(),
        )
    }

    #[test]
    fn tax_rate_outside_unit_interval_is_rejected() {
        let mut cfg = base_config();
        cfg.tax_rate = 1.5;
        assert!(cfg.validate().is_err());

        cfg.tax_rate = -0.1;
        assert!(cfg.validate().is_err());

        cfg.tax_rate = 0.0875;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn pricing_policy_rounds_money_to_two_places() {
        let cfg = base_config();
        let policy = cfg.pricing_policy().expect("policy");
        assert_eq!(policy.flat_shipping_fee, dec!(5.99));
        assert_eq!(policy.free_shipping_threshold, dec!(50.00));
    }

    #[test]
    fn gateways_absent_without_credentials() {
        let cfg = base_config();
        assert!(cfg.stripe_config().is_none());
        assert!(cfg.paypal_config().is_none());

        let mut cfg = base_config();
        cfg.paypal_client_id = Some("client".into());
        // secret still missing: not configured
        assert!(cfg.paypal_config().is_none());
        cfg.paypal_client_secret = Some("secret".into());
        assert!(cfg.paypal_config().is_some());
    }
}
