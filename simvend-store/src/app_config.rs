use serde::Deserialize;
use simvend_shared::Masked;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub payment: PaymentConfig,
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub fulfillment: FulfillmentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Masked<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub backend: StorageBackend,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: Masked<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentDriver {
    Xendit,
    Mock,
}

/// How payment callbacks are authenticated.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallbackAuth {
    /// Static `x-callback-token` header, as Xendit sends it
    #[default]
    Token,
    /// Hex HMAC-SHA256 of the body in `x-callback-signature`
    Hmac,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    pub driver: PaymentDriver,
    #[serde(default = "default_xendit_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Masked<String>,
    /// Callback verification token, or the HMAC key under `callback_auth = "hmac"`
    pub webhook_secret: Masked<String>,
    #[serde(default)]
    pub callback_auth: CallbackAuth,
    #[serde(default = "default_payment_timeout")]
    pub timeout_seconds: u64,
}

fn default_xendit_url() -> String { "https://api.xendit.co".into() }
fn default_payment_timeout() -> u64 { 15 }

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProvisioningDriver {
    Fivesim,
    Mock,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvisioningConfig {
    pub driver: ProvisioningDriver,
    #[serde(default = "default_fivesim_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Masked<String>,
    #[serde(default = "default_provisioning_timeout")]
    pub timeout_seconds: u64,
}

fn default_fivesim_url() -> String { "https://5sim.net/v1".into() }
fn default_provisioning_timeout() -> u64 { 30 }

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FulfillmentConfig {
    pub sweep_interval_seconds: u64,
    pub sweep_batch_size: i64,
    /// PROVISIONING orders older than this are reported by the sweep
    pub stale_provisioning_seconds: u64,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: 60,
            sweep_batch_size: 50,
            stale_provisioning_seconds: 600,
        }
    }
}

impl PaymentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ProvisioningConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `SIMVEND__PAYMENT__WEBHOOK_SECRET=...`
            .add_source(config::Environment::with_prefix("SIMVEND").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn from_toml(raw: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [server]
        port = 8080

        [database]
        backend = "memory"

        [auth]
        jwt_secret = "jwt-secret"

        [payment]
        driver = "mock"
        webhook_secret = "whsec"

        [provisioning]
        driver = "mock"
    "#;

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.backend, StorageBackend::Memory);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.payment.driver, PaymentDriver::Mock);
        assert_eq!(config.payment.api_url, "https://api.xendit.co");
        assert_eq!(config.payment.timeout(), Duration::from_secs(15));
        assert_eq!(config.payment.callback_auth, CallbackAuth::Token);
        assert_eq!(config.provisioning.driver, ProvisioningDriver::Mock);
        assert_eq!(config.provisioning.timeout(), Duration::from_secs(30));
        assert_eq!(config.fulfillment.sweep_batch_size, 50);
    }

    #[test]
    fn test_secrets_do_not_leak_into_debug() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.payment.webhook_secret.expose(), "whsec");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("whsec"));
        assert!(!printed.contains("jwt-secret"));
    }

    #[test]
    fn test_hmac_callback_auth() {
        let raw = MINIMAL.replace(
            r#"webhook_secret = "whsec""#,
            "webhook_secret = \"whsec\"\n        callback_auth = \"hmac\"",
        );
        let config = Config::from_toml(&raw).unwrap();
        assert_eq!(config.payment.callback_auth, CallbackAuth::Hmac);

        let raw = MINIMAL.replace(
            r#"webhook_secret = "whsec""#,
            "webhook_secret = \"whsec\"\n        callback_auth = \"basic\"",
        );
        assert!(Config::from_toml(&raw).is_err());
    }

    #[test]
    fn test_unknown_driver_is_rejected() {
        // First occurrence is the payment section
        let raw = MINIMAL.replacen(r#"driver = "mock""#, r#"driver = "stripe""#, 1);
        assert!(Config::from_toml(&raw).is_err());
    }
}
