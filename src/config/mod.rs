use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub platform: PlatformConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlatformConfig {
    /// Platform fee in basis points of the rate price (1500 = 15%).
    pub fee_bps: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GatewayConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    /// Base64-encoded 32-byte key for encrypting bank account numbers at rest.
    pub account_cipher_key: String,
}

fn default_gateway_timeout() -> u64 {
    30
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("database.url", "sqlite://ringfence.db")?
            .set_default("database.max_connections", 10)?
            .set_default("platform.fee_bps", 1500)?
            .set_default("platform.currency", "USD")?
            .set_default("gateway.timeout_seconds", 30)?
            .set_default("gateway.enabled", false)?
            .set_default("security.account_cipher_key", "")?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with RINGFENCE__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("RINGFENCE").separator("__"))

            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://ringfence.db".to_string(),
                max_connections: 10,
            },
            platform: PlatformConfig {
                fee_bps: 1500,
                currency: "USD".to_string(),
            },
            gateway: GatewayConfig {
                secret_key: None,
                webhook_secret: None,
                timeout_seconds: 30,
                enabled: false,
            },
            security: SecurityConfig {
                account_cipher_key: String::new(),
            },
        }
    }
}
