//! Server Configuration

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {0}")]
    Invalid(&'static str),
}

/// Settings gathered once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Payments are disabled without it
    pub stripe_secret_key: Option<String>,
    /// The webhook endpoint is disabled without it
    pub stripe_webhook_secret: Option<String>,
    pub payment_currency: String,
    /// Pending rows older than this are swept. `None` disables the sweeper.
    pub pending_ttl: Option<Duration>,
    pub sweep_interval: Duration,
    pub seed_catalog: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            payment_currency: "usd".into(),
            pending_ttl: None,
            sweep_interval: Duration::from_secs(300),
            seed_catalog: true,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let pending_ttl = var("PENDING_TTL_SECS")
            .map(|v| v.parse::<u64>().map_err(|_| ConfigError::Invalid("PENDING_TTL_SECS")))
            .transpose()?
            .map(Duration::from_secs);

        let sweep_interval = match var("SWEEP_INTERVAL_SECS") {
            Some(v) => match v.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::Invalid("SWEEP_INTERVAL_SECS")),
            },
            None => defaults.sweep_interval,
        };

        let seed_catalog = match var("SEED_CATALOG").as_deref().map(str::to_lowercase).as_deref() {
            None => defaults.seed_catalog,
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => false,
            Some(_) => return Err(ConfigError::Invalid("SEED_CATALOG")),
        };

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            stripe_secret_key: var("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            payment_currency: var("PAYMENT_CURRENCY")
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.payment_currency),
            pending_ttl,
            sweep_interval,
            seed_catalog,
        })
    }
}
