//! Configuration loader — merges env vars, .env file, and config.toml.

use common::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;

use sniper_strategy::{RuntimeConfig, StrategyConfig};

/// Top-level sniper bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SniperBotConfig {
    /// Kalshi API key ID.
    #[serde(default)]
    pub kalshi_api_key: String,

    /// RSA private key PEM.
    #[serde(default)]
    pub kalshi_secret_key: String,

    /// Odds feed API key.
    #[serde(default)]
    pub odds_api_key: String,

    /// Use demo environment.
    #[serde(default = "default_true")]
    pub use_demo: bool,

    /// Strategy parameters.
    #[serde(default)]
    pub strategy: StrategyConfig,

    /// Queue and worker sizing.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

fn default_true() -> bool {
    true
}

impl Default for SniperBotConfig {
    fn default() -> Self {
        Self {
            kalshi_api_key: String::new(),
            kalshi_secret_key: String::new(),
            odds_api_key: String::new(),
            use_demo: true,
            strategy: StrategyConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

/// Load bot configuration from environment and optional config file.
pub fn load_config() -> Result<SniperBotConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = SniperBotConfig::default();

    // 3. Try loading config.toml if it exists.
    let config_path = Path::new("config.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))?;
    }

    // 4. Override with environment variables (highest priority).
    if let Ok(key) = std::env::var("KALSHI_API_KEY") {
        config.kalshi_api_key = key;
    }
    if let Ok(secret) = std::env::var("KALSHI_SECRET_KEY") {
        config.kalshi_secret_key = secret;
    }
    if let Ok(key) = std::env::var("ODDS_API_KEY") {
        config.odds_api_key = key;
    }
    if let Ok(demo) = std::env::var("USE_DEMO") {
        config.use_demo = demo != "0" && demo.to_lowercase() != "false";
    }

    // 5. Validate required fields and ranges.
    if config.kalshi_api_key.is_empty() {
        return Err(Error::Config(
            "KALSHI_API_KEY is required (set in .env or environment)".into(),
        ));
    }
    if config.kalshi_secret_key.is_empty() {
        return Err(Error::Config(
            "KALSHI_SECRET_KEY is required (set in .env or environment)".into(),
        ));
    }
    if config.odds_api_key.is_empty() {
        return Err(Error::Config(
            "ODDS_API_KEY is required (set in .env or environment)".into(),
        ));
    }
    config.strategy.validate()?;

    Ok(config)
}
