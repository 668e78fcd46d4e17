// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: The only hard requirement is the bot access token

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default device name registered with the realtime-channel infrastructure.
pub const DEFAULT_DEVICE_NAME: &str = "rust-webex-teams-client";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub webex: WebexConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebexConfig {
    /// Bot access token, supplied by the embedding application.
    pub token: String,
    #[serde(default = "default_device_name")]
    pub device_name: String,
}

fn default_device_name() -> String {
    DEFAULT_DEVICE_NAME.to_string()
}

impl Config {
    /// Load configuration from config.toml with environment variable overrides
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_from("config.toml")
    }

    /// Load configuration from a specific TOML file, then apply env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Config {
                webex: WebexConfig {
                    token: String::new(),
                    device_name: default_device_name(),
                },
            }
        };

        if let Ok(val) = std::env::var("WEBEX_TOKEN") {
            config.webex.token = val;
        }
        if let Ok(val) = std::env::var("WEBEX_DEVICE_NAME") {
            config.webex.device_name = val;
        }

        if config.webex.token.trim().is_empty() {
            anyhow::bail!("webex.token is required (set in config.toml or WEBEX_TOKEN env var)");
        }

        Ok(config)
    }
}
