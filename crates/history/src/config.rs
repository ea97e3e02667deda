use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Shortest poll interval accepted from configuration.
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub store_dir: PathBuf,
    pub page_size: usize,
    pub poll_interval_ms: u64,
    pub scroll_threshold: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("/var/lib/genq/records"),
            page_size: 20,
            poll_interval_ms: 3000,
            scroll_threshold: 5,
        }
    }
}

impl ClientConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

pub fn load_config(path: Option<&std::path::Path>) -> Result<ClientConfig> {
    let config = if let Some(config_path) = path {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

            toml::from_str::<ClientConfig>(&contents)
                .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?
        } else {
            #[cfg(not(test))]
            tracing::warn!("Config file not found at {:?}, using defaults", config_path);
            ClientConfig::default()
        }
    } else {
        #[cfg(not(test))]
        tracing::info!("No config path provided, using defaults");
        ClientConfig::default()
    };

    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &ClientConfig) -> Result<()> {
    if config.store_dir.as_os_str().is_empty() {
        anyhow::bail!("store_dir cannot be empty");
    }

    if config.page_size == 0 {
        anyhow::bail!("page_size must be at least 1");
    }

    if config.poll_interval_ms < MIN_POLL_INTERVAL_MS {
        anyhow::bail!(
            "poll_interval_ms must be at least {} (got {})",
            MIN_POLL_INTERVAL_MS,
            config.poll_interval_ms
        );
    }

    if config.scroll_threshold == 0 {
        anyhow::bail!("scroll_threshold must be at least 1");
    }

    Ok(())
}
