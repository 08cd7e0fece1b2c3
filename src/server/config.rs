use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::monitor::DEFAULT_LIMITED_WINDOW;
use crate::notifications::WebhookConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Required unless the binary runs with the in-memory store.
    pub database_url: Option<String>,
    /// Offset of the display timezone, fractional hours allowed.
    pub timezone_offset_hours: f32,
    pub log_dir: String,
    pub limited_window: u64,
    pub probe_timeout_seconds: u64,
    pub webhook: Option<WebhookConfig>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
pub(crate) struct PartialServerConfig {
    database_url: Option<String>,
    timezone_offset_hours: Option<f32>,
    log_dir: Option<String>,
    limited_window: Option<u64>,
    probe_timeout_seconds: Option<u64>,
    notification_webhook_url: Option<String>,
    notification_webhook_method: Option<String>,
    notification_body_template: Option<String>,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

const DEFAULT_PROBE_TIMEOUT_SECONDS: u64 = 10;

impl PartialServerConfig {
    fn from_file(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))
    }

    // Field names map to upper-case variables, e.g. `LIMITED_WINDOW`.
    fn from_env() -> Result<Self, String> {
        envy::from_env::<PartialServerConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))
    }
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config = match config_path {
            Some(path_str) => PartialServerConfig::from_file(Path::new(path_str))?,
            None => PartialServerConfig::default(),
        };

        // 2. Load from environment variables
        let env_config = PartialServerConfig::from_env()?;

        // 3. Merge: environment overrides file
        Ok(Self::merge(file_config, env_config))
    }

    pub(crate) fn merge(file_config: PartialServerConfig, env_config: PartialServerConfig) -> Self {
        let webhook_url = env_config
            .notification_webhook_url
            .or(file_config.notification_webhook_url);
        let webhook = webhook_url.map(|url| {
            let mut webhook = WebhookConfig::new(url);
            if let Some(method) = env_config
                .notification_webhook_method
                .or(file_config.notification_webhook_method)
            {
                webhook.method = method;
            }
            webhook.body_template = env_config
                .notification_body_template
                .or(file_config.notification_body_template);
            webhook
        });

        ServerConfig {
            database_url: env_config.database_url.or(file_config.database_url),
            timezone_offset_hours: env_config
                .timezone_offset_hours
                .or(file_config.timezone_offset_hours)
                .unwrap_or(0.0),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            limited_window: env_config
                .limited_window
                .or(file_config.limited_window)
                .unwrap_or(DEFAULT_LIMITED_WINDOW),
            probe_timeout_seconds: env_config
                .probe_timeout_seconds
                .or(file_config.probe_timeout_seconds)
                .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECONDS),
            webhook,
        }
    }

    /// Display timezone. Offsets outside ±24h fall back to UTC.
    pub fn timezone(&self) -> FixedOffset {
        let seconds = (self.timezone_offset_hours * 3600.0).round() as i32;
        FixedOffset::east_opt(seconds).unwrap_or_else(|| Utc.fix())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds.max(1))
    }

    pub fn database_url(&self) -> Result<&str, String> {
        self.database_url
            .as_deref()
            .ok_or_else(|| "DATABASE_URL is required".to_string())
    }
}
