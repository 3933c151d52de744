use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::api::ApiConfig;
use crate::application::ControllerSettings;

/// Files the backend keeps when asked to clean up.
pub const DEFAULT_KEEP_FILES: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub controller: ControllerSettings,
    pub keep_files: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            controller: ControllerSettings::default(),
            keep_files: DEFAULT_KEEP_FILES,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment, after loading a
    /// `.env` file if one exists.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(base_url) = lookup("DOWNLOADER_API_URL").filter(|v| !v.trim().is_empty()) {
            config.api.base_url = base_url.trim().to_string();
        }
        if let Some(format) = lookup("DOWNLOADER_AUDIO_FORMAT").filter(|v| !v.trim().is_empty()) {
            config.api.audio_format = format.trim().to_lowercase();
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "DOWNLOADER_POLL_INTERVAL_MS") {
            if ms == 0 {
                warn!("DOWNLOADER_POLL_INTERVAL_MS must be positive, keeping default");
            } else {
                config.controller.poll_interval = Duration::from_millis(ms);
            }
        }
        if let Some(len) = parse_var::<usize>(&lookup, "DOWNLOADER_MAX_URL_LENGTH") {
            config.controller.max_url_length = len;
        }
        if let Some(keep) = parse_var::<u32>(&lookup, "DOWNLOADER_KEEP_FILES") {
            config.keep_files = keep;
        }

        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}
