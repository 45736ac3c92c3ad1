use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "rewind.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse settings file '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("{field} is not a valid absolute url: '{value}'")]
    InvalidUrl { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub gateway_url: String,
    pub cdn_url: String,
    pub asset_locale: String,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub request_timeout: Duration,
    pub warmup_batch_width: usize,
    pub autoplay_period: Duration,
    pub static_art: Vec<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            gateway_url: "http://127.0.0.1:8080".into(),
            cdn_url: "https://ddragon.leagueoflegends.com".into(),
            asset_locale: "en_US".into(),
            poll_interval: Duration::from_secs(2),
            max_poll_attempts: 150,
            request_timeout: Duration::from_secs(15),
            warmup_batch_width: 10,
            autoplay_period: Duration::from_secs(10),
            static_art: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    gateway_url: Option<String>,
    cdn_url: Option<String>,
    asset_locale: Option<String>,
    poll_interval_ms: Option<u64>,
    max_poll_attempts: Option<u32>,
    request_timeout_secs: Option<u64>,
    warmup_batch_width: Option<usize>,
    autoplay_secs: Option<u64>,
    static_art: Option<Vec<String>>,
}

/// Defaults, then `rewind.toml` (or `path`), then environment overrides.
pub fn load_settings(path: Option<&Path>) -> Result<ClientSettings, SettingsError> {
    let mut settings = ClientSettings::default();

    match path {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|source| SettingsError::Read {
                path: path.display().to_string(),
                source,
            })?;
            apply_file(&mut settings, &raw, &path.display().to_string())?;
        }
        None => {
            if let Ok(raw) = fs::read_to_string(DEFAULT_SETTINGS_FILE) {
                apply_file(&mut settings, &raw, DEFAULT_SETTINGS_FILE)?;
            }
        }
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    validate(&settings)?;
    Ok(settings)
}

pub fn apply_file(
    settings: &mut ClientSettings,
    raw: &str,
    origin: &str,
) -> Result<(), SettingsError> {
    let file_cfg: FileSettings = toml::from_str(raw).map_err(|source| SettingsError::Parse {
        path: origin.to_string(),
        source,
    })?;

    if let Some(v) = file_cfg.gateway_url {
        settings.gateway_url = v;
    }
    if let Some(v) = file_cfg.cdn_url {
        settings.cdn_url = v;
    }
    if let Some(v) = file_cfg.asset_locale {
        settings.asset_locale = v;
    }
    if let Some(v) = file_cfg.poll_interval_ms {
        settings.poll_interval = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.max_poll_attempts {
        settings.max_poll_attempts = v.max(1);
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout = Duration::from_secs(v);
    }
    if let Some(v) = file_cfg.warmup_batch_width {
        settings.warmup_batch_width = v.max(1);
    }
    if let Some(v) = file_cfg.autoplay_secs {
        settings.autoplay_period = Duration::from_secs(v.max(1));
    }
    if let Some(v) = file_cfg.static_art {
        settings.static_art = v;
    }

    Ok(())
}

/// `lookup` is `std::env::var` in production; tests pass a map.
pub fn apply_env_overrides<F>(settings: &mut ClientSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("REWIND_GATEWAY_URL") {
        settings.gateway_url = v;
    }
    if let Some(v) = lookup("APP__GATEWAY_URL") {
        settings.gateway_url = v;
    }

    if let Some(v) = lookup("REWIND_CDN_URL") {
        settings.cdn_url = v;
    }

    if let Some(v) = lookup("REWIND_ASSET_LOCALE") {
        settings.asset_locale = v;
    }

    if let Some(v) = parsed::<u64>(&lookup, "REWIND_POLL_INTERVAL_MS") {
        settings.poll_interval = Duration::from_millis(v);
    }
    if let Some(v) = parsed::<u32>(&lookup, "REWIND_MAX_POLL_ATTEMPTS") {
        settings.max_poll_attempts = v.max(1);
    }
    if let Some(v) = parsed::<u64>(&lookup, "REWIND_REQUEST_TIMEOUT_SECS") {
        settings.request_timeout = Duration::from_secs(v);
    }
    if let Some(v) = parsed::<usize>(&lookup, "REWIND_WARMUP_BATCH") {
        settings.warmup_batch_width = v.max(1);
    }
    if let Some(v) = parsed::<u64>(&lookup, "REWIND_AUTOPLAY_SECS") {
        settings.autoplay_period = Duration::from_secs(v.max(1));
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "config: ignoring unparseable override");
            None
        }
    }
}

fn validate(settings: &ClientSettings) -> Result<(), SettingsError> {
    for (field, value) in [
        ("gateway_url", &settings.gateway_url),
        ("cdn_url", &settings.cdn_url),
    ] {
        let valid = url::Url::parse(value)
            .map(|url| !url.cannot_be_a_base())
            .unwrap_or(false);
        if !valid {
            return Err(SettingsError::InvalidUrl {
                field,
                value: value.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
