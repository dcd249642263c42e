use std::{fs, io, path::Path, time::Duration};

use serde::Deserialize;
use shared::protocol::AreaFilter;
use thiserror::Error;
use url::Url;

use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_INTERVAL};

pub const DEFAULT_SETTINGS_FILE: &str = "club.toml";
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid backend url '{value}': {source}")]
    BackendUrl {
        value: String,
        source: url::ParseError,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub backend_url: String,
    pub retry_interval_ms: u64,
    pub retry_max_attempts: u32,
    pub request_timeout_secs: u64,
    pub enrollment_area: AreaFilter,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            retry_interval_ms: DEFAULT_RETRY_INTERVAL.as_millis() as u64,
            retry_max_attempts: DEFAULT_MAX_ATTEMPTS,
            request_timeout_secs: 15,
            enrollment_area: AreaFilter::All,
        }
    }
}

impl ClientSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_millis(self.retry_interval_ms),
            max_attempts: self.retry_max_attempts,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Replaces the backend url, applying the same validation as the file and
    /// environment layers.
    pub fn override_backend_url(&mut self, value: &str) -> Result<(), ConfigError> {
        self.backend_url = parse_backend_url(value)?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    backend_url: Option<String>,
    retry_interval_ms: Option<u64>,
    retry_max_attempts: Option<u32>,
    request_timeout_secs: Option<u64>,
    enrollment_area: Option<String>,
}

/// Defaults, then `club.toml` in the working directory, then environment.
pub fn load_settings() -> Result<ClientSettings, ConfigError> {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| {
        std::env::var(key).ok()
    })
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientSettings, ConfigError> {
    let mut settings = ClientSettings::default();

    let file_cfg = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<FileSettings>(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => FileSettings::default(),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };

    if let Some(v) = file_cfg.backend_url {
        settings.backend_url = parse_backend_url(&v)?;
    }
    if let Some(v) = file_cfg.retry_interval_ms {
        settings.retry_interval_ms = v;
    }
    if let Some(v) = file_cfg.retry_max_attempts {
        settings.retry_max_attempts = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.enrollment_area {
        settings.enrollment_area = parse_value("enrollment_area", &v)?;
    }

    if let Some(v) = env("CLUB_BACKEND_URL") {
        settings.backend_url = parse_backend_url(&v)?;
    }
    if let Some(v) = env("APP__BACKEND_URL") {
        settings.backend_url = parse_backend_url(&v)?;
    }
    if let Some(v) = env("APP__RETRY_INTERVAL_MS") {
        settings.retry_interval_ms = parse_value("APP__RETRY_INTERVAL_MS", &v)?;
    }
    if let Some(v) = env("APP__RETRY_MAX_ATTEMPTS") {
        settings.retry_max_attempts = parse_value("APP__RETRY_MAX_ATTEMPTS", &v)?;
    }
    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = parse_value("APP__REQUEST_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = env("APP__ENROLLMENT_AREA") {
        settings.enrollment_area = parse_value("APP__ENROLLMENT_AREA", &v)?;
    }

    Ok(settings)
}

fn parse_backend_url(value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    Url::parse(value).map_err(|source| ConfigError::BackendUrl {
        value: value.to_string(),
        source,
    })?;
    Ok(value.to_string())
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
