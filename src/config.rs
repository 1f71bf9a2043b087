//! Service configuration.
//!
//! Loading order, later wins:
//! 1. compiled [`Config::default()`]
//! 2. the JSON file passed with `--config`, deep-merged over the defaults
//! 3. `TASKDESK_*` / `TWILIO_*` environment variables
//!
//! Null values in the file keep the default. Unparseable environment values
//! are ignored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_file: PathBuf,
    /// HS256 secret used to sign and verify bearer tokens.
    pub jwt_secret: String,
    pub token_ttl_hours: u64,
    pub log_level: String,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub sms: SmsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub api_base: String,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            api_base: "https://api.twilio.com".into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            data_file: PathBuf::from("taskdesk.json"),
            jwt_secret: String::new(),
            token_ttl_hours: 24,
            log_level: "info".into(),
            default_page_size: 20,
            max_page_size: 100,
            sms: SmsConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Deep-merge the file at `path` over the defaults. A missing file is
    /// an error: the caller asked for it explicitly.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "loading config file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        let merged = deep_merge(serde_json::to_value(Self::default())?, user);
        Ok(serde_json::from_value(merged)?)
    }

    /// Override fields from variables resolved through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = read("TASKDESK_HOST") {
            self.host = v;
        }
        if let Some(v) = read("TASKDESK_PORT").and_then(|v| v.parse::<u16>().ok()) {
            self.port = v;
        }
        if let Some(v) = read("TASKDESK_DATA_FILE") {
            self.data_file = PathBuf::from(v);
        }
        if let Some(v) = read("TASKDESK_JWT_SECRET") {
            self.jwt_secret = v;
        }
        if let Some(v) = read("TASKDESK_TOKEN_TTL_HOURS").and_then(|v| v.parse::<u64>().ok()) {
            self.token_ttl_hours = v;
        }
        if let Some(v) = read("TASKDESK_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = read("TWILIO_ACCOUNT_SID") {
            self.sms.account_sid = Some(v);
        }
        if let Some(v) = read("TWILIO_AUTH_TOKEN") {
            self.sms.auth_token = Some(v);
        }
        if let Some(v) = read("TWILIO_PHONE_NUMBER") {
            self.sms.from_number = Some(v);
        }
    }

    /// Checks needed before serving traffic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "jwtSecret must be set (config file or TASKDESK_JWT_SECRET)".into(),
            ));
        }
        if self.default_page_size == 0 || self.max_page_size < self.default_page_size {
            return Err(ConfigError::InvalidValue(format!(
                "page sizes must satisfy 0 < defaultPageSize ({}) <= maxPageSize ({})",
                self.default_page_size, self.max_page_size
            )));
        }
        Ok(())
    }
}

/// Objects merge per key, everything else is replaced, nulls are skipped.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}
