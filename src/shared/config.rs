use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default)]
    pub access_token: Option<String>,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    // セッションユーザー以外のユーザースコープの保持上限
    pub max_user_scopes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                base_url: "http://localhost:54321".to_string(),
                access_token: None,
                request_timeout_ms: 10_000,
            },
            cache: CacheConfig {
                max_user_scopes: 32,
            },
            logging: LoggingConfig {
                filter: "verse_store=debug,info".to_string(),
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        // 既定値
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("VERSE_BACKEND_URL") {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                cfg.backend.base_url = trimmed.trim_end_matches('/').to_string();
            }
        }
        if let Ok(v) = std::env::var("VERSE_ACCESS_TOKEN") {
            let trimmed = v.trim();
            cfg.backend.access_token = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
        }
        if let Ok(v) = std::env::var("VERSE_REQUEST_TIMEOUT_MS") {
            if let Some(value) = parse_u64(&v) {
                cfg.backend.request_timeout_ms = value;
            }
        }
        if let Ok(v) = std::env::var("VERSE_MAX_USER_SCOPES") {
            if let Some(value) = parse_usize(&v) {
                cfg.cache.max_user_scopes = value;
            }
        }
        if let Ok(v) = std::env::var("VERSE_LOG") {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                cfg.logging.filter = trimmed.to_string();
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(AppError::Configuration(
                "Backend base_url must not be empty".to_string(),
            ));
        }
        if !self.backend.base_url.starts_with("http://")
            && !self.backend.base_url.starts_with("https://")
        {
            return Err(AppError::Configuration(format!(
                "Backend base_url must be an http(s) URL: {}",
                self.backend.base_url
            )));
        }
        if self.backend.request_timeout_ms == 0 {
            return Err(AppError::Configuration(
                "Backend request_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.request_timeout_ms)
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

fn parse_usize(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok()
}
