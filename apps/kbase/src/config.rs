//! # Application Configuration
//!
//! TOML file with three tables, all optional:
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! body_limit = 2097152
//!
//! [security]
//! api_key = "secret"
//! rate_limit = 100
//! cors_origins = "http://localhost:3000"
//!
//! [pipeline]
//! decision_languages = ["DMN_1_2"]
//! ```
//!
//! ## Environment Overrides
//!
//! - `KBASE_API_KEY`: API key (empty disables authentication)
//! - `KBASE_RATE_LIMIT`: requests per second (0 disables rate limiting)
//! - `KBASE_CORS_ORIGINS`: comma-separated origins, or "*" for all

use kbase_core::{KbError, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default rate limit in requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Default request body limit (2 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

// =============================================================================
// SECTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Bearer key required on every endpoint except `/health`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub rate_limit: u32,
    /// Comma-separated allowed origins, "*" for any. Localhost only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors_origins: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            cors_origins: None,
        }
    }
}

impl SecurityConfig {
    /// The configured key, if authentication is enabled.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

// =============================================================================
// APP CONFIG
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, KbError> {
        toml::from_str(raw).map_err(|e| KbError::Config(e.to_string()))
    }

    /// Load from `path`, falling back to defaults when no file exists there,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, KbError> {
        let config = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    KbError::Io(format!("reading config {}: {}", path.display(), e))
                })?;
                tracing::debug!(path = %path.display(), "loaded configuration file");
                Self::from_toml_str(&raw)?
            }
            Some(path) => {
                tracing::info!(path = %path.display(), "no configuration file, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply `KBASE_*` overrides read through `lookup`.
    #[must_use]
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("KBASE_API_KEY") {
            self.security.api_key = Some(key);
        }
        if let Some(limit) = lookup("KBASE_RATE_LIMIT") {
            match limit.parse() {
                Ok(limit) => self.security.rate_limit = limit,
                Err(_) => tracing::warn!(value = %limit, "ignoring invalid KBASE_RATE_LIMIT"),
            }
        }
        if let Some(origins) = lookup("KBASE_CORS_ORIGINS") {
            self.security.cors_origins = Some(origins);
        }
        self
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, KbError> {
        toml::to_string_pretty(self).map_err(|e| KbError::Config(e.to_string()))
    }
}
