//! Configuration for the resource cache.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration for the resource cache and its HTTP transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceCacheConfig {
    /// Origin of the resource API (default: `http://localhost:5000`).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path prefix for bare resource ids (default: `/api/resources`).
    #[serde(default = "default_resource_prefix")]
    pub resource_prefix: String,

    /// Seconds before a retrieval is abandoned (default: 30).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Scheme placed before the token in the `Authorization` header (default: `Bearer`).
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_resource_prefix() -> String {
    "/api/resources".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_auth_scheme() -> String {
    "Bearer".to_string()
}

/// Errors that can occur during cache configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheConfigError {
    /// The base URL is not an absolute http(s) URL.
    #[error("Invalid base URL '{0}': must be an absolute http or https URL")]
    InvalidBaseUrl(String),

    /// The resource prefix does not start with `/`.
    #[error("Invalid resource prefix '{0}': must start with '/'")]
    InvalidResourcePrefix(String),

    /// Invalid request timeout (must be > 0).
    #[error("Invalid request timeout: must be greater than 0")]
    InvalidRequestTimeout,

    /// The auth scheme is empty or contains whitespace.
    #[error("Invalid auth scheme '{0}'")]
    InvalidAuthScheme(String),
}

impl Default for ResourceCacheConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            resource_prefix: default_resource_prefix(),
            request_timeout_secs: default_request_timeout_secs(),
            auth_scheme: default_auth_scheme(),
        }
    }
}

impl ResourceCacheConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), CacheConfigError> {
        match Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(CacheConfigError::InvalidBaseUrl(self.base_url.clone())),
        }

        if !self.resource_prefix.starts_with('/') {
            return Err(CacheConfigError::InvalidResourcePrefix(self.resource_prefix.clone()));
        }

        if self.request_timeout_secs == 0 {
            return Err(CacheConfigError::InvalidRequestTimeout);
        }

        if self.auth_scheme.is_empty() || self.auth_scheme.contains(char::is_whitespace) {
            return Err(CacheConfigError::InvalidAuthScheme(self.auth_scheme.clone()));
        }

        Ok(())
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Errors that can occur when loading configuration from disk.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// I/O error reading config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Configuration validation error.
    #[error("Configuration validation error: {0}")]
    Validation(#[from] CacheConfigError),
}

/// Load the `[resources]` section of a TOML config file.
///
/// A missing file or a file without a `[resources]` table yields the
/// default configuration.
///
/// # Errors
/// Returns error if the file exists but cannot be read, parsed or validated.
pub fn load_config(path: &Path) -> Result<ResourceCacheConfig, ConfigLoadError> {
    #[derive(Deserialize)]
    struct ConfigFile {
        #[serde(default)]
        resources: Option<ResourceCacheConfig>,
    }

    if !path.exists() {
        return Ok(ResourceCacheConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let file: ConfigFile = toml::from_str(&content)?;
    let config = file.resources.unwrap_or_default();
    config.validate()?;
    Ok(config)
}

/// Get the default config file path for a workspace root.
///
/// # Returns
/// Path to `.lumen/config.toml`
#[must_use]
pub fn default_config_path(root: &Path) -> PathBuf {
    root.join(".lumen").join("config.toml")
}
