//! HTTP transport backed by reqwest.

use async_trait::async_trait;
use lumen_abstraction::{CacheKey, Transport, TransportError, TransportResponse};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use crate::cache::ResourceCacheConfig;

/// Retrieves resources from the configured origin with an `Authorization` header.
///
/// Keys starting with `/` are requested relative to the origin. Any other key
/// is treated as a bare resource id and requested under the resource prefix.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// HTTP client for making requests.
    http_client: Client,
    /// Origin of the resource API, without a trailing slash.
    base_url: String,
    /// Path prefix for bare resource ids.
    resource_prefix: String,
    /// Scheme placed before the token.
    auth_scheme: String,
}

impl HttpTransport {
    /// Creates a transport from a validated configuration.
    ///
    /// # Errors
    /// Returns `TransportError::Request` if the HTTP client cannot be built.
    pub fn new(config: &ResourceCacheConfig) -> Result<Self, TransportError> {
        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TransportError::Request(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            resource_prefix: config.resource_prefix.trim_end_matches('/').to_string(),
            auth_scheme: config.auth_scheme.clone(),
        })
    }

    /// The URL requested for `key`.
    #[must_use]
    pub fn request_url(&self, key: &CacheKey) -> String {
        let key = key.as_str();
        if key.starts_with('/') {
            format!("{}{}", self.base_url, key)
        } else {
            format!("{}{}/{}", self.base_url, self.resource_prefix, key)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn retrieve(&self, key: &CacheKey, token: &str) -> Result<TransportResponse, TransportError> {
        let url = self.request_url(key);
        debug!(url = %url, "Requesting resource");

        let response = self
            .http_client
            .get(&url)
            .header(AUTHORIZATION, format!("{} {}", self.auth_scheme, token))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Request(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Body(e.to_string())
            }
        })?;

        Ok(TransportResponse {
            status,
            content_type,
            body,
        })
    }
}
