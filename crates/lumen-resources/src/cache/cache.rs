//! ResourceCache service.

use lumen_abstraction::{CredentialProvider, Transport, TransportError};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use super::config::{CacheConfigError, ResourceCacheConfig};
use super::store::ResourceStore;
use super::types::CacheStats;
use crate::binder::ResourceBinder;
use crate::fetch::FetchCoordinator;
use crate::http::HttpTransport;
use crate::lifecycle::CacheLifecycle;

/// Errors that can occur when building a cache from configuration.
#[derive(Debug, Error)]
pub enum CacheBuildError {
    /// Configuration validation error.
    #[error("Invalid cache configuration: {0}")]
    Config(#[from] CacheConfigError),

    /// The HTTP transport could not be created.
    #[error("Failed to create transport: {0}")]
    Transport(#[from] TransportError),
}

struct CacheInner {
    store: Arc<ResourceStore>,
    coordinator: Arc<FetchCoordinator>,
    credentials: Arc<dyn CredentialProvider>,
}

/// Authenticated, reference-counted remote-resource cache.
///
/// Cloning is cheap and shares the same store. Consumers obtain a
/// [`ResourceBinder`] through [`ResourceCache::bind`].
#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<CacheInner>,
}

impl ResourceCache {
    /// Create an empty cache over the given collaborators.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store: Arc::new(ResourceStore::new()),
                coordinator: Arc::new(FetchCoordinator::new(transport)),
                credentials,
            }),
        }
    }

    /// Create a cache talking HTTP to the configured origin.
    ///
    /// # Errors
    /// Returns `CacheBuildError` if the configuration is invalid or the
    /// HTTP client cannot be built.
    pub fn from_config(
        config: &ResourceCacheConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, CacheBuildError> {
        config.validate()?;
        let transport = HttpTransport::new(config)?;
        info!(base_url = %config.base_url, "Resource cache created");
        Ok(Self::new(Arc::new(transport), credentials))
    }

    /// A new consumer binding, initially idle.
    #[must_use]
    pub fn bind(&self) -> ResourceBinder {
        ResourceBinder::new(
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.coordinator),
            Arc::clone(&self.inner.credentials),
        )
    }

    /// The shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<ResourceStore> {
        &self.inner.store
    }

    /// The fetch coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.inner.coordinator
    }

    /// Lifecycle controller for bulk teardown.
    #[must_use]
    pub fn lifecycle(&self) -> CacheLifecycle {
        CacheLifecycle::new(Arc::clone(&self.inner.store))
    }

    /// Disposes every handle and empties the store.
    ///
    /// # Returns
    /// Number of entries removed.
    pub fn clear_all(&self) -> usize {
        self.lifecycle().clear_all()
    }

    /// Snapshot of the store statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.inner.store.stats()
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("store", &self.inner.store)
            .field("coordinator", &self.inner.coordinator)
            .finish_non_exhaustive()
    }
}
