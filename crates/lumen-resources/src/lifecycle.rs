//! Cache lifecycle: bulk teardown and the process-wide instance.

use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::info;

use crate::cache::{ResourceCache, ResourceStore};

/// Errors from the process-wide cache lifecycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// `init_global` was called more than once.
    #[error("Resource cache already initialized")]
    AlreadyInitialized,
}

/// Bulk teardown of a store, used on session end.
///
/// Does not coordinate with live binders: their held keys become absent and
/// later releases are no-ops. Callers re-request (e.g. `refetch`) afterwards.
#[derive(Debug, Clone)]
pub struct CacheLifecycle {
    store: Arc<ResourceStore>,
}

impl CacheLifecycle {
    /// Controller over `store`.
    #[must_use]
    pub fn new(store: Arc<ResourceStore>) -> Self {
        Self { store }
    }

    /// Disposes every handle and empties the store, regardless of reference counts.
    ///
    /// # Returns
    /// Number of entries removed.
    pub fn clear_all(&self) -> usize {
        self.store.clear_all()
    }
}

static GLOBAL: OnceLock<ResourceCache> = OnceLock::new();

/// Installs the process-wide cache.
///
/// # Errors
/// Returns `LifecycleError::AlreadyInitialized` if a cache is already installed.
pub fn init_global(cache: ResourceCache) -> Result<&'static ResourceCache, LifecycleError> {
    let mut installed = false;
    let global = GLOBAL.get_or_init(|| {
        installed = true;
        cache
    });
    if !installed {
        return Err(LifecycleError::AlreadyInitialized);
    }
    info!("Process-wide resource cache initialized");
    Ok(global)
}

/// The process-wide cache, if installed.
#[must_use]
pub fn global() -> Option<&'static ResourceCache> {
    GLOBAL.get()
}
