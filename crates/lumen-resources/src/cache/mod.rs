//! Reference-counted resource caching.
//!
//! This module provides the process-wide store of fetched resources, keyed by
//! canonical cache key, plus the [`ResourceCache`] service that ties the store
//! to a fetch coordinator and a credential provider.

pub mod cache;
pub mod config;
pub mod store;
pub mod types;

pub use cache::{CacheBuildError, ResourceCache};
pub use config::{CacheConfigError, ConfigLoadError, ResourceCacheConfig, default_config_path, load_config};
pub use store::ResourceStore;
pub use types::{CacheEntry, CacheStats};
