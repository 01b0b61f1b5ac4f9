//! Authenticated, reference-counted remote-resource cache for Lumen.
//!
//! This crate turns protected resource locators into shared local handles.
//!
//! # Components
//!
//! - **key**: canonicalizes locators into cache keys
//! - **cache**: the reference-counted store, statistics and configuration
//! - **fetch**: cancellable, de-duplicated authenticated retrieval
//! - **http**: reqwest-backed transport
//! - **binder**: per-consumer session state machine
//! - **lifecycle**: bulk teardown and the process-wide instance

pub mod binder;
pub mod cache;
pub mod credentials;
pub mod fetch;
pub mod http;
pub mod key;
pub mod lifecycle;

#[cfg(test)]
pub(crate) mod test_support;

pub use binder::{BinderPhase, ResourceBinder, ResourceView};
pub use cache::{
    CacheBuildError, CacheConfigError, CacheStats, ConfigLoadError, ResourceCache, ResourceCacheConfig,
    ResourceStore, default_config_path, load_config,
};
pub use credentials::{SessionCredentials, StaticCredentials};
pub use fetch::{FetchCoordinator, FetchToken};
pub use http::HttpTransport;
pub use key::{normalize, normalize_requested};
pub use lifecycle::{CacheLifecycle, LifecycleError, global, init_global};

pub use lumen_abstraction::{
    CacheKey, CredentialProvider, FetchError, LocalHandle, Transport, TransportError, TransportResponse,
};
