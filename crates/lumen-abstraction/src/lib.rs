//! Resource abstraction layer for Lumen.
//!
//! This module defines the shared vocabulary of the remote-resource cache:
//! canonical cache keys, disposable local handles, the fetch error taxonomy,
//! and the collaborator traits (transport and credentials) the cache is
//! built against.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical identifier of a remote resource.
///
/// Produced by the key normalizer; two locators naming the same
/// path, query and fragment map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wraps an already-canonical key string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the path component of the key (everything before `?` or `#`).
    #[must_use]
    pub fn path(&self) -> &str {
        let end = self.0.find(|c: char| c == '?' || c == '#').unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

struct HandleInner {
    id: u64,
    content_type: String,
    len: usize,
    payload: RwLock<Option<Bytes>>,
}

/// In-process handle to a fetched resource.
///
/// Cloning a handle shares it. Disposing it releases the payload for every
/// clone at once; disposal is idempotent.
#[derive(Clone)]
pub struct LocalHandle {
    inner: Arc<HandleInner>,
}

impl LocalHandle {
    /// Creates a live handle over the given payload.
    #[must_use]
    pub fn new(payload: Bytes, content_type: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
                content_type: content_type.into(),
                len: payload.len(),
                payload: RwLock::new(Some(payload)),
            }),
        }
    }

    /// Process-unique identifier of this handle.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// MIME type of the payload.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.inner.content_type
    }

    /// Size of the payload in bytes, as decoded (still reported after disposal).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len
    }

    /// Returns `true` if the payload was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Returns the payload, or `None` once the handle has been disposed.
    #[must_use]
    pub fn bytes(&self) -> Option<Bytes> {
        self.inner
            .payload
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns `true` once the handle has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner
            .payload
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Disposes the handle for all holders.
    ///
    /// Returns `true` if this call performed the disposal, `false` if the
    /// handle was already disposed.
    pub fn dispose(&self) -> bool {
        self.inner
            .payload
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    /// Returns `true` if both values refer to the same handle.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Renders the payload as a `data:` URL, or `None` once disposed.
    #[must_use]
    pub fn to_data_url(&self) -> Option<String> {
        self.bytes()
            .map(|payload| format!("data:{};base64,{}", self.content_type(), STANDARD.encode(payload)))
    }
}

impl PartialEq for LocalHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for LocalHandle {}

impl fmt::Debug for LocalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalHandle")
            .field("id", &self.inner.id)
            .field("content_type", &self.inner.content_type)
            .field("len", &self.inner.len)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Outcome taxonomy of a resource fetch.
///
/// `Cancelled` is not a reportable error: it marks an attempt that was
/// superseded or aborted and must never be surfaced to a consumer.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchError {
    /// No credential was available; nothing was sent.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The remote answered with a non-success status.
    #[error("Failed to fetch resource: {status}")]
    RemoteRejected {
        /// HTTP status code returned by the remote.
        status: u16,
    },

    /// The transfer failed below the HTTP layer.
    #[error("{0}")]
    TransportFailure(String),

    /// The attempt was cancelled before it completed.
    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Returns `true` for the cancellation outcome.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if the error may be shown to a consumer.
    #[must_use]
    pub fn is_reportable(&self) -> bool {
        !self.is_cancelled()
    }
}

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        Self::TransportFailure(err.to_string())
    }
}

/// Failures reported by a [`Transport`] below the HTTP status layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request could not be sent or the connection failed.
    #[error("Request Error: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// The response body could not be read.
    #[error("Body Error: {0}")]
    Body(String),
}

/// Raw response of an authenticated retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Response body.
    pub body: Bytes,
}

impl TransportResponse {
    /// Returns `true` for a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs the authenticated byte retrieval for a canonical key.
///
/// Implementations must be cancel-safe: dropping the returned future aborts
/// the transfer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Retrieves the resource named by `key`, presenting `token` as credential.
    ///
    /// # Errors
    /// Returns a `TransportError` if the transfer fails below the status layer.
    async fn retrieve(&self, key: &CacheKey, token: &str) -> Result<TransportResponse, TransportError>;
}

/// Supplies the current authentication token on demand.
pub trait CredentialProvider: Send + Sync {
    /// Returns the current access token, or `None` when signed out.
    fn access_token(&self) -> Option<String>;
}
