//! Fetch coordination.
//!
//! The coordinator turns a canonical key plus a credential into a
//! [`LocalHandle`]. Attempts for the same key that overlap in time share a
//! single transport call; each attempt keeps its own cancellation token, and
//! the shared transfer is dropped (aborting it) once its last waiter leaves.
//!
//! The coordinator never touches the resource store. Publishing a fetched
//! handle is the caller's job.

use futures::future::{BoxFuture, FutureExt, Shared};
use lumen_abstraction::{CacheKey, FetchError, LocalHandle, Transport};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use bytes::Bytes;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one fetch attempt.
///
/// Two tokens are equal only if they are the same attempt; "is this attempt
/// still current" is a plain equality check against the session's token.
#[derive(Debug, Clone)]
pub struct FetchToken {
    id: u64,
    cancel: CancellationToken,
}

impl FetchToken {
    /// Creates a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed),
            cancel: CancellationToken::new(),
        }
    }

    /// Attempt identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Asks the attempt to abort.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The underlying cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Default for FetchToken {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for FetchToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FetchToken {}

#[derive(Debug, Clone)]
struct Payload {
    body: Bytes,
    content_type: Option<String>,
}

type SharedRetrieval = Shared<BoxFuture<'static, Result<Payload, FetchError>>>;

struct Flight {
    id: u64,
    retrieval: SharedRetrieval,
    waiters: usize,
}

/// Performs cancellable, de-duplicated authenticated retrievals.
pub struct FetchCoordinator {
    transport: Arc<dyn Transport>,
    flights: Mutex<HashMap<CacheKey, Flight>>,
    next_flight: AtomicU64,
    flights_started: AtomicU64,
}

impl FetchCoordinator {
    /// Create a coordinator over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            flights: Mutex::new(HashMap::new()),
            next_flight: AtomicU64::new(1),
            flights_started: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Flight>> {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the resource named by `key`.
    ///
    /// Suspends until the transfer completes, `cancel` fires, or the
    /// transfer fails.
    ///
    /// # Errors
    /// - `Unauthenticated` when `auth_token` is absent; no transfer is started.
    /// - `Cancelled` when `cancel` fired first; callers must not surface it.
    /// - `RemoteRejected` for a non-success status.
    /// - `TransportFailure` for failures below the status layer.
    pub async fn fetch(
        &self,
        key: &CacheKey,
        auth_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<LocalHandle, FetchError> {
        let Some(auth_token) = auth_token else {
            debug!(key = %key, "No credential available, not fetching");
            return Err(FetchError::Unauthenticated);
        };

        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let mut waiter = self.join(key, auth_token);
        let retrieval = waiter.retrieval.clone();

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(key = %key, "Fetch cancelled");
                return Err(FetchError::Cancelled);
            }
            outcome = retrieval => outcome,
        };

        waiter.complete();
        outcome.map(|payload| decode(key, payload))
    }

    /// Number of transport calls started since creation.
    #[must_use]
    pub fn flights_started(&self) -> u64 {
        self.flights_started.load(Ordering::Relaxed)
    }

    /// Number of keys with a transfer currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    fn join(&self, key: &CacheKey, auth_token: &str) -> Waiter<'_> {
        let mut flights = self.lock();
        if let Some(flight) = flights.get_mut(key) {
            flight.waiters += 1;
            debug!(key = %key, waiters = flight.waiters, "Joining in-flight fetch");
            return Waiter {
                coordinator: self,
                key: key.clone(),
                flight_id: flight.id,
                retrieval: flight.retrieval.clone(),
                done: false,
            };
        }

        let flight_id = self.next_flight.fetch_add(1, Ordering::Relaxed);
        self.flights_started.fetch_add(1, Ordering::Relaxed);
        let retrieval = retrieve(Arc::clone(&self.transport), key.clone(), auth_token.to_string())
            .boxed()
            .shared();
        flights.insert(
            key.clone(),
            Flight {
                id: flight_id,
                retrieval: retrieval.clone(),
                waiters: 1,
            },
        );
        debug!(key = %key, flight_id, "Started fetch");

        Waiter {
            coordinator: self,
            key: key.clone(),
            flight_id,
            retrieval,
            done: false,
        }
    }

    /// The transfer resolved: later attempts must start a new one.
    fn finish(&self, key: &CacheKey, flight_id: u64) {
        let mut flights = self.lock();
        if flights.get(key).is_some_and(|flight| flight.id == flight_id) {
            flights.remove(key);
        }
    }

    /// A waiter gave up; drop the transfer when nobody is left.
    fn leave(&self, key: &CacheKey, flight_id: u64) {
        let mut flights = self.lock();
        let Some(flight) = flights.get_mut(key) else {
            return;
        };
        if flight.id != flight_id {
            return;
        }
        flight.waiters = flight.waiters.saturating_sub(1);
        if flight.waiters == 0 {
            flights.remove(key);
            debug!(key = %key, flight_id, "Last waiter left, aborting transfer");
        }
    }
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("in_flight", &self.in_flight())
            .field("flights_started", &self.flights_started())
            .finish_non_exhaustive()
    }
}

/// Membership of one attempt in a flight; leaving is guaranteed on drop.
struct Waiter<'a> {
    coordinator: &'a FetchCoordinator,
    key: CacheKey,
    flight_id: u64,
    retrieval: SharedRetrieval,
    done: bool,
}

impl Waiter<'_> {
    fn complete(&mut self) {
        self.done = true;
        self.coordinator.finish(&self.key, self.flight_id);
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.coordinator.leave(&self.key, self.flight_id);
        }
    }
}

async fn retrieve(
    transport: Arc<dyn Transport>,
    key: CacheKey,
    auth_token: String,
) -> Result<Payload, FetchError> {
    let response = transport.retrieve(&key, &auth_token).await.map_err(|e| {
        warn!(key = %key, error = %e, "Transport failure");
        FetchError::from(e)
    })?;

    if !response.is_success() {
        warn!(key = %key, status = response.status, "Resource request rejected");
        return Err(FetchError::RemoteRejected {
            status: response.status,
        });
    }

    debug!(key = %key, bytes = response.body.len(), "Resource retrieved");
    Ok(Payload {
        body: response.body,
        content_type: response.content_type,
    })
}

/// Decode a retrieved payload into a fresh local handle.
fn decode(key: &CacheKey, payload: Payload) -> LocalHandle {
    let content_type = payload
        .content_type
        .filter(|content_type| !content_type.trim().is_empty())
        .unwrap_or_else(|| detect_content_type(key.path()).to_string());
    LocalHandle::new(payload.body, content_type)
}

/// Detects a MIME type from the extension of a key path.
pub(crate) fn detect_content_type(path: &str) -> &'static str {
    let extension = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, extension)| extension.to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedTransport, settle};
    use lumen_abstraction::TransportError;

    fn coordinator(transport: &Arc<ScriptedTransport>) -> Arc<FetchCoordinator> {
        Arc::new(FetchCoordinator::new(Arc::clone(transport) as Arc<dyn Transport>))
    }

    #[tokio::test]
    async fn test_missing_credential_is_unauthenticated_without_transfer() {
        let transport = Arc::new(ScriptedTransport::new());
        let coordinator = coordinator(&transport);

        let result = coordinator
            .fetch(&CacheKey::new("/api/media/x.png"), None, &CancellationToken::new())
            .await;

        assert_eq!(result.unwrap_err(), FetchError::Unauthenticated);
        assert_eq!(transport.calls(), 0);
        assert_eq!(coordinator.flights_started(), 0);
    }

    #[tokio::test]
    async fn test_success_decodes_handle() {
        let transport = Arc::new(ScriptedTransport::new());
        let coordinator = coordinator(&transport);
        let key = CacheKey::new("/api/media/x.png");

        let handle = coordinator
            .fetch(&key, Some("token"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(handle.bytes().unwrap().as_ref(), b"/api/media/x.png");
        assert_eq!(handle.content_type(), "image/png");
        assert_eq!(transport.last_token().as_deref(), Some("token"));
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_non_success_status_is_remote_rejected() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_with_status("/missing", 404);
        let coordinator = coordinator(&transport);

        let result = coordinator
            .fetch(&CacheKey::new("/missing"), Some("token"), &CancellationToken::new())
            .await;

        assert_eq!(result.unwrap_err(), FetchError::RemoteRejected { status: 404 });
    }

    #[tokio::test]
    async fn test_transport_error_is_transport_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_with("/r/1", TransportError::Request("Network error".to_string()));
        let coordinator = coordinator(&transport);

        let result = coordinator
            .fetch(&CacheKey::new("/r/1"), Some("token"), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(FetchError::TransportFailure(msg)) if msg.contains("Network error")));
    }

    #[tokio::test]
    async fn test_cancel_before_completion_yields_cancelled() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.hold("/r/1");
        let coordinator = coordinator(&transport);
        let token = FetchToken::new();

        let task = {
            let coordinator = Arc::clone(&coordinator);
            let cancel = token.cancellation().clone();
            tokio::spawn(async move {
                coordinator.fetch(&CacheKey::new("/r/1"), Some("token"), &cancel).await
            })
        };
        settle().await;
        assert_eq!(coordinator.in_flight(), 1);

        token.cancel();
        let result = task.await.unwrap();

        assert_eq!(result.unwrap_err(), FetchError::Cancelled);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_fetches_share_one_transfer() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.hold("/r/1");
        let coordinator = coordinator(&transport);

        let spawn_fetch = |coordinator: Arc<FetchCoordinator>| {
            tokio::spawn(async move {
                coordinator
                    .fetch(&CacheKey::new("/r/1"), Some("token"), &CancellationToken::new())
                    .await
            })
        };
        let first = spawn_fetch(Arc::clone(&coordinator));
        let second = spawn_fetch(Arc::clone(&coordinator));
        settle().await;

        transport.release("/r/1");
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert_eq!(transport.calls(), 1);
        assert_eq!(coordinator.flights_started(), 1);
        // Each waiter decodes its own handle over the shared payload
        assert_eq!(first.bytes(), second.bytes());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_cancelling_one_waiter_keeps_the_transfer_for_others() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.hold("/r/1");
        let coordinator = coordinator(&transport);
        let leaving = FetchToken::new();

        let left = {
            let coordinator = Arc::clone(&coordinator);
            let cancel = leaving.cancellation().clone();
            tokio::spawn(async move { coordinator.fetch(&CacheKey::new("/r/1"), Some("t"), &cancel).await })
        };
        let stayed = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .fetch(&CacheKey::new("/r/1"), Some("t"), &CancellationToken::new())
                    .await
            })
        };
        settle().await;

        leaving.cancel();
        assert_eq!(left.await.unwrap().unwrap_err(), FetchError::Cancelled);
        assert_eq!(coordinator.in_flight(), 1);

        transport.release("/r/1");
        assert!(stayed.await.unwrap().is_ok());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_sequential_fetches_start_new_transfers() {
        let transport = Arc::new(ScriptedTransport::new());
        let coordinator = coordinator(&transport);
        let key = CacheKey::new("/r/1");

        coordinator.fetch(&key, Some("t"), &CancellationToken::new()).await.unwrap();
        coordinator.fetch(&key, Some("t"), &CancellationToken::new()).await.unwrap();

        assert_eq!(transport.calls(), 2);
        assert_eq!(coordinator.flights_started(), 2);
    }

    #[test]
    fn test_fetch_token_identity() {
        let a = FetchToken::new();
        let b = FetchToken::new();

        assert_eq!(a, a.clone());
        assert_ne!(a, b);

        a.cancel();
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
    }

    #[test]
    fn test_detect_content_type() {
        assert_eq!(detect_content_type("/api/media/x.png"), "image/png");
        assert_eq!(detect_content_type("/a/b.JPEG"), "image/jpeg");
        assert_eq!(detect_content_type("/a/b.webm"), "video/webm");
        assert_eq!(detect_content_type("/a.dir/file"), "application/octet-stream");
        assert_eq!(detect_content_type("resource-123"), "application/octet-stream");
    }

    #[test]
    fn test_decode_prefers_response_content_type() {
        let key = CacheKey::new("/a/b.png");
        let handle = decode(
            &key,
            Payload {
                body: Bytes::from_static(b"x"),
                content_type: Some("image/webp".to_string()),
            },
        );
        assert_eq!(handle.content_type(), "image/webp");

        let handle = decode(
            &key,
            Payload {
                body: Bytes::from_static(b"x"),
                content_type: Some(String::new()),
            },
        );
        assert_eq!(handle.content_type(), "image/png");
    }
}
