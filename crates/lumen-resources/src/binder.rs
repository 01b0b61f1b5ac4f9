//! Per-consumer binding to the resource cache.
//!
//! A [`ResourceBinder`] owns one consumer session. It holds at most one
//! reference unit in the store, runs at most one live fetch attempt, and
//! discards any attempt result that no longer matches the session's current
//! request.

use lumen_abstraction::{CacheKey, CredentialProvider, FetchError, LocalHandle};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::ResourceStore;
use crate::fetch::{FetchCoordinator, FetchToken};
use crate::key::normalize_requested;

/// Lifecycle phase of a consumer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BinderPhase {
    /// No resource requested.
    Idle,
    /// A fetch for the requested key is in flight.
    Acquiring,
    /// The requested resource is held.
    Ready,
    /// The last fetch failed; the error is in the view.
    Failed,
    /// Torn down; no further transitions.
    Detached,
}

/// What a consumer sees.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceView {
    /// The held handle, once ready.
    pub handle: Option<LocalHandle>,
    /// `true` while a fetch is in flight.
    pub is_loading: bool,
    /// The failure of the last attempt. Never `Cancelled`.
    pub error: Option<FetchError>,
}

impl ResourceView {
    fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    fn ready(handle: LocalHandle) -> Self {
        Self {
            handle: Some(handle),
            ..Self::default()
        }
    }

    fn failed(error: FetchError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct Session {
    /// Last locator passed to `observe`, kept while disabled.
    locator: Option<String>,
    enabled: bool,
    requested: Option<CacheKey>,
    active: Option<FetchToken>,
    held: Option<CacheKey>,
    phase: BinderPhase,
}

struct BinderShared {
    store: Arc<ResourceStore>,
    coordinator: Arc<FetchCoordinator>,
    credentials: Arc<dyn CredentialProvider>,
    session: Mutex<Session>,
    view_tx: watch::Sender<ResourceView>,
}

/// Binds one consumer to the cache.
///
/// Must be used from within a Tokio runtime; fetches run as spawned tasks.
/// Dropping the binder detaches it.
pub struct ResourceBinder {
    shared: Arc<BinderShared>,
}

impl ResourceBinder {
    /// Creates an idle binder over the given store and coordinator.
    #[must_use]
    pub fn new(
        store: Arc<ResourceStore>,
        coordinator: Arc<FetchCoordinator>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let (view_tx, _) = watch::channel(ResourceView::default());
        Self {
            shared: Arc::new(BinderShared {
                store,
                coordinator,
                credentials,
                session: Mutex::new(Session {
                    locator: None,
                    enabled: true,
                    requested: None,
                    active: None,
                    held: None,
                    phase: BinderPhase::Idle,
                }),
                view_tx,
            }),
        }
    }

    /// Sets the consumer's desired resource. `None` or a blank locator clears it.
    ///
    /// Observing the key already requested is a no-op; use
    /// [`Self::refetch`] to force a new acquisition.
    pub fn observe(&self, locator: Option<&str>) {
        let mut session = self.shared.lock();
        if session.phase == BinderPhase::Detached {
            warn!(locator = ?locator, "observe on detached binder ignored");
            return;
        }

        session.locator = locator.map(str::to_string);
        if !session.enabled {
            debug!(locator = ?locator, "Binder disabled, locator remembered");
            return;
        }

        let key = normalize_requested(locator);
        if session.requested == key {
            return;
        }
        self.shared.rebind(&mut session, key);
    }

    /// Re-acquires the current key even though it did not change.
    ///
    /// No-op when idle or detached.
    pub fn refetch(&self) {
        let mut session = self.shared.lock();
        if session.phase == BinderPhase::Detached {
            return;
        }
        if let Some(key) = session.requested.clone() {
            debug!(key = %key, "Refetching");
            self.shared.rebind(&mut session, Some(key));
        }
    }

    /// Disabling behaves like clearing the key; enabling re-observes the
    /// remembered locator.
    pub fn set_enabled(&self, enabled: bool) {
        let mut session = self.shared.lock();
        if session.phase == BinderPhase::Detached || session.enabled == enabled {
            return;
        }
        session.enabled = enabled;

        let key = if enabled {
            normalize_requested(session.locator.as_deref())
        } else {
            None
        };
        if session.requested != key {
            self.shared.rebind(&mut session, key);
        }
    }

    /// Tears the session down: cancels the live attempt and releases the held unit.
    pub fn detach(&self) {
        let mut session = self.shared.lock();
        if session.phase == BinderPhase::Detached {
            return;
        }
        self.shared.unbind(&mut session);
        session.requested = None;
        session.phase = BinderPhase::Detached;
        self.shared.view_tx.send_replace(ResourceView::default());
        debug!("Binder detached");
    }

    /// Receiver notified on every view change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ResourceView> {
        self.shared.view_tx.subscribe()
    }

    /// Current view.
    #[must_use]
    pub fn view(&self) -> ResourceView {
        self.shared.view_tx.borrow().clone()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> BinderPhase {
        self.shared.lock().phase
    }

    /// Canonical key currently requested.
    #[must_use]
    pub fn requested_key(&self) -> Option<CacheKey> {
        self.shared.lock().requested.clone()
    }

    /// Key for which this binder holds a reference unit.
    #[must_use]
    pub fn held_key(&self) -> Option<CacheKey> {
        self.shared.lock().held.clone()
    }

    /// Waits until the view is no longer loading and returns it.
    pub async fn settled(&self) -> ResourceView {
        let mut receiver = self.subscribe();
        match receiver.wait_for(|view| !view.is_loading).await {
            Ok(view) => view.clone(),
            Err(_) => self.view(),
        }
    }
}

impl Drop for ResourceBinder {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for ResourceBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceBinder")
            .field("session", &*self.shared.lock())
            .finish_non_exhaustive()
    }
}

impl BinderShared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancels the live attempt and releases the held unit.
    fn unbind(&self, session: &mut Session) {
        if let Some(token) = session.active.take() {
            token.cancel();
        }
        if let Some(held) = session.held.take() {
            self.store.release(&held);
        }
    }

    /// Moves the session to `key`: hit binds immediately, miss starts an attempt.
    fn rebind(self: &Arc<Self>, session: &mut Session, key: Option<CacheKey>) {
        self.unbind(session);
        session.requested.clone_from(&key);

        let Some(key) = key else {
            session.phase = BinderPhase::Idle;
            self.view_tx.send_replace(ResourceView::default());
            return;
        };

        if let Some(handle) = self.store.acquire_existing(&key) {
            session.held = Some(key);
            session.phase = BinderPhase::Ready;
            self.view_tx.send_replace(ResourceView::ready(handle));
            return;
        }

        let token = FetchToken::new();
        session.active = Some(token.clone());
        session.phase = BinderPhase::Acquiring;
        self.view_tx.send_replace(ResourceView::loading());

        let credential = self.credentials.access_token();
        let attempt = Arc::clone(self).run_attempt(key.clone(), token, credential);
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(attempt);
            }
            Err(e) => {
                warn!(key = %key, error = %e, "No async runtime, cannot fetch");
                session.active = None;
                session.phase = BinderPhase::Failed;
                self.view_tx
                    .send_replace(ResourceView::failed(FetchError::TransportFailure(e.to_string())));
            }
        }
    }

    async fn run_attempt(self: Arc<Self>, key: CacheKey, token: FetchToken, credential: Option<String>) {
        let outcome = self
            .coordinator
            .fetch(&key, credential.as_deref(), token.cancellation())
            .await;

        if matches!(outcome, Err(FetchError::Cancelled)) {
            return;
        }

        let mut session = self.lock();
        if session.active.as_ref() != Some(&token) || session.requested.as_ref() != Some(&key) {
            debug!(key = %key, attempt = token.id(), "Discarding stale fetch result");
            return;
        }
        session.active = None;

        match outcome {
            Ok(handle) => {
                let handle = self.store.insert_new(&key, handle);
                session.held = Some(key);
                session.phase = BinderPhase::Ready;
                self.view_tx.send_replace(ResourceView::ready(handle));
            }
            Err(error) => {
                debug!(key = %key, error = %error, "Fetch failed");
                session.phase = BinderPhase::Failed;
                self.view_tx.send_replace(ResourceView::failed(error));
            }
        }
    }
}
