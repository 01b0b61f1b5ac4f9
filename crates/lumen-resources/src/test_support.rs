//! Scripted transport for unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use lumen_abstraction::{CacheKey, Transport, TransportError, TransportResponse};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

#[derive(Default)]
struct Script {
    calls: usize,
    calls_by_key: HashMap<String, usize>,
    last_token: Option<String>,
    outcomes: HashMap<String, Result<TransportResponse, TransportError>>,
    gates: HashMap<String, watch::Sender<bool>>,
}

/// Transport whose answers and timing are scripted per key.
///
/// Unscripted keys answer 200 `image/png` with the key itself as body.
/// A held key blocks every retrieval until it is released.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn with_script<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut script)
    }

    pub(crate) fn respond_with_status(&self, key: &str, status: u16) {
        self.with_script(|script| {
            script.outcomes.insert(
                key.to_string(),
                Ok(TransportResponse {
                    status,
                    content_type: Some("application/json".to_string()),
                    body: Bytes::from_static(b"{}"),
                }),
            );
        });
    }

    pub(crate) fn fail_with(&self, key: &str, error: TransportError) {
        self.with_script(|script| {
            script.outcomes.insert(key.to_string(), Err(error));
        });
    }

    /// Blocks retrievals of `key` until [`Self::release`] is called.
    pub(crate) fn hold(&self, key: &str) {
        self.with_script(|script| {
            script.gates.insert(key.to_string(), watch::channel(false).0);
        });
    }

    pub(crate) fn release(&self, key: &str) {
        self.with_script(|script| {
            if let Some(gate) = script.gates.get(key) {
                gate.send_replace(true);
            }
        });
    }

    pub(crate) fn calls(&self) -> usize {
        self.with_script(|script| script.calls)
    }

    pub(crate) fn calls_for(&self, key: &str) -> usize {
        self.with_script(|script| script.calls_by_key.get(key).copied().unwrap_or(0))
    }

    pub(crate) fn last_token(&self) -> Option<String> {
        self.with_script(|script| script.last_token.clone())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn retrieve(&self, key: &CacheKey, token: &str) -> Result<TransportResponse, TransportError> {
        let (gate, outcome) = self.with_script(|script| {
            script.calls += 1;
            *script.calls_by_key.entry(key.as_str().to_string()).or_default() += 1;
            script.last_token = Some(token.to_string());
            (
                script.gates.get(key.as_str()).map(watch::Sender::subscribe),
                script.outcomes.get(key.as_str()).cloned(),
            )
        });

        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }

        outcome.unwrap_or_else(|| {
            Ok(TransportResponse {
                status: 200,
                content_type: Some("image/png".to_string()),
                body: Bytes::copy_from_slice(key.as_str().as_bytes()),
            })
        })
    }
}

/// Lets spawned tasks run until they block.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
