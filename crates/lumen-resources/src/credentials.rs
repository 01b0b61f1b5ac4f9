//! Credential providers.

use lumen_abstraction::CredentialProvider;
use std::sync::{PoisonError, RwLock};
use tracing::info;

/// A fixed credential, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(Option<String>);

impl StaticCredentials {
    /// A provider that always presents `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// A provider with no credential.
    #[must_use]
    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl CredentialProvider for StaticCredentials {
    fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// A credential that follows a sign-in session.
///
/// The token is read fresh on every fetch attempt, so signing in or out
/// affects the next attempt and never one already in flight.
#[derive(Debug, Default)]
pub struct SessionCredentials {
    token: RwLock<Option<String>>,
}

impl SessionCredentials {
    /// Creates a signed-out session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the token of a new session.
    pub fn sign_in(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
        info!("Session signed in");
    }

    /// Forgets the current token.
    pub fn sign_out(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
        info!("Session signed out");
    }

    /// Returns `true` while a token is held.
    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.token.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

impl CredentialProvider for SessionCredentials {
    fn access_token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_credentials() {
        assert_eq!(StaticCredentials::new("abc").access_token().as_deref(), Some("abc"));
        assert_eq!(StaticCredentials::anonymous().access_token(), None);
    }

    #[test]
    fn test_session_sign_in_and_out() {
        let session = SessionCredentials::new();
        assert!(!session.is_signed_in());
        assert_eq!(session.access_token(), None);

        session.sign_in("mock-token");
        assert!(session.is_signed_in());
        assert_eq!(session.access_token().as_deref(), Some("mock-token"));

        session.sign_out();
        assert_eq!(session.access_token(), None);
    }
}
