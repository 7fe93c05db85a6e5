//! Capability traits consumed by the session manager.
//!
//! These traits abstract the three external collaborators — the remote auth
//! backend, durable credential persistence, and the OS-level browser
//! authorization flow — to enable dependency injection and testing.

use async_trait::async_trait;

use crate::error::SessionError;
use crate::types::{AuthorizationUrl, Session, SessionBundle, User};

/// Remote endpoint capability: issues sign-in URLs and mints sessions.
///
/// All methods map non-success backend responses into errors; a successful
/// return always carries usable data.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Request an authorization URL for the given redirect target.
    ///
    /// # Errors
    /// Returns [`SessionError::AuthorizationDenied`] when the backend refuses
    /// to issue one.
    async fn authorization_url(&self, redirect_uri: &str)
        -> Result<AuthorizationUrl, SessionError>;

    /// Exchange an authorization code for a full `{session, user}` pair.
    ///
    /// # Errors
    /// Returns [`SessionError::ExchangeFailed`] when the exchange is
    /// rejected.
    async fn exchange_code(&self, code: &str) -> Result<SessionBundle, SessionError>;

    /// Resolve the user behind an access token (remote validity check).
    ///
    /// # Errors
    /// Returns [`SessionError::ExchangeFailed`] when the token is not
    /// accepted.
    async fn fetch_session(&self, access_token: &str) -> Result<User, SessionError>;

    /// Mint a new session from a refresh token.
    ///
    /// # Errors
    /// Returns [`SessionError::ExchangeFailed`] when the refresh token is
    /// rejected.
    async fn refresh(&self, refresh_token: &str) -> Result<SessionBundle, SessionError>;

    /// Invalidate the session remotely. Best-effort from the manager's
    /// perspective.
    ///
    /// # Errors
    /// Returns an error when the backend rejects or the call fails; callers
    /// may swallow it.
    async fn sign_out(&self, access_token: &str) -> Result<(), SessionError>;
}

/// Durable key-value persistence for auth artifacts.
///
/// The session manager is the sole writer for these keys; every write is a
/// full-record replace.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist the session record, replacing any previous one.
    ///
    /// # Errors
    /// Returns [`SessionError::Persistence`] when the write fails.
    async fn save_session(&self, session: &Session) -> Result<(), SessionError>;

    /// Load the persisted session, if any.
    ///
    /// # Errors
    /// Returns [`SessionError::Persistence`] when the read fails.
    async fn session(&self) -> Result<Option<Session>, SessionError>;

    /// Persist the user record, replacing any previous one.
    ///
    /// # Errors
    /// Returns [`SessionError::Persistence`] when the write fails.
    async fn save_user(&self, user: &User) -> Result<(), SessionError>;

    /// Load the persisted user, if any.
    ///
    /// # Errors
    /// Returns [`SessionError::Persistence`] when the read fails.
    async fn user(&self) -> Result<Option<User>, SessionError>;

    /// The persisted access token, if a session is stored.
    ///
    /// # Errors
    /// Returns [`SessionError::Persistence`] when the read fails.
    async fn access_token(&self) -> Result<Option<String>, SessionError> {
        Ok(self.session().await?.map(|s| s.access_token))
    }

    /// The persisted refresh token, if a session with one is stored.
    ///
    /// # Errors
    /// Returns [`SessionError::Persistence`] when the read fails.
    async fn refresh_token(&self) -> Result<Option<String>, SessionError> {
        Ok(self.session().await?.and_then(|s| s.refresh_token))
    }

    /// Remove session and user records. Idempotent.
    ///
    /// # Errors
    /// Returns [`SessionError::Persistence`] when deletion fails.
    async fn clear_auth(&self) -> Result<(), SessionError>;
}

/// Terminal result of the external browser authorization flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOutcome {
    /// The flow completed and redirected back to the app.
    Success {
        /// The terminal callback URL, carrying tokens or a code.
        callback_url: String,
    },
    /// The user dismissed the flow.
    Cancelled,
    /// The flow failed before reaching the redirect.
    Failed(String),
}

/// OS-level browser-session capability.
///
/// Given an authorization URL and the expected redirect prefix, suspends
/// until the user completes or abandons the external flow.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Open the authorization URL and wait for the terminal outcome.
    ///
    /// # Errors
    /// Returns an error only when the capability itself breaks; user
    /// cancellation is reported through [`BrowserOutcome::Cancelled`].
    async fn authorize(
        &self,
        auth_url: &str,
        redirect_uri: &str,
    ) -> Result<BrowserOutcome, SessionError>;
}
