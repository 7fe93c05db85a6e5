//! Mock implementations of the capability traits.

#![allow(clippy::missing_errors_doc)]

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::SessionError;
use crate::traits::{AuthBackend, BrowserOutcome, BrowserSession, CredentialStore};
use crate::types::{AuthorizationUrl, Session, SessionBundle, User};

/// A plausible user record for tests.
#[must_use]
pub fn sample_user(id: &str) -> User {
    User {
        id: id.to_string(),
        email: Some(format!("{id}@example.com")),
        extra: serde_json::Map::new(),
    }
}

/// A `{session, user}` pair expiring `expires_in` seconds from now.
#[must_use]
pub fn sample_bundle(access_token: &str, expires_in: i64) -> SessionBundle {
    SessionBundle {
        session: Session::new(
            access_token.to_string(),
            Some(format!("refresh-{access_token}")),
            "bearer".to_string(),
            expires_in,
            None,
        ),
        user: sample_user("user-1"),
    }
}

/// In-memory [`CredentialStore`] with an optional write-failure switch.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    session: Mutex<Option<Session>>,
    user: Mutex<Option<User>>,
    fail_writes: Mutex<bool>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a persisted `{session, user}` pair, as if a prior
    /// process run had signed in.
    pub fn seed(&self, bundle: &SessionBundle) {
        *self.session.lock() = Some(bundle.session.clone());
        *self.user.lock() = Some(bundle.user.clone());
    }

    /// Make every subsequent write fail with a persistence error.
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    /// Whether the store holds neither session nor user.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.session.lock().is_none() && self.user.lock().is_none()
    }

    /// Synchronous view of the stored session, for assertions.
    #[must_use]
    pub fn session_snapshot(&self) -> Option<Session> {
        self.session.lock().clone()
    }

    fn check_writable(&self) -> Result<(), SessionError> {
        if *self.fail_writes.lock() {
            Err(SessionError::Persistence("simulated write failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save_session(&self, session: &Session) -> Result<(), SessionError> {
        self.check_writable()?;
        *self.session.lock() = Some(session.clone());
        Ok(())
    }

    async fn session(&self) -> Result<Option<Session>, SessionError> {
        Ok(self.session.lock().clone())
    }

    async fn save_user(&self, user: &User) -> Result<(), SessionError> {
        self.check_writable()?;
        *self.user.lock() = Some(user.clone());
        Ok(())
    }

    async fn user(&self) -> Result<Option<User>, SessionError> {
        Ok(self.user.lock().clone())
    }

    async fn clear_auth(&self) -> Result<(), SessionError> {
        *self.session.lock() = None;
        *self.user.lock() = None;
        Ok(())
    }
}

/// Scripted [`AuthBackend`] with per-operation call counters.
///
/// Defaults to a happy path: authorization URLs are issued, `fetch_session`
/// resolves a sample user, and exchange/refresh succeed once a response has
/// been configured.
#[derive(Debug)]
pub struct MockAuthBackend {
    exchange_response: Mutex<Option<SessionBundle>>,
    refresh_response: Mutex<Option<SessionBundle>>,
    user_response: Mutex<User>,
    refresh_error: Mutex<Option<String>>,
    sign_out_fails: Mutex<bool>,
    authorization_url_calls: AtomicUsize,
    exchange_calls: AtomicUsize,
    fetch_session_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
    last_code: Mutex<Option<String>>,
    last_refresh_token: Mutex<Option<String>>,
}

impl Default for MockAuthBackend {
    fn default() -> Self {
        Self {
            exchange_response: Mutex::new(None),
            refresh_response: Mutex::new(None),
            user_response: Mutex::new(sample_user("user-1")),
            refresh_error: Mutex::new(None),
            sign_out_fails: Mutex::new(false),
            authorization_url_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            fetch_session_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            last_code: Mutex::new(None),
            last_refresh_token: Mutex::new(None),
        }
    }
}

impl MockAuthBackend {
    /// Create a backend with the default happy-path script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bundle returned by the next `exchange_code` calls.
    pub fn set_exchange_response(&self, bundle: SessionBundle) {
        *self.exchange_response.lock() = Some(bundle);
    }

    /// Bundle returned by the next `refresh` calls.
    pub fn set_refresh_response(&self, bundle: SessionBundle) {
        *self.refresh_response.lock() = Some(bundle);
        *self.refresh_error.lock() = None;
    }

    /// Make `refresh` fail with the given message.
    pub fn fail_refresh(&self, message: &str) {
        *self.refresh_error.lock() = Some(message.to_string());
    }

    /// User resolved by `fetch_session`.
    pub fn set_user(&self, user: User) {
        *self.user_response.lock() = user;
    }

    /// Make the remote `sign_out` call fail.
    pub fn fail_sign_out(&self, fail: bool) {
        *self.sign_out_fails.lock() = fail;
    }

    /// Number of `authorization_url` calls observed.
    pub fn authorization_url_calls(&self) -> usize {
        self.authorization_url_calls.load(Ordering::SeqCst)
    }

    /// Number of `exchange_code` calls observed.
    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_session` calls observed.
    pub fn fetch_session_calls(&self) -> usize {
        self.fetch_session_calls.load(Ordering::SeqCst)
    }

    /// Number of `refresh` calls observed.
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Number of remote `sign_out` calls observed.
    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    /// The last authorization code received by `exchange_code`.
    pub fn last_code(&self) -> Option<String> {
        self.last_code.lock().clone()
    }

    /// The last refresh token received by `refresh`.
    pub fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token.lock().clone()
    }
}

#[async_trait]
impl AuthBackend for MockAuthBackend {
    async fn authorization_url(
        &self,
        redirect_uri: &str,
    ) -> Result<AuthorizationUrl, SessionError> {
        self.authorization_url_calls.fetch_add(1, Ordering::SeqCst);
        Ok(AuthorizationUrl {
            url: format!("https://auth.caeli.app/authorize?redirect_to={redirect_uri}"),
            provider: Some("google".to_string()),
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<SessionBundle, SessionError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_code.lock() = Some(code.to_string());
        self.exchange_response
            .lock()
            .clone()
            .ok_or_else(|| SessionError::ExchangeFailed("no exchange response scripted".into()))
    }

    async fn fetch_session(&self, _access_token: &str) -> Result<User, SessionError> {
        self.fetch_session_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.user_response.lock().clone())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<SessionBundle, SessionError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh_token.lock() = Some(refresh_token.to_string());

        if let Some(message) = self.refresh_error.lock().clone() {
            return Err(SessionError::ExchangeFailed(message));
        }
        self.refresh_response
            .lock()
            .clone()
            .ok_or_else(|| SessionError::ExchangeFailed("no refresh response scripted".into()))
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), SessionError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if *self.sign_out_fails.lock() {
            Err(SessionError::ExchangeFailed("simulated sign-out failure".into()))
        } else {
            Ok(())
        }
    }
}

/// [`BrowserSession`] that resolves immediately with a preset outcome.
#[derive(Debug)]
pub struct StaticBrowser {
    outcome: BrowserOutcome,
    opened_url: Mutex<Option<String>>,
}

impl StaticBrowser {
    /// Resolve every flow with the given terminal callback URL.
    #[must_use]
    pub fn with_callback(callback_url: &str) -> Self {
        Self {
            outcome: BrowserOutcome::Success { callback_url: callback_url.to_string() },
            opened_url: Mutex::new(None),
        }
    }

    /// Resolve every flow with the given outcome.
    #[must_use]
    pub fn with_outcome(outcome: BrowserOutcome) -> Self {
        Self { outcome, opened_url: Mutex::new(None) }
    }

    /// The authorization URL the manager asked to open, if any.
    pub fn opened_url(&self) -> Option<String> {
        self.opened_url.lock().clone()
    }
}

#[async_trait]
impl BrowserSession for StaticBrowser {
    async fn authorize(
        &self,
        auth_url: &str,
        _redirect_uri: &str,
    ) -> Result<BrowserOutcome, SessionError> {
        *self.opened_url.lock() = Some(auth_url.to_string());
        Ok(self.outcome.clone())
    }
}
