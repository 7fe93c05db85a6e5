//! Session lifecycle manager.
//!
//! Owns the authenticated session's lifetime: the browser sign-in flow,
//! callback normalization, persistence, and the self-scheduling silent
//! refresh. At most one refresh timer exists per manager; scheduling always
//! cancels the previous one, and refresh attempts are serialized so a
//! timer-fired and a user-triggered refresh cannot interleave.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::callback::{parse_callback_url, CallbackOutcome};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::traits::{AuthBackend, BrowserOutcome, BrowserSession, CredentialStore};
use crate::types::{Session, SessionBundle, SessionState, User};

/// Delay before the refresh timer fires.
///
/// `max(expires_at - now - threshold, 0)` seconds: a session already inside
/// the threshold refreshes on the next scheduler tick instead of being
/// treated as an error.
#[must_use]
pub fn refresh_delay(expires_at: i64, now: i64, threshold_seconds: i64) -> Duration {
    let seconds = expires_at - now - threshold_seconds;
    if seconds <= 0 {
        Duration::ZERO
    } else {
        Duration::from_secs(seconds.unsigned_abs())
    }
}

/// Scheduled future refresh. At most one live instance per manager;
/// cancelled and replaced, never stacked.
struct RefreshTimer {
    id: u64,
    handle: JoinHandle<()>,
}

impl RefreshTimer {
    fn cancel(self) {
        self.handle.abort();
    }
}

/// Lifecycle manager for one authenticated principal.
///
/// Cheap to clone; all clones share the same state, timer slot, and
/// collaborators. Construct once at application start and call
/// [`initialize`](Self::initialize) before first use; call
/// [`dispose`](Self::dispose) on shutdown.
pub struct SessionManager<B, S, W> {
    backend: Arc<B>,
    store: Arc<S>,
    browser: Arc<W>,
    config: SessionConfig,
    state: Arc<RwLock<SessionState>>,
    timer: Arc<Mutex<Option<RefreshTimer>>>,
    timer_seq: Arc<AtomicU64>,
    refresh_lock: Arc<tokio::sync::Mutex<()>>,
}

impl<B, S, W> Clone for SessionManager<B, S, W> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            store: Arc::clone(&self.store),
            browser: Arc::clone(&self.browser),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            timer: Arc::clone(&self.timer),
            timer_seq: Arc::clone(&self.timer_seq),
            refresh_lock: Arc::clone(&self.refresh_lock),
        }
    }
}

impl<B, S, W> SessionManager<B, S, W>
where
    B: AuthBackend + 'static,
    S: CredentialStore + 'static,
    W: BrowserSession + 'static,
{
    /// Create a manager from its three collaborators.
    #[must_use]
    pub fn new(config: SessionConfig, backend: B, store: S, browser: W) -> Self {
        Self {
            backend: Arc::new(backend),
            store: Arc::new(store),
            browser: Arc::new(browser),
            config,
            state: Arc::new(RwLock::new(SessionState::SignedOut)),
            timer: Arc::new(Mutex::new(None)),
            timer_seq: Arc::new(AtomicU64::new(0)),
            refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Rehydrate persisted credentials on process start.
    ///
    /// A still-valid session resumes the refresh schedule at the correct
    /// offset; an expired one triggers an immediate refresh. Never errors the
    /// caller out of startup — failures are logged and leave the manager
    /// signed out.
    pub async fn initialize(&self) {
        match self.store.session().await {
            Ok(Some(session)) => {
                if session.is_expired(0) {
                    debug!("persisted session already expired, refreshing");
                    if let Err(e) = self.refresh_session().await {
                        warn!("startup refresh failed: {e}");
                    }
                } else {
                    info!("resuming persisted session");
                    self.set_state(SessionState::SignedIn).await;
                    self.schedule_refresh(&session);
                }
            }
            Ok(None) => {
                debug!("no persisted session found");
            }
            Err(e) => {
                warn!("failed to load persisted session: {e}");
            }
        }
    }

    /// Run the browser sign-in flow to completion.
    ///
    /// Requests an authorization URL, opens the external flow, normalizes
    /// whichever callback shape comes back, persists the result, and
    /// schedules the silent refresh.
    ///
    /// # Errors
    /// Returns a typed error for every failure mode — backend refusal,
    /// cancellation, malformed callback, rejected exchange, or persistence
    /// failure. The manager is signed out afterwards in all of them.
    pub async fn sign_in(&self) -> Result<SessionBundle, SessionError> {
        self.set_state(SessionState::SigningIn).await;

        match self.run_sign_in().await {
            Ok(bundle) => {
                self.set_state(SessionState::SignedIn).await;
                info!(user = %bundle.user.id, "sign-in completed");
                Ok(bundle)
            }
            Err(e) => {
                self.set_state(SessionState::SignedOut).await;
                Err(e)
            }
        }
    }

    async fn run_sign_in(&self) -> Result<SessionBundle, SessionError> {
        let authorization = self.backend.authorization_url(&self.config.redirect_uri).await?;
        debug!(provider = ?authorization.provider, "opening authorization flow");

        let callback_url = match self
            .browser
            .authorize(&authorization.url, &self.config.redirect_uri)
            .await?
        {
            BrowserOutcome::Success { callback_url } => callback_url,
            BrowserOutcome::Cancelled => {
                return Err(SessionError::AuthorizationDenied(
                    "authorization cancelled".to_string(),
                ));
            }
            BrowserOutcome::Failed(message) => {
                return Err(SessionError::AuthorizationDenied(message));
            }
        };

        let bundle = match parse_callback_url(&callback_url)? {
            CallbackOutcome::Tokens(tokens) => {
                let session = tokens.into_session(self.config.default_expires_in);
                let user = self.backend.fetch_session(&session.access_token).await?;
                SessionBundle { session, user }
            }
            CallbackOutcome::Code(code) => self.backend.exchange_code(&code).await?,
        };

        self.persist(&bundle).await?;
        self.schedule_refresh(&bundle.session);
        Ok(bundle)
    }

    /// Mint a new session from the stored refresh token.
    ///
    /// Attempts are serialized: a timer-fired refresh and a user-triggered
    /// one cannot interleave; the later caller waits, then operates on
    /// whatever state the first one left behind.
    ///
    /// # Errors
    /// Returns [`SessionError::NoCredential`] when no refresh token is
    /// stored, or the exchange/persistence error otherwise. Every failure
    /// purges persisted credentials and cancels the pending timer, so
    /// repeated calls with an invalid refresh token converge to signed-out.
    pub async fn refresh_session(&self) -> Result<SessionBundle, SessionError> {
        let _guard = self.refresh_lock.lock().await;

        let result = self.run_refresh().await;
        match result {
            Ok(bundle) => {
                self.set_state(SessionState::SignedIn).await;
                info!("session refreshed");
                Ok(bundle)
            }
            Err(e) => {
                self.cancel_timer();
                if let Err(purge_error) = self.store.clear_auth().await {
                    warn!("failed to purge credentials after refresh failure: {purge_error}");
                }
                self.set_state(SessionState::SignedOut).await;
                warn!("refresh failed, credentials purged: {e}");
                Err(e)
            }
        }
    }

    async fn run_refresh(&self) -> Result<SessionBundle, SessionError> {
        let refresh_token = self
            .store
            .refresh_token()
            .await?
            .ok_or(SessionError::NoCredential("refresh token"))?;

        self.set_state(SessionState::Refreshing).await;

        let bundle = self.backend.refresh(&refresh_token).await?;
        self.persist(&bundle).await?;
        self.schedule_refresh(&bundle.session);
        Ok(bundle)
    }

    /// Sign out: cancel the timer, best-effort remote invalidation, local
    /// purge.
    ///
    /// The remote call's failure is swallowed — the local outcome is the
    /// same whether the backend acknowledged, rejected, or was unreachable.
    /// Signing out while already signed out succeeds.
    ///
    /// # Errors
    /// Returns [`SessionError::Persistence`] only when the local purge
    /// itself fails.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        self.cancel_timer();

        let access_token = self.store.access_token().await.unwrap_or_default();
        if let Some(token) = access_token {
            if let Err(e) = self.backend.sign_out(&token).await {
                debug!("remote sign-out failed, clearing local state anyway: {e}");
            }
        }

        let purge = self.store.clear_auth().await;
        self.set_state(SessionState::SignedOut).await;
        info!("signed out");
        purge
    }

    /// Load the persisted session and validate it remotely.
    ///
    /// Returns `None` when nothing is persisted.
    ///
    /// # Errors
    /// Returns the store error, or the backend's rejection of the access
    /// token.
    pub async fn get_session(&self) -> Result<Option<SessionBundle>, SessionError> {
        let Some(session) = self.store.session().await? else {
            return Ok(None);
        };
        let user = self.backend.fetch_session(&session.access_token).await?;
        Ok(Some(SessionBundle { session, user }))
    }

    /// Purely local authentication check: an access token is stored and the
    /// persisted expiry is strictly in the future. Never contacts the
    /// network; store errors read as not authenticated.
    pub async fn is_authenticated(&self) -> bool {
        match self.store.session().await {
            Ok(Some(session)) => {
                !session.access_token.is_empty() && session.expires_at > Utc::now().timestamp()
            }
            _ => false,
        }
    }

    /// The persisted user record, if any.
    ///
    /// # Errors
    /// Returns the store error when the read fails.
    pub async fn current_user(&self) -> Result<Option<User>, SessionError> {
        self.store.user().await
    }

    /// Current observable lifecycle state.
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Whether a refresh timer is currently scheduled.
    #[must_use]
    pub fn has_pending_refresh(&self) -> bool {
        self.timer.lock().is_some()
    }

    /// Tear down without touching persisted credentials: cancels the pending
    /// timer so the process can exit cleanly. The session resumes on the
    /// next [`initialize`](Self::initialize).
    pub fn dispose(&self) {
        self.cancel_timer();
    }

    /// Get the auth backend for advanced operations.
    #[must_use]
    pub fn backend(&self) -> Arc<B> {
        Arc::clone(&self.backend)
    }

    /// Get the credential store for advanced operations.
    #[must_use]
    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    async fn persist(&self, bundle: &SessionBundle) -> Result<(), SessionError> {
        self.store.save_session(&bundle.session).await?;
        self.store.save_user(&bundle.user).await?;
        Ok(())
    }

    async fn set_state(&self, next: SessionState) {
        *self.state.write().await = next;
    }

    /// Schedule the silent refresh for a session, superseding any pending
    /// timer.
    fn schedule_refresh(&self, session: &Session) {
        let delay = refresh_delay(
            session.expires_at,
            Utc::now().timestamp(),
            self.config.refresh_threshold_seconds,
        );
        self.schedule_refresh_in(delay);
    }

    fn schedule_refresh_in(&self, delay: Duration) {
        let id = self.timer_seq.fetch_add(1, Ordering::Relaxed);
        let manager = self.clone();

        debug!(delay_secs = delay.as_secs(), "scheduling silent refresh");

        // The slot lock is held across spawn + install so the task cannot
        // observe the slot before its own handle is registered.
        let mut slot = self.timer.lock();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Retire this timer's slot entry before refreshing so the
            // reschedule inside refresh_session() never aborts the task that
            // is performing it. A newer timer in the slot stays untouched.
            {
                let mut slot = manager.timer.lock();
                let is_current = slot.as_ref().is_some_and(|current| current.id == id);
                if !is_current {
                    return;
                }
                *slot = None;
            }

            debug!("refresh timer fired");
            if let Err(e) = manager.refresh_session().await {
                warn!("scheduled refresh failed: {e}");
            }
        });

        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        *slot = Some(RefreshTimer { id, handle });
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.timer.lock().take() {
            debug!("cancelling pending refresh timer");
            timer.cancel();
        }
    }
}
