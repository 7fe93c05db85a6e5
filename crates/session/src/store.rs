//! Platform-keychain implementation of the [`CredentialStore`] capability.
//!
//! Stores the session and user records as JSON under per-account keys in the
//! OS keychain (macOS Keychain, Windows Credential Manager, Linux Secret
//! Service). Keyring calls are blocking, so every operation runs on the
//! blocking thread pool.

use async_trait::async_trait;
use keyring::Entry;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::traits::CredentialStore;
use crate::types::{Session, User};

const SESSION_PREFIX: &str = "session.";
const USER_PREFIX: &str = "user.";

/// Production [`CredentialStore`] over the platform keychain.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service_name: String,
    account: String,
}

impl KeyringCredentialStore {
    /// Create a store scoped to a keychain service and account.
    ///
    /// # Arguments
    /// * `service_name` - Keychain service identifier (e.g. `"Caeli"`)
    /// * `account` - Account name the keys are scoped under (e.g. `"main"`)
    #[must_use]
    pub fn new(service_name: impl Into<String>, account: impl Into<String>) -> Self {
        Self { service_name: service_name.into(), account: account.into() }
    }

    fn entry(&self, prefix: &str) -> Result<Entry, SessionError> {
        let key = format!("{prefix}{}", self.account);
        Entry::new(&self.service_name, &key).map_err(|e| {
            SessionError::Persistence(format!("failed to open keychain entry {key}: {e}"))
        })
    }

    fn set_record(&self, prefix: &str, value: &str) -> Result<(), SessionError> {
        debug!(service = %self.service_name, prefix, "storing credential record");
        self.entry(prefix)?.set_password(value).map_err(|e| {
            SessionError::Persistence(format!("failed to store {prefix} record: {e}"))
        })
    }

    /// Read a record; a missing entry is `None`, not an error.
    fn get_record(&self, prefix: &str) -> Result<Option<String>, SessionError> {
        match self.entry(prefix)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SessionError::Persistence(format!(
                "failed to read {prefix} record: {e}"
            ))),
        }
    }

    /// Delete a record, tolerating its absence.
    fn delete_record(&self, prefix: &str) -> Result<(), SessionError> {
        match self.entry(prefix)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(SessionError::Persistence(format!(
                "failed to delete {prefix} record: {e}"
            ))),
        }
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, SessionError>
    where
        T: Send + 'static,
        F: FnOnce(KeyringCredentialStore) -> Result<T, SessionError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(store))
            .await
            .map_err(|e| SessionError::Persistence(format!("keychain task failed: {e}")))?
    }
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn save_session(&self, session: &Session) -> Result<(), SessionError> {
        let json = serde_json::to_string(session)
            .map_err(|e| SessionError::Persistence(format!("failed to encode session: {e}")))?;
        self.run_blocking(move |store| store.set_record(SESSION_PREFIX, &json)).await
    }

    async fn session(&self) -> Result<Option<Session>, SessionError> {
        let raw = self.run_blocking(|store| store.get_record(SESSION_PREFIX)).await?;
        let Some(raw) = raw else { return Ok(None) };

        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                // Structurally invalid record: destroy it rather than wedge
                // every later operation on the same parse failure.
                warn!(error = %e, "persisted session is invalid, discarding");
                self.run_blocking(|store| store.delete_record(SESSION_PREFIX)).await?;
                Ok(None)
            }
        }
    }

    async fn save_user(&self, user: &User) -> Result<(), SessionError> {
        let json = serde_json::to_string(user)
            .map_err(|e| SessionError::Persistence(format!("failed to encode user: {e}")))?;
        self.run_blocking(move |store| store.set_record(USER_PREFIX, &json)).await
    }

    async fn user(&self) -> Result<Option<User>, SessionError> {
        let raw = self.run_blocking(|store| store.get_record(USER_PREFIX)).await?;
        let Some(raw) = raw else { return Ok(None) };

        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!(error = %e, "persisted user is invalid, discarding");
                self.run_blocking(|store| store.delete_record(USER_PREFIX)).await?;
                Ok(None)
            }
        }
    }

    async fn clear_auth(&self) -> Result<(), SessionError> {
        debug!(service = %self.service_name, account = %self.account, "clearing auth records");
        self.run_blocking(|store| {
            store.delete_record(SESSION_PREFIX)?;
            store.delete_record(USER_PREFIX)?;
            Ok(())
        })
        .await
    }
}
