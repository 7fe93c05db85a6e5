//! Core session types.
//!
//! Defines the data model shared by the manager, the HTTP backend, and the
//! credential store: the [`Session`] token record, the opaque [`User`]
//! profile, and the observable [`SessionState`].

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One authenticated login: the access/refresh token pair plus expiry
/// metadata.
///
/// `expires_at` is the authoritative expiry as absolute epoch seconds;
/// `expires_in` is the informational seconds-from-issuance window. A session
/// is never mutated in place — each refresh produces a new record that
/// supersedes the old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Bearer credential for backend calls.
    pub access_token: String,

    /// Credential used to mint a new session.
    /// Absent when the provider hand-off did not include one; refresh is then
    /// impossible and reported as a missing-credential error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type, conventionally `"bearer"`.
    pub token_type: String,

    /// Seconds-from-issuance validity window (informational).
    pub expires_in: i64,

    /// Absolute epoch seconds when `access_token` becomes invalid
    /// (authoritative).
    pub expires_at: i64,
}

impl Session {
    /// Build a session from exchange or hand-off fields.
    ///
    /// When the provider omitted `expires_at`, it is derived from the wall
    /// clock as `now + expires_in` so the stored value is always an absolute
    /// expiry, never a relative offset.
    #[must_use]
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        token_type: String,
        expires_in: i64,
        expires_at: Option<i64>,
    ) -> Self {
        let expires_at = expires_at.unwrap_or_else(|| Utc::now().timestamp() + expires_in);
        Self { access_token, refresh_token, token_type, expires_in, expires_at }
    }

    /// Check if the access token is expired or will expire within the given
    /// threshold.
    ///
    /// A threshold of zero answers "is it expired right now": valid means
    /// `expires_at` is strictly greater than the current time.
    #[must_use]
    pub fn is_expired(&self, threshold_seconds: i64) -> bool {
        Utc::now().timestamp() + threshold_seconds >= self.expires_at
    }

    /// Seconds until the access token expires. Negative once expired.
    #[must_use]
    pub fn seconds_until_expiry(&self) -> i64 {
        self.expires_at - Utc::now().timestamp()
    }
}

/// Opaque profile record returned by the backend alongside a session.
///
/// The manager treats this as a pass-through value: display fields beyond
/// `id`/`email` survive persistence via the flattened `extra` map without the
/// session core knowing their names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable backend identifier.
    pub id: String,

    /// Primary e-mail, when the provider exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Remaining profile fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A freshly obtained `{session, user}` pair.
#[derive(Debug, Clone)]
pub struct SessionBundle {
    /// The new session record.
    pub session: Session,
    /// The profile resolved alongside it.
    pub user: User,
}

/// Authorization URL issued by the backend for the browser hand-off.
#[derive(Debug, Clone)]
pub struct AuthorizationUrl {
    /// The URL to open in the external browser.
    pub url: String,
    /// Provider hint (e.g. `"google"`), when the backend reports one.
    pub provider: Option<String>,
}

/// Observable lifecycle state of a [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No credentials; the initial and terminal state.
    SignedOut,
    /// A browser authorization flow is in progress.
    SigningIn,
    /// A session is current and a refresh is scheduled.
    SignedIn,
    /// A refresh exchange is in flight.
    Refreshing,
}

#[cfg(test)]
mod tests {
    //! Unit tests for session types.
    use super::*;

    #[test]
    fn test_session_derives_absolute_expiry() {
        let before = Utc::now().timestamp();
        let session = Session::new("at".to_string(), None, "bearer".to_string(), 3600, None);
        let after = Utc::now().timestamp();

        assert!(session.expires_at >= before + 3600);
        assert!(session.expires_at <= after + 3600);
    }

    #[test]
    fn test_explicit_expires_at_is_authoritative() {
        let session =
            Session::new("at".to_string(), None, "bearer".to_string(), 3600, Some(1_234_567));
        assert_eq!(session.expires_at, 1_234_567);
    }

    #[test]
    fn test_expiry_threshold() {
        let session = Session::new(
            "at".to_string(),
            Some("rt".to_string()),
            "bearer".to_string(),
            3600,
            None,
        );

        assert!(!session.is_expired(300));
        assert!(session.is_expired(7200));
    }

    #[test]
    fn test_seconds_until_expiry() {
        let session = Session::new("at".to_string(), None, "bearer".to_string(), 3600, None);
        let secs = session.seconds_until_expiry();
        assert!(secs > 3590 && secs <= 3600);
    }

    #[test]
    fn test_session_serde_roundtrip() {
        let session = Session::new(
            "at".to_string(),
            Some("rt".to_string()),
            "bearer".to_string(),
            3600,
            Some(42),
        );

        let json = serde_json::to_string(&session).expect("serialize");
        let parsed: Session = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(parsed.access_token, "at");
        assert_eq!(parsed.refresh_token, Some("rt".to_string()));
        assert_eq!(parsed.expires_at, 42);
    }

    #[test]
    fn test_user_preserves_unknown_fields() {
        let json = r#"{"id":"u1","email":"a@b.c","display_name":"Ada","avatar_url":"x"}"#;
        let user: User = serde_json::from_str(json).expect("deserialize");

        assert_eq!(user.id, "u1");
        assert_eq!(user.email, Some("a@b.c".to_string()));
        assert_eq!(user.extra.get("display_name").and_then(|v| v.as_str()), Some("Ada"));

        let back = serde_json::to_string(&user).expect("serialize");
        assert!(back.contains("avatar_url"));
    }
}
