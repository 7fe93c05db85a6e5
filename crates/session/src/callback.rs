//! Redirect callback parsing.
//!
//! The external authorization flow terminates with a redirect to the app
//! scheme (e.g. `caeli://auth/callback`). Two callback shapes are valid:
//!
//! 1. **Fragment/implicit** — the URL fragment carries `access_token` and
//!    optionally `refresh_token`, `expires_in`, `expires_at`, `token_type`.
//! 2. **Code** — the URL query carries an opaque `code` exchanged server-side
//!    for tokens.
//!
//! A callback with neither is malformed; the provider's `error` /
//! `error_description` query parameters become the reported message when
//! present.

use url::Url;

use crate::error::SessionError;
use crate::types::Session;

/// Tokens handed over directly in the callback URL fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentTokens {
    /// Bearer credential from the fragment.
    pub access_token: String,
    /// Refresh credential, when the provider included one.
    pub refresh_token: Option<String>,
    /// Validity window in seconds, when present.
    pub expires_in: Option<i64>,
    /// Absolute epoch-seconds expiry, when present.
    pub expires_at: Option<i64>,
    /// Token type, when present.
    pub token_type: Option<String>,
}

impl FragmentTokens {
    /// Normalize the fragment hand-off into a [`Session`].
    ///
    /// Missing fields take the documented defaults: `expires_in` falls back
    /// to `default_expires_in`, `token_type` to `"bearer"`, and a missing
    /// `expires_at` is derived as an absolute epoch expiry from the current
    /// time plus `expires_in`.
    #[must_use]
    pub fn into_session(self, default_expires_in: i64) -> Session {
        let expires_in = self.expires_in.unwrap_or(default_expires_in);
        Session::new(
            self.access_token,
            self.refresh_token,
            self.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_in,
            self.expires_at,
        )
    }
}

/// The two valid callback shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Fragment/implicit form: tokens arrived directly in the URL.
    Tokens(FragmentTokens),
    /// Code form: an authorization code to exchange with the backend.
    Code(String),
}

/// Parse a terminal redirect URL into one of the two valid callback shapes.
///
/// Fragment tokens win over a query `code` when both are somehow present;
/// each path is exclusive — a code callback never goes through fragment
/// token parsing and vice versa.
///
/// # Errors
/// Returns [`SessionError::CallbackMalformed`] when the URL has neither an
/// `access_token` fragment parameter nor a `code` query parameter, carrying
/// the provider's `error_description`/`error` when available.
pub fn parse_callback_url(raw: &str) -> Result<CallbackOutcome, SessionError> {
    let url = Url::parse(raw)
        .map_err(|e| SessionError::CallbackMalformed(format!("invalid callback URL: {e}")))?;

    if let Some(tokens) = parse_fragment_tokens(&url) {
        return Ok(CallbackOutcome::Tokens(tokens));
    }

    if let Some(code) = query_param(&url, "code") {
        if !code.is_empty() {
            return Ok(CallbackOutcome::Code(code));
        }
    }

    Err(SessionError::CallbackMalformed(callback_error_message(&url)))
}

/// Extract fragment tokens, treating the fragment as a query string.
/// Returns `None` unless `access_token` is present and non-empty.
fn parse_fragment_tokens(url: &Url) -> Option<FragmentTokens> {
    let fragment = url.fragment()?;

    let mut access_token = None;
    let mut refresh_token = None;
    let mut expires_in = None;
    let mut expires_at = None;
    let mut token_type = None;

    for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "access_token" => access_token = Some(value.into_owned()),
            "refresh_token" => refresh_token = Some(value.into_owned()),
            "expires_in" => expires_in = value.parse().ok(),
            "expires_at" => expires_at = value.parse().ok(),
            "token_type" => token_type = Some(value.into_owned()),
            _ => {}
        }
    }

    let access_token = access_token.filter(|t| !t.is_empty())?;
    Some(FragmentTokens { access_token, refresh_token, expires_in, expires_at, token_type })
}

/// Best message for a callback that carried neither tokens nor a code.
fn callback_error_message(url: &Url) -> String {
    if let Some(description) = query_param(url, "error_description") {
        return description;
    }
    if let Some(error) = query_param(url, "error") {
        return error;
    }
    "no code or tokens received".to_string()
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
}
