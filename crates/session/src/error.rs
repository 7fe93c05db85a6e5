//! Error types for session lifecycle operations.
//!
//! Every public `SessionManager` operation returns `Result<_, SessionError>`;
//! collaborator failures are wrapped into one of these variants rather than
//! surfacing raw transport or storage errors to callers.

use thiserror::Error;

/// Error type for all session lifecycle operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The backend refused to issue an authorization URL, or the browser
    /// capability reported cancellation/failure.
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    /// The redirect callback carried neither tokens nor an authorization code.
    /// Carries the provider's `error_description`/`error` when available.
    #[error("malformed callback: {0}")]
    CallbackMalformed(String),

    /// A code-for-session or refresh exchange returned a non-success response.
    #[error("exchange failed: {0}")]
    ExchangeFailed(String),

    /// An operation required a credential that is not stored.
    #[error("no {0} available")]
    NoCredential(&'static str),

    /// The credential store failed on read or write. Indicates an
    /// unrecoverable local-storage problem and is propagated, not swallowed.
    #[error("credential store failure: {0}")]
    Persistence(String),

    /// HTTP transport failure talking to the auth backend.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend returned a response that could not be parsed.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),
}
