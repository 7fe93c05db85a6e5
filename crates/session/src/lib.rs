//! Authenticated-session lifecycle core for the Caeli client.
//!
//! This crate owns the full lifetime of one authenticated login: initiating
//! the browser-based OAuth flow, normalizing the redirect callback into a
//! [`Session`], persisting it, tracking expiry, and scheduling a silent
//! refresh before the access token lapses.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  SessionManager  │  Lifecycle orchestrator + refresh timer
//! └────────┬─────────┘
//!          │
//!          ├──► AuthBackend       (sign-in URL, code exchange, refresh)
//!          ├──► CredentialStore   (durable session/user persistence)
//!          └──► BrowserSession    (OS-level external authorization flow)
//! ```
//!
//! The three collaborators are capability traits; production implementations
//! ([`HttpAuthBackend`], [`KeyringCredentialStore`]) live in this crate, the
//! browser capability is supplied by the embedding application.
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use caeli_session::{
//!     HttpAuthBackend, KeyringCredentialStore, SessionConfig, SessionManager,
//! };
//! # use caeli_session::{BrowserOutcome, BrowserSession, SessionError};
//! # struct AppBrowser;
//! # #[async_trait::async_trait]
//! # impl BrowserSession for AppBrowser {
//! #     async fn authorize(&self, _: &str, _: &str) -> Result<BrowserOutcome, SessionError> {
//! #         unimplemented!()
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::new("https://api.caeli.app", "caeli://auth/callback");
//!     let backend = HttpAuthBackend::new(&config);
//!     let store = KeyringCredentialStore::new("Caeli", "main");
//!     let manager = SessionManager::new(config, backend, store, AppBrowser);
//!
//!     // Rehydrate persisted credentials and resume the refresh schedule.
//!     manager.initialize().await;
//!
//!     if !manager.is_authenticated().await {
//!         let bundle = manager.sign_in().await?;
//!         println!("signed in as {}", bundle.user.id);
//!     }
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod backend;
pub mod callback;
pub mod config;
pub mod error;
pub mod manager;
pub mod store;
pub mod traits;
pub mod types;

// Testing utilities
// ---------------------------------------------------------------
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use backend::{BackendRoutes, HttpAuthBackend};
pub use callback::{parse_callback_url, CallbackOutcome, FragmentTokens};
pub use config::SessionConfig;
pub use error::SessionError;
pub use manager::{refresh_delay, SessionManager};
pub use store::KeyringCredentialStore;
pub use traits::{AuthBackend, BrowserOutcome, BrowserSession, CredentialStore};
pub use types::{AuthorizationUrl, Session, SessionBundle, SessionState, User};
