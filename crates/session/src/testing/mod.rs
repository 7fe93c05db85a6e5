//! Test doubles for the session manager's capability seams.
//!
//! In-memory, deterministic implementations of [`AuthBackend`],
//! [`CredentialStore`], and [`BrowserSession`] with scripted responses and
//! call counters. Used by this crate's own test suite and available to
//! downstream crates that embed a [`SessionManager`](crate::SessionManager).
//!
//! [`AuthBackend`]: crate::AuthBackend
//! [`CredentialStore`]: crate::CredentialStore
//! [`BrowserSession`]: crate::BrowserSession

pub mod mocks;

pub use mocks::{sample_bundle, sample_user, MemoryCredentialStore, MockAuthBackend, StaticBrowser};
