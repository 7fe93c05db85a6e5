//! Integration tests for the session lifecycle manager.
//!
//! Exercises the full manager against in-memory doubles: sign-in through
//! both callback shapes, refresh scheduling and failure convergence,
//! sign-out idempotence, and startup rehydration.

use std::sync::Arc;
use std::time::Duration;

use caeli_session::testing::{
    sample_bundle, sample_user, MemoryCredentialStore, MockAuthBackend, StaticBrowser,
};
use caeli_session::{
    refresh_delay, BrowserOutcome, SessionConfig, SessionError, SessionManager, SessionState,
};
use chrono::Utc;

type TestManager = SessionManager<MockAuthBackend, MemoryCredentialStore, StaticBrowser>;

struct Harness {
    manager: TestManager,
    backend: Arc<MockAuthBackend>,
    store: Arc<MemoryCredentialStore>,
}

fn harness_with_browser(browser: StaticBrowser) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let config = SessionConfig::new("https://api.caeli.test", "caeli://auth/callback");
    let manager =
        SessionManager::new(config, MockAuthBackend::new(), MemoryCredentialStore::new(), browser);
    let backend = manager.backend();
    let store = manager.store();
    Harness { manager, backend, store }
}

fn harness(callback_url: &str) -> Harness {
    harness_with_browser(StaticBrowser::with_callback(callback_url))
}

/// Let spawned timer tasks make progress on the paused current-thread
/// runtime.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Sign-in: dual callback shapes
// ============================================================================

/// A fragment callback yields a session directly and resolves the user via
/// session lookup; the code-exchange endpoint is never contacted.
#[tokio::test(start_paused = true)]
async fn fragment_callback_signs_in_without_code_exchange() {
    let h = harness("caeli://auth/callback#access_token=AT1&refresh_token=RT1&expires_in=3600");

    let bundle = h.manager.sign_in().await.expect("sign-in should succeed");

    assert_eq!(bundle.session.access_token, "AT1");
    assert_eq!(bundle.session.refresh_token, Some("RT1".to_string()));
    assert_eq!(bundle.session.expires_in, 3600);
    assert_eq!(bundle.session.token_type, "bearer");

    assert_eq!(h.backend.exchange_calls(), 0);
    assert_eq!(h.backend.fetch_session_calls(), 1);
    assert_eq!(h.manager.state().await, SessionState::SignedIn);
    assert!(h.manager.is_authenticated().await);
    assert!(h.manager.has_pending_refresh());
}

/// Fragment hand-offs without expiry metadata take the documented defaults
/// and land as an absolute epoch expiry.
#[tokio::test(start_paused = true)]
async fn fragment_callback_defaults_expiry() {
    let h = harness("caeli://auth/callback#access_token=AT1");
    let before = Utc::now().timestamp();

    let bundle = h.manager.sign_in().await.expect("sign-in should succeed");

    assert_eq!(bundle.session.refresh_token, None);
    assert_eq!(bundle.session.expires_in, 3600);
    assert!(bundle.session.expires_at >= before + 3600);
}

/// A code callback triggers exactly one exchange and no fragment parsing.
#[tokio::test(start_paused = true)]
async fn code_callback_exchanges_exactly_once() {
    let h = harness("caeli://auth/callback?code=XYZ");
    h.backend.set_exchange_response(sample_bundle("exchanged-token", 3600));

    let bundle = h.manager.sign_in().await.expect("sign-in should succeed");

    assert_eq!(bundle.session.access_token, "exchanged-token");
    assert_eq!(h.backend.exchange_calls(), 1);
    assert_eq!(h.backend.last_code(), Some("XYZ".to_string()));
    // The user comes from the exchange response, not a separate lookup
    assert_eq!(h.backend.fetch_session_calls(), 0);
    assert!(h.store.session_snapshot().is_some());
}

/// A callback with neither tokens nor a code fails with the provider's
/// error description and leaves the manager signed out.
#[tokio::test(start_paused = true)]
async fn malformed_callback_reports_provider_message() {
    let h = harness("caeli://auth/callback?error=access_denied&error_description=User%20cancelled");

    let err = h.manager.sign_in().await.expect_err("sign-in should fail");

    match err {
        SessionError::CallbackMalformed(message) => assert_eq!(message, "User cancelled"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.manager.state().await, SessionState::SignedOut);
    assert!(!h.manager.is_authenticated().await);
    assert!(!h.manager.has_pending_refresh());
    assert!(h.store.is_empty());
}

/// User dismissal of the browser flow is an authorization failure, not a
/// panic or a hang.
#[tokio::test(start_paused = true)]
async fn cancelled_browser_flow_is_denied() {
    let h = harness_with_browser(StaticBrowser::with_outcome(BrowserOutcome::Cancelled));

    let err = h.manager.sign_in().await.expect_err("sign-in should fail");

    assert!(matches!(err, SessionError::AuthorizationDenied(_)));
    assert_eq!(h.manager.state().await, SessionState::SignedOut);
}

// ============================================================================
// Refresh scheduling
// ============================================================================

/// Threshold math: expiry in 1000s with a 300s threshold schedules at 700s;
/// expiry inside the threshold schedules immediately.
#[test]
fn refresh_delay_math() {
    let now = Utc::now().timestamp();
    assert_eq!(refresh_delay(now + 1000, now, 300), Duration::from_millis(700_000));
    assert_eq!(refresh_delay(now + 100, now, 300), Duration::ZERO);
}

/// At most one timer is pending through sign-in and repeated refreshes:
/// advancing time far past every scheduled deadline fires exactly the
/// refreshes the single live timer accounts for.
#[tokio::test(start_paused = true)]
async fn scheduling_supersedes_prior_timer() {
    let h = harness("caeli://auth/callback#access_token=AT1&refresh_token=RT1&expires_in=3600");
    h.backend.set_refresh_response(sample_bundle("refreshed-1", 3600));

    h.manager.sign_in().await.expect("sign-in should succeed");
    assert!(h.manager.has_pending_refresh());

    // Two explicit refreshes, each of which reschedules
    h.manager.refresh_session().await.expect("first refresh");
    h.manager.refresh_session().await.expect("second refresh");
    assert_eq!(h.backend.refresh_calls(), 2);
    assert!(h.manager.has_pending_refresh());

    // Only the latest timer is live: one tick of the schedule fires exactly
    // one more refresh, which then re-arms itself
    h.backend.set_refresh_response(sample_bundle("refreshed-2", 7200));
    // Let the latest timer arm its sleep before the clock jumps.
    settle().await;
    tokio::time::advance(Duration::from_secs(3600)).await;
    settle().await;

    assert_eq!(h.backend.refresh_calls(), 3);
    assert!(h.manager.has_pending_refresh());
}

/// The timer fires the silent refresh on its own once the threshold is
/// reached.
#[tokio::test(start_paused = true)]
async fn timer_fires_silent_refresh() {
    let h = harness("caeli://auth/callback#access_token=AT1&refresh_token=RT1&expires_in=1000");
    h.backend.set_refresh_response(sample_bundle("refreshed", 3600));

    h.manager.sign_in().await.expect("sign-in should succeed");
    assert_eq!(h.backend.refresh_calls(), 0);

    // Let the spawned timer arm its sleep before the clock jumps.
    settle().await;

    // 1000s expiry - 300s threshold: fires at 700s
    tokio::time::advance(Duration::from_secs(699)).await;
    settle().await;
    assert_eq!(h.backend.refresh_calls(), 0);

    tokio::time::advance(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(h.backend.refresh_calls(), 1);

    let session = h.store.session_snapshot().expect("session persisted");
    assert_eq!(session.access_token, "refreshed");
}

/// A failed refresh purges every persisted credential and converges to
/// signed-out; repeating the call stays there.
#[tokio::test(start_paused = true)]
async fn refresh_failure_purges_state() {
    let h = harness("caeli://auth/callback#access_token=AT1&refresh_token=RT1&expires_in=3600");
    h.manager.sign_in().await.expect("sign-in should succeed");

    h.backend.fail_refresh("invalid_grant");

    let err = h.manager.refresh_session().await.expect_err("refresh should fail");
    assert!(matches!(err, SessionError::ExchangeFailed(_)));

    assert!(h.store.is_empty());
    assert!(!h.manager.is_authenticated().await);
    assert!(!h.manager.has_pending_refresh());
    assert_eq!(h.manager.state().await, SessionState::SignedOut);

    // Idempotent convergence: the second attempt finds no refresh token
    let err = h.manager.refresh_session().await.expect_err("still signed out");
    assert!(matches!(err, SessionError::NoCredential(_)));
    assert!(h.store.is_empty());
}

/// Refreshing with nothing stored reports the missing credential without
/// contacting the backend.
#[tokio::test(start_paused = true)]
async fn refresh_without_token_is_reported() {
    let h = harness("caeli://auth/callback?code=unused");

    let err = h.manager.refresh_session().await.expect_err("no token stored");

    assert!(matches!(err, SessionError::NoCredential("refresh token")));
    assert_eq!(h.backend.refresh_calls(), 0);
}

// ============================================================================
// Sign-out
// ============================================================================

/// Signing out when already signed out succeeds and leaves the store empty.
#[tokio::test(start_paused = true)]
async fn sign_out_is_idempotent() {
    let h = harness("caeli://auth/callback?code=unused");

    h.manager.sign_out().await.expect("sign-out should succeed");
    h.manager.sign_out().await.expect("repeat sign-out should succeed");

    assert!(h.store.is_empty());
    // No token stored, so the remote endpoint was never contacted
    assert_eq!(h.backend.sign_out_calls(), 0);
}

/// A failing remote sign-out still purges local state and settles the call.
#[tokio::test(start_paused = true)]
async fn sign_out_survives_remote_failure() {
    let h = harness("caeli://auth/callback#access_token=AT1&refresh_token=RT1&expires_in=3600");
    h.manager.sign_in().await.expect("sign-in should succeed");

    h.backend.fail_sign_out(true);
    h.manager.sign_out().await.expect("local outcome is unaffected");

    assert_eq!(h.backend.sign_out_calls(), 1);
    assert!(h.store.is_empty());
    assert!(!h.manager.has_pending_refresh());
    assert!(!h.manager.is_authenticated().await);
}

/// Sign-out cancels the pending silent refresh: advancing past the old
/// deadline fires nothing.
#[tokio::test(start_paused = true)]
async fn sign_out_cancels_pending_timer() {
    let h = harness("caeli://auth/callback#access_token=AT1&refresh_token=RT1&expires_in=1000");
    h.manager.sign_in().await.expect("sign-in should succeed");
    assert!(h.manager.has_pending_refresh());

    h.manager.sign_out().await.expect("sign-out should succeed");
    assert!(!h.manager.has_pending_refresh());

    tokio::time::advance(Duration::from_secs(7200)).await;
    settle().await;
    assert_eq!(h.backend.refresh_calls(), 0);
}

// ============================================================================
// Initialization / rehydration
// ============================================================================

/// A persisted unexpired session resumes the schedule without any network
/// traffic.
#[tokio::test(start_paused = true)]
async fn initialize_resumes_valid_session() {
    let h = harness("caeli://auth/callback?code=unused");
    h.store.seed(&sample_bundle("persisted", 3600));

    h.manager.initialize().await;
    settle().await;

    assert_eq!(h.manager.state().await, SessionState::SignedIn);
    assert!(h.manager.has_pending_refresh());
    assert_eq!(h.backend.refresh_calls(), 0);
    assert_eq!(h.backend.fetch_session_calls(), 0);
}

/// A persisted expired session triggers exactly one immediate refresh.
#[tokio::test(start_paused = true)]
async fn initialize_refreshes_expired_session() {
    let h = harness("caeli://auth/callback?code=unused");
    let mut bundle = sample_bundle("stale", 3600);
    bundle.session.expires_at = Utc::now().timestamp() - 10;
    h.store.seed(&bundle);
    h.backend.set_refresh_response(sample_bundle("revived", 3600));

    h.manager.initialize().await;

    assert_eq!(h.backend.refresh_calls(), 1);
    assert_eq!(h.manager.state().await, SessionState::SignedIn);
    assert!(h.manager.is_authenticated().await);
}

/// Startup with nothing persisted stays signed out and schedules nothing.
#[tokio::test(start_paused = true)]
async fn initialize_with_empty_store() {
    let h = harness("caeli://auth/callback?code=unused");

    h.manager.initialize().await;

    assert_eq!(h.manager.state().await, SessionState::SignedOut);
    assert!(!h.manager.has_pending_refresh());
}

/// A failed startup refresh is swallowed: the process comes up signed out
/// with the stale credentials purged.
#[tokio::test(start_paused = true)]
async fn initialize_swallows_refresh_failure() {
    let h = harness("caeli://auth/callback?code=unused");
    let mut bundle = sample_bundle("stale", 3600);
    bundle.session.expires_at = Utc::now().timestamp() - 10;
    h.store.seed(&bundle);
    h.backend.fail_refresh("invalid_grant");

    h.manager.initialize().await;

    assert_eq!(h.manager.state().await, SessionState::SignedOut);
    assert!(h.store.is_empty());
}

// ============================================================================
// Queries and teardown
// ============================================================================

/// `is_authenticated` is a pure expiry check against the store.
#[tokio::test(start_paused = true)]
async fn is_authenticated_checks_expiry_locally() {
    let h = harness("caeli://auth/callback?code=unused");
    assert!(!h.manager.is_authenticated().await);

    let mut bundle = sample_bundle("expired", 3600);
    bundle.session.expires_at = Utc::now().timestamp() - 1;
    h.store.seed(&bundle);
    assert!(!h.manager.is_authenticated().await);

    h.store.seed(&sample_bundle("valid", 3600));
    assert!(h.manager.is_authenticated().await);
    assert_eq!(h.backend.fetch_session_calls(), 0);
}

/// `get_session` validates the persisted token remotely.
#[tokio::test(start_paused = true)]
async fn get_session_validates_remotely() {
    let h = harness("caeli://auth/callback?code=unused");
    assert!(h.manager.get_session().await.expect("empty store").is_none());

    h.store.seed(&sample_bundle("valid", 3600));
    h.backend.set_user(sample_user("user-42"));

    let bundle = h.manager.get_session().await.expect("lookup").expect("session present");
    assert_eq!(bundle.user.id, "user-42");
    assert_eq!(h.backend.fetch_session_calls(), 1);
}

/// `dispose` cancels the timer but keeps credentials for the next run.
#[tokio::test(start_paused = true)]
async fn dispose_keeps_credentials() {
    let h = harness("caeli://auth/callback#access_token=AT1&refresh_token=RT1&expires_in=3600");
    h.manager.sign_in().await.expect("sign-in should succeed");

    h.manager.dispose();

    assert!(!h.manager.has_pending_refresh());
    assert!(h.store.session_snapshot().is_some());

    tokio::time::advance(Duration::from_secs(7200)).await;
    settle().await;
    assert_eq!(h.backend.refresh_calls(), 0);
}

/// A persistence failure during sign-in surfaces as a store error instead of
/// a half-written success.
#[tokio::test(start_paused = true)]
async fn sign_in_propagates_persistence_failure() {
    let h = harness("caeli://auth/callback#access_token=AT1&refresh_token=RT1&expires_in=3600");
    h.store.set_fail_writes(true);

    let err = h.manager.sign_in().await.expect_err("persistence should fail");

    assert!(matches!(err, SessionError::Persistence(_)));
    assert_eq!(h.manager.state().await, SessionState::SignedOut);
}
