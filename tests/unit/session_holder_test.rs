//! Unit tests for the SessionHolder: initial identity read, auth-change
//! tracking and release of the auth registration.

use std::sync::Arc;
use std::time::Duration;

use bookmark_sync::managers::session_holder::{SessionHolder, SessionHolderTrait};
use bookmark_sync::services::backend::Backend;
use bookmark_sync::services::memory_backend::{MemoryBackend, Operation};
use bookmark_sync::types::errors::BackendError;
use bookmark_sync::types::identity::{AuthChangeKind, AuthEvent, Identity};

async fn eventually<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn test_starts_signed_out() {
    let backend = Arc::new(MemoryBackend::new());
    let holder = SessionHolder::start(backend.clone()).await.unwrap();
    assert!(holder.current_identity().is_none());
    assert!(!holder.is_authenticated());
    assert!(holder.is_listening());
}

#[tokio::test]
async fn test_reads_existing_session() {
    let backend = Arc::new(MemoryBackend::new());
    backend.sign_in_as(Identity::new("u1", Some("ada@example.com")));

    let holder = SessionHolder::start(backend.clone()).await.unwrap();
    let identity = holder.current_identity().unwrap();
    assert_eq!(identity.id, "u1");
    assert_eq!(identity.display_name(), "ada@example.com");
}

#[tokio::test]
async fn test_tracks_sign_in_and_sign_out() {
    let backend = Arc::new(MemoryBackend::new());
    let holder = SessionHolder::start(backend.clone()).await.unwrap();
    let mut rx = holder.watch();

    backend.sign_in_as(Identity::new("u1", None));
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().as_ref().map(|i| i.id.clone()), Some("u1".to_string()));
    assert!(holder.is_authenticated());

    backend.sign_out().await.unwrap();
    rx.changed().await.unwrap();
    assert!(rx.borrow().is_none());
    assert!(!holder.is_authenticated());
}

#[tokio::test]
async fn test_token_refresh_replaces_identity_wholesale() {
    let backend = Arc::new(MemoryBackend::new());
    backend.sign_in_as(Identity::new("u1", None));
    let holder = SessionHolder::start(backend.clone()).await.unwrap();

    backend.emit_auth(AuthEvent {
        kind: AuthChangeKind::TokenRefreshed,
        identity: Some(Identity::new("u1", Some("new@example.com"))),
    });
    assert!(
        eventually(|| holder.current_identity().and_then(|i| i.email)
            == Some("new@example.com".to_string()))
        .await
    );
}

#[tokio::test]
async fn test_start_fails_when_identity_read_fails() {
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_next(Operation::CurrentIdentity, BackendError::Network("offline".into()));

    let err = SessionHolder::start(backend.clone()).await.unwrap_err();
    assert_eq!(err, BackendError::Network("offline".into()));
    // The registration made before the read must not leak.
    assert_eq!(backend.auth_listener_count(), 0);
}

#[tokio::test]
async fn test_teardown_releases_registration() {
    let backend = Arc::new(MemoryBackend::new());
    let mut holder = SessionHolder::start(backend.clone()).await.unwrap();
    assert_eq!(backend.auth_listener_count(), 1);

    holder.teardown().await;
    assert!(!holder.is_listening());
    assert_eq!(backend.auth_listener_count(), 0);

    // Events after teardown leave the last identity untouched.
    backend.sign_in_as(Identity::new("u1", None));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(holder.current_identity().is_none());

    holder.teardown().await;
}

#[tokio::test]
async fn test_drop_releases_registration() {
    let backend = Arc::new(MemoryBackend::new());
    let holder = SessionHolder::start(backend.clone()).await.unwrap();
    drop(holder);
    assert!(eventually(|| backend.auth_listener_count() == 0).await);
}
