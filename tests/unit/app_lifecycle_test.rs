//! Lifecycle tests for App: startup wiring, identity transitions and
//! teardown of every backend registration.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use bookmark_sync::app::App;
use bookmark_sync::managers::bookmark_store::BookmarkStoreTrait;
use bookmark_sync::managers::mutation_dispatcher::MutationDispatcherTrait;
use bookmark_sync::managers::session_holder::SessionHolderTrait;
use bookmark_sync::services::memory_backend::{MemoryBackend, Operation};
use bookmark_sync::types::bookmark::{Bookmark, BookmarkDraft};
use bookmark_sync::types::change::ChangeEvent;
use bookmark_sync::types::errors::BackendError;
use bookmark_sync::types::identity::Identity;
use bookmark_sync::types::notice::NoticeLevel;
use bookmark_sync::types::settings::ClientSettings;

fn bookmark(id: &str, owner: &str, minute: i64) -> Bookmark {
    Bookmark {
        id: id.to_string(),
        title: id.to_string(),
        url: format!("https://example.com/{}", id),
        user_id: owner.to_string(),
        created_at: Utc.timestamp_opt(1_700_000_000 + minute * 60, 0).unwrap(),
    }
}

async fn eventually<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

async fn start(backend: &Arc<MemoryBackend>) -> App {
    App::start(backend.clone(), ClientSettings::default())
        .await
        .expect("app should start")
}

#[tokio::test]
async fn test_start_signed_in_loads_and_subscribes() {
    let backend = Arc::new(MemoryBackend::new());
    backend.sign_in_as(Identity::new("u1", None));
    backend.seed([bookmark("b1", "u1", 1), bookmark("b2", "u1", 2), bookmark("x", "u2", 3)]);

    let app = start(&backend).await;
    let ids: Vec<String> = app.store.list().into_iter().map(|b| b.id).collect();
    assert_eq!(ids, vec!["b2", "b1"]);
    assert!(!app.store.is_loading());
    assert!(app.store.is_subscribed());
    assert_eq!(backend.auth_listener_count(), 1);
    assert_eq!(backend.open_channel_count(), 1);
}

#[tokio::test]
async fn test_start_signed_out_skips_fetch() {
    let backend = Arc::new(MemoryBackend::new());
    let app = start(&backend).await;
    assert!(app.store.list().is_empty());
    assert!(app.store.is_loading());
    assert_eq!(backend.calls(Operation::Fetch), 0);
    assert!(!app.store.is_subscribed());
    assert_eq!(backend.calls(Operation::OpenChannel), 0);
}

#[tokio::test]
async fn test_start_fails_when_identity_read_fails() {
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_next(Operation::CurrentIdentity, BackendError::Network("offline".into()));
    let result = App::start(backend.clone(), ClientSettings::default()).await;
    assert!(result.is_err());
    assert_eq!(backend.auth_listener_count(), 0);
}

#[tokio::test]
async fn test_start_survives_fetch_and_channel_failures() {
    let backend = Arc::new(MemoryBackend::new());
    backend.sign_in_as(Identity::new("u1", None));
    backend.fail_next(Operation::Fetch, BackendError::MissingTable("bookmarks".into()));
    backend.fail_next(Operation::OpenChannel, BackendError::Network("refused".into()));

    let app = start(&backend).await;
    assert!(app.store.is_loading());
    assert!(!app.store.is_subscribed());
    assert!(app.session.is_authenticated());
}

#[tokio::test]
async fn test_sign_in_loads_owner_bookmarks() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed([bookmark("b1", "u1", 1)]);
    let app = start(&backend).await;

    backend.sign_in_as(Identity::new("u1", None));
    assert!(eventually(|| app.store.contains("b1")).await);
    assert!(eventually(|| app.store.is_subscribed()).await);
    assert_eq!(app.store.owner(), Some("u1".to_string()));
}

#[tokio::test]
async fn test_complete_sign_in_switches_identity() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed([bookmark("b1", "u7", 1)]);
    let app = start(&backend).await;

    let identity = app.complete_sign_in("u7", "refresh").await.unwrap();
    assert_eq!(identity.id, "u7");
    assert!(eventually(|| app.store.contains("b1")).await);
}

#[tokio::test]
async fn test_sign_out_clears_list() {
    let backend = Arc::new(MemoryBackend::new());
    backend.sign_in_as(Identity::new("u1", None));
    backend.seed([bookmark("b1", "u1", 1)]);
    let app = start(&backend).await;
    assert_eq!(app.store.len(), 1);

    app.sign_out().await.unwrap();
    assert!(eventually(|| app.store.list().is_empty()).await);
    assert!(eventually(|| !app.session.is_authenticated()).await);
}

#[tokio::test]
async fn test_signed_out_app_ignores_pushed_rows() {
    let backend = Arc::new(MemoryBackend::new());
    backend.sign_in_as(Identity::new("u1", None));
    backend.seed([bookmark("b1", "u1", 1)]);
    let app = start(&backend).await;

    app.sign_out().await.unwrap();
    assert!(eventually(|| app.store.list().is_empty()).await);
    assert!(eventually(|| !app.store.is_subscribed()).await);
    assert_eq!(backend.open_channel_count(), 0);

    backend.emit_change(ChangeEvent::insert(bookmark("x", "u2", 2)));
    assert!(!app.store.apply(&ChangeEvent::insert(bookmark("y", "u2", 3))));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(app.store.list().is_empty());
}

#[tokio::test]
async fn test_channel_failure_raises_warning_notice() {
    let backend = Arc::new(MemoryBackend::new());
    let app = start(&backend).await;
    let mut notices = app.notices();

    backend.fail_next(Operation::OpenChannel, BackendError::Network("refused".into()));
    backend.sign_in_as(Identity::new("u1", None));

    let notice = tokio::time::timeout(Duration::from_secs(1), notices.recv())
        .await
        .expect("notice should arrive")
        .unwrap();
    assert_eq!(notice.level, NoticeLevel::Warning);
    assert_eq!(notice.message, "Live updates unavailable");
    assert!(!app.store.is_subscribed());
}

#[tokio::test]
async fn test_created_bookmark_arrives_through_channel() {
    let backend = Arc::new(MemoryBackend::new());
    backend.sign_in_as(Identity::new("u1", None));
    let app = start(&backend).await;

    let mut draft = BookmarkDraft::new("Rust", "https://rust-lang.org");
    let stored = app.dispatcher.create(&mut draft).await.unwrap();
    assert!(eventually(|| app.store.contains(&stored.id)).await);
    assert_eq!(app.store.len(), 1);
}

#[tokio::test]
async fn test_sign_in_returns_provider_url() {
    let backend = Arc::new(MemoryBackend::new());
    let app = start(&backend).await;
    let url = app.sign_in().await.unwrap();
    assert!(url.contains("provider=google"));
}

#[tokio::test]
async fn test_shutdown_releases_everything() {
    let backend = Arc::new(MemoryBackend::new());
    backend.sign_in_as(Identity::new("u1", None));
    let mut app = start(&backend).await;

    app.shutdown().await;
    assert_eq!(backend.auth_listener_count(), 0);
    assert_eq!(backend.open_channel_count(), 0);
    assert!(!app.store.is_subscribed());
    assert!(!app.session.is_listening());

    // Auth events after shutdown reach nobody.
    backend.sign_in_as(Identity::new("u2", None));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(app.session.current_identity().map(|i| i.id), Some("u1".to_string()));

    app.shutdown().await;
}

#[tokio::test]
async fn test_drop_releases_everything() {
    let backend = Arc::new(MemoryBackend::new());
    backend.sign_in_as(Identity::new("u1", None));
    let app = start(&backend).await;
    drop(app);
    assert!(eventually(|| backend.auth_listener_count() == 0).await);
    assert!(eventually(|| backend.open_channel_count() == 0).await);
}

#[tokio::test]
async fn test_token_refresh_keeps_list_without_refetch() {
    let backend = Arc::new(MemoryBackend::new());
    backend.sign_in_as(Identity::new("u1", None));
    backend.seed([bookmark("b1", "u1", 1)]);
    let app = start(&backend).await;
    assert_eq!(backend.calls(Operation::Fetch), 1);

    app.refresh_session().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(backend.calls(Operation::Fetch), 1);
    assert!(app.store.contains("b1"));
    assert!(app.store.is_subscribed());
}
