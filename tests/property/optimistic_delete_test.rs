//! Property-based tests for optimistic delete.
//!
//! A failed delete restores the exact pre-mutation list, whatever it held
//! and whichever id was targeted. A confirmed delete removes only that id.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use tokio::sync::{broadcast, watch};

use bookmark_sync::managers::bookmark_store::{BookmarkStore, BookmarkStoreTrait, StoreOptions};
use bookmark_sync::managers::mutation_dispatcher::{
    MutationDispatcher, MutationDispatcherTrait, NOTICE_CAPACITY,
};
use bookmark_sync::services::memory_backend::{MemoryBackend, Operation};
use bookmark_sync::types::bookmark::Bookmark;
use bookmark_sync::types::errors::BackendError;
use bookmark_sync::types::identity::Identity;

fn bookmark(n: u16) -> Bookmark {
    Bookmark {
        id: format!("b{}", n),
        title: format!("Bookmark {}", n),
        url: format!("https://example.com/{}", n),
        user_id: "u1".to_string(),
        created_at: Utc.timestamp_opt(1_700_000_000 + i64::from(n), 0).unwrap(),
    }
}

fn arb_failure() -> impl Strategy<Value = BackendError> {
    prop_oneof![
        "[a-z ]{1,20}".prop_map(BackendError::Network),
        "[a-z ]{1,20}".prop_map(BackendError::PolicyDenied),
        "[a-z ]{1,20}".prop_map(BackendError::MissingTable),
        (400u16..600, "[a-z ]{1,20}")
            .prop_map(|(status, message)| BackendError::Rejected { status, message }),
    ]
}

/// Rows `b0..b{count}` loaded into a fresh store, plus the dispatcher.
async fn loaded(count: u16) -> (Arc<MemoryBackend>, Arc<BookmarkStore>, MutationDispatcher) {
    let backend = Arc::new(MemoryBackend::without_echo());
    let identity = Identity::new("u1", None);
    backend.sign_in_as(identity.clone());
    backend.seed((0..count).map(bookmark));

    let store = Arc::new(BookmarkStore::new(backend.clone(), StoreOptions::default()));
    store.set_owner(Some("u1".to_string()));
    store.refresh().await.unwrap();

    let (_tx, rx) = watch::channel(Some(identity));
    let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
    let dispatcher = MutationDispatcher::new(backend.clone(), rx, store.clone(), notices);
    (backend, store, dispatcher)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn failed_delete_restores_full_snapshot(
        count in 0u16..12,
        target in 0u16..14,
        failure in arb_failure(),
    ) {
        let (before, after, notice) = runtime().block_on(async {
            let (backend, store, dispatcher) = loaded(count).await;
            let mut notices = dispatcher.notices();
            let before = store.list();

            backend.fail_next(Operation::Delete, failure);
            let result = dispatcher.delete(&format!("b{}", target)).await;
            assert!(result.is_err());
            (before, store.list(), notices.try_recv().ok())
        });
        prop_assert_eq!(before, after);
        let notice = notice.expect("a failure notice");
        prop_assert_eq!(notice.message, "Failed to delete bookmark");
    }

    #[test]
    fn confirmed_delete_removes_only_target(count in 1u16..12, target in 0u16..12) {
        let target = target % count;
        let (before, after) = runtime().block_on(async {
            let (_backend, store, dispatcher) = loaded(count).await;
            let before = store.list();
            dispatcher.delete(&format!("b{}", target)).await.unwrap();
            (before, store.list())
        });
        let expected: Vec<Bookmark> = before
            .into_iter()
            .filter(|b| b.id != format!("b{}", target))
            .collect();
        prop_assert_eq!(after, expected);
    }
}
