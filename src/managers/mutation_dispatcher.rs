//! Mutation Dispatchers for bookmarks.
//!
//! Create submits an insert and relies on the push channel to add the row to
//! the list. Delete removes the row optimistically and restores the full
//! pre-mutation snapshot if the backend refuses.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::managers::bookmark_store::{BookmarkStore, BookmarkStoreTrait};
use crate::services::backend::SharedBackend;
use crate::types::bookmark::{Bookmark, BookmarkDraft, NewBookmark};
use crate::types::errors::DispatchError;
use crate::types::identity::Identity;
use crate::types::notice::Notice;

/// Invoked with the stored row after a successful create.
pub type CompletionCallback = Box<dyn Fn(&Bookmark) + Send + Sync>;

/// Buffered notices per receiver before the oldest are dropped.
pub const NOTICE_CAPACITY: usize = 32;

/// Trait defining bookmark mutation operations.
#[async_trait]
pub trait MutationDispatcherTrait {
    async fn create(&self, draft: &mut BookmarkDraft) -> Result<Bookmark, DispatchError>;
    async fn delete(&self, id: &str) -> Result<(), DispatchError>;
}

pub struct MutationDispatcher {
    backend: SharedBackend,
    session: watch::Receiver<Option<Identity>>,
    store: Arc<BookmarkStore>,
    notices: broadcast::Sender<Notice>,
    on_created: Option<CompletionCallback>,
}

impl MutationDispatcher {
    pub fn new(
        backend: SharedBackend,
        session: watch::Receiver<Option<Identity>>,
        store: Arc<BookmarkStore>,
        notices: broadcast::Sender<Notice>,
    ) -> Self {
        Self {
            backend,
            session,
            store,
            notices,
            on_created: None,
        }
    }

    pub fn with_completion(mut self, callback: CompletionCallback) -> Self {
        self.on_created = Some(callback);
        self
    }

    /// User-visible failure notices.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    fn identity(&self) -> Option<Identity> {
        self.session.borrow().clone()
    }

    fn table(&self) -> &str {
        &self.store.options().table
    }

    fn report(&self, message: &str, err: &DispatchError) {
        warn!(error = %err, "{}", message);
        // No receivers just means nothing is rendering notices right now.
        let _ = self.notices.send(Notice::error(message, err));
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, DispatchError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DispatchError::Validation(field.to_string()));
    }
    Ok(value)
}

#[async_trait]
impl MutationDispatcherTrait for MutationDispatcher {
    /// Validates the draft, then inserts it for the current identity.
    ///
    /// The draft is cleared only once the backend confirms. The local list is
    /// not touched; the row arrives through the change channel.
    async fn create(&self, draft: &mut BookmarkDraft) -> Result<Bookmark, DispatchError> {
        let title = required("title", &draft.title)?;
        let url = required("url", &draft.url)?;
        let identity = self.identity().ok_or(DispatchError::NotAuthenticated)?;

        let record = NewBookmark {
            title: title.to_string(),
            url: url.to_string(),
            user_id: identity.id,
        };
        match self.backend.insert(self.table(), &record).await {
            Ok(stored) => {
                info!(id = %stored.id, "bookmark created");
                draft.clear();
                if let Some(callback) = &self.on_created {
                    callback(&stored);
                }
                Ok(stored)
            }
            Err(e) => {
                let err = DispatchError::from(e);
                self.report("Failed to add bookmark", &err);
                Err(err)
            }
        }
    }

    /// Removes the row locally, then asks the backend to delete it. A refusal
    /// restores the pre-mutation list, unless the owner changed meanwhile.
    async fn delete(&self, id: &str) -> Result<(), DispatchError> {
        if self.identity().is_none() {
            return Err(DispatchError::NotAuthenticated);
        }

        let snapshot = self.store.snapshot();
        let removed = self.store.remove_local(id);
        match self.backend.delete(self.table(), id).await {
            Ok(()) => {
                info!(id, removed, "bookmark deleted");
                Ok(())
            }
            Err(e) => {
                if !self.store.restore(snapshot) {
                    debug!(id, "owner changed during delete, rollback skipped");
                }
                let err = DispatchError::from(e);
                self.report("Failed to delete bookmark", &err);
                Err(err)
            }
        }
    }
}
