//! App Core for bookmark-sync.
//!
//! Wires the session holder, bookmark store and mutation dispatcher around one
//! injected backend and owns their lifecycle.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::managers::bookmark_store::{BookmarkStore, BookmarkStoreTrait, StoreOptions};
use crate::managers::mutation_dispatcher::{MutationDispatcher, NOTICE_CAPACITY};
use crate::managers::session_holder::{SessionHolder, SessionHolderTrait};
use crate::services::backend::SharedBackend;
use crate::types::errors::BackendError;
use crate::types::identity::Identity;
use crate::types::notice::Notice;
use crate::types::settings::ClientSettings;

/// Central application struct holding the session, store and dispatcher.
pub struct App {
    pub backend: SharedBackend,
    pub settings: ClientSettings,
    pub session: SessionHolder,
    pub store: Arc<BookmarkStore>,
    pub dispatcher: MutationDispatcher,
    notices: broadcast::Sender<Notice>,
    identity_watcher: Option<JoinHandle<()>>,
}

impl App {
    /// Starts the session holder and, when signed in, loads the list and opens
    /// the change channel.
    ///
    /// Only a failed identity read is fatal. A failed fetch or channel open is
    /// logged and raised as a notice; the app keeps running.
    pub async fn start(backend: SharedBackend, settings: ClientSettings) -> Result<Self, BackendError> {
        let session = SessionHolder::start(Arc::clone(&backend)).await?;
        let store = Arc::new(BookmarkStore::new(
            Arc::clone(&backend),
            StoreOptions::from(&settings.sync),
        ));
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let dispatcher = MutationDispatcher::new(
            Arc::clone(&backend),
            session.watch(),
            Arc::clone(&store),
            notices.clone(),
        );

        let owner = session.current_identity().map(|i| i.id);
        store.set_owner(owner.clone());
        if owner.is_some() {
            load(&store, &notices).await;
            open_channel(&store, &notices).await;
        }

        let identity_watcher = tokio::spawn(watch_identity(
            session.watch(),
            owner.clone(),
            Arc::clone(&store),
            notices.clone(),
        ));
        info!(
            signed_in = owner.is_some(),
            bookmarks = store.len(),
            "app started"
        );

        Ok(Self {
            backend,
            settings,
            session,
            store,
            dispatcher,
            notices,
            identity_watcher: Some(identity_watcher),
        })
    }

    /// Returns the provider URL that starts an OAuth sign-in.
    pub async fn sign_in(&self) -> Result<String, BackendError> {
        let auth = &self.settings.auth;
        self.backend
            .sign_in_with_oauth(&auth.provider, &auth.redirect_to)
            .await
    }

    /// Installs tokens captured at the redirect target.
    pub async fn complete_sign_in(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Identity, BackendError> {
        self.backend.complete_sign_in(access_token, refresh_token).await
    }

    /// Renews the session tokens. The bookmark list is left as is.
    pub async fn refresh_session(&self) -> Result<Identity, BackendError> {
        self.backend.refresh_session().await
    }

    pub async fn sign_out(&self) -> Result<(), BackendError> {
        self.backend.sign_out().await
    }

    /// All user-visible notices: dispatcher failures, load errors and channel
    /// warnings.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Stops the identity watcher, closes the channel and releases the auth
    /// registration, in that order. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if let Some(watcher) = self.identity_watcher.take() {
            watcher.abort();
            let _ = watcher.await;
        }
        self.store.teardown().await;
        self.session.teardown().await;
        info!("app shut down");
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(watcher) = self.identity_watcher.take() {
            watcher.abort();
        }
    }
}

async fn load(store: &BookmarkStore, notices: &broadcast::Sender<Notice>) {
    if let Err(e) = store.refresh().await {
        let _ = notices.send(Notice::error("Failed to load bookmarks", &e));
    }
}

async fn open_channel(store: &BookmarkStore, notices: &broadcast::Sender<Notice>) {
    if let Err(e) = store.subscribe().await {
        warn!(error = %e, "change channel unavailable");
        let _ = notices.send(Notice::warning("Live updates unavailable", &e));
    }
}

/// Follows identity changes: a new owner gets a fresh list and a channel
/// opened with its credentials; sign-out empties the list and leaves the
/// channel closed.
async fn watch_identity(
    mut identity: watch::Receiver<Option<Identity>>,
    mut owner: Option<String>,
    store: Arc<BookmarkStore>,
    notices: broadcast::Sender<Notice>,
) {
    loop {
        let next = identity.borrow_and_update().as_ref().map(|i| i.id.clone());
        // Token refreshes keep the same owner.
        if next != owner {
            owner = next;
            info!(user = owner.as_deref().unwrap_or("-"), "identity changed");
            store.set_owner(owner.clone());
            store.teardown().await;
            if owner.is_some() {
                load(&store, &notices).await;
                open_channel(&store, &notices).await;
            }
        }
        if identity.changed().await.is_err() {
            break;
        }
    }
}
