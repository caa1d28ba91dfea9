//! Capability contract for the managed backend.
//!
//! Components receive an `Arc<dyn Backend>` at construction instead of reaching
//! for a global client, so tests can substitute [`MemoryBackend`].
//!
//! [`MemoryBackend`]: crate::services::memory_backend::MemoryBackend

use std::sync::Arc;

use async_trait::async_trait;

use crate::services::subscription::Subscription;
use crate::types::bookmark::{Bookmark, NewBookmark};
use crate::types::change::{ChangeFilter, ChannelMessage, FetchOrder};
use crate::types::errors::BackendError;
use crate::types::identity::{AuthEvent, Identity};

/// Shared handle to a backend implementation.
pub type SharedBackend = Arc<dyn Backend>;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Identity of the signed-in user, if any.
    async fn current_identity(&self) -> Result<Option<Identity>, BackendError>;

    /// Registers for auth-state changes until the handle is released.
    fn on_auth_state_change(&self) -> Subscription<AuthEvent>;

    /// Starts an OAuth sign-in. Returns the provider URL the user must visit.
    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str)
        -> Result<String, BackendError>;

    /// Installs the tokens returned to the OAuth redirect target.
    async fn complete_sign_in(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Identity, BackendError>;

    /// Renews the session tokens and announces `TokenRefreshed`.
    async fn refresh_session(&self) -> Result<Identity, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// All rows of `table` visible to the current identity, in `order`.
    async fn fetch_all(&self, table: &str, order: &FetchOrder)
        -> Result<Vec<Bookmark>, BackendError>;

    /// Inserts one row and returns it as stored.
    async fn insert(&self, table: &str, record: &NewBookmark) -> Result<Bookmark, BackendError>;

    async fn delete(&self, table: &str, id: &str) -> Result<(), BackendError>;

    /// Opens a push channel for row changes matching `filter`.
    async fn open_change_channel(
        &self,
        channel: &str,
        filter: &ChangeFilter,
    ) -> Result<Subscription<ChannelMessage>, BackendError>;
}
