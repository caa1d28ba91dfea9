//! In-memory backend.
//!
//! Behaves like the managed service for a single process: rows are filtered by
//! the signed-in owner, inserts and deletes echo change events to open
//! channels, and auth transitions are broadcast to listeners. Tests drive it
//! through [`MemoryBackend::sign_in_as`], [`MemoryBackend::emit_change`] and
//! [`MemoryBackend::fail_next`].

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::services::backend::Backend;
use crate::services::subscription::{ListenerSet, Subscription};
use crate::types::bookmark::{Bookmark, NewBookmark};
use crate::types::change::{ChangeEvent, ChangeFilter, ChannelMessage, ChannelStatus, FetchOrder};
use crate::types::errors::BackendError;
use crate::types::identity::{AuthChangeKind, AuthEvent, Identity};

/// Backend operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CurrentIdentity,
    SignOut,
    Fetch,
    Insert,
    Delete,
    OpenChannel,
}

#[derive(Default)]
struct MemoryState {
    identity: Option<Identity>,
    rows: Vec<Bookmark>,
    failures: HashMap<Operation, VecDeque<BackendError>>,
    calls: HashMap<Operation, usize>,
    last_created_at: Option<DateTime<Utc>>,
}

pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    auth_listeners: ListenerSet<AuthEvent>,
    channels: ListenerSet<ChannelMessage>,
    echo_changes: bool,
}

impl MemoryBackend {
    /// A backend that echoes its own inserts and deletes to open channels.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            auth_listeners: ListenerSet::new(),
            channels: ListenerSet::new(),
            echo_changes: true,
        }
    }

    /// A backend whose channels only carry events sent with [`emit_change`](Self::emit_change).
    pub fn without_echo() -> Self {
        Self {
            echo_changes: false,
            ..Self::new()
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test thread panicked; the state is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Counts the call and pops a queued failure for `op`, if any.
    fn enter(&self, op: Operation) -> Result<(), BackendError> {
        let mut state = self.lock();
        *state.calls.entry(op).or_insert(0) += 1;
        match state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Makes the next call of `op` fail with `err`. Failures queue up.
    pub fn fail_next(&self, op: Operation, err: BackendError) {
        self.lock().failures.entry(op).or_default().push_back(err);
    }

    pub fn calls(&self, op: Operation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Signs `identity` in and notifies auth listeners.
    pub fn sign_in_as(&self, identity: Identity) {
        self.lock().identity = Some(identity.clone());
        self.auth_listeners.emit(&AuthEvent::signed_in(identity));
    }

    /// Emits an arbitrary auth event without touching the stored identity.
    pub fn emit_auth(&self, event: AuthEvent) {
        self.auth_listeners.emit(&event);
    }

    /// Stores rows as if they had been created earlier. No events are sent.
    pub fn seed<I: IntoIterator<Item = Bookmark>>(&self, rows: I) {
        self.lock().rows.extend(rows);
    }

    pub fn rows(&self) -> Vec<Bookmark> {
        self.lock().rows.clone()
    }

    /// Pushes a change to every open channel.
    pub fn emit_change(&self, event: ChangeEvent) {
        self.channels.emit(&ChannelMessage::Change(event));
    }

    /// Pushes a status update to every open channel.
    pub fn emit_status(&self, status: ChannelStatus) {
        self.channels.emit(&ChannelMessage::Status(status));
    }

    pub fn auth_listener_count(&self) -> usize {
        self.auth_listeners.len()
    }

    pub fn open_channel_count(&self) -> usize {
        self.channels.len()
    }

    fn next_created_at(state: &mut MemoryState) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match state.last_created_at {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        state.last_created_at = Some(ts);
        ts
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn current_identity(&self) -> Result<Option<Identity>, BackendError> {
        self.enter(Operation::CurrentIdentity)?;
        Ok(self.lock().identity.clone())
    }

    fn on_auth_state_change(&self) -> Subscription<AuthEvent> {
        self.auth_listeners.subscribe()
    }

    async fn sign_in_with_oauth(
        &self,
        provider: &str,
        redirect_to: &str,
    ) -> Result<String, BackendError> {
        Ok(format!(
            "memory://authorize?provider={}&redirect_to={}",
            provider, redirect_to
        ))
    }

    /// The access token doubles as the user id.
    async fn complete_sign_in(
        &self,
        access_token: &str,
        _refresh_token: &str,
    ) -> Result<Identity, BackendError> {
        if access_token.is_empty() {
            return Err(BackendError::PolicyDenied("access token rejected".to_string()));
        }
        let identity = Identity::new(access_token, None);
        self.sign_in_as(identity.clone());
        Ok(identity)
    }

    async fn refresh_session(&self) -> Result<Identity, BackendError> {
        let identity = self.lock().identity.clone().ok_or(BackendError::NoSession)?;
        self.auth_listeners.emit(&AuthEvent {
            kind: AuthChangeKind::TokenRefreshed,
            identity: Some(identity.clone()),
        });
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.enter(Operation::SignOut)?;
        self.lock().identity = None;
        self.auth_listeners.emit(&AuthEvent::signed_out());
        Ok(())
    }

    async fn fetch_all(
        &self,
        table: &str,
        order: &FetchOrder,
    ) -> Result<Vec<Bookmark>, BackendError> {
        self.enter(Operation::Fetch)?;
        let state = self.lock();
        let Some(owner) = state.identity.as_ref().map(|i| i.id.clone()) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<Bookmark> = state
            .rows
            .iter()
            .filter(|b| b.user_id == owner)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        if !order.ascending {
            rows.reverse();
        }
        debug!(table, count = rows.len(), "memory fetch");
        Ok(rows)
    }

    async fn insert(&self, table: &str, record: &NewBookmark) -> Result<Bookmark, BackendError> {
        self.enter(Operation::Insert)?;
        let stored = {
            let mut state = self.lock();
            match state.identity.as_ref() {
                None => return Err(BackendError::NoSession),
                Some(identity) if identity.id != record.user_id => {
                    return Err(BackendError::PolicyDenied(format!(
                        "new row violates row-level security policy for table \"{}\"",
                        table
                    )));
                }
                Some(_) => {}
            }
            let stored = Bookmark {
                id: Uuid::new_v4().to_string(),
                title: record.title.clone(),
                url: record.url.clone(),
                user_id: record.user_id.clone(),
                created_at: Self::next_created_at(&mut state),
            };
            state.rows.push(stored.clone());
            stored
        };
        if self.echo_changes {
            self.emit_change(ChangeEvent::insert(stored.clone()));
        }
        Ok(stored)
    }

    async fn delete(&self, _table: &str, id: &str) -> Result<(), BackendError> {
        self.enter(Operation::Delete)?;
        let removed = {
            let mut state = self.lock();
            let owner = state.identity.as_ref().map(|i| i.id.clone());
            let before = state.rows.len();
            state
                .rows
                .retain(|b| !(b.id == id && Some(&b.user_id) == owner.as_ref()));
            before != state.rows.len()
        };
        if removed && self.echo_changes {
            self.emit_change(ChangeEvent::delete(id));
        }
        Ok(())
    }

    async fn open_change_channel(
        &self,
        channel: &str,
        filter: &ChangeFilter,
    ) -> Result<Subscription<ChannelMessage>, BackendError> {
        self.enter(Operation::OpenChannel)?;
        debug!(channel, table = %filter.table, "memory channel opened");
        Ok(self.channels.subscribe())
    }
}
