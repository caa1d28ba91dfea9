//! Bookmark List Store.
//!
//! Holds the current owner's bookmarks in an identifier-keyed
//! [`BookmarkCollection`]. `refresh()` replaces the whole collection from a
//! backend fetch; `subscribe()` starts a pump task that applies pushed change
//! events as idempotent patches. All writes go through the store's single
//! mutex; no guard is held across an `.await`.
//!
//! Every owner change bumps a generation counter. Writes prepared under an
//! earlier generation (a fetch still in flight, a rollback snapshot) are
//! dropped, so one user's rows never land in another session's list.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::services::backend::SharedBackend;
use crate::services::subscription::Subscription;
use crate::types::bookmark::Bookmark;
use crate::types::change::{
    ChangeEvent, ChangeFilter, ChangeKind, ChannelMessage, ChannelStatus, EventMask, FetchOrder,
};
use crate::types::collection::BookmarkCollection;
use crate::types::errors::{ChannelError, FetchError};
use crate::types::settings::{ReconnectSettings, SyncSettings};

/// Trait defining bookmark list operations.
pub trait BookmarkStoreTrait {
    fn list(&self) -> Vec<Bookmark>;
    fn len(&self) -> usize;
    fn contains(&self, id: &str) -> bool;
    fn apply(&self, event: &ChangeEvent) -> bool;
    fn snapshot(&self) -> StoreSnapshot;
    fn restore(&self, snapshot: StoreSnapshot) -> bool;
    fn remove_local(&self, id: &str) -> bool;
}

/// Table and channel the store is bound to.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub table: String,
    pub channel_name: String,
    pub reconnect: ReconnectSettings,
}

impl From<&SyncSettings> for StoreOptions {
    fn from(sync: &SyncSettings) -> Self {
        Self {
            table: sync.table.clone(),
            channel_name: sync.channel_name.clone(),
            reconnect: sync.reconnect.clone(),
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from(&SyncSettings::default())
    }
}

/// The collection at one point in time, tied to the owner it was taken for.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    generation: u64,
    collection: BookmarkCollection,
}

#[derive(Default)]
struct StoreState {
    collection: BookmarkCollection,
    owner: Option<String>,
    generation: u64,
    loaded: bool,
}

struct StoreShared {
    state: Mutex<StoreState>,
    snapshots: watch::Sender<Vec<Bookmark>>,
}

impl StoreShared {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, state: &StoreState) {
        self.snapshots.send_replace(state.collection.to_vec());
    }

    fn apply(&self, event: &ChangeEvent) -> bool {
        let mut state = self.lock();
        let changed = match event.kind {
            ChangeKind::Insert => match &event.new {
                Some(record) if owned_by(&state.owner, record) => {
                    state.collection.insert_if_absent(record.clone())
                }
                Some(record) => {
                    debug!(id = %record.id, "ignoring insert for another owner");
                    false
                }
                None => false,
            },
            ChangeKind::Update => match &event.new {
                Some(record) if owned_by(&state.owner, record) => {
                    state.collection.replace_existing(record.clone())
                }
                // Ownership moved away from this session.
                Some(record) => state.collection.remove(&record.id).is_some(),
                None => false,
            },
            ChangeKind::Delete => match event.target_id() {
                Some(id) => state.collection.remove(id).is_some(),
                None => false,
            },
        };
        if changed {
            self.publish(&state);
        }
        debug!(kind = ?event.kind, id = event.target_id().unwrap_or("-"), changed, "applied change");
        changed
    }

    /// Returns `None` when the owner changed while the fetch was in flight.
    async fn refresh(
        &self,
        backend: &SharedBackend,
        table: &str,
    ) -> Result<Option<usize>, FetchError> {
        let generation = self.lock().generation;
        let rows = backend
            .fetch_all(table, &FetchOrder::newest_first())
            .await
            .map_err(|e| {
                warn!(table, error = %e, "bookmark fetch failed");
                FetchError::from(e)
            })?;
        let mut state = self.lock();
        if state.generation != generation {
            debug!(table, "discarding fetch for a previous owner");
            return Ok(None);
        }
        state.collection = BookmarkCollection::from_records(rows);
        state.loaded = true;
        self.publish(&state);
        Ok(Some(state.collection.len()))
    }
}

/// Without an owner nothing is displayable.
fn owned_by(owner: &Option<String>, record: &Bookmark) -> bool {
    owner.as_deref().is_some_and(|o| o == record.user_id)
}

/// Delay before reconnect attempt `attempt` (0-based), doubling up to the cap.
pub fn reconnect_delay(settings: &ReconnectSettings, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
    let delay = settings.base_delay_ms.saturating_mul(factor);
    Duration::from_millis(delay.min(settings.max_delay_ms))
}

pub struct BookmarkStore {
    backend: SharedBackend,
    options: StoreOptions,
    shared: Arc<StoreShared>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl BookmarkStore {
    pub fn new(backend: SharedBackend, options: StoreOptions) -> Self {
        let (snapshots, _) = watch::channel(Vec::new());
        Self {
            backend,
            options,
            shared: Arc::new(StoreShared {
                state: Mutex::new(StoreState::default()),
                snapshots,
            }),
            pump: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Replaces the collection with a full fetch, newest first.
    ///
    /// On failure the current collection is left exactly as it was. A fetch
    /// that completes after an owner change is discarded.
    pub async fn refresh(&self) -> Result<(), FetchError> {
        if let Some(count) = self.shared.refresh(&self.backend, &self.options.table).await? {
            info!(table = %self.options.table, count, "bookmarks refreshed");
        }
        Ok(())
    }

    /// Opens the push channel and starts applying its events.
    pub async fn subscribe(&self) -> Result<(), ChannelError> {
        if self.is_subscribed() {
            return Err(ChannelError::AlreadyOpen);
        }
        let filter = ChangeFilter::table(&self.options.table);
        let subscription = self
            .backend
            .open_change_channel(&self.options.channel_name, &filter)
            .await?;
        info!(channel = %self.options.channel_name, "change channel opened");

        let task = tokio::spawn(run_pump(
            Arc::clone(&self.shared),
            Arc::clone(&self.backend),
            self.options.clone(),
            subscription,
        ));
        if let Ok(mut pump) = self.pump.lock() {
            *pump = Some(task);
        }
        Ok(())
    }

    pub fn is_subscribed(&self) -> bool {
        self.pump
            .lock()
            .map(|p| p.as_ref().is_some_and(|t| !t.is_finished()))
            .unwrap_or(false)
    }

    /// Closes the push channel. Safe to call more than once.
    pub async fn teardown(&self) {
        let task = self.pump.lock().ok().and_then(|mut p| p.take());
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
            info!(channel = %self.options.channel_name, "change channel closed");
        }
    }

    /// Sets the owner whose bookmarks are displayed. A different owner empties
    /// the collection until the next refresh and invalidates outstanding
    /// snapshots and fetches.
    pub fn set_owner(&self, owner: Option<String>) {
        let mut state = self.shared.lock();
        if state.owner != owner {
            state.owner = owner;
            state.generation = state.generation.wrapping_add(1);
            state.collection.clear();
            state.loaded = false;
            self.shared.publish(&state);
        }
    }

    pub fn owner(&self) -> Option<String> {
        self.shared.lock().owner.clone()
    }

    /// True until the first successful refresh for the current owner.
    pub fn is_loading(&self) -> bool {
        !self.shared.lock().loaded
    }

    /// Receives the display list after every change.
    pub fn watch(&self) -> watch::Receiver<Vec<Bookmark>> {
        self.shared.snapshots.subscribe()
    }
}

impl BookmarkStoreTrait for BookmarkStore {
    fn list(&self) -> Vec<Bookmark> {
        self.shared.lock().collection.to_vec()
    }

    fn len(&self) -> usize {
        self.shared.lock().collection.len()
    }

    fn contains(&self, id: &str) -> bool {
        self.shared.lock().collection.contains(id)
    }

    fn apply(&self, event: &ChangeEvent) -> bool {
        self.shared.apply(event)
    }

    fn snapshot(&self) -> StoreSnapshot {
        let state = self.shared.lock();
        StoreSnapshot {
            generation: state.generation,
            collection: state.collection.clone(),
        }
    }

    /// Puts the snapshot back unless the owner changed since it was taken.
    fn restore(&self, snapshot: StoreSnapshot) -> bool {
        let mut state = self.shared.lock();
        if state.generation != snapshot.generation {
            return false;
        }
        state.collection = snapshot.collection;
        self.shared.publish(&state);
        true
    }

    fn remove_local(&self, id: &str) -> bool {
        let mut state = self.shared.lock();
        let removed = state.collection.remove(id).is_some();
        if removed {
            self.shared.publish(&state);
        }
        removed
    }
}

impl Drop for BookmarkStore {
    fn drop(&mut self) {
        if let Some(task) = self.pump.get_mut().ok().and_then(Option::take) {
            task.abort();
        }
    }
}

/// Applies channel events until the channel ends, reconnecting if enabled.
async fn run_pump(
    shared: Arc<StoreShared>,
    backend: SharedBackend,
    options: StoreOptions,
    mut subscription: Subscription<ChannelMessage>,
) {
    let filter = ChangeFilter::table(&options.table);
    loop {
        let status = drain(&shared, &mut subscription, filter.events).await;
        if !options.reconnect.enabled {
            info!(channel = %options.channel_name, ?status, "change channel ended");
            return;
        }
        warn!(channel = %options.channel_name, ?status, "change channel dropped, reconnecting");

        let mut attempt = 0;
        subscription = loop {
            sleep(reconnect_delay(&options.reconnect, attempt)).await;
            match backend.open_change_channel(&options.channel_name, &filter).await {
                Ok(next) => break next,
                Err(e) => {
                    warn!(attempt, error = %e, "change channel reconnect failed");
                    attempt = attempt.saturating_add(1);
                }
            }
        };
        // Events sent while disconnected are gone; resync from the backend.
        if let Err(e) = shared.refresh(&backend, &options.table).await {
            warn!(error = %e, "resync after reconnect failed");
        }
    }
}

async fn drain(
    shared: &StoreShared,
    subscription: &mut Subscription<ChannelMessage>,
    mask: EventMask,
) -> ChannelStatus {
    while let Some(message) = subscription.recv().await {
        match message {
            ChannelMessage::Change(event) if mask.matches(event.kind) => {
                shared.apply(&event);
            }
            ChannelMessage::Change(_) => {}
            ChannelMessage::Status(ChannelStatus::Subscribed) => {
                info!("change channel subscribed");
            }
            ChannelMessage::Status(status) => return status,
        }
    }
    ChannelStatus::Closed
}
