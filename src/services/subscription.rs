//! Subscription handles for long-lived backend streams.
//!
//! A [`Subscription`] pairs a receiver with a release action. The release
//! runs exactly once: on [`Subscription::unsubscribe`] or when the handle is
//! dropped, whichever comes first. [`ListenerSet`] is the producer side used by
//! backends that fan one event out to several subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

type Release = Box<dyn FnOnce() + Send>;

/// Receiving end of a backend stream with guaranteed release.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    release: Option<Release>,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::UnboundedReceiver<T>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            rx,
            release: Some(Box::new(release)),
        }
    }

    /// Waits for the next item. Returns `None` once the producer is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-blocking receive, for draining in tests and shutdown paths.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Releases the backend registration.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
        self.rx.close();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.release.is_none())
            .finish_non_exhaustive()
    }
}

/// Registry of live subscribers for one event type.
pub struct ListenerSet<T> {
    next_id: AtomicU64,
    senders: Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<T>>>>,
}

impl<T: Clone + Send + 'static> ListenerSet<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            senders: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers a new subscriber. Dropping the handle removes it.
    pub fn subscribe(&self) -> Subscription<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut senders) = self.senders.lock() {
            senders.insert(id, tx);
        }
        let senders = Arc::clone(&self.senders);
        Subscription::new(rx, move || {
            if let Ok(mut senders) = senders.lock() {
                senders.remove(&id);
            }
        })
    }

    /// Delivers `event` to every subscriber, pruning closed ones.
    pub fn emit(&self, event: &T) {
        if let Ok(mut senders) = self.senders.lock() {
            senders.retain(|_, tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn len(&self) -> usize {
        self.senders.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + 'static> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
