//! Session State Holder.
//!
//! Tracks the current identity. On start it registers for auth-state changes
//! and reads the current identity once; a background task then replaces the
//! identity wholesale on every change event. Dependents observe changes
//! through [`SessionHolder::watch`].

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::services::backend::SharedBackend;
use crate::types::errors::BackendError;
use crate::types::identity::Identity;

/// Trait defining session state operations.
pub trait SessionHolderTrait {
    fn current_identity(&self) -> Option<Identity>;
    fn is_authenticated(&self) -> bool;
    fn watch(&self) -> watch::Receiver<Option<Identity>>;
}

#[derive(Debug)]
pub struct SessionHolder {
    identity: Arc<watch::Sender<Option<Identity>>>,
    listener: Option<JoinHandle<()>>,
}

impl SessionHolder {
    /// Registers for auth changes, then loads the current identity.
    ///
    /// Registration happens first so a sign-in that lands during the initial
    /// read is not lost.
    pub async fn start(backend: SharedBackend) -> Result<Self, BackendError> {
        let mut subscription = backend.on_auth_state_change();
        let initial = backend.current_identity().await?;
        info!(
            user = initial.as_ref().map(|i| i.id.as_str()).unwrap_or("-"),
            "session loaded"
        );

        let identity = Arc::new(watch::Sender::new(initial));
        let sender = Arc::clone(&identity);
        let listener = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                debug!(kind = ?event.kind, "auth state changed");
                sender.send_replace(event.identity);
            }
        });

        Ok(Self {
            identity,
            listener: Some(listener),
        })
    }

    /// Stops listening for auth changes and releases the backend registration.
    pub async fn teardown(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            let _ = listener.await;
            debug!("session listener released");
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(|l| !l.is_finished())
    }
}

impl SessionHolderTrait for SessionHolder {
    fn current_identity(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    fn is_authenticated(&self) -> bool {
        self.identity.borrow().is_some()
    }

    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }
}

impl Drop for SessionHolder {
    fn drop(&mut self) {
        // Aborting drops the task's future, which drops the subscription.
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}
