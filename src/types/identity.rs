use serde::{Deserialize, Serialize};

/// The authenticated principal for the current session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: Option<&str>) -> Self {
        Self {
            id: id.into(),
            email: email.map(str::to_string),
        }
    }

    /// Email when known, otherwise the identifier.
    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.id)
    }
}

/// Kind of auth-state transition reported by the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthChangeKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// An auth-state change notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthChangeKind,
    pub identity: Option<Identity>,
}

impl AuthEvent {
    pub fn signed_in(identity: Identity) -> Self {
        Self {
            kind: AuthChangeKind::SignedIn,
            identity: Some(identity),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: AuthChangeKind::SignedOut,
            identity: None,
        }
    }
}
