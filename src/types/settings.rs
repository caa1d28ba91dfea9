use serde::{Deserialize, Serialize};

/// Top-level client settings container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClientSettings {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Where the managed backend lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendSettings {
    /// Project API URL, e.g. `https://xyz.supabase.co`.
    pub api_url: String,
    /// Public (anon) API key sent with every request.
    pub anon_key: String,
    /// Per-request timeout for REST calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    15
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            anon_key: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// OAuth sign-in settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSettings {
    pub provider: String,
    /// Where the provider sends the user back after consent.
    pub redirect_to: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            redirect_to: "http://localhost:3000/auth/callback".to_string(),
        }
    }
}

/// Table and push-channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSettings {
    pub table: String,
    pub channel_name: String,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
}

fn default_heartbeat_secs() -> u64 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            table: "bookmarks".to_string(),
            channel_name: "bookmarks-channel".to_string(),
            heartbeat_secs: default_heartbeat_secs(),
            reconnect: ReconnectSettings::default(),
        }
    }
}

/// Push-channel reconnection policy. Disabled by default: a dropped channel
/// stays closed until the next `subscribe()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSettings {
    pub enabled: bool,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}
