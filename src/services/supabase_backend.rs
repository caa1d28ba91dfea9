//! Managed backend adapter: REST for rows, GoTrue endpoints for auth, and the
//! realtime websocket for change channels.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, error, info};
use zeroize::Zeroizing;

use crate::services::backend::Backend;
use crate::services::realtime_channel;
use crate::services::subscription::{ListenerSet, Subscription};
use crate::types::bookmark::{Bookmark, NewBookmark};
use crate::types::change::{ChangeFilter, ChannelMessage, FetchOrder};
use crate::types::errors::BackendError;
use crate::types::identity::{AuthChangeKind, AuthEvent, Identity};
use crate::types::settings::{BackendSettings, SyncSettings};

/// In-memory session tokens. Wiped on drop.
struct AuthSession {
    access_token: Zeroizing<String>,
    refresh_token: Zeroizing<String>,
}

#[derive(Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl From<UserResponse> for Identity {
    fn from(user: UserResponse) -> Self {
        Identity {
            id: user.id,
            email: user.email.filter(|e| !e.is_empty()),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    user: UserResponse,
}

/// Error body returned by the REST layer.
#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Maps a failed response onto the backend error taxonomy.
pub fn classify_error(status: u16, body: &str) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .clone()
        .unwrap_or_else(|| body.trim().to_string());
    match parsed.code.as_deref() {
        Some("42P01") | Some("PGRST205") => return BackendError::MissingTable(message),
        Some("42501") => return BackendError::PolicyDenied(message),
        _ => {}
    }
    match status {
        401 | 403 => BackendError::PolicyDenied(message),
        _ => BackendError::Rejected { status, message },
    }
}

pub struct SupabaseBackend {
    http: reqwest::Client,
    api_url: String,
    anon_key: String,
    heartbeat: Duration,
    session: RwLock<Option<AuthSession>>,
    /// Current access token, followed by open realtime channels.
    access_tokens: watch::Sender<Option<Zeroizing<String>>>,
    auth_listeners: ListenerSet<AuthEvent>,
}

impl SupabaseBackend {
    pub fn new(backend: &BackendSettings, sync: &SyncSettings) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(backend.request_timeout_secs))
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Ok(Self {
            http,
            api_url: backend.api_url.trim_end_matches('/').to_string(),
            anon_key: backend.anon_key.clone(),
            heartbeat: Duration::from_secs(sync.heartbeat_secs.max(1)),
            session: RwLock::new(None),
            access_tokens: watch::Sender::new(None),
            auth_listeners: ListenerSet::new(),
        })
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.api_url, path)
    }

    fn access_token(&self) -> Option<Zeroizing<String>> {
        self.session
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|s| s.access_token.clone()))
    }

    fn request(&self, method: Method, url: &str, token: Option<&str>) -> RequestBuilder {
        let bearer = token.unwrap_or(&self.anon_key);
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        error!(status, body = %body, "backend request failed");
        Err(classify_error(status, &body))
    }

    async fn fetch_user(&self, token: &str) -> Result<Option<Identity>, BackendError> {
        let response = self
            .request(Method::GET, &self.auth_url("user"), Some(token))
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let user: UserResponse = Self::check(response).await?.json().await?;
        Ok(Some(user.into()))
    }

    fn store_session(&self, session: Option<AuthSession>) {
        let token = session.as_ref().map(|s| s.access_token.clone());
        if let Ok(mut slot) = self.session.write() {
            *slot = session;
        }
        self.access_tokens.send_replace(token);
    }

    /// Installs tokens obtained from the OAuth callback and announces the sign-in.
    pub async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Identity, BackendError> {
        let identity = self
            .fetch_user(access_token)
            .await?
            .ok_or_else(|| BackendError::PolicyDenied("access token rejected".to_string()))?;
        self.store_session(Some(AuthSession {
            access_token: Zeroizing::new(access_token.to_string()),
            refresh_token: Zeroizing::new(refresh_token.to_string()),
        }));
        info!(user = %identity.id, "session established");
        self.auth_listeners.emit(&AuthEvent::signed_in(identity.clone()));
        Ok(identity)
    }

    /// Exchanges the refresh token for a new access token.
    async fn exchange_refresh_token(&self) -> Result<Identity, BackendError> {
        let refresh_token = self
            .session
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|s| s.refresh_token.clone()))
            .ok_or(BackendError::NoSession)?;
        let response = self
            .request(
                Method::POST,
                &self.auth_url("token?grant_type=refresh_token"),
                None,
            )
            .json(&serde_json::json!({ "refresh_token": refresh_token.as_str() }))
            .send()
            .await?;
        let tokens: TokenResponse = Self::check(response).await?.json().await?;
        let identity: Identity = tokens.user.into();
        self.store_session(Some(AuthSession {
            access_token: Zeroizing::new(tokens.access_token),
            refresh_token: Zeroizing::new(tokens.refresh_token),
        }));
        debug!(user = %identity.id, "session refreshed");
        self.auth_listeners.emit(&AuthEvent {
            kind: AuthChangeKind::TokenRefreshed,
            identity: Some(identity.clone()),
        });
        Ok(identity)
    }
}

impl std::fmt::Debug for SupabaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseBackend")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Backend for SupabaseBackend {
    /// A token the auth server rejects ends the session.
    async fn current_identity(&self) -> Result<Option<Identity>, BackendError> {
        let Some(token) = self.access_token() else {
            return Ok(None);
        };
        let identity = self.fetch_user(&token).await?;
        if identity.is_none() {
            info!("stored session expired");
            self.store_session(None);
            self.auth_listeners.emit(&AuthEvent::signed_out());
        }
        Ok(identity)
    }

    fn on_auth_state_change(&self) -> Subscription<AuthEvent> {
        self.auth_listeners.subscribe()
    }

    async fn sign_in_with_oauth(
        &self,
        provider: &str,
        redirect_to: &str,
    ) -> Result<String, BackendError> {
        let url = Url::parse_with_params(
            &self.auth_url("authorize"),
            &[("provider", provider), ("redirect_to", redirect_to)],
        )
        .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(url.to_string())
    }

    async fn complete_sign_in(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Identity, BackendError> {
        self.set_session(access_token, refresh_token).await
    }

    async fn refresh_session(&self) -> Result<Identity, BackendError> {
        self.exchange_refresh_token().await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(token) = self.access_token() {
            let response = self
                .request(Method::POST, &self.auth_url("logout"), Some(token.as_str()))
                .send()
                .await?;
            // An already-expired token still counts as signed out.
            if response.status() != StatusCode::UNAUTHORIZED
                && response.status() != StatusCode::NOT_FOUND
            {
                Self::check(response).await?;
            }
        }
        self.store_session(None);
        info!("signed out");
        self.auth_listeners.emit(&AuthEvent::signed_out());
        Ok(())
    }

    async fn fetch_all(
        &self,
        table: &str,
        order: &FetchOrder,
    ) -> Result<Vec<Bookmark>, BackendError> {
        let direction = if order.ascending { "asc" } else { "desc" };
        let url = format!(
            "{}?select=*&order={}.{}",
            self.rest_url(table),
            order.column,
            direction
        );
        let token = self.access_token();
        let response = self
            .request(Method::GET, &url, token.as_deref().map(String::as_str))
            .send()
            .await?;
        let rows: Vec<Bookmark> = Self::check(response).await?.json().await?;
        debug!(table, count = rows.len(), "fetched rows");
        Ok(rows)
    }

    async fn insert(&self, table: &str, record: &NewBookmark) -> Result<Bookmark, BackendError> {
        let token = self.access_token().ok_or(BackendError::NoSession)?;
        let response = self
            .request(Method::POST, &self.rest_url(table), Some(token.as_str()))
            .header("Prefer", "return=representation")
            .json(&[record])
            .send()
            .await?;
        let mut rows: Vec<Bookmark> = Self::check(response).await?.json().await?;
        let stored = rows
            .pop()
            .ok_or_else(|| BackendError::Decode("insert returned no rows".to_string()))?;
        debug!(table, id = %stored.id, "inserted row");
        Ok(stored)
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), BackendError> {
        let token = self.access_token().ok_or(BackendError::NoSession)?;
        let url = Url::parse_with_params(&self.rest_url(table), &[("id", format!("eq.{}", id))])
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        let response = self
            .request(Method::DELETE, url.as_str(), Some(token.as_str()))
            .send()
            .await?;
        Self::check(response).await?;
        debug!(table, id, "deleted row");
        Ok(())
    }

    async fn open_change_channel(
        &self,
        channel: &str,
        filter: &ChangeFilter,
    ) -> Result<Subscription<ChannelMessage>, BackendError> {
        let ws_url = realtime_channel::websocket_url(&self.api_url, &self.anon_key);
        realtime_channel::open(
            &ws_url,
            channel,
            filter,
            self.access_tokens.subscribe(),
            self.heartbeat,
        )
        .await
    }
}
