//! RPC method handler for the bookmark-sync JSON-RPC protocol.
//!
//! Kept apart from `rpc_server.rs` so it can be unit-tested against an `App`
//! built on the in-memory backend.

use serde_json::{json, Value};

use crate::app::App;
use crate::managers::bookmark_store::BookmarkStoreTrait;
use crate::managers::mutation_dispatcher::MutationDispatcherTrait;
use crate::managers::session_holder::SessionHolderTrait;
use crate::types::bookmark::BookmarkDraft;

fn str_param<'a>(params: &'a Value, name: &str) -> Result<&'a str, String> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {}", name))
}

/// Dispatch a JSON-RPC method call.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub async fn handle_method(app: &App, method: &str, params: &Value) -> Result<Value, String> {
    match method {
        "ping" => Ok(json!({"pong": true, "version": env!("CARGO_PKG_VERSION")})),

        // ─── Session ───
        "session.current" => {
            let identity = app.session.current_identity();
            Ok(json!({
                "signed_in": identity.is_some(),
                "identity": identity,
                "display_name": identity.as_ref().map(|i| i.display_name().to_string()),
            }))
        }
        "auth.sign_in" => {
            let url = app.sign_in().await.map_err(|e| e.to_string())?;
            Ok(json!({"url": url}))
        }
        "auth.complete" => {
            let access = str_param(params, "access_token")?;
            let refresh = str_param(params, "refresh_token")?;
            let identity = app
                .complete_sign_in(access, refresh)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({"identity": identity}))
        }
        "auth.refresh" => {
            let identity = app.refresh_session().await.map_err(|e| e.to_string())?;
            Ok(json!({"identity": identity}))
        }
        "auth.sign_out" => {
            app.sign_out().await.map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }

        // ─── Bookmarks ───
        "bookmark.list" => Ok(json!({
            "loading": app.store.is_loading(),
            "bookmarks": app.store.list(),
        })),
        "bookmark.refresh" => {
            if !app.session.is_authenticated() {
                return Err("Not authenticated".to_string());
            }
            app.store.refresh().await.map_err(|e| e.to_string())?;
            Ok(json!({"count": app.store.len()}))
        }
        "bookmark.create" => {
            let mut draft = BookmarkDraft::new(
                params.get("title").and_then(|v| v.as_str()).unwrap_or(""),
                params.get("url").and_then(|v| v.as_str()).unwrap_or(""),
            );
            let stored = app
                .dispatcher
                .create(&mut draft)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!(stored))
        }
        "bookmark.delete" => {
            let id = str_param(params, "id")?;
            app.dispatcher.delete(id).await.map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }

        _ => Err(format!("unknown method: {}", method)),
    }
}
