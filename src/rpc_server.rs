//! bookmark-sync RPC server: JSON-RPC over stdin/stdout for a UI shell.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! Request:  {"id":1, "method":"bookmark.create", "params":{"title":"...","url":"..."}}
//! Response: {"id":1, "result":{...}} or {"id":1, "error":"..."}
//! Events:   {"event":"bookmarks","bookmarks":[...]} and {"event":"notice",...}

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use bookmark_sync::app::App;
use bookmark_sync::logging;
use bookmark_sync::rpc_handler::handle_method;
use bookmark_sync::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use bookmark_sync::services::supabase_backend::SupabaseBackend;

/// Fixed one-second window request limiter.
struct RateLimiter {
    window_start: Instant,
    request_count: u32,
    max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self {
            window_start: Instant::now(),
            request_count: 0,
            max_per_second,
        }
    }

    fn check(&mut self) -> bool {
        if self.window_start.elapsed().as_secs() >= 1 {
            self.window_start = Instant::now();
            self.request_count = 0;
        }
        self.request_count += 1;
        self.request_count <= self.max_per_second
    }
}

async fn emit(out: &mut io::Stdout, value: &Value) -> io::Result<()> {
    let mut line = value.to_string();
    line.push('\n');
    out.write_all(line.as_bytes()).await?;
    out.flush().await
}

async fn respond(app: &App, limiter: &mut RateLimiter, line: &str) -> Value {
    let req: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return json!({"id": null, "error": format!("parse error: {}", e)}),
    };
    let id = req.get("id").cloned().unwrap_or(Value::Null);
    if !limiter.check() {
        return json!({"id": id, "error": "rate limit exceeded"});
    }

    let method = req.get("method").and_then(|v| v.as_str()).unwrap_or("");
    let params = req.get("params").cloned().unwrap_or(json!({}));
    match handle_method(app, method, &params).await {
        Ok(val) => json!({"id": id, "result": val}),
        Err(err) => json!({"id": id, "error": err}),
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = SettingsEngine::new(std::env::var("BOOKMARK_SYNC_CONFIG").ok());
    engine.load()?;
    engine.apply_env_overrides();
    engine.validate()?;
    let settings = engine.get_settings().clone();

    let backend = SupabaseBackend::new(&settings.backend, &settings.sync)?;
    let mut app = App::start(Arc::new(backend), settings).await?;

    let mut out = io::stdout();
    emit(&mut out, &json!({"event": "ready", "version": env!("CARGO_PKG_VERSION")})).await?;

    let mut notices = app.notices();
    let mut bookmarks = app.store.watch();
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut limiter = RateLimiter::new(200);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let response = respond(&app, &mut limiter, &line).await;
                emit(&mut out, &response).await?;
            }
            notice = notices.recv() => match notice {
                Ok(notice) => {
                    emit(&mut out, &json!({"event": "notice", "notice": notice})).await?;
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "notices dropped"),
                Err(RecvError::Closed) => {}
            },
            changed = bookmarks.changed() => {
                if changed.is_err() {
                    break;
                }
                let list = bookmarks.borrow_and_update().clone();
                emit(&mut out, &json!({"event": "bookmarks", "bookmarks": list})).await?;
            }
        }
    }

    info!("stdin closed");
    app.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "bookmark-sync-rpc failed");
            ExitCode::FAILURE
        }
    }
}
