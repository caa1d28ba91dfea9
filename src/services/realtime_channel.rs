//! Realtime change channel over the backend's Phoenix websocket protocol.
//!
//! One socket per channel. The socket joins `realtime:{channel}` with a
//! `postgres_changes` config for the table, sends a heartbeat on the `phoenix`
//! topic every `heartbeat` interval, and forwards row changes and status
//! transitions to the returned [`Subscription`]. A renewed access token is
//! pushed to the server with an `access_token` frame so the channel outlives
//! the token it joined with. Releasing the subscription sends `phx_leave` and
//! closes the socket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::services::subscription::Subscription;
use crate::types::bookmark::Bookmark;
use crate::types::change::{
    ChangeEvent, ChangeFilter, ChangeKind, ChannelMessage, ChannelStatus, OldRecord,
};
use crate::types::errors::{BackendError, ChannelError};

const JOIN_REF: &str = "1";
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// One Phoenix protocol frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// Builds the websocket endpoint from the REST API URL.
pub fn websocket_url(api_url: &str, anon_key: &str) -> String {
    let base = api_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/realtime/v1/websocket?apikey={}&vsn=1.0.0", base, anon_key)
}

pub fn topic_for(channel: &str) -> String {
    format!("realtime:{}", channel)
}

pub fn join_frame(topic: &str, filter: &ChangeFilter, access_token: Option<&str>) -> PhoenixFrame {
    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [{
                "event": filter.events.as_wire(),
                "schema": filter.schema,
                "table": filter.table,
            }],
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = json!(token);
    }
    PhoenixFrame {
        topic: topic.to_string(),
        event: "phx_join".to_string(),
        payload,
        reference: Some(JOIN_REF.to_string()),
        join_ref: Some(JOIN_REF.to_string()),
    }
}

fn heartbeat_frame(reference: u64) -> PhoenixFrame {
    PhoenixFrame {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

pub fn access_token_frame(topic: &str, access_token: &str, reference: u64) -> PhoenixFrame {
    PhoenixFrame {
        topic: topic.to_string(),
        event: "access_token".to_string(),
        payload: json!({ "access_token": access_token }),
        reference: Some(reference.to_string()),
        join_ref: Some(JOIN_REF.to_string()),
    }
}

fn leave_frame(topic: &str) -> PhoenixFrame {
    PhoenixFrame {
        topic: topic.to_string(),
        event: "phx_leave".to_string(),
        payload: json!({}),
        reference: Some("leave".to_string()),
        join_ref: Some(JOIN_REF.to_string()),
    }
}

fn decode_record(value: &Value) -> Result<Option<Bookmark>, ChannelError> {
    match value {
        Value::Object(map) if !map.is_empty() => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| ChannelError::Protocol(format!("bad record: {}", e))),
        _ => Ok(None),
    }
}

fn decode_change(payload: &Value) -> Result<ChangeEvent, ChannelError> {
    let data = payload.get("data").unwrap_or(payload);
    let kind = match data.get("type").and_then(Value::as_str) {
        Some("INSERT") => ChangeKind::Insert,
        Some("UPDATE") => ChangeKind::Update,
        Some("DELETE") => ChangeKind::Delete,
        other => {
            return Err(ChannelError::Protocol(format!(
                "unknown change type: {:?}",
                other
            )))
        }
    };
    let new = decode_record(data.get("record").unwrap_or(&Value::Null))?;
    let old = data
        .get("old_record")
        .and_then(|o| o.get("id"))
        .and_then(Value::as_str)
        .map(|id| OldRecord { id: id.to_string() });
    Ok(ChangeEvent { kind, new, old })
}

/// Interprets one incoming frame for `topic`. Frames that carry nothing for
/// the subscriber (heartbeat replies, other topics) decode to `None`.
pub fn decode_frame(topic: &str, text: &str) -> Result<Option<ChannelMessage>, ChannelError> {
    let frame: PhoenixFrame = serde_json::from_str(text)
        .map_err(|e| ChannelError::Protocol(format!("bad frame: {}", e)))?;
    if frame.topic != topic {
        return Ok(None);
    }
    let message = match frame.event.as_str() {
        "phx_reply" if frame.reference.as_deref() == Some(JOIN_REF) => {
            match frame.payload.get("status").and_then(Value::as_str) {
                Some("ok") => Some(ChannelMessage::Status(ChannelStatus::Subscribed)),
                _ => Some(ChannelMessage::Status(ChannelStatus::Error(
                    frame.payload["response"].to_string(),
                ))),
            }
        }
        "postgres_changes" => Some(ChannelMessage::Change(decode_change(&frame.payload)?)),
        "phx_close" => Some(ChannelMessage::Status(ChannelStatus::Closed)),
        "phx_error" => Some(ChannelMessage::Status(ChannelStatus::Error(
            "channel crashed".to_string(),
        ))),
        "system" if frame.payload.get("status").and_then(Value::as_str) == Some("error") => {
            Some(ChannelMessage::Status(ChannelStatus::Error(
                frame.payload["message"].as_str().unwrap_or("system error").to_string(),
            )))
        }
        _ => None,
    };
    Ok(message)
}

fn encode(frame: &PhoenixFrame) -> Option<Message> {
    serde_json::to_string(frame).ok().map(|s| Message::Text(s.into()))
}

/// Connects and joins a change channel with the current access token, then
/// follows `access_token` for renewals.
pub async fn open(
    ws_url: &str,
    channel: &str,
    filter: &ChangeFilter,
    mut access_token: watch::Receiver<Option<Zeroizing<String>>>,
    heartbeat: Duration,
) -> Result<Subscription<ChannelMessage>, BackendError> {
    let (socket, _) = connect_async(ws_url)
        .await
        .map_err(|e| BackendError::Network(e.to_string()))?;
    let (mut write, mut read) = socket.split();

    let topic = topic_for(channel);
    let join = join_frame(
        &topic,
        filter,
        access_token.borrow_and_update().as_ref().map(|t| t.as_str()),
    );
    if let Some(join) = encode(&join) {
        write
            .send(join)
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
    }
    info!(channel, table = %filter.table, "joining change channel");

    let (tx, rx) = mpsc::unbounded_channel();
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut ticker = interval(heartbeat);
        ticker.tick().await;
        let mut heartbeat_ref: u64 = 1;
        let join_timeout = sleep(JOIN_TIMEOUT);
        tokio::pin!(join_timeout);
        let mut joined = false;
        let mut following_token = true;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if let Some(leave) = encode(&leave_frame(&topic)) {
                        let _ = write.send(leave).await;
                    }
                    let _ = write.close().await;
                    debug!(topic = %topic, "change channel released");
                    break;
                }
                _ = ticker.tick() => {
                    heartbeat_ref += 1;
                    if let Some(beat) = encode(&heartbeat_frame(heartbeat_ref)) {
                        if write.send(beat).await.is_err() {
                            let _ = tx.send(ChannelMessage::Status(ChannelStatus::Closed));
                            break;
                        }
                    }
                }
                renewed = access_token.changed(), if following_token => {
                    if renewed.is_err() {
                        following_token = false;
                        continue;
                    }
                    heartbeat_ref += 1;
                    let frame = access_token
                        .borrow_and_update()
                        .as_ref()
                        .map(|t| access_token_frame(&topic, t.as_str(), heartbeat_ref));
                    // Sign-out clears the token; the channel is torn down separately.
                    if let Some(message) = frame.as_ref().and_then(encode) {
                        if write.send(message).await.is_err() {
                            let _ = tx.send(ChannelMessage::Status(ChannelStatus::Closed));
                            break;
                        }
                        debug!(topic = %topic, "access token forwarded");
                    }
                }
                _ = &mut join_timeout, if !joined => {
                    warn!(topic = %topic, "change channel join timed out");
                    let _ = tx.send(ChannelMessage::Status(ChannelStatus::TimedOut));
                    break;
                }
                incoming = read.next() => {
                    let text = match incoming {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            let _ = tx.send(ChannelMessage::Status(ChannelStatus::Closed));
                            break;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            let _ = tx.send(ChannelMessage::Status(ChannelStatus::Error(e.to_string())));
                            break;
                        }
                    };
                    match decode_frame(&topic, &text) {
                        Ok(Some(message)) => {
                            let terminal = match &message {
                                ChannelMessage::Status(status) => {
                                    joined |= *status == ChannelStatus::Subscribed;
                                    status.is_terminal()
                                }
                                ChannelMessage::Change(_) => false,
                            };
                            if tx.send(message).is_err() || terminal {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!(topic = %topic, error = %e, "dropping undecodable frame"),
                    }
                }
            }
        }
    });

    Ok(Subscription::new(rx, move || {
        let _ = shutdown_tx.send(true);
    }))
}
