/// Realtime channel over WebSocket.
///
/// The hosted service speaks the Phoenix channel protocol: every frame is a
/// JSON object `{topic, event, payload, ref}`. A client joins one topic per
/// group, asking for `postgres_changes` on the two tables it cares about, and
/// must send a heartbeat on the `phoenix` topic or the server drops it.

use super::{ChangeEvent, Subscription};
use crate::error::{ClientError, Result};
use crate::models::{MemberRequest, MessageRow};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// One Phoenix channel frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixFrame {
    pub fn join(topic: &str, payload: Value, reference: u64) -> Self {
        PhoenixFrame {
            topic: topic.to_string(),
            event: "phx_join".to_string(),
            payload,
            reference: Some(reference.to_string()),
        }
    }

    pub fn leave(topic: &str, reference: u64) -> Self {
        PhoenixFrame {
            topic: topic.to_string(),
            event: "phx_leave".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    pub fn heartbeat(reference: u64) -> Self {
        PhoenixFrame {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    fn to_message(&self) -> Result<Message> {
        Ok(Message::Text(serde_json::to_string(self)?.into()))
    }
}

/// Derive the realtime WebSocket endpoint from the project's HTTP base URL
pub fn endpoint(base_url: &str, api_key: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)?;

    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ClientError::ConfigError(format!(
                "Unsupported backend URL scheme: {}",
                other
            )))
        }
    };

    url.set_scheme(scheme)
        .map_err(|_| ClientError::ConfigError(format!("Cannot use {} scheme", scheme)))?;
    url.set_path("/realtime/v1/websocket");
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", api_key)
        .append_pair("vsn", "1.0.0");

    Ok(url)
}

pub fn topic_for(group_id: &str) -> String {
    format!("realtime:group-{}", group_id)
}

/// Join payload: message inserts and any join-request change, both scoped to
/// the group
pub fn join_payload(group_id: &str, access_token: &str) -> Value {
    let filter = format!("group_id=eq.{}", group_id);
    json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [
                { "event": "INSERT", "schema": "public", "table": "messages", "filter": filter },
                { "event": "*", "schema": "public", "table": "member_requests", "filter": filter }
            ]
        },
        "access_token": access_token
    })
}

/// Extract a row change from a frame, if it carries one we understand
pub fn decode_change(frame: &PhoenixFrame) -> Option<ChangeEvent> {
    match frame.event.as_str() {
        "postgres_changes" => {}
        "phx_reply" => {
            if frame.payload.get("status").and_then(Value::as_str) == Some("error") {
                log::warn!("Realtime join on {} rejected: {}", frame.topic, frame.payload);
            }
            return None;
        }
        "phx_error" => {
            log::error!("Realtime channel {} errored: {}", frame.topic, frame.payload);
            return None;
        }
        other => {
            log::debug!("Ignoring realtime event {} on {}", other, frame.topic);
            return None;
        }
    }

    let data = frame.payload.get("data")?;
    let table = data.get("table").and_then(Value::as_str)?;
    let record = data.get("record")?.clone();

    let decoded = match table {
        "messages" => serde_json::from_value::<MessageRow>(record).map(ChangeEvent::MessageInserted),
        "member_requests" => {
            serde_json::from_value::<MemberRequest>(record).map(ChangeEvent::MemberRequestChanged)
        }
        _ => return None,
    };

    match decoded {
        Ok(change) => Some(change),
        Err(e) => {
            // DELETE events carry an empty record.
            log::debug!("Skipping undecodable {} record: {}", table, e);
            None
        }
    }
}

/// Connect, join the group's topic and forward decoded changes
pub async fn subscribe(endpoint: &Url, access_token: &str, group_id: &str) -> Result<Subscription> {
    let (ws_stream, _) = connect_async(endpoint.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();

    let topic = topic_for(group_id);
    let join = PhoenixFrame::join(&topic, join_payload(group_id, access_token), 1);
    write.send(join.to_message()?).await?;
    log::info!("Joined realtime topic {}", topic);

    let (tx, rx) = mpsc::unbounded_channel::<ChangeEvent>();

    let task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut next_ref: u64 = 2;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let frame = PhoenixFrame::heartbeat(next_ref);
                    next_ref += 1;
                    let sent = match frame.to_message() {
                        Ok(message) => write.send(message).await.map_err(ClientError::from),
                        Err(e) => Err(e),
                    };
                    if let Err(e) = sent {
                        log::error!("Failed to send realtime heartbeat: {}", e);
                        break;
                    }
                }
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<PhoenixFrame>(&text) {
                            Ok(frame) => {
                                if let Some(change) = decode_change(&frame) {
                                    if tx.send(change).is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => log::warn!("Unparseable realtime frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        log::info!("Realtime connection closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::error!("Realtime WebSocket error: {}", e);
                        break;
                    }
                }
            }
        }

        if let Ok(leave) = PhoenixFrame::leave(&topic, next_ref).to_message() {
            let _ = write.send(leave).await;
        }
        let _ = write.close().await;
    });

    Ok(Subscription::new(group_id, rx, Some(task)))
}
