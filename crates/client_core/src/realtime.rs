//! Insert notifications for `votes` and `script_ideas`.
//!
//! Delivery is best effort and at least once; consumers must treat every
//! notification as "re-fetch", never as a delta to apply.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use shared::protocol::{ChangeNotification, ChangeTable, RealtimeFrame};
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use url::Url;

use crate::config::BackendCredentials;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REALTIME_PROTOCOL_VERSION: &str = "1.0.0";
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Anything that can hand out change-notification receivers.
pub trait ChangeSource: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<ChangeNotification>;
}

/// In-process source; notifications are pushed by the owner.
pub struct LocalChangeSource {
    events: broadcast::Sender<ChangeNotification>,
}

impl Default for LocalChangeSource {
    fn default() -> Self {
        let (events, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { events }
    }
}

impl LocalChangeSource {
    pub fn publish(&self, notification: ChangeNotification) -> usize {
        self.events.send(notification).unwrap_or(0)
    }
}

impl ChangeSource for LocalChangeSource {
    fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.events.subscribe()
    }
}

/// Websocket subscription to the hosted realtime endpoint. Reconnects with a
/// fixed delay until dropped.
pub struct RealtimeChangeFeed {
    events: broadcast::Sender<ChangeNotification>,
    task: JoinHandle<()>,
}

impl RealtimeChangeFeed {
    pub fn spawn(credentials: &BackendCredentials) -> Result<Self> {
        let url = realtime_socket_url(credentials)?;
        Ok(Self::spawn_at(url, credentials.anon_key.clone()))
    }

    pub fn spawn_at(url: Url, access_token: String) -> Self {
        let (events, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let sender = events.clone();
        let task = tokio::spawn(async move {
            loop {
                match run_session(&url, &access_token, &sender).await {
                    Ok(()) => info!("realtime: socket closed; reconnecting"),
                    Err(err) => warn!("realtime: session failed: {err:#}"),
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });
        Self { events, task }
    }
}

impl ChangeSource for RealtimeChangeFeed {
    fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.events.subscribe()
    }
}

impl Drop for RealtimeChangeFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_session(
    url: &Url,
    access_token: &str,
    events: &broadcast::Sender<ChangeNotification>,
) -> Result<()> {
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("failed to connect realtime socket: {}", redacted(url)))?;
    let (mut ws_writer, mut ws_reader) = ws_stream.split();

    let mut next_ref: u64 = 0;
    for table in ChangeTable::ALL {
        next_ref += 1;
        let frame = join_frame(table, access_token, next_ref);
        ws_writer
            .send(Message::Text(serde_json::to_string(&frame)?))
            .await
            .with_context(|| format!("failed to join realtime channel {}", table.as_str()))?;
    }
    info!("realtime: joined channels for votes and script_ideas");

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                next_ref += 1;
                let frame = heartbeat_frame(next_ref);
                ws_writer
                    .send(Message::Text(serde_json::to_string(&frame)?))
                    .await
                    .context("failed to send realtime heartbeat")?;
            }
            msg = ws_reader.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(notification) = parse_change(&text) {
                        let _ = events.send(notification);
                    } else if let Some(reason) = join_error(&text) {
                        warn!("realtime: channel rejected subscription: {reason}");
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(anyhow!(err).context("realtime socket error")),
            }
        }
    }
}

pub fn realtime_socket_url(credentials: &BackendCredentials) -> Result<Url> {
    let mut url = credentials.url.clone();
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(anyhow!("backend url must be http(s), got '{other}'")),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("failed to switch backend url to {scheme}"))?;
    url.set_path("/realtime/v1/websocket");
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", &credentials.anon_key)
        .append_pair("vsn", REALTIME_PROTOCOL_VERSION);
    Ok(url)
}

fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

pub fn topic_for(table: ChangeTable) -> String {
    format!("realtime:{}", table.as_str())
}

pub fn join_frame(table: ChangeTable, access_token: &str, reference: u64) -> RealtimeFrame {
    RealtimeFrame {
        topic: topic_for(table),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": {"ack": false, "self": false},
                "presence": {"key": ""},
                "postgres_changes": [
                    {"event": "INSERT", "schema": "public", "table": table.as_str()}
                ],
                "private": false
            },
            "access_token": access_token
        }),
        reference: Some(reference.to_string()),
    }
}

pub fn heartbeat_frame(reference: u64) -> RealtimeFrame {
    RealtimeFrame {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

/// Extracts an insert notification from a raw frame; anything else is `None`.
pub fn parse_change(text: &str) -> Option<ChangeNotification> {
    let frame: RealtimeFrame = serde_json::from_str(text).ok()?;
    if frame.event != "postgres_changes" {
        return None;
    }
    let data = frame.payload.get("data").unwrap_or(&Value::Null);
    if let Some(kind) = data.get("type").and_then(Value::as_str) {
        if !kind.eq_ignore_ascii_case("INSERT") {
            return None;
        }
    }
    let table = data
        .get("table")
        .and_then(Value::as_str)
        .and_then(ChangeTable::from_table_name)
        .or_else(|| {
            frame
                .topic
                .strip_prefix("realtime:")
                .and_then(ChangeTable::from_table_name)
        })?;
    let record = data.get("record").filter(|v| !v.is_null()).cloned();
    Some(ChangeNotification { table, record })
}

fn join_error(text: &str) -> Option<String> {
    let frame: RealtimeFrame = serde_json::from_str(text).ok()?;
    if frame.event != "phx_reply" {
        return None;
    }
    if frame.payload.get("status").and_then(Value::as_str) != Some("error") {
        return None;
    }
    Some(format!("{} {}", frame.topic, frame.payload["response"]))
}

#[cfg(test)]
#[path = "tests/realtime_tests.rs"]
mod tests;
