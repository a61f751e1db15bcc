use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use shared_config::AppConfig;

use crate::error::StoreError;

pub type ChangeReceiver = broadcast::Receiver<()>;

const FEED_CAPACITY: usize = 64;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const WATCHED_TABLES: [&str; 2] = ["appointments", "patients"];

/// Payload-less "something changed, refetch" signal shared by stores and
/// snapshot owners.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<()>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> ChangeReceiver {
        self.sender.subscribe()
    }

    pub fn notify(&self) {
        // No subscribers is fine: nobody holds a snapshot yet.
        let _ = self.sender.send(());
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Listens to Supabase Realtime `postgres_changes` for the tenant's rows and
/// forwards each one to a [`ChangeFeed`].
pub struct RealtimeListener {
    socket_url: String,
    access_token: String,
    tenant: String,
    feed: ChangeFeed,
    heartbeat_interval: Duration,
    reconnect_delay: Duration,
}

impl RealtimeListener {
    pub fn new(config: &AppConfig, feed: ChangeFeed) -> Option<Self> {
        let socket_url = socket_url(&config.supabase_url, &config.supabase_anon_key)?;

        Some(Self {
            socket_url,
            access_token: config.store_api_key().to_string(),
            tenant: config.clinic_tenant.clone(),
            feed,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            reconnect_delay: RECONNECT_DELAY,
        })
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        loop {
            match self.session().await {
                Ok(()) => info!("Realtime socket closed, reconnecting"),
                Err(e) => warn!("Realtime session failed: {}", e),
            }

            // A missed event during the gap is covered by forcing a refetch.
            self.feed.notify();
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn session(&self) -> Result<(), StoreError> {
        let (mut socket, _) = connect_async(self.socket_url.as_str())
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        info!("Realtime connected for tenant {}", self.tenant);

        let mut next_ref: u64 = 1;
        let join = join_message(&self.tenant, &self.access_token, next_ref);
        socket
            .send(Message::text(join.to_string()))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    next_ref += 1;
                    socket
                        .send(Message::text(heartbeat_message(next_ref).to_string()))
                        .await
                        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                }
                frame = socket.next() => match frame {
                    Some(Ok(Message::Text(text))) => match classify_frame(&text) {
                        FrameKind::Change => {
                            debug!("Realtime change received");
                            self.feed.notify();
                        }
                        FrameKind::JoinRejected(reason) => {
                            return Err(StoreError::Unavailable(format!("channel join rejected: {}", reason)));
                        }
                        FrameKind::Other => {}
                    },
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(StoreError::Unavailable(e.to_string())),
                }
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum FrameKind {
    Change,
    JoinRejected(String),
    Other,
}

fn classify_frame(text: &str) -> FrameKind {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        return FrameKind::Other;
    };

    match frame.get("event").and_then(Value::as_str) {
        Some("postgres_changes") => FrameKind::Change,
        Some("phx_reply") => {
            let payload = &frame["payload"];
            if payload.get("status").and_then(Value::as_str) == Some("error") {
                FrameKind::JoinRejected(payload["response"].to_string())
            } else {
                FrameKind::Other
            }
        }
        _ => FrameKind::Other,
    }
}

pub fn socket_url(base_url: &str, apikey: &str) -> Option<String> {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        return None;
    };

    Some(format!(
        "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
        ws_base,
        urlencoding::encode(apikey)
    ))
}

pub fn channel_topic(tenant: &str) -> String {
    format!("realtime:clinic-{}", tenant)
}

pub fn join_message(tenant: &str, access_token: &str, message_ref: u64) -> Value {
    let filter = format!("tenant_id=eq.{}", tenant);
    let changes: Vec<Value> = WATCHED_TABLES
        .iter()
        .map(|table| json!({
            "event": "*",
            "schema": "public",
            "table": table,
            "filter": filter,
        }))
        .collect();

    json!({
        "topic": channel_topic(tenant),
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": changes,
            },
            "access_token": access_token,
        },
        "ref": message_ref.to_string(),
        "join_ref": message_ref.to_string(),
    })
}

pub fn heartbeat_message(message_ref: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": message_ref.to_string(),
    })
}
