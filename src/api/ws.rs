use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::db::PriceRecord;
use crate::service::PriceService;

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Frames pushed to WebSocket listeners.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PushMessage {
    Price(PriceRecord),
    Ping { timestamp: DateTime<Utc> },
}

impl PushMessage {
    fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json)),
            Err(e) => {
                warn!("Failed to serialize push message: {}", e);
                None
            },
        }
    }
}

/// `GET /ws/prices`: stream every published price update.
pub async fn prices_ws(ws: WebSocketUpgrade, State(service): State<Arc<PriceService>>) -> Response {
    // Subscribe before the upgrade so nothing published after the request is missed
    let updates = service.subscribe();
    ws.on_upgrade(move |socket| stream_prices(socket, updates))
}

async fn stream_prices(socket: WebSocket, mut updates: broadcast::Receiver<PriceRecord>) {
    info!("WebSocket price listener connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        let outgoing = tokio::select! {
            update = updates.recv() => match update {
                Ok(record) => PushMessage::Price(record),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WebSocket listener lagged, dropped {} updates", skipped);
                    continue;
                },
                Err(RecvError::Closed) => break,
            },
            _ = ping.tick() => PushMessage::Ping { timestamp: Utc::now() },
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!("WebSocket receive error: {}", e);
                    break;
                },
                Some(Ok(_)) => continue,
            },
        };

        let Some(message) = outgoing.to_message() else {
            continue;
        };
        if ws_tx.send(message).await.is_err() {
            break;
        }
    }

    info!("WebSocket price listener disconnected");
}
