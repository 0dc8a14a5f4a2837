//! Socket Mode: the long-lived streaming connection and the adapter consuming its events.
//!
//! The connection task only reads frames, acknowledges envelopes and forwards decoded
//! [`StreamEvent`]s; the adapter task does the (possibly slow) handling, so keep-alive traffic is
//! never stalled by event processing.

use super::api::SlackClient;
use super::events::{SocketEnvelope, StreamEvent};
use super::ingest::Ingestor;
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

/// Owns the Socket Mode WebSocket and reconnects after a fixed delay whenever it drops.
pub struct SocketModeConnection {
    client: SlackClient,
    reconnect_delay: Duration,
}

fn forward(tx: &mpsc::UnboundedSender<StreamEvent>, event: StreamEvent) -> bool {
    tx.send(event).is_ok()
}

impl SocketModeConnection {
    pub fn new(client: SlackClient, reconnect_delay: Duration) -> Self {
        Self {
            client,
            reconnect_delay,
        }
    }

    /// Spawn the connect/read loop. It stops once the event receiver is dropped.
    pub fn start(self, events_tx: mpsc::UnboundedSender<StreamEvent>) -> JoinHandle<()> {
        log::info!("slack: starting socket mode connection");
        tokio::spawn(async move { self.run(events_tx).await })
    }

    async fn run(self, events_tx: mpsc::UnboundedSender<StreamEvent>) {
        loop {
            let event = match self.client.open_socket_url().await {
                Ok(url) => match self.run_session(&url, &events_tx).await {
                    Ok(()) => None,
                    Err(e) => Some(StreamEvent::ConnectionError(format!("{:#}", e))),
                },
                Err(e) if matches!(e.api_code(), Some("invalid_auth" | "not_authed")) => {
                    Some(StreamEvent::InvalidAuth)
                }
                Err(e) => Some(StreamEvent::ConnectionError(e.to_string())),
            };
            if let Some(event) = event {
                if !forward(&events_tx, event) {
                    break;
                }
            }
            if events_tx.is_closed() {
                break;
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
        log::info!("slack: socket mode connection stopped");
    }

    async fn run_session(
        &self,
        url: &str,
        events_tx: &mpsc::UnboundedSender<StreamEvent>,
    ) -> Result<()> {
        let (stream, _response) = connect_async(url)
            .await
            .context("failed to connect socket mode websocket")?;
        let (mut sink, mut source) = stream.split();
        if !forward(events_tx, StreamEvent::Connected) {
            return Ok(());
        }

        while let Some(frame) = source.next().await {
            let frame = frame.context("failed reading socket mode frame")?;
            let text = match frame {
                WsMessage::Text(text) => text,
                WsMessage::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(e) => {
                        forward(events_tx, StreamEvent::ProtocolError(e.to_string()));
                        continue;
                    }
                },
                WsMessage::Close(frame) => {
                    log::info!("slack: socket closed by server: {:?}", frame);
                    return Ok(());
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
            };

            let envelope = match SocketEnvelope::decode(&text) {
                Ok(envelope) => envelope,
                Err(e) => {
                    if !forward(events_tx, StreamEvent::ProtocolError(e.to_string())) {
                        return Ok(());
                    }
                    continue;
                }
            };

            if let Some(id) = envelope.envelope_id.as_deref() {
                let ack = json!({ "envelope_id": id }).to_string();
                sink.send(WsMessage::Text(ack))
                    .await
                    .context("failed to acknowledge socket mode envelope")?;
            }

            if envelope.is_disconnect() {
                log::info!(
                    "slack: server requested reconnect ({})",
                    envelope.reason.as_deref().unwrap_or("no reason")
                );
                return Ok(());
            }

            if !forward(events_tx, envelope.into_event()) {
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Consumes streaming events in order: cache rebuilds, membership upkeep and message ingestion.
pub struct StreamingAdapter {
    ingestor: Ingestor,
    fetch_user_groups: bool,
}

impl StreamingAdapter {
    /// User groups are only fetched when `fetch_user_groups` (a workspace token is configured).
    pub fn new(ingestor: Ingestor, fetch_user_groups: bool) -> Self {
        Self {
            ingestor,
            fetch_user_groups,
        }
    }

    pub fn start(self, events_rx: mpsc::UnboundedReceiver<StreamEvent>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(events_rx).await })
    }

    pub async fn run(self, mut events_rx: mpsc::UnboundedReceiver<StreamEvent>) {
        while let Some(event) = events_rx.recv().await {
            self.handle_event(event).await;
        }
        log::debug!("slack: streaming adapter stopped");
    }

    pub async fn handle_event(&self, event: StreamEvent) {
        match event {
            StreamEvent::Connected => {
                self.ingestor
                    .directory()
                    .rebuild(self.ingestor.api(), self.fetch_user_groups)
                    .await;
                log::info!("slack: socket mode connection established");
            }
            StreamEvent::Hello => {}
            StreamEvent::Message(ev) => self.ingestor.handle_message(ev).await,
            StreamEvent::MemberJoined(m) => self.ingestor.handle_member_joined(m).await,
            StreamEvent::MemberLeft(m) => self.ingestor.handle_member_left(m),
            StreamEvent::ProtocolError(e) => log::error!("slack: protocol error: {}", e),
            StreamEvent::ConnectionError(e) => log::error!("slack: connection error: {}", e),
            StreamEvent::InvalidAuth => {
                log::error!("slack: invalid authorization; double check the app and bot tokens")
            }
            StreamEvent::Unhandled { kind } => log::debug!("slack: unhandled event '{}'", kind),
        }
    }
}
