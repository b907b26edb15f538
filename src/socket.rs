//! WebSocket client for the agent backend.
//!
//! One logical connection at a time. When the socket closes or errors the
//! client waits a random delay in `[0, reconnect_jitter)` and dials again,
//! until [`SocketClient::teardown`] is called.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{ClientEnvelope, GenericMessage, QuickButton, ServerEnvelope};

/// What the connection task reports back to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Connecting,
    Connected,
    Disconnected,
    Generic(Vec<GenericMessage>),
    /// Transport-level typing hint.
    Typing,
}

#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub reconnect_jitter: Duration,
}

pub struct SocketClient {
    identity: String,
    config: SocketConfig,
    events: mpsc::UnboundedSender<SocketEvent>,
    outbound: Option<mpsc::UnboundedSender<ClientEnvelope>>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SocketClient {
    pub fn new(
        identity: String,
        config: SocketConfig,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> Self {
        Self {
            identity,
            config,
            events,
            outbound: None,
            connected: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// True while the connection task is dialing, connected, or waiting to redial.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn connect(&mut self, endpoint: &str) {
        if self.cancel.is_cancelled() {
            debug!("socket torn down, ignoring connect");
            return;
        }
        if self.is_active() {
            debug!("socket already active");
            return;
        }

        let url = endpoint_url(endpoint);
        info!(%url, "creating new websocket connection");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound = Some(outbound_tx);

        let session = Session {
            url,
            identity: self.identity.clone(),
            reconnect_jitter: self.config.reconnect_jitter,
            events: self.events.clone(),
            connected: self.connected.clone(),
            cancel: self.cancel.clone(),
        };
        self.task = Some(tokio::spawn(session.run(outbound_rx)));
    }

    pub fn send_user_message(&self, text: &str) -> bool {
        self.send(ClientEnvelope::user_message(&self.identity, text))
    }

    pub fn send_quick_reply(&self, button: &QuickButton) -> bool {
        self.send(ClientEnvelope::quick_reply(&self.identity, button))
    }

    fn send(&self, envelope: ClientEnvelope) -> bool {
        let kind = envelope.message_type();
        if !self.is_connected() {
            warn!(kind = kind.as_str(), "socket not open, dropping outgoing envelope");
            return false;
        }
        match &self.outbound {
            Some(tx) if tx.send(envelope).is_ok() => true,
            _ => {
                warn!(kind = kind.as_str(), "socket task gone, dropping outgoing envelope");
                false
            }
        }
    }

    /// Close the connection for good. No reconnect is scheduled afterwards.
    pub fn teardown(&mut self) {
        if !self.cancel.is_cancelled() {
            info!("tearing down websocket");
        }
        self.cancel.cancel();
        self.connected.store(false, Ordering::Relaxed);
        self.outbound = None;
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// `host:port/path` becomes `ws://host:port/path`; explicit schemes are kept.
pub fn endpoint_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        endpoint.to_string()
    } else {
        format!("ws://{endpoint}")
    }
}

/// Uniform delay in `[0, max)`.
pub fn reconnect_delay<R: Rng>(max: Duration, rng: &mut R) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.random_range(0..max_ms))
}

/// Map one text frame to a controller event. Malformed frames are logged and dropped.
pub fn decode_frame(text: &str) -> Option<SocketEvent> {
    match ServerEnvelope::parse(text) {
        Ok(ServerEnvelope::Message { generic: Some(units) }) => Some(SocketEvent::Generic(units)),
        Ok(ServerEnvelope::Message { generic: None }) => {
            debug!("message envelope without generic units");
            None
        }
        Ok(ServerEnvelope::Typing) => Some(SocketEvent::Typing),
        Err(err) => {
            warn!(error = %err, "dropping malformed payload");
            None
        }
    }
}

enum SessionEnd {
    Closed,
    TornDown,
}

struct Session {
    url: String,
    identity: String,
    reconnect_jitter: Duration,
    events: mpsc::UnboundedSender<SocketEvent>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Session {
    async fn run(self, mut outbound: mpsc::UnboundedReceiver<ClientEnvelope>) {
        let mut rng = StdRng::from_rng(&mut rand::rng());

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let _ = self.events.send(SocketEvent::Connecting);

            match self.run_once(&mut outbound).await {
                Ok(SessionEnd::TornDown) => break,
                Ok(SessionEnd::Closed) => info!("websocket closed"),
                Err(err) => warn!("websocket error: {err:#}"),
            }

            self.connected.store(false, Ordering::Relaxed);
            if self.events.send(SocketEvent::Disconnected).is_err() {
                break;
            }
            if self.cancel.is_cancelled() {
                break;
            }

            let delay = reconnect_delay(self.reconnect_jitter, &mut rng);
            info!(delay_ms = delay.as_millis() as u64, "reconnecting after delay");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => break,
            }
        }

        self.connected.store(false, Ordering::Relaxed);
        debug!("websocket task stopped");
    }

    async fn run_once(
        &self,
        outbound: &mut mpsc::UnboundedReceiver<ClientEnvelope>,
    ) -> Result<SessionEnd> {
        let (stream, _) = tokio::select! {
            connected = connect_async(self.url.as_str()) => connected?,
            _ = self.cancel.cancelled() => return Ok(SessionEnd::TornDown),
        };
        info!(url = %self.url, "websocket open");

        let (mut write, mut read) = stream.split();

        let hello = ClientEnvelope::hello(&self.identity).to_json()?;
        write.send(WsMessage::Text(hello)).await?;

        // Drop anything queued during the previous connection.
        while outbound.try_recv().is_ok() {}

        self.connected.store(true, Ordering::Relaxed);
        let _ = self.events.send(SocketEvent::Connected);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(SessionEnd::TornDown);
                }
                envelope = outbound.recv() => match envelope {
                    Some(envelope) => {
                        debug!(kind = envelope.message_type().as_str(), "sending envelope");
                        write.send(WsMessage::Text(envelope.to_json()?)).await?;
                    }
                    None => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        return Ok(SessionEnd::TornDown);
                    }
                },
                frame = read.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        debug!(payload = %text, "received payload");
                        if let Some(event) = decode_frame(&text) {
                            let _ = self.events.send(event);
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => write.send(WsMessage::Pong(data)).await?,
                    Some(Ok(WsMessage::Close(_))) | None => return Ok(SessionEnd::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                },
            }
        }
    }
}
