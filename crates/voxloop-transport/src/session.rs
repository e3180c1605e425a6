use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use voxloop_core::config::LiveConfig;
use voxloop_core::{EncodedAudioChunk, InboundEvent};

use crate::wire::{RealtimeInputMessage, ServerMessage, SetupMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

enum Outbound {
    Audio(EncodedAudioChunk),
    Close,
}

// ── LiveSender ────────────────────────────────────────────────

/// Sending half handed to the capture pipeline.
#[derive(Clone)]
pub struct LiveSender {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl LiveSender {
    /// Best-effort, no delivery acknowledgment. Chunks sent before the
    /// session is established are queued by the session task; chunks
    /// sent after it ended are dropped.
    pub fn send_audio(&self, chunk: EncodedAudioChunk) {
        let _ = self.tx.send(Outbound::Audio(chunk));
    }
}

// ── LiveSession ───────────────────────────────────────────────

/// One bidirectional streaming session to the remote service. The
/// connection work runs on a spawned task; establishment is signaled
/// by `InboundEvent::Opened` on the event stream, not by `open`
/// returning.
pub struct LiveSession {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    event_rx: Option<mpsc::UnboundedReceiver<InboundEvent>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl LiveSession {
    pub fn open(config: LiveConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_session(config, outbound_rx, event_tx));

        Self {
            outbound_tx,
            event_rx: Some(event_rx),
            task: Some(task),
        }
    }

    pub fn sender(&self) -> LiveSender {
        LiveSender {
            tx: self.outbound_tx.clone(),
        }
    }

    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<InboundEvent>> {
        self.event_rx.take()
    }

    /// Ask the session task to close the socket. Safe to call
    /// repeatedly, and before establishment.
    pub fn close(&self) {
        let _ = self.outbound_tx.send(Outbound::Close);
    }

    /// Close, then wait briefly for the session task to wind down.
    pub async fn shutdown(&mut self) {
        self.close();
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task)
                .await
                .is_err()
            {
                tracing::warn!("session task did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

// ── Session task ──────────────────────────────────────────────

fn fail(event_tx: &mpsc::UnboundedSender<InboundEvent>, message: String) {
    tracing::error!("{}", message);
    let _ = event_tx.send(InboundEvent::Error(message));
    let _ = event_tx.send(InboundEvent::Closed);
}

async fn run_session(
    config: LiveConfig,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    event_tx: mpsc::UnboundedSender<InboundEvent>,
) {
    // The key rides in the query string; log the endpoint only
    let url = format!("{}?key={}", config.endpoint, config.api_key);
    tracing::debug!(endpoint = %config.endpoint, "connecting");

    let mut socket = match tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str())).await
    {
        Ok(Ok((socket, _response))) => socket,
        Ok(Err(e)) => {
            fail(&event_tx, format!("connect failed: {}", e));
            return;
        }
        Err(_) => {
            fail(&event_tx, "connect timed out".to_string());
            return;
        }
    };

    let setup = match serde_json::to_string(&SetupMessage::new(&config.model)) {
        Ok(text) => text,
        Err(e) => {
            fail(&event_tx, format!("setup serialization failed: {}", e));
            return;
        }
    };
    if let Err(e) = socket.send(Message::Text(setup)).await {
        fail(&event_tx, format!("setup send failed: {}", e));
        return;
    }

    let mut established = false;
    let mut queued: Vec<EncodedAudioChunk> = Vec::new();

    loop {
        tokio::select! {
            incoming = socket.next() => {
                match incoming {
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "server closed the session");
                        let _ = event_tx.send(InboundEvent::Closed);
                        return;
                    }
                    Some(Ok(message)) => {
                        let was_established = established;
                        for event in parse_events(message) {
                            if matches!(event, InboundEvent::Opened) {
                                established = true;
                            }
                            if event_tx.send(event).is_err() {
                                // Receiver gone — nobody is listening anymore
                                let _ = socket.close(None).await;
                                return;
                            }
                        }
                        if established && !was_established {
                            tracing::info!("session established");
                            for chunk in queued.drain(..) {
                                if let Err(e) = send_chunk(&mut socket, &chunk).await {
                                    fail(&event_tx, e);
                                    return;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        fail(&event_tx, format!("stream error: {}", e));
                        return;
                    }
                    None => {
                        let _ = event_tx.send(InboundEvent::Closed);
                        return;
                    }
                }
            }
            command = outbound_rx.recv() => {
                match command {
                    Some(Outbound::Audio(chunk)) => {
                        if established {
                            if let Err(e) = send_chunk(&mut socket, &chunk).await {
                                fail(&event_tx, e);
                                return;
                            }
                        } else {
                            queued.push(chunk);
                        }
                    }
                    Some(Outbound::Close) | None => {
                        // Command sender dropped counts as a close request
                        if let Err(e) = socket.close(None).await {
                            tracing::debug!("close handshake: {}", e);
                        }
                        let _ = event_tx.send(InboundEvent::Closed);
                        return;
                    }
                }
            }
        }
    }
}

async fn send_chunk(socket: &mut WsStream, chunk: &EncodedAudioChunk) -> Result<(), String> {
    let message = RealtimeInputMessage::from_chunk(chunk);
    let text =
        serde_json::to_string(&message).map_err(|e| format!("chunk serialization failed: {}", e))?;
    socket
        .send(Message::Text(text))
        .await
        .map_err(|e| format!("chunk send failed: {}", e))
}

fn parse_events(message: Message) -> Vec<InboundEvent> {
    let text = match message {
        Message::Text(text) => text,
        // The service is free to deliver JSON in binary frames
        Message::Binary(bytes) => match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                tracing::warn!("binary frame was not utf-8, ignoring");
                return Vec::new();
            }
        },
        // Ping/pong are answered by the library
        _ => return Vec::new(),
    };

    match serde_json::from_str::<ServerMessage>(&text) {
        Ok(parsed) => parsed.into_events(),
        Err(e) => {
            tracing::warn!("unparseable server message: {}", e);
            Vec::new()
        }
    }
}
