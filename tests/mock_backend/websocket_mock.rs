//! WebSocket mock server for the live session backend

use super::MockStats;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Something the test asks the server to do on the live connection.
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Send a JSON envelope as a text frame
    Send(Value),
    /// Send a text frame verbatim
    SendRaw(String),
    /// Send a close frame with this status
    Close { code: u16, reason: String },
    /// Drop the socket without a close frame
    Drop,
}

/// How the server reacts on its own.
#[derive(Debug, Clone)]
pub struct MockBehaviour {
    /// Answer `start_session` with `status: setup_complete`
    pub auto_setup: bool,
    /// Echo every `audio_chunk` back as model audio
    pub echo_audio: bool,
    /// Accept TCP connections but never complete the WebSocket handshake
    pub stall_handshake: bool,
}

impl Default for MockBehaviour {
    fn default() -> Self {
        Self {
            auto_setup: true,
            echo_audio: false,
            stall_handshake: false,
        }
    }
}

/// Shared server state
pub struct MockBackendState {
    pub behaviour: MockBehaviour,
    pub stats: MockStats,
    received: Mutex<Vec<Value>>,
    authorization: Mutex<Option<String>>,
    controls: Mutex<Vec<mpsc::UnboundedSender<ServerAction>>>,
}

impl MockBackendState {
    fn new(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            stats: MockStats::default(),
            received: Mutex::new(Vec::new()),
            authorization: Mutex::new(None),
            controls: Mutex::new(Vec::new()),
        }
    }
}

/// A running mock backend bound to an ephemeral local port.
pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<MockBackendState>,
    handle: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        Self::with_behaviour(MockBehaviour::default()).await
    }

    pub async fn with_behaviour(behaviour: MockBehaviour) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend address");
        let state = Arc::new(MockBackendState::new(behaviour));
        let handle = tokio::spawn(serve(listener, Arc::clone(&state)));
        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn stats(&self) -> &MockStats {
        &self.state.stats
    }

    pub fn connections(&self) -> u64 {
        self.state.stats.connections.load(Ordering::Relaxed)
    }

    /// Every envelope received so far, in order.
    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().clone()
    }

    /// Event names of every envelope received so far.
    pub fn received_events(&self) -> Vec<String> {
        self.state
            .received
            .lock()
            .iter()
            .filter_map(|e| e.get("event").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub fn count_event(&self, event: &str) -> usize {
        self.received_events().iter().filter(|e| *e == event).count()
    }

    /// Authorization header of the most recent handshake.
    pub fn authorization(&self) -> Option<String> {
        self.state.authorization.lock().clone()
    }

    /// Hand an action to the most recent connection. False if it is gone.
    pub fn push(&self, action: ServerAction) -> bool {
        let controls = self.state.controls.lock();
        match controls.last() {
            Some(control) => control.send(action).is_ok(),
            None => false,
        }
    }

    pub fn send(&self, envelope: Value) -> bool {
        self.push(ServerAction::Send(envelope))
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
        for control in self.state.controls.lock().drain(..) {
            let _ = control.send(ServerAction::Drop);
        }
    }
}

async fn serve(listener: TcpListener, state: Arc<MockBackendState>) {
    while let Ok((stream, _)) = listener.accept().await {
        let state = Arc::clone(&state);

        if state.behaviour.stall_handshake {
            tokio::spawn(async move {
                let _held = stream;
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
            continue;
        }

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                eprintln!("Mock backend connection error: {}", e);
            }
        });
    }
}

fn text(envelope: &Value) -> Message {
    Message::Text(envelope.to_string().into())
}

/// Handle a single client connection
async fn handle_connection(
    stream: TcpStream,
    state: Arc<MockBackendState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let header_state = Arc::clone(&state);
    let capture_auth = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let header = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *header_state.authorization.lock() = header;
        Ok(response)
    };

    let ws_stream = accept_hdr_async(stream, capture_auth).await?;
    let (mut write, mut read) = ws_stream.split();

    let (control_tx, mut control_rx) = mpsc::unbounded_channel();
    state.controls.lock().push(control_tx);
    state.stats.record_connection();

    loop {
        tokio::select! {
            action = control_rx.recv() => match action {
                Some(ServerAction::Send(envelope)) => {
                    state.stats.record_push();
                    write.send(text(&envelope)).await?;
                }
                Some(ServerAction::SendRaw(raw)) => {
                    state.stats.record_push();
                    write.send(Message::Text(raw.into())).await?;
                }
                Some(ServerAction::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    write.send(Message::Close(Some(frame))).await?;
                }
                Some(ServerAction::Drop) | None => break,
            },

            msg = read.next() => match msg {
                Some(Ok(Message::Text(raw))) => {
                    let Ok(envelope) = serde_json::from_str::<Value>(raw.as_str()) else {
                        state.stats.record_malformed();
                        continue;
                    };
                    state.stats.record_envelope();
                    state.received.lock().push(envelope.clone());

                    match envelope.get("event").and_then(Value::as_str) {
                        Some("start_session") if state.behaviour.auto_setup => {
                            let reply = json!({"event": "status", "data": "setup_complete"});
                            write.send(text(&reply)).await?;
                        }
                        Some("audio_chunk") if state.behaviour.echo_audio => {
                            let data = envelope.get("data").cloned().unwrap_or(Value::Null);
                            let reply = json!({"event": "audio_chunk", "data": data});
                            write.send(text(&reply)).await?;
                        }
                        _ => {}
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    write.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    eprintln!("Mock backend read error: {}", e);
                    break;
                }
                _ => {}
            },
        }
    }

    Ok(())
}
