//! Transport channel.
//!
//! Owns one persistent WebSocket link to the backend and reports lifecycle as
//! [`TransportSignal`]s on an unbounded channel. The coordinating client is the
//! only consumer.
//!
//! Every physical connection gets an epoch. The link state and the epoch are
//! checked under one lock before any signal is emitted, so a connect attempt
//! that resolves after `close` (or an I/O task of a superseded connection)
//! never produces `Opened`, `Frame` or `Closed`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use http::header::AUTHORIZATION;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use super::base::{ConnectError, ConnectionState, SendRejectReason};

/// Close code used for a local, normal close.
pub const DEFAULT_CLOSE_CODE: u16 = 1000;
/// Close reason used for a local, normal close.
pub const DEFAULT_CLOSE_REASON: &str = "Client initiated disconnect";
/// Code reported when the link dropped without a close frame.
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;
/// Code reported when a close frame carried no status.
const NO_STATUS_CODE: u16 = 1005;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingConnect = Shared<BoxFuture<'static, Result<(), ConnectError>>>;

/// Lifecycle and data signals produced by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// A new connection attempt started
    Connecting,
    /// The connection is open
    Opened,
    /// Raw inbound frame (text or binary), not yet decoded
    Frame(Bytes),
    /// The connection closed
    Closed {
        code: u16,
        reason: String,
        was_clean: bool,
        /// True when the close was requested locally
        explicit: bool,
    },
    /// Transport-level failure detail
    Error(String),
}

/// A full-duplex message channel to the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `url`.
    ///
    /// Resolves immediately when already connected. Concurrent calls while an
    /// attempt is pending share that attempt's outcome.
    async fn open(&self, url: &str) -> Result<(), ConnectError>;

    /// Close the connection locally. Safe in any state, including mid-connect.
    fn close(&self, code: u16, reason: &str);

    /// Queue one text frame for sending. Fails fast when not connected.
    fn send(&self, text: String) -> Result<(), SendRejectReason>;

    /// Current link state.
    fn connection_state(&self) -> ConnectionState;
}

enum Link {
    Idle,
    Connecting {
        epoch: u64,
        attempt: PendingConnect,
        abort: AbortHandle,
    },
    Connected {
        epoch: u64,
        outbound: mpsc::UnboundedSender<Message>,
    },
}

struct TransportInner {
    signals: mpsc::UnboundedSender<TransportSignal>,
    connect_timeout: Duration,
    auth_token: Option<Zeroizing<String>>,
    epoch: AtomicU64,
    link: Mutex<Link>,
}

impl TransportInner {
    fn signal(&self, signal: TransportSignal) {
        if self.signals.send(signal).is_err() {
            debug!("Transport signal dropped, receiver gone");
        }
    }

    /// Emit `signal` only if `epoch` is the live connection.
    fn signal_if_current(&self, epoch: u64, signal: TransportSignal) {
        let link = self.link.lock();
        if matches!(&*link, Link::Connected { epoch: current, .. } if *current == epoch) {
            self.signal(signal);
        } else {
            debug!(epoch, "Discarding signal from stale connection");
        }
    }
}

/// [`Transport`] over `tokio-tungstenite`.
#[derive(Clone)]
pub struct WebSocketTransport {
    inner: Arc<TransportInner>,
}

impl WebSocketTransport {
    /// Create a transport and the receiver for its signals.
    pub fn new(
        connect_timeout: Duration,
        auth_token: Option<String>,
    ) -> (Self, mpsc::UnboundedReceiver<TransportSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            inner: Arc::new(TransportInner {
                signals: tx,
                connect_timeout,
                auth_token: auth_token.map(Zeroizing::new),
                epoch: AtomicU64::new(0),
                link: Mutex::new(Link::Idle),
            }),
        };
        (transport, rx)
    }

    /// Epoch of the most recent physical connection attempt.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    async fn connect(
        inner: Arc<TransportInner>,
        url: String,
        epoch: u64,
    ) -> Result<(), ConnectError> {
        let result = Self::handshake(&inner, &url).await;

        let ws = match result {
            Ok(ws) => ws,
            Err(e) => {
                let mut link = inner.link.lock();
                if matches!(&*link, Link::Connecting { epoch: current, .. } if *current == epoch) {
                    *link = Link::Idle;
                    error!(epoch, url = %url, "Connection failed: {}", e);
                    inner.signal(TransportSignal::Error(e.to_string()));
                }
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut link = inner.link.lock();
            if !matches!(&*link, Link::Connecting { epoch: current, .. } if *current == epoch) {
                debug!(epoch, "Connection resolved after being abandoned, dropping it");
                return Err(ConnectError::Aborted);
            }
            *link = Link::Connected {
                epoch,
                outbound: tx,
            };
            inner.signal(TransportSignal::Opened);
        }

        info!(epoch, url = %url, "Connected to live session backend");
        tokio::spawn(Self::run_io(inner, epoch, ws, rx));
        Ok(())
    }

    async fn handshake(inner: &TransportInner, url: &str) -> Result<WsStream, ConnectError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ConnectError::InvalidAddress(e.to_string()))?;

        if let Some(token) = &inner.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                .map_err(|e| ConnectError::InvalidAddress(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        match tokio::time::timeout(
            inner.connect_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        {
            Ok(Ok((ws, _response))) => Ok(ws),
            Ok(Err(e)) => Err(ConnectError::Handshake(e.to_string())),
            Err(_) => Err(ConnectError::Timeout(inner.connect_timeout.as_secs())),
        }
    }

    async fn run_io(
        inner: Arc<TransportInner>,
        epoch: u64,
        ws: WsStream,
        mut outbound: mpsc::UnboundedReceiver<Message>,
    ) {
        let (mut sink, mut stream) = ws.split();

        let (code, reason, was_clean) = loop {
            tokio::select! {
                message = outbound.recv() => match message {
                    Some(message) => {
                        if let Err(e) = sink.send(message).await {
                            error!(epoch, "Failed to send WebSocket message: {}", e);
                            inner.signal_if_current(epoch, TransportSignal::Error(e.to_string()));
                            break (ABNORMAL_CLOSE_CODE, String::new(), false);
                        }
                    }
                    // Sender dropped: the link was closed or replaced locally.
                    None => {
                        let _ = sink.close().await;
                        break (DEFAULT_CLOSE_CODE, String::new(), true);
                    }
                },

                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        inner.signal_if_current(
                            epoch,
                            TransportSignal::Frame(Bytes::copy_from_slice(text.as_bytes())),
                        );
                    }
                    Some(Ok(Message::Binary(data))) => {
                        inner.signal_if_current(epoch, TransportSignal::Frame(data));
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            warn!(epoch, "Failed to answer ping: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                            .unwrap_or((NO_STATUS_CODE, String::new()));
                        debug!(epoch, code, "Close frame received");
                        break (code, reason, true);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(epoch, "WebSocket read error: {}", e);
                        inner.signal_if_current(epoch, TransportSignal::Error(e.to_string()));
                        break (ABNORMAL_CLOSE_CODE, String::new(), false);
                    }
                    None => break (ABNORMAL_CLOSE_CODE, String::new(), false),
                },
            }
        };

        let mut link = inner.link.lock();
        if matches!(&*link, Link::Connected { epoch: current, .. } if *current == epoch) {
            *link = Link::Idle;
            info!(epoch, code, reason = %reason, "Connection closed by peer");
            inner.signal(TransportSignal::Closed {
                code,
                reason,
                was_clean,
                explicit: false,
            });
        } else {
            debug!(epoch, "I/O task finished after local close");
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<(), ConnectError> {
        let attempt = {
            let mut link = self.inner.link.lock();
            match &*link {
                Link::Connected { .. } => return Ok(()),
                Link::Connecting { attempt, .. } => attempt.clone(),
                Link::Idle => {
                    let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!(epoch, url, "Opening connection");

                    let handle = tokio::spawn(Self::connect(
                        Arc::clone(&self.inner),
                        url.to_string(),
                        epoch,
                    ));
                    let abort = handle.abort_handle();
                    let attempt = async move {
                        match handle.await {
                            Ok(result) => result,
                            Err(_) => Err(ConnectError::Aborted),
                        }
                    }
                    .boxed()
                    .shared();

                    *link = Link::Connecting {
                        epoch,
                        attempt: attempt.clone(),
                        abort,
                    };
                    self.inner.signal(TransportSignal::Connecting);
                    attempt
                }
            }
        };

        attempt.await
    }

    fn close(&self, code: u16, reason: &str) {
        let mut link = self.inner.link.lock();
        match std::mem::replace(&mut *link, Link::Idle) {
            Link::Idle => debug!("close ignored, no connection"),
            Link::Connecting { epoch, abort, .. } => {
                info!(epoch, "Abandoning pending connection attempt");
                abort.abort();
                self.inner.signal(TransportSignal::Closed {
                    code,
                    reason: reason.to_string(),
                    was_clean: false,
                    explicit: true,
                });
            }
            Link::Connected { epoch, outbound } => {
                info!(epoch, code, reason, "Closing connection");
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.to_string().into(),
                };
                if outbound.send(Message::Close(Some(frame))).is_err() {
                    debug!(epoch, "I/O task already gone");
                }
                self.inner.signal(TransportSignal::Closed {
                    code,
                    reason: reason.to_string(),
                    was_clean: true,
                    explicit: true,
                });
            }
        }
    }

    fn send(&self, text: String) -> Result<(), SendRejectReason> {
        let link = self.inner.link.lock();
        match &*link {
            Link::Connected { outbound, .. } => outbound
                .send(Message::Text(text.into()))
                .map_err(|_| SendRejectReason::NotConnected),
            _ => Err(SendRejectReason::NotConnected),
        }
    }

    fn connection_state(&self) -> ConnectionState {
        match &*self.inner.link.lock() {
            Link::Idle => ConnectionState::Disconnected,
            Link::Connecting { .. } => ConnectionState::Connecting,
            Link::Connected { .. } => ConnectionState::Connected,
        }
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("state", &self.connection_state())
            .field("epoch", &self.epoch())
            .field("connect_timeout", &self.inner.connect_timeout)
            .finish()
    }
}
