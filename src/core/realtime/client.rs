//! Live session client.
//!
//! [`LiveSessionClient`] wires the transport, codec, dispatcher, state machine
//! and audio framer together. All state-machine mutations happen on one
//! coordinating task that consumes transport signals and host commands in
//! order; host commands reply through `oneshot` channels.
//!
//! ```text
//! transport signals ──┐
//!                     ├──> SessionCore (single writer) ──> dispatcher ──> host handlers
//! host commands ──────┘            │
//!                                  └──> codec ──> transport
//! ```
//!
//! Handlers run synchronously on the coordinating task. They must not block;
//! to call back into the client from a handler, spawn a task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::audio::{AudioChunk, AudioStreamFramer, FramerStats};
use super::base::{
    ConnectionState, RealtimeError, RealtimeResult, SendRejectReason, SendRejected, SessionState,
    Speaker, Turn,
};
use super::codec::{self, Envelope};
use super::dispatcher::{
    Diagnostic, EventArgs, EventDispatcher, HandlerId, HandlerResult, LifecycleSignal, events,
};
use super::session::{SessionStateMachine, SessionView};
use super::transport::{
    DEFAULT_CLOSE_CODE, DEFAULT_CLOSE_REASON, Transport, TransportSignal, WebSocketTransport,
};
use crate::config::ClientConfig;
use crate::core::recording::SessionRecorder;

/// Point-in-time view of the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub turn: Turn,
    pub session_id: Option<String>,
    pub connection: ConnectionState,
}

/// Construction options for [`LiveSessionClient::new`].
#[derive(Debug)]
pub struct ClientOptions {
    /// Backend WebSocket address
    pub url: String,
    /// Optional per-session audio recorder
    pub recorder: Option<SessionRecorder>,
}

impl ClientOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: SessionRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }
}

enum Command {
    StartSession {
        custom_params: HashMap<String, Value>,
        reply: oneshot::Sender<RealtimeResult<String>>,
    },
    EndSession {
        reply: oneshot::Sender<()>,
    },
    SendChunk {
        chunk: AudioChunk,
        reply: oneshot::Sender<Result<(), SendRejected>>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Settle {
        reply: oneshot::Sender<()>,
    },
}

/// Session protocol client over one transport.
pub struct LiveSessionClient<T: Transport + 'static> {
    url: String,
    transport: Arc<T>,
    dispatcher: Arc<EventDispatcher>,
    framer: Arc<AudioStreamFramer>,
    view: Arc<RwLock<SessionView>>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl LiveSessionClient<WebSocketTransport> {
    /// Build a WebSocket client from configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        let (transport, signals) = WebSocketTransport::new(
            Duration::from_secs(config.connect_timeout_seconds),
            config.auth_token.clone(),
        );

        let mut options = ClientOptions::new(config.url.clone());
        if config.recording.enabled {
            options = options.with_recorder(SessionRecorder::new(
                config.recording.directory.clone(),
                config.input_sample_rate,
                config.output_sample_rate,
            ));
        }

        Self::new(transport, signals, options)
    }
}

impl<T: Transport + 'static> LiveSessionClient<T> {
    /// Create a client and spawn its coordinating task.
    ///
    /// `signals` must be the receiver paired with `transport`. Must be called
    /// from within a Tokio runtime.
    pub fn new(
        transport: T,
        signals: mpsc::UnboundedReceiver<TransportSignal>,
        options: ClientOptions,
    ) -> Self {
        let transport = Arc::new(transport);
        let dispatcher = Arc::new(EventDispatcher::new());
        let framer = Arc::new(AudioStreamFramer::new());
        let machine = SessionStateMachine::new(Arc::clone(&dispatcher), Arc::clone(&framer));
        let view = machine.view();
        let (commands, command_rx) = mpsc::unbounded_channel();

        let core = SessionCore {
            transport: Arc::clone(&transport),
            machine,
            dispatcher: Arc::clone(&dispatcher),
            framer: Arc::clone(&framer),
            recorder: options.recorder,
        };
        let task = tokio::spawn(core.run(signals, command_rx));

        Self {
            url: options.url,
            transport,
            dispatcher,
            framer,
            view,
            commands,
            task,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    // -------------------------------------------------------------------------
    // Handler registration
    // -------------------------------------------------------------------------

    /// Register a handler for a lifecycle, session or inbound event.
    /// See [`events`] for the names.
    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&EventArgs) -> HandlerResult + Send + Sync + 'static,
    {
        self.dispatcher.on(event, handler)
    }

    pub fn off(&self, id: HandlerId) -> bool {
        self.dispatcher.off(id)
    }

    /// Register the playback sink for decoded inbound audio.
    pub fn on_inbound_chunk<F>(&self, handler: F)
    where
        F: Fn(&AudioChunk) + Send + Sync + 'static,
    {
        self.framer.on_inbound_chunk(handler);
    }

    /// Register the playback sink for the end-of-audio control.
    pub fn on_end_of_audio<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.framer.on_end_of_audio(handler);
    }

    // -------------------------------------------------------------------------
    // Connection
    // -------------------------------------------------------------------------

    /// Open the connection. Idempotent while connected or connecting.
    pub async fn connect(&self) -> RealtimeResult<()> {
        self.transport.open(&self.url).await?;
        Ok(())
    }

    /// Close the connection with code 1000.
    pub fn disconnect(&self) {
        self.disconnect_with(DEFAULT_CLOSE_CODE, DEFAULT_CLOSE_REASON);
    }

    pub fn disconnect_with(&self, code: u16, reason: &str) {
        self.transport.close(code, reason);
    }

    // -------------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------------

    /// Start a session. Returns the generated session id.
    pub async fn start_session(
        &self,
        custom_params: HashMap<String, Value>,
    ) -> RealtimeResult<String> {
        self.request(|reply| Command::StartSession {
            custom_params,
            reply,
        })
        .await?
    }

    /// End the current session. A no-op when none is starting or active.
    pub async fn end_session(&self) -> RealtimeResult<()> {
        self.request(|reply| Command::EndSession { reply }).await
    }

    /// Send one audio chunk. Rejected unless the session is active.
    pub async fn send_chunk(&self, chunk: impl Into<AudioChunk>) -> RealtimeResult<()> {
        let chunk = chunk.into();
        self.request(|reply| Command::SendChunk { chunk, reply })
            .await?
            .map_err(RealtimeError::from)
    }

    /// Reset the session to `none`. Does not touch the connection.
    pub async fn reset(&self) -> RealtimeResult<()> {
        self.request(|reply| Command::Reset { reply }).await
    }

    /// Wait until every transport signal received so far has been applied,
    /// then return a snapshot.
    pub async fn settle(&self) -> RealtimeResult<SessionSnapshot> {
        self.request(|reply| Command::Settle { reply }).await?;
        Ok(self.snapshot())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let view = self.view.read().clone();
        SessionSnapshot {
            state: view.state,
            turn: view.turn,
            session_id: view.session_id,
            connection: self.transport.connection_state(),
        }
    }

    pub fn framer_stats(&self) -> FramerStats {
        self.framer.stats()
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> RealtimeResult<R> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| RealtimeError::ClientClosed)?;
        rx.await.map_err(|_| RealtimeError::ClientClosed)
    }
}

impl<T: Transport + 'static> std::fmt::Debug for LiveSessionClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSessionClient")
            .field("url", &self.url)
            .field("snapshot", &self.snapshot())
            .field("running", &!self.task.is_finished())
            .finish()
    }
}

// =============================================================================
// Coordinating task
// =============================================================================

struct SessionCore<T: Transport> {
    transport: Arc<T>,
    machine: SessionStateMachine,
    dispatcher: Arc<EventDispatcher>,
    framer: Arc<AudioStreamFramer>,
    recorder: Option<SessionRecorder>,
}

impl<T: Transport + 'static> SessionCore<T> {
    async fn run(
        mut self,
        mut signals: mpsc::UnboundedReceiver<TransportSignal>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        loop {
            tokio::select! {
                biased;

                Some(signal) = signals.recv() => self.handle_signal(signal),

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
            self.flush_recording();
        }

        debug!("Client dropped, closing transport");
        self.transport.close(DEFAULT_CLOSE_CODE, DEFAULT_CLOSE_REASON);
        self.machine.reset();
        self.flush_recording();
    }

    fn handle_signal(&mut self, signal: TransportSignal) {
        match signal {
            TransportSignal::Connecting => {
                self.lifecycle(events::CONNECTING, LifecycleSignal::Connecting)
            }
            TransportSignal::Opened => self.lifecycle(events::OPENED, LifecycleSignal::Opened),
            TransportSignal::Frame(bytes) => self.handle_frame(&bytes),
            TransportSignal::Closed {
                code,
                reason,
                was_clean,
                explicit,
            } => {
                self.lifecycle(
                    events::CLOSED,
                    LifecycleSignal::Closed {
                        code,
                        reason: reason.clone(),
                        was_clean,
                        explicit,
                    },
                );
                self.machine.handle_closed(code, &reason, explicit);
            }
            TransportSignal::Error(detail) => {
                self.lifecycle(events::ERROR, LifecycleSignal::TransportError(detail))
            }
        }
    }

    fn handle_frame(&mut self, bytes: &[u8]) {
        let envelope = match codec::decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                self.diagnostic(events::ERROR, Diagnostic::Decode(e));
                return;
            }
        };

        debug!(event = envelope.event().unwrap_or("<none>"), "Inbound envelope");

        let dispatcher = Arc::clone(&self.dispatcher);
        let machine = &mut self.machine;
        let framer = &self.framer;
        let recorder = &mut self.recorder;

        let dispatched = dispatcher.dispatch_envelope(&envelope, |envelope| {
            if envelope.event() == Some(events::AUDIO_CHUNK) {
                match framer.deliver_inbound(envelope.data()) {
                    Ok(chunk) => {
                        if let Some(recorder) = recorder.as_mut() {
                            recorder.record(Speaker::Model, chunk.as_bytes());
                        }
                    }
                    Err(e) => {
                        warn!("Dropping inbound audio: {}", e);
                        dispatcher.emit(
                            events::ERROR,
                            &EventArgs::Diagnostic(Diagnostic::Decode(e)),
                        );
                    }
                }
            }
            machine.handle_inbound(envelope);
        });

        if let Err(warning) = dispatched {
            warn!("Protocol warning: {}", warning);
            self.diagnostic(events::ERROR, Diagnostic::Protocol(warning));
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartSession {
                custom_params,
                reply,
            } => {
                let transport = Arc::clone(&self.transport);
                let result = self
                    .machine
                    .start_session(custom_params, |env| send_envelope(&*transport, env));

                match &result {
                    Ok(session_id) => {
                        if let Some(recorder) = self.recorder.as_mut() {
                            recorder.begin(session_id);
                        }
                    }
                    Err(RealtimeError::SendRejected(rejected)) => {
                        warn!("{}", rejected);
                        self.diagnostic(
                            events::SEND_FAILED,
                            Diagnostic::SendRejected(rejected.clone()),
                        );
                    }
                    Err(e) => warn!("start_session refused: {}", e),
                }
                let _ = reply.send(result);
            }

            Command::EndSession { reply } => {
                let transport = Arc::clone(&self.transport);
                let mut rejected = None;
                self.machine.end_session(|env| {
                    let result = send_envelope(&*transport, env);
                    if let Err(e) = &result {
                        rejected = Some(e.clone());
                    }
                    result
                });
                if let Some(rejected) = rejected {
                    self.diagnostic(events::SEND_FAILED, Diagnostic::SendRejected(rejected));
                }
                let _ = reply.send(());
            }

            Command::SendChunk { chunk, reply } => {
                let result = self
                    .framer
                    .frame_outbound(&chunk, self.machine.state())
                    .and_then(|env| {
                        send_envelope(&*self.transport, &env).inspect_err(|_| {
                            self.framer.mark_rejected();
                        })
                    });

                match &result {
                    Ok(()) => {
                        self.framer.mark_sent();
                        if let Some(recorder) = self.recorder.as_mut() {
                            recorder.record(Speaker::User, chunk.as_bytes());
                        }
                    }
                    Err(rejected) => {
                        debug!("{}", rejected);
                        self.diagnostic(
                            events::SEND_FAILED,
                            Diagnostic::SendRejected(rejected.clone()),
                        );
                    }
                }
                let _ = reply.send(result);
            }

            Command::Reset { reply } => {
                self.machine.reset();
                let _ = reply.send(());
            }

            // Signals take priority in the select loop, so replying here
            // means every signal queued before this command was applied.
            Command::Settle { reply } => {
                let _ = reply.send(());
            }
        }
    }

    /// Write out the recording once the session is no longer live.
    fn flush_recording(&mut self) {
        if self.machine.state().is_live() {
            return;
        }
        let Some(recording) = self.recorder.as_mut().and_then(SessionRecorder::take) else {
            return;
        };

        info!(session_id = recording.session_id(), "Writing session recording");
        tokio::task::spawn_blocking(move || recording.write_logged());
    }

    fn lifecycle(&self, event: &str, signal: LifecycleSignal) {
        self.dispatcher.emit(event, &EventArgs::Lifecycle(signal));
    }

    fn diagnostic(&self, event: &str, diagnostic: Diagnostic) {
        self.dispatcher.emit(event, &EventArgs::Diagnostic(diagnostic));
    }
}

fn send_envelope<T: Transport + ?Sized>(
    transport: &T,
    envelope: &Envelope,
) -> Result<(), SendRejected> {
    transport
        .send(codec::encode(envelope))
        .map_err(|reason: SendRejectReason| SendRejected {
            event: envelope.event().unwrap_or_default().to_string(),
            reason,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::core::realtime::base::ConnectError;
    use crate::core::realtime::dispatcher::SessionSignal;

    /// In-memory transport: records outbound frames and lets the test inject
    /// inbound signals.
    struct MockTransport {
        connected: AtomicBool,
        sent: Arc<Mutex<Vec<String>>>,
        signals: mpsc::UnboundedSender<TransportSignal>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn open(&self, _url: &str) -> Result<(), ConnectError> {
            if !self.connected.swap(true, Ordering::SeqCst) {
                let _ = self.signals.send(TransportSignal::Connecting);
                let _ = self.signals.send(TransportSignal::Opened);
            }
            Ok(())
        }

        fn close(&self, code: u16, reason: &str) {
            if self.connected.swap(false, Ordering::SeqCst) {
                let _ = self.signals.send(TransportSignal::Closed {
                    code,
                    reason: reason.to_string(),
                    was_clean: true,
                    explicit: true,
                });
            }
        }

        fn send(&self, text: String) -> Result<(), SendRejectReason> {
            if !self.connected.load(Ordering::SeqCst) {
                return Err(SendRejectReason::NotConnected);
            }
            self.sent.lock().push(text);
            Ok(())
        }

        fn connection_state(&self) -> ConnectionState {
            if self.connected.load(Ordering::SeqCst) {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            }
        }
    }

    struct Harness {
        client: LiveSessionClient<MockTransport>,
        inject: mpsc::UnboundedSender<TransportSignal>,
        sent: Arc<Mutex<Vec<String>>>,
        log: Arc<Mutex<Vec<(String, EventArgs)>>>,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let sent = Arc::new(Mutex::new(Vec::new()));
            let transport = MockTransport {
                connected: AtomicBool::new(false),
                sent: Arc::clone(&sent),
                signals: tx.clone(),
            };
            let client = LiveSessionClient::new(transport, rx, ClientOptions::new("ws://mock"));

            let log = Arc::new(Mutex::new(Vec::new()));
            for name in [
                events::MESSAGE,
                events::OPENED,
                events::CLOSED,
                events::DISCONNECTED,
                events::DISCONNECTED_UNEXPECTEDLY,
                events::ERROR,
                events::SEND_FAILED,
                events::STATUS,
                events::INTERRUPTED,
            ] {
                let l = Arc::clone(&log);
                client.on(name, move |args| {
                    l.lock().push((name.to_string(), args.clone()));
                    Ok(())
                });
            }

            Self {
                client,
                inject: tx,
                sent,
                log,
            }
        }

        fn inbound(&self, json: &str) {
            self.inject
                .send(TransportSignal::Frame(bytes::Bytes::copy_from_slice(
                    json.as_bytes(),
                )))
                .unwrap();
        }

        async fn settle(&self) {
            self.client.settle().await.unwrap();
        }

        fn names(&self) -> Vec<String> {
            self.log.lock().iter().map(|(n, _)| n.clone()).collect()
        }

        async fn activate(&self) -> String {
            self.client.connect().await.unwrap();
            let id = self.client.start_session(HashMap::new()).await.unwrap();
            self.inbound(r#"{"event":"status","data":"setup_complete"}"#);
            self.settle().await;
            assert_eq!(self.client.snapshot().state, SessionState::Active);
            id
        }
    }

    #[tokio::test]
    async fn test_start_then_setup_complete_then_send_chunk() {
        let h = Harness::new();
        let id = h.activate().await;

        h.client.send_chunk(vec![0x00u8, 0x01, 0xFF, 0x7F]).await.unwrap();

        let sent = h.sent.lock();
        assert_eq!(sent.len(), 2);
        let start: Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(start["event"], "start_session");
        assert_eq!(start["data"]["sessionId"], json!(id));
        assert_eq!(sent[1], r#"{"event":"audio_chunk","data":"AAH/fw=="}"#);
        assert_eq!(h.client.framer_stats().chunks_sent, 1);
    }

    #[tokio::test]
    async fn test_send_chunk_rejected_until_active() {
        let h = Harness::new();
        h.client.connect().await.unwrap();

        let err = h.client.send_chunk(vec![1u8, 2]).await.unwrap_err();
        assert!(matches!(
            err,
            RealtimeError::SendRejected(SendRejected {
                reason: SendRejectReason::SessionInactive(SessionState::None),
                ..
            })
        ));

        h.client.start_session(HashMap::new()).await.unwrap();
        assert!(h.client.send_chunk(vec![1u8, 2]).await.is_err());

        assert_eq!(h.sent.lock().len(), 1);
        assert_eq!(
            h.names().iter().filter(|n| *n == events::SEND_FAILED).count(),
            2
        );
    }

    #[tokio::test]
    async fn test_start_session_while_disconnected() {
        let h = Harness::new();
        let err = h.client.start_session(HashMap::new()).await.unwrap_err();
        assert!(matches!(err, RealtimeError::SendRejected(_)));
        assert_eq!(h.client.snapshot().state, SessionState::None);
        assert!(h.names().contains(&events::SEND_FAILED.to_string()));
    }

    #[tokio::test]
    async fn test_unexpected_close_is_distinct_from_disconnect() {
        let h = Harness::new();
        h.activate().await;

        h.inject
            .send(TransportSignal::Closed {
                code: 1006,
                reason: String::new(),
                was_clean: false,
                explicit: false,
            })
            .unwrap();
        h.settle().await;

        let names = h.names();
        assert!(names.contains(&events::DISCONNECTED_UNEXPECTEDLY.to_string()));
        assert!(!names.contains(&events::DISCONNECTED.to_string()));
        assert_eq!(h.client.snapshot().state, SessionState::Ended);
    }

    #[tokio::test]
    async fn test_explicit_disconnect_ends_session() {
        let h = Harness::new();
        h.activate().await;

        h.client.disconnect();
        h.settle().await;

        let names = h.names();
        let closed = names.iter().position(|n| n == events::CLOSED).unwrap();
        let disconnected = names.iter().position(|n| n == events::DISCONNECTED).unwrap();
        assert!(closed < disconnected);
        assert!(!names.contains(&events::DISCONNECTED_UNEXPECTEDLY.to_string()));

        let snapshot = h.client.snapshot();
        assert_eq!(snapshot.state, SessionState::Ended);
        assert_eq!(snapshot.connection, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_processing() {
        let h = Harness::new();
        h.client.connect().await.unwrap();

        h.inbound("{not json");
        h.inbound(r#"{"event":"status","data":"connected"}"#);
        h.settle().await;

        let log = h.log.lock();
        assert!(log.iter().any(|(n, args)| n == events::ERROR
            && matches!(args, EventArgs::Diagnostic(Diagnostic::Decode(_)))));
        assert!(log.iter().any(|(n, args)| n == events::STATUS
            && args.data_str() == Some("connected")));
        assert_eq!(h.client.snapshot().connection, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_envelope_without_event_only_dispatches_message() {
        let h = Harness::new();
        h.inbound(r#"{"data":"hi"}"#);
        h.settle().await;

        let log = h.log.lock();
        let inbound: Vec<_> = log
            .iter()
            .filter(|(n, _)| n == events::MESSAGE || n == events::STATUS)
            .collect();
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].0, events::MESSAGE);
        assert!(log.iter().any(|(_, args)| matches!(
            args,
            EventArgs::Diagnostic(Diagnostic::Protocol(_))
        )));
    }

    #[tokio::test]
    async fn test_interrupt_flushes_playback() {
        let h = Harness::new();
        h.activate().await;

        let flushed = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&flushed);
        h.client.on_end_of_audio(move || f.store(true, Ordering::SeqCst));

        h.inbound(r#"{"event":"model_transcript","data":"Sure, I"}"#);
        h.inbound(r#"{"event":"interrupt","data":{"reason":"barge_in"}}"#);
        h.settle().await;

        assert!(flushed.load(Ordering::SeqCst));
        assert_eq!(h.client.snapshot().turn, Turn::None);
        let expected = EventArgs::Session(SessionSignal::Interrupted {
            reason: Some("barge_in".to_string()),
        });
        assert!(h.log.lock().iter().any(|(_, args)| *args == expected));
    }

    #[tokio::test]
    async fn test_inbound_audio_reaches_sink() {
        let h = Harness::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&received);
        h.client
            .on_inbound_chunk(move |chunk| r.lock().push(chunk.as_bytes().to_vec()));

        h.inbound(r#"{"event":"audio_chunk","data":"AQI="}"#);
        h.inbound(r#"{"event":"audio_chunk","data":"AwQ="}"#);
        h.settle().await;

        assert_eq!(*received.lock(), vec![vec![1u8, 2], vec![3u8, 4]]);
    }

    #[tokio::test]
    async fn test_reset_allows_new_session() {
        let h = Harness::new();
        let first = h.activate().await;
        h.client.end_session().await.unwrap();
        assert_eq!(h.client.snapshot().state, SessionState::Ended);

        h.client.reset().await.unwrap();
        let snapshot = h.client.snapshot();
        assert_eq!(snapshot.state, SessionState::None);
        assert_eq!(snapshot.session_id, None);

        let second = h.client.start_session(HashMap::new()).await.unwrap();
        assert_ne!(first, second);
    }
}
