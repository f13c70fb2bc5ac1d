//! WebSocket client transport
//!
//! One outbound connection per [`McpClient`]. Messages sent while the socket
//! is down wait in a bounded FIFO queue and are flushed, in order, as soon as
//! the connection comes back. Reconnection uses a linear backoff and gives up
//! after a configured number of consecutive failures.

mod queue;

pub use queue::{OutboundQueue, OverflowPolicy};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::models::{
    ComponentAddedPayload, Message, Payload, PerformancePayload, StateChangedPayload,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

const EVENT_CHANNEL_CAPACITY: usize = 256;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Gave up after too many consecutive failures
    Failed,
    /// Shut down by the caller
    Closed,
}

/// Notifications from a running client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    StateChanged(ConnectionState),
    /// A JSON frame from the server (responses and broadcasts)
    Message(Value),
    /// The queue was full; `dropped` is the evicted or rejected message
    QueueOverflow { dropped: String, depth: usize },
    Error(String),
    MaxAttemptsReached { attempts: u32 },
}

/// What `send` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the socket writer
    Sent,
    /// Waiting for a connection; `depth` is the queue length after the push
    Queued { depth: usize },
}

/// Queue and writer share one lock so that a flush on connect and a
/// concurrent `send` cannot interleave.
struct Outbox {
    queue: OutboundQueue,
    writer: Option<mpsc::UnboundedSender<String>>,
}

struct Shared {
    config: ClientConfig,
    outbox: Mutex<Outbox>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ClientEvent>,
    cancel: CancellationToken,
}

impl Shared {
    fn outbox(&self) -> MutexGuard<'_, Outbox> {
        // A panic while holding the lock cannot leave the queue half-updated.
        self.outbox.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            log::debug!("Client state: {:?}", next);
            self.emit(ClientEvent::StateChanged(next));
        }
    }
}

/// How a connected session ended.
enum SessionEnd {
    Cancelled,
    Dropped,
    /// Server closed with a policy violation (e.g., connection limit)
    Rejected,
}

/// WebSocket client with an outbound queue and automatic reconnection.
pub struct McpClient {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl McpClient {
    pub fn new(config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let queue = OutboundQueue::new(config.max_queue_depth, config.overflow_policy);

        Self {
            shared: Arc::new(Shared {
                config,
                outbox: Mutex::new(Outbox {
                    queue,
                    writer: None,
                }),
                state,
                events,
                cancel: CancellationToken::new(),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Messages waiting for a connection.
    pub fn queued(&self) -> usize {
        self.shared.outbox().queue.len()
    }

    /// Spawn the connection task.
    ///
    /// Must be called inside a tokio runtime. A client that gave up after
    /// too many failures may be started again.
    pub fn start(&self) -> Result<(), ClientError> {
        if self.shared.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }

        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(ClientError::AlreadyStarted);
        }

        *task = Some(tokio::spawn(run(self.shared.clone())));
        Ok(())
    }

    /// Send a message, or queue it until the connection is up.
    ///
    /// A message without a `source` gets the configured one.
    pub fn send(&self, mut message: Message) -> Result<SendOutcome, ClientError> {
        if self.shared.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }
        if message.source.is_none() {
            message.source = self.shared.config.source.clone();
        }

        let mut text = serde_json::to_string(&message)?;
        let mut outbox = self.shared.outbox();

        if let Some(writer) = outbox.writer.as_ref() {
            match writer.send(text) {
                Ok(()) => return Ok(SendOutcome::Sent),
                Err(mpsc::error::SendError(returned)) => text = returned,
            }
            // Writer is gone; the session is ending.
            outbox.writer = None;
        }

        match outbox.queue.push(text) {
            Ok(None) => Ok(SendOutcome::Queued {
                depth: outbox.queue.len(),
            }),
            Ok(Some(dropped)) => {
                let depth = outbox.queue.len();
                log::warn!("Outbound queue full, dropped oldest message");
                self.shared.emit(ClientEvent::QueueOverflow { dropped, depth });
                Ok(SendOutcome::Queued { depth })
            }
            Err(e) => {
                log::warn!("Outbound queue full, rejected message");
                self.shared.emit(ClientEvent::QueueOverflow {
                    dropped: serde_json::to_string(&message).unwrap_or_default(),
                    depth: outbox.queue.len(),
                });
                Err(e)
            }
        }
    }

    pub fn track_component_added(
        &self,
        component_name: impl Into<String>,
        file_path: impl Into<String>,
        dependencies: Vec<String>,
    ) -> Result<SendOutcome, ClientError> {
        self.send(Message::new(Payload::ComponentAdded(ComponentAddedPayload {
            component_name: component_name.into(),
            file_path: file_path.into(),
            dependencies,
        })))
    }

    /// Report render, mount and update times in milliseconds.
    pub fn track_performance(
        &self,
        component_name: impl Into<String>,
        render_time: f64,
        mount_time: f64,
        update_time: f64,
    ) -> Result<SendOutcome, ClientError> {
        self.send(Message::new(Payload::PerformanceMetric(PerformancePayload {
            component_name: component_name.into(),
            render_time,
            mount_time,
            update_time,
        })))
    }

    pub fn track_state_change(
        &self,
        component_name: impl Into<String>,
        state_key: impl Into<String>,
        old_value: Option<Value>,
        new_value: Option<Value>,
    ) -> Result<SendOutcome, ClientError> {
        self.send(Message::new(Payload::StateChanged(StateChangedPayload {
            component_name: component_name.into(),
            state_key: state_key.into(),
            old_value,
            new_value,
        })))
    }

    /// Ask the server for the current state.
    pub fn request_state(&self) -> Result<SendOutcome, ClientError> {
        self.send(Message::new(Payload::GetState))
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Queued messages are discarded.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();

        let task = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::error!("Client task ended abnormally: {}", e);
            }
        }

        let dropped = self.shared.outbox().queue.drain().len();
        if dropped > 0 {
            log::info!("Discarded {} queued messages on shutdown", dropped);
        }
        self.shared.set_state(ConnectionState::Closed);
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

/// Connection task: connect, run the session, back off, repeat.
async fn run(shared: Arc<Shared>) {
    let url = shared.config.url.clone();
    let max_failures = shared.config.max_reconnect_attempts.max(1);
    let base_delay = Duration::from_millis(shared.config.reconnect_delay_ms);
    let mut failures: u32 = 0;

    loop {
        shared.set_state(ConnectionState::Connecting);

        let connected = tokio::select! {
            _ = shared.cancel.cancelled() => return,
            result = tokio_tungstenite::connect_async(url.as_str()) => result,
        };

        let failed = match connected {
            Ok((socket, _)) => {
                log::info!("Connected to {}", url);
                match session(&shared, socket).await {
                    SessionEnd::Cancelled => return,
                    SessionEnd::Dropped => {
                        failures = 0;
                        false
                    }
                    SessionEnd::Rejected => true,
                }
            }
            Err(e) => {
                log::warn!("Connection to {} failed: {}", url, e);
                shared.emit(ClientEvent::Error(e.to_string()));
                true
            }
        };
        shared.set_state(ConnectionState::Disconnected);

        if failed {
            failures += 1;
            if failures >= max_failures {
                log::error!(
                    "Giving up on {} after {} consecutive failures",
                    url,
                    failures
                );
                shared.set_state(ConnectionState::Failed);
                shared.emit(ClientEvent::MaxAttemptsReached { attempts: failures });
                return;
            }
        }

        let delay = backoff_delay(base_delay, failures);
        log::info!("Reconnecting to {} in {:?}", url, delay);
        tokio::select! {
            _ = shared.cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Linear backoff, saturating at `Duration::MAX`.
fn backoff_delay(base: Duration, failures: u32) -> Duration {
    base.saturating_mul(failures.max(1))
}

/// Drive one open socket until it closes or the client shuts down.
async fn session(shared: &Shared, socket: Socket) -> SessionEnd {
    let (mut sink, mut stream) = socket.split();
    let (writer, mut pending) = mpsc::unbounded_channel::<String>();

    {
        let mut outbox = shared.outbox();
        let backlog = outbox.queue.drain();
        if !backlog.is_empty() {
            log::info!("Flushing {} queued messages", backlog.len());
        }
        for text in backlog {
            let _ = writer.send(text);
        }
        outbox.writer = Some(writer);
    }
    shared.set_state(ConnectionState::Connected);

    let mut unsent = None;
    let end = loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => {
                let _ = sink
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: Cow::Borrowed("Client shutting down"),
                    })))
                    .await;
                let _ = sink.close().await;
                break SessionEnd::Cancelled;
            }
            outgoing = pending.recv() => {
                let Some(text) = outgoing else {
                    break SessionEnd::Dropped;
                };
                if let Err(e) = sink.send(WsMessage::Text(text.clone())).await {
                    log::warn!("Send failed: {}", e);
                    shared.emit(ClientEvent::Error(e.to_string()));
                    unsent = Some(text);
                    break SessionEnd::Dropped;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<Value>(&text) {
                        Ok(value) => shared.emit(ClientEvent::Message(value)),
                        Err(e) => log::warn!("Dropping unparseable frame from server: {}", e),
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        let rejected = frame
                            .as_ref()
                            .is_some_and(|f| f.code == CloseCode::Policy);
                        match frame {
                            Some(f) => log::info!("Server closed the connection: {} {}", f.code, f.reason),
                            None => log::info!("Server closed the connection"),
                        }
                        break if rejected { SessionEnd::Rejected } else { SessionEnd::Dropped };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("Connection error: {}", e);
                        shared.emit(ClientEvent::Error(e.to_string()));
                        break SessionEnd::Dropped;
                    }
                    None => break SessionEnd::Dropped,
                }
            }
        }
    };

    // Anything the writer never got onto the wire goes back to the queue.
    let mut outbox = shared.outbox();
    outbox.writer = None;
    let mut requeue: Vec<String> = unsent.into_iter().collect();
    while let Ok(text) = pending.try_recv() {
        requeue.push(text);
    }
    if !requeue.is_empty() && !matches!(end, SessionEnd::Cancelled) {
        log::info!("Re-queued {} unsent messages", requeue.len());
        let dropped = outbox.queue.requeue_front(requeue);
        if dropped > 0 {
            log::warn!("Outbound queue full, dropped {} newest messages", dropped);
        }
    }

    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageType;

    fn offline_config(max_queue_depth: usize, overflow_policy: OverflowPolicy) -> ClientConfig {
        ClientConfig {
            url: "ws://127.0.0.1:9".to_string(),
            max_queue_depth,
            overflow_policy,
            source: Some("test-app".to_string()),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 0), base);
        assert_eq!(backoff_delay(base, 1), base);
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(1500));

        let huge = Duration::from_millis(u64::MAX);
        assert_eq!(backoff_delay(huge, 5), Duration::MAX);
    }

    #[test]
    fn test_send_before_start_queues() {
        let client = McpClient::new(offline_config(10, OverflowPolicy::DropOldest));
        assert_eq!(client.state(), ConnectionState::Disconnected);

        let outcome = client
            .track_component_added("Header", "src/Header.tsx", vec![])
            .unwrap();
        assert_eq!(outcome, SendOutcome::Queued { depth: 1 });
        client.request_state().unwrap();
        assert_eq!(client.queued(), 2);
    }

    #[test]
    fn test_source_is_stamped() {
        let client = McpClient::new(offline_config(10, OverflowPolicy::DropOldest));
        client.request_state().unwrap();

        let queued = client.shared.outbox().queue.drain();
        let message: Message = serde_json::from_str(&queued[0]).unwrap();
        assert_eq!(message.kind(), MessageType::GetState);
        assert_eq!(message.source.as_deref(), Some("test-app"));
    }

    #[test]
    fn test_overflow_drop_oldest_emits_event() {
        let client = McpClient::new(offline_config(1, OverflowPolicy::DropOldest));
        let mut events = client.subscribe();

        client.track_performance("A", 1.0, 2.0, 3.0).unwrap();
        client.track_performance("B", 1.0, 2.0, 3.0).unwrap();

        assert_eq!(client.queued(), 1);
        match events.try_recv().unwrap() {
            ClientEvent::QueueOverflow { dropped, depth } => {
                assert!(dropped.contains("\"componentName\":\"A\""));
                assert_eq!(depth, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_overflow_reject_new() {
        let client = McpClient::new(offline_config(1, OverflowPolicy::RejectNew));
        client.request_state().unwrap();

        let err = client.request_state().unwrap_err();
        assert!(matches!(err, ClientError::QueueFull { capacity: 1 }));
        assert_eq!(client.queued(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_client() {
        let client = McpClient::new(ClientConfig {
            reconnect_delay_ms: 10,
            ..offline_config(10, OverflowPolicy::DropOldest)
        });
        let watch = client.watch_state();
        client.start().unwrap();
        assert!(matches!(client.start(), Err(ClientError::AlreadyStarted)));

        client.shutdown().await;
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(*watch.borrow(), ConnectionState::Closed);
        assert!(matches!(client.request_state(), Err(ClientError::Closed)));
        assert!(matches!(client.start(), Err(ClientError::Closed)));
    }
}
