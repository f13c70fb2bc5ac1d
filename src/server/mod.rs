//! WebSocket server transport
//!
//! ```text
//! McpServer::start
//!   └─ accept loop (port fallback, cancellation)
//!        └─ connection task per client
//!             ├─ reader: parse → type check → validate → EngineHandle::apply → response
//!             └─ writer: drains the outbound channel
//! ```
//!
//! The engine actor owns the project context and the action log; connection
//! tasks only ever talk to it through [`EngineHandle`].

mod connection;
mod registry;

pub use registry::{ConnectionInfo, ConnectionRegistry};

use crate::config::ServerConfig;
use crate::engine::{spawn_engine, EngineHandle, ServerEvent};
use crate::error::ServerError;
use crate::models::{ActionLogEntry, Message, ProjectContext};
use connection::{broadcast_state, handle_connection, ConnectionContext};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// Capacity of the server event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

struct Running {
    addr: SocketAddr,
    cancel: CancellationToken,
    accept_task: JoinHandle<()>,
}

/// WebSocket server: accepts clients, dispatches their messages to the
/// engine and broadcasts state.
pub struct McpServer {
    config: Arc<ServerConfig>,
    registry: ConnectionRegistry,
    engine: EngineHandle,
    events: broadcast::Sender<ServerEvent>,
    running: Option<Running>,
}

impl McpServer {
    /// Create a server and spawn its engine.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: ServerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let engine = spawn_engine(config.max_action_log_size, Some(events.clone()));

        Self {
            config: Arc::new(config),
            registry: ConnectionRegistry::new(),
            engine,
            events,
            running: None,
        }
    }

    /// Subscribe to server events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Bind and start accepting connections.
    ///
    /// When the configured port is taken, the next ports are tried up to
    /// `max_port_attempts` in total. Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        if let Some(root) = self.config.project_root.clone() {
            self.check_structure(root);
        }

        let listener = bind_with_fallback(
            &self.config.host,
            self.config.port,
            self.config.max_port_attempts,
        )
        .await?;
        let addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: format!("{}:{}", self.config.host, self.config.port),
            source,
        })?;

        let cancel = CancellationToken::new();
        let ctx = ConnectionContext {
            config: self.config.clone(),
            registry: self.registry.clone(),
            engine: self.engine.clone(),
            events: self.events.clone(),
            cancel: cancel.clone(),
        };
        let accept_task = tokio::spawn(accept_loop(listener, ctx));

        log::info!("MCP server listening on ws://{}", addr);
        let _ = self.events.send(ServerEvent::Started { addr });

        self.running = Some(Running {
            addr,
            cancel,
            accept_task,
        });
        Ok(addr)
    }

    /// Run the structure check in the background, one event per finding.
    fn check_structure(&self, root: std::path::PathBuf) {
        let structure = self.config.structure.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let checked_root = root.clone();
            let result = tokio::task::spawn_blocking(move || {
                crate::structure::run_checks(&checked_root, &structure)
            })
            .await;

            match result {
                Ok(warnings) => {
                    for warning in warnings {
                        log::warn!("{}: {}", root.display(), warning);
                        let _ = events.send(ServerEvent::ValidationWarning(warning));
                    }
                    log::info!("Initial structure validation complete");
                }
                Err(e) => log::error!("Structure check panicked: {}", e),
            }
        });
    }

    /// Stop accepting, close every connection and wait for the tasks to end.
    ///
    /// Calling it on a stopped server does nothing.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.cancel.cancel();
        if let Err(e) = running.accept_task.await {
            log::error!("Accept loop ended abnormally: {}", e);
        }

        log::info!("MCP server on {} stopped", running.addr);
        let _ = self.events.send(ServerEvent::Stopped);
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.count()
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.registry.list()
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Snapshot of the project context.
    pub async fn context(&self) -> Result<ProjectContext, ServerError> {
        self.engine.context().await.map_err(ServerError::Engine)
    }

    /// Action log, oldest first.
    pub async fn action_log(&self) -> Vec<ActionLogEntry> {
        self.engine.action_log().await
    }

    /// Send `message` to every open connection.
    ///
    /// Serialized once. Returns how many connections it was queued for.
    pub fn broadcast(&self, message: &Message) -> Result<usize, ServerError> {
        let text = serde_json::to_string(message)
            .map_err(|e| ServerError::Engine(format!("Failed to encode message: {}", e)))?;
        Ok(self.registry.broadcast_text(&text))
    }

    /// Broadcast STATE_UPDATED with the current context.
    pub async fn broadcast_state(&self) -> Result<usize, ServerError> {
        broadcast_state(&self.registry, &self.engine, &self.events)
            .await
            .map_err(ServerError::Engine)
    }
}

impl Drop for McpServer {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

/// Bind `host:port`, moving to the next port while the address is in use.
async fn bind_with_fallback(
    host: &str,
    port: u16,
    max_attempts: u16,
) -> Result<TcpListener, ServerError> {
    // Port 0 asks the OS, so there is nothing to fall back to.
    let attempts = if port == 0 { 1 } else { max_attempts.max(1) };
    let mut last = port;

    for offset in 0..attempts {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        last = candidate;

        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => {
                if offset > 0 {
                    log::info!("Port {} was in use, bound {} instead", port, candidate);
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                log::warn!("Port {} is already in use", candidate);
            }
            Err(source) => {
                return Err(ServerError::Bind {
                    addr: format!("{}:{}", host, candidate),
                    source,
                });
            }
        }
    }

    Err(ServerError::PortsExhausted {
        host: host.to_string(),
        first: port,
        last,
    })
}

async fn accept_loop(listener: TcpListener, ctx: ConnectionContext) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        log::debug!("Accepted TCP connection from {}", addr);
                        connections.spawn(handle_connection(stream, addr, ctx.clone()));
                    }
                    Err(e) => log::warn!("Accept failed: {}", e),
                }
            }
        }
    }

    drop(listener);
    // Connection tasks see the same token and close their sockets.
    while connections.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        ServerConfig {
            port: 0,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let mut server = McpServer::new(test_config());
        let mut events = server.subscribe();

        let addr = server.start().await.expect("Failed to start");
        assert_ne!(addr.port(), 0);
        assert_eq!(server.local_addr(), Some(addr));
        assert_eq!(events.recv().await.unwrap(), ServerEvent::Started { addr });

        assert!(matches!(server.start().await, Err(ServerError::AlreadyRunning)));

        server.stop().await;
        assert!(!server.is_running());
        // Idempotent
        server.stop().await;
    }

    #[tokio::test]
    async fn test_port_fallback() {
        let blocker = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let taken = blocker.local_addr().unwrap().port();

        match bind_with_fallback("127.0.0.1", taken, 5).await {
            Ok(listener) => {
                let bound = listener.local_addr().unwrap().port();
                assert_ne!(bound, taken);
                assert!(bound > taken && bound < taken.saturating_add(5));
            }
            // Every neighbour may be taken on a busy machine.
            Err(e) => assert!(matches!(e, ServerError::PortsExhausted { .. })),
        }
    }

    #[tokio::test]
    async fn test_ports_exhausted() {
        let blocker = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let taken = blocker.local_addr().unwrap().port();

        match bind_with_fallback("127.0.0.1", taken, 1).await {
            Err(ServerError::PortsExhausted { first, last, .. }) => {
                assert_eq!(first, taken);
                assert_eq!(last, taken);
            }
            other => panic!("expected PortsExhausted, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_context_without_start() {
        let server = McpServer::new(test_config());
        let context = server.context().await.unwrap();
        assert!(context.components.is_empty());
        assert!(server.action_log().await.is_empty());
        assert_eq!(server.connection_count(), 0);
    }
}
