//! Connection registry
//!
//! Tracks every open WebSocket connection by id together with the channel
//! feeding its writer task. Used by the connection tasks (register and
//! unregister) and by broadcast.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Public view of one connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: String,
    pub remote_addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub messages_received: u64,
}

impl ConnectionInfo {
    fn new(id: String, remote_addr: SocketAddr) -> Self {
        let now = Utc::now();
        Self {
            id,
            remote_addr,
            connected_at: now,
            last_activity: now,
            messages_received: 0,
        }
    }
}

struct ConnectionEntry {
    info: ConnectionInfo,
    outbound: mpsc::UnboundedSender<WsMessage>,
}

/// Thread-safe registry of open connections.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<String, ConnectionEntry>>,
    /// Slots taken, including registrations in progress
    slots: Arc<AtomicUsize>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection unless `max_connections` are already open.
    ///
    /// Returns `false` when the limit is reached; nothing is recorded then.
    pub fn try_register(
        &self,
        id: String,
        remote_addr: SocketAddr,
        outbound: mpsc::UnboundedSender<WsMessage>,
        max_connections: usize,
    ) -> bool {
        let reserved = self
            .slots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max_connections).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            return false;
        }

        self.connections.insert(
            id.clone(),
            ConnectionEntry {
                info: ConnectionInfo::new(id, remote_addr),
                outbound,
            },
        );
        true
    }

    /// Remove a connection (e.g., on close). Returns whether it was present.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.connections.remove(id).is_some();
        if removed {
            self.slots.fetch_sub(1, Ordering::SeqCst);
        }
        removed
    }

    /// Record one inbound frame.
    pub fn record_activity(&self, id: &str) {
        if let Some(mut entry) = self.connections.get_mut(id) {
            entry.info.last_activity = Utc::now();
            entry.info.messages_received += 1;
        }
    }

    /// Queue the same text frame for every open connection.
    ///
    /// Connections whose writer has already gone away are skipped and
    /// removed. Returns the number of connections the frame was queued for.
    pub fn broadcast_text(&self, text: &str) -> usize {
        let mut stale = Vec::new();
        let mut delivered = 0;

        for entry in self.connections.iter() {
            if entry.value().outbound.is_closed() {
                stale.push(entry.key().clone());
                continue;
            }
            if entry.value().outbound.send(WsMessage::Text(text.to_string())).is_ok() {
                delivered += 1;
            } else {
                stale.push(entry.key().clone());
            }
        }

        for id in stale {
            log::debug!("Dropping stale connection {}", id);
            self.unregister(&id);
        }

        delivered
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn list(&self) -> Vec<ConnectionInfo> {
        self.connections.iter().map(|e| e.value().info.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<ConnectionInfo> {
        self.connections.get(id).map(|e| e.value().info.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    #[test]
    fn test_register_respects_limit() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(registry.try_register("a".to_string(), addr(), tx.clone(), 2));
        assert!(registry.try_register("b".to_string(), addr(), tx.clone(), 2));
        assert!(!registry.try_register("c".to_string(), addr(), tx.clone(), 2));
        assert_eq!(registry.count(), 2);
        assert!(registry.get("c").is_none());

        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert!(registry.try_register("c".to_string(), addr(), tx, 2));
    }

    #[test]
    fn test_record_activity() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.try_register("a".to_string(), addr(), tx, 10);

        registry.record_activity("a");
        registry.record_activity("a");
        registry.record_activity("missing");

        let info = registry.get("a").unwrap();
        assert_eq!(info.messages_received, 2);
        assert!(info.last_activity >= info.connected_at);
    }

    #[test]
    fn test_broadcast_skips_closed() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        registry.try_register("a".to_string(), addr(), tx_a, 10);
        registry.try_register("b".to_string(), addr(), tx_b, 10);

        drop(rx_b);
        let delivered = registry.broadcast_text("hello");

        assert_eq!(delivered, 1);
        assert_eq!(registry.count(), 1);
        assert_eq!(rx_a.try_recv().unwrap(), WsMessage::Text("hello".to_string()));
    }
}
