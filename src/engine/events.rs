use crate::models::{ActionLogEntry, MessageType};
use crate::structure::StructureWarning;
use std::net::SocketAddr;

/// Events published by the server and its engine.
///
/// Delivered through a `tokio::sync::broadcast` channel; subscribers that
/// fall behind miss events rather than slowing the server down.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Started {
        addr: SocketAddr,
    },
    Stopped,
    ClientConnected {
        id: String,
        count: usize,
    },
    ClientDisconnected {
        id: String,
        count: usize,
    },
    /// Connection refused because the limit was reached
    ConnectionRejected {
        addr: SocketAddr,
        reason: String,
    },

    // Domain events from the engine
    ActionProcessed(ActionLogEntry),
    ComponentAdded {
        name: String,
    },
    ComponentRemoved {
        name: String,
    },
    StateChanged {
        component_name: String,
        state_key: String,
    },
    DependencyAdded {
        name: String,
        version: String,
    },
    DocumentationUpdated {
        file: String,
    },
    ContextUpdated,
    PlanUpdated,
    GuidelinesUpdated,
    /// ERROR / WARNING / INFO reported by a client
    ClientNotice {
        kind: MessageType,
        message: String,
    },

    /// STATE_UPDATED went out to `delivered` connections
    StateBroadcast {
        delivered: usize,
    },
    ValidationWarning(StructureWarning),
    Error {
        connection_id: Option<String>,
        message: String,
    },
}
