//! mcpwire: development-time event protocol between a front-end app and a
//! local observer.
//!
//! * [`client`] - outbound connection with queueing and reconnection
//! * [`server`] - WebSocket server, validation, dispatch and broadcast
//! * [`engine`] - actor owning the project context and the action log
//! * [`structure`] - project layout, README and import checks
//! * [`audit`] - HTTP surface for plan, guidelines and audit log

pub mod audit;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod protocol;
pub mod server;
pub mod structure;
pub mod utils;
