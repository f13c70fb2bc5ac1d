//! Error types surfaced by the public API.
//!
//! Engine and store internals report `Result<_, String>`; the transports and
//! the config layer wrap those in the enums below.

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Bind failed for a reason other than the port being taken
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Every port in the fallback range was already in use
    #[error("no free port on {host} in {first}..={last}")]
    PortsExhausted { host: String, first: u16, last: u16 },

    #[error("server is already running")]
    AlreadyRunning,

    #[error("engine error: {0}")]
    Engine(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("outbound queue is full ({capacity} messages)")]
    QueueFull { capacity: usize },

    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("client is already running")]
    AlreadyStarted,

    #[error("client has shut down")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to get user home directory")]
    NoHomeDir,

    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}
