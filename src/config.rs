/// Configuration management for mcpwire
///
/// Configuration is a single JSON file at `$USER_HOME/.mcpwire/config.json`.
/// Every field has a default, so a missing file or a partial file is fine.
use crate::client::OverflowPolicy;
use crate::error::ConfigError;
use crate::protocol::ValidationOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "MCPWIRE_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub audit: AuditConfig,
}

/// WebSocket server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// First port tried; 0 lets the OS pick
    pub port: u16,
    pub max_connections: usize,
    /// Ports tried are `port .. port + max_port_attempts`
    pub max_port_attempts: u16,
    pub max_action_log_size: usize,
    /// Broadcast STATE_UPDATED to every client after each accepted action
    pub broadcast_on_change: bool,
    pub validation: ValidationOptions,
    /// When set, the structure check runs once at startup
    pub project_root: Option<PathBuf>,
    pub structure: StructureConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_connections: 100,
            max_port_attempts: 5,
            max_action_log_size: 100,
            broadcast_on_change: true,
            validation: ValidationOptions::default(),
            project_root: None,
            structure: StructureConfig::default(),
        }
    }
}

/// What the project structure check looks for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    pub required_dirs: Vec<String>,
    pub required_files: Vec<String>,
    /// Headings the README must contain
    pub required_sections: Vec<String>,
    /// Scan sources for imports of packages missing from package.json
    pub check_imports: bool,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            required_dirs: vec![
                "src".to_string(),
                "data".to_string(),
                "docs".to_string(),
                "public".to_string(),
            ],
            required_files: vec!["README.md".to_string(), "package.json".to_string()],
            required_sections: vec!["## Project Overview".to_string()],
            check_imports: true,
        }
    }
}

/// WebSocket client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub url: String,
    /// Consecutive failures before the client gives up
    pub max_reconnect_attempts: u32,
    /// Base delay; attempt `n` waits `n * reconnect_delay_ms`
    pub reconnect_delay_ms: u64,
    pub max_queue_depth: usize,
    pub overflow_policy: OverflowPolicy,
    /// Stamped into `source` on outgoing messages
    pub source: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080".to_string(),
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
            max_queue_depth: 1000,
            overflow_policy: OverflowPolicy::DropOldest,
            source: None,
        }
    }
}

/// HTTP audit surface settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Holds plan.json, guidelines.json and audit.json
    pub data_dir: PathBuf,
    /// Root served by /readme and /structure
    pub project_root: PathBuf,
    /// Actor recorded by /logResponse
    pub assistant_actor: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8081,
            data_dir: PathBuf::from("data"),
            project_root: PathBuf::from("."),
            assistant_actor: "ASSISTANT".to_string(),
        }
    }
}

/// Get the path to the config file
///
/// Returns: `$USER_HOME/.mcpwire/config.json`
/// Respects `MCPWIRE_CONFIG_PATH`.
pub fn get_config_path() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }

    let home_dir = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home_dir.join(".mcpwire").join("config.json"))
}

/// Load configuration from the default location.
///
/// A missing file yields the defaults; nothing is written.
pub fn load_config() -> Result<McpConfig, ConfigError> {
    load_config_from(&get_config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<McpConfig, ConfigError> {
    if !path.exists() {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(McpConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Save configuration as pretty JSON, creating parent directories.
pub fn save_config(config: &McpConfig) -> Result<PathBuf, ConfigError> {
    let path = get_config_path()?;
    save_config_to(config, &path)?;
    Ok(path)
}

pub fn save_config_to(config: &McpConfig, path: &Path) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content).map_err(io_err)
}
