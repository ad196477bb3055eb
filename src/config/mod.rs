/// Configuration management for the flowcore engine
///
/// Handles server configuration, relay connection policy, engine pacing and
/// document storage location.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Webhook relay connection configuration
    pub relay: RelayConfig,
    /// Execution engine configuration
    pub engine: EngineConfig,
    /// Workflow document storage configuration
    pub storage: StorageConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Relay channel connection policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address of the external relay process (e.g., "127.0.0.1:3006")
    pub address: String,
    /// Reconnect attempts after an unexpected close before giving up
    pub max_retries: u32,
    /// Fixed delay between reconnect attempts
    pub retry_delay_ms: u64,
    /// A single connect attempt fails if not open within this window
    pub connect_timeout_ms: u64,
    /// Delay between the `running` and `success` writes for relay-driven executions
    pub status_settle_ms: u64,
}

/// Execution engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed pause before each node body runs (0 disables it)
    pub step_delay_ms: u64,
}

/// Storage location for the flat workflow document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the JSON document holding nodes, edges and metadata
    pub document_path: String,
}

impl RelayConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn status_settle(&self) -> Duration {
        Duration::from_millis(self.status_settle_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            address: std::env::var("FLOWCORE_RELAY_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3006".to_string()),
            max_retries: env_or("FLOWCORE_RELAY_MAX_RETRIES", 5),
            retry_delay_ms: env_or("FLOWCORE_RELAY_RETRY_DELAY_MS", 3000),
            connect_timeout_ms: env_or("FLOWCORE_RELAY_CONNECT_TIMEOUT_MS", 5000),
            status_settle_ms: 500,
        }
    }
}

impl EngineConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: env_or("FLOWCORE_STEP_DELAY_MS", 0),
        }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("FLOWCORE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("FLOWCORE_PORT", 3005),
            },
            relay: RelayConfig::default(),
            engine: EngineConfig::default(),
            storage: StorageConfig {
                document_path: std::env::var("FLOWCORE_DOCUMENT_PATH")
                    .unwrap_or_else(|_| "data/workflow.json".to_string()),
            },
        }
    }
}

/// Read a numeric environment variable, falling back when unset or unparsable
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
