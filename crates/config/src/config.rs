//! Main configuration module
//!
//! A node is described by a single `tsscore.toml` file. Every section has
//! defaults except `[node]`, which must name the local account and key.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default number of operation ids a proposer puts in one proposal.
pub const DEFAULT_MAX_OPERATIONS_PER_PROPOSAL: usize = 32;

/// Default capacity of the pending operation queue.
pub const DEFAULT_POOL_CAPACITY: usize = 10_000;

/// Default capacity of per-phase early message mailboxes.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1024;

/// Main configuration struct.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Local identity
    pub node: NodeConfig,

    /// Session bootstrap and limits
    #[serde(default)]
    pub session: SessionConfig,

    /// Pending operation pool
    #[serde(default)]
    pub pool: PoolConfig,

    /// Peer networking
    #[serde(default)]
    pub network: NetworkConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        info!("Loading configuration from {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content)?;

        debug!("Configuration parsed successfully, validating...");
        config.validate()?;

        info!(
            account = %config.node.account,
            start_block = config.session.start_block,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> ConfigResult<()> {
        self.node.validate()?;
        self.session.validate()?;
        self.pool.validate()?;
        self.network.validate()?;
        self.logging.validate()?;

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }
}

// =============================================================================
// Node Configuration
// =============================================================================

/// Local identity.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeConfig {
    /// Local account as registered on chain
    pub account: String,

    /// File holding the hex secp256k1 key used to sign peer requests
    pub key_file: PathBuf,
}

impl NodeConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.account.trim().is_empty() {
            return Err(ConfigError::MissingField("node.account"));
        }
        if self.key_file.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("node.key_file"));
        }
        Ok(())
    }

    /// Read the hex private key from `key_file`.
    pub fn read_private_key(&self) -> ConfigResult<String> {
        let content =
            std::fs::read_to_string(&self.key_file).map_err(|e| ConfigError::FileRead {
                path: self.key_file.clone(),
                source: e,
            })?;
        let key = content.trim();
        if key.is_empty() {
            return Err(ConfigError::MissingField("private key"));
        }
        Ok(key.to_string())
    }
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Session bootstrap and per-session limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Block at which the first session starts
    pub start_block: u64,

    /// Seed signature (hex) used to elect the first proposer
    pub start_signature: String,

    /// Run the one-shot keygen session instead of default and reshare sessions
    #[serde(default)]
    pub keygen: bool,

    /// Upper bound of operation ids per proposal
    #[serde(default = "default_max_operations")]
    pub max_operations_per_proposal: usize,

    /// Capacity of early-message mailboxes
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

fn default_max_operations() -> usize {
    DEFAULT_MAX_OPERATIONS_PER_PROPOSAL
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

impl SessionConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let seed = self
            .start_signature
            .strip_prefix("0x")
            .unwrap_or(&self.start_signature);
        if seed.is_empty() {
            return Err(ConfigError::MissingField("session.start_signature"));
        }
        if seed.len() % 2 != 0 || !seed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConfigError::InvalidStartSignature(
                self.start_signature.clone(),
            ));
        }
        if self.max_operations_per_proposal == 0 {
            return Err(ConfigError::NotPositive {
                name: "session.max_operations_per_proposal",
                value: 0,
            });
        }
        if self.mailbox_capacity == 0 {
            return Err(ConfigError::NotPositive {
                name: "session.mailbox_capacity",
                value: 0,
            });
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start_block: 1,
            start_signature: "00".repeat(65),
            keygen: false,
            max_operations_per_proposal: DEFAULT_MAX_OPERATIONS_PER_PROPOSAL,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

// =============================================================================
// Pool Configuration
// =============================================================================

/// Pending operation pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Capacity of the FIFO; `add` waits while it is full
    pub capacity: usize,

    /// Scan all chain operations once at startup
    #[serde(default = "default_true")]
    pub catchup: bool,
}

fn default_true() -> bool {
    true
}

impl PoolConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.capacity == 0 {
            return Err(ConfigError::NotPositive {
                name: "pool.capacity",
                value: 0,
            });
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_POOL_CAPACITY,
            catchup: true,
        }
    }
}

// =============================================================================
// Network Configuration
// =============================================================================

/// Peer networking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Address the peer RPC server binds to
    pub listen_addr: String,

    /// Timeout of a single peer request in milliseconds
    pub request_timeout_ms: u64,

    /// Pause between delivery attempts of targeted messages in milliseconds
    pub retry_interval_ms: u64,

    /// Maximum concurrent inbound connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    100
}

impl NetworkConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.listen_addr
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocketAddr(self.listen_addr.clone()))?;

        if self.request_timeout_ms == 0 {
            return Err(ConfigError::NotPositive {
                name: "network.request_timeout_ms",
                value: 0,
            });
        }
        if self.retry_interval_ms == 0 {
            return Err(ConfigError::NotPositive {
                name: "network.retry_interval_ms",
                value: 0,
            });
        }
        Ok(())
    }

    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Retry interval as a duration.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:26660".to_string(),
            request_timeout_ms: 5_000,
            retry_interval_ms: 500,
            max_connections: 100,
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json, compact)
    pub format: String,
}

impl LoggingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.level.clone()));
        }

        let valid_formats = ["text", "json", "compact"];
        if !valid_formats.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogFormat(self.format.clone()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}
