//! Configuration for rwsplit
//!
//! Centralized configuration with sensible defaults. Can be loaded from a
//! JSON file, every field optional.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ProxyError, Result};
use crate::protocol::CodecLimits;
use crate::router::{Classifier, DEFAULT_READ_ONLY_COMMANDS};

/// Main configuration for a proxy instance
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address for clients
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Backend dial timeout (milliseconds, 0 = OS default)
    pub connect_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Backend Configuration
    // -------------------------------------------------------------------------
    /// Node accepting writes
    pub primary: BackendConfig,

    /// Node serving reads
    pub replica: BackendConfig,

    // -------------------------------------------------------------------------
    // Routing Configuration
    // -------------------------------------------------------------------------
    /// Keywords sent to the replica; everything else goes to the primary
    pub read_only_commands: Vec<String>,

    // -------------------------------------------------------------------------
    // Protocol Configuration
    // -------------------------------------------------------------------------
    /// Decode caps for client frames and backend replies
    pub limits: CodecLimits,
}

/// Where and how to reach one backend
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// host:port
    pub addr: String,

    /// Sent as `AUTH <password>` right after connecting
    pub password: Option<String>,

    /// Sent as `SELECT <db>` right after connecting when non-zero
    pub db: u32,
}

impl BackendConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            password: None,
            db: 0,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new("127.0.0.1:6379")
    }
}

// Keeps passwords out of logs
impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("addr", &self.addr)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db", &self.db)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8889".to_string(),
            max_connections: 1024,
            connect_timeout_ms: 3000,
            primary: BackendConfig::new("127.0.0.1:6379"),
            replica: BackendConfig::new("127.0.0.1:6380"),
            read_only_commands: DEFAULT_READ_ONLY_COMMANDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            limits: CodecLimits::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load a config from a JSON file
    ///
    /// Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            ProxyError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Parse a config from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text)
            .map_err(|e| ProxyError::Config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the proxy cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.trim().is_empty() {
            return Err(ProxyError::Config("listen_addr is empty".to_string()));
        }
        if self.primary.addr.trim().is_empty() {
            return Err(ProxyError::Config("primary.addr is empty".to_string()));
        }
        if self.replica.addr.trim().is_empty() {
            return Err(ProxyError::Config("replica.addr is empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ProxyError::Config("max_connections must be > 0".to_string()));
        }
        let limits = &self.limits;
        if limits.max_nesting_depth == 0
            || limits.max_array_len == 0
            || limits.max_bulk_len == 0
            || limits.max_line_len == 0
            || limits.max_frame_len == 0
        {
            return Err(ProxyError::Config("codec limits must be > 0".to_string()));
        }
        self.classifier().map(|_| ())
    }

    /// Build the routing classifier for this config
    pub fn classifier(&self) -> Result<Classifier> {
        Classifier::new(&self.read_only_commands)
    }

    /// Backend dial timeout, `None` when the OS default applies
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from an existing config, e.g. one loaded from a file
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the primary backend
    pub fn primary(mut self, backend: BackendConfig) -> Self {
        self.config.primary = backend;
        self
    }

    /// Set the replica backend
    pub fn replica(mut self, backend: BackendConfig) -> Self {
        self.config.replica = backend;
        self
    }

    /// Replace the read-only keyword set
    pub fn read_only_commands<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.read_only_commands = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the backend dial timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the decode limits
    pub fn limits(mut self, limits: CodecLimits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
