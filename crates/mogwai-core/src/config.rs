//! Mogwai Configuration Management
//!
//! Handles configuration from environment variables and TOML files,
//! with defaults matching a local Titan/Rexster server.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MogwaiConfig {
    /// Graph server connection
    pub connection: ConnectionSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl MogwaiConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::parse_toml(path, &content)
    }

    fn parse_toml(path: PathBuf, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        if let Ok(host) = std::env::var("MOGWAI_HOST") {
            self.connection.host = host;
        }
        if let Ok(port) = std::env::var("MOGWAI_PORT") {
            self.connection.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "MOGWAI_PORT".to_string(),
                value: port,
            })?;
        }
        if let Ok(graph) = std::env::var("MOGWAI_GRAPH") {
            self.connection.graph = graph;
        }
        if let Ok(client) = std::env::var("MOGWAI_CLIENT") {
            self.connection.client = client.parse()?;
        }
        if let Ok(policy) = std::env::var("MOGWAI_INDEX_FAILURE_POLICY") {
            self.connection.index_failure_policy = policy.parse()?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(self)
    }
}

/// Graph server connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Graph (database) name on the server
    pub graph: String,

    /// Backend client flavour
    pub client: ClientKind,

    /// What `connect` does when some index keys could not be created
    pub index_failure_policy: IndexFailurePolicy,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8182,
            graph: "graph".to_string(),
            client: ClientKind::Titan,
            index_failure_policy: IndexFailurePolicy::Strict,
        }
    }
}

impl ConnectionSettings {
    /// Create settings for a given server and backend
    pub fn new(
        host: impl Into<String>,
        port: u16,
        graph: impl Into<String>,
        client: ClientKind,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            graph: graph.into(),
            client,
            ..Default::default()
        }
    }

    /// Set the partial index failure policy
    pub fn with_index_failure_policy(mut self, policy: IndexFailurePolicy) -> Self {
        self.index_failure_policy = policy;
        self
    }

    /// Base URL of the graph on the server
    pub fn graph_url(&self) -> String {
        format!("http://{}:{}/graphs/{}", self.host, self.port, self.graph)
    }
}

/// Supported graph backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    Titan,
    Rexster,
}

impl std::fmt::Display for ClientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Titan => write!(f, "titan"),
            Self::Rexster => write!(f, "rexster"),
        }
    }
}

impl std::str::FromStr for ClientKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "titan" => Ok(Self::Titan),
            "rexster" => Ok(Self::Rexster),
            _ => Err(ConfigError::InvalidValue {
                key: "MOGWAI_CLIENT".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Behaviour when an index creation batch partially fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexFailurePolicy {
    /// `connect` fails with the first creation error; readiness is not signalled
    #[default]
    Strict,
    /// Failures are logged and reported, readiness is signalled anyway
    Degraded,
}

impl std::str::FromStr for IndexFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "degraded" => Ok(Self::Degraded),
            _ => Err(ConfigError::InvalidValue {
                key: "MOGWAI_INDEX_FAILURE_POLICY".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
