//! Mogwai Core - Schema types, errors, and shared configuration
//!
//! This crate defines the building blocks used by the rest of Mogwai:
//! - Property descriptors and their backend data types
//! - Schemas (ordered property sets with the reserved discriminator)
//! - Vertex/edge element identifiers
//! - Common error types
//! - Configuration management

pub mod config;
pub mod property;
pub mod schema;

pub use config::{
    ClientKind, ConfigError, ConnectionSettings, IndexFailurePolicy, LoggingConfig, MogwaiConfig,
};
pub use property::{Property, PropertyOptions, PropertyType};
pub use schema::{Schema, SchemaBuilder};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the reserved property binding a vertex to the model that created it
pub const DISCRIMINATOR: &str = "$type";

/// Element identifier field as returned by the backend
pub const ID_FIELD: &str = "_id";

/// Element kind field as returned by the backend ("vertex" / "edge")
pub const ELEMENT_TYPE_FIELD: &str = "_type";

/// Property names an application schema may never declare
pub const RESERVED_PROPERTY_NAMES: [&str; 3] = [DISCRIMINATOR, ID_FIELD, ELEMENT_TYPE_FIELD];

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Mogwai operations
#[derive(Error, Debug)]
pub enum MogwaiError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Compilation error: {0}")]
    Compilation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Failure surfaced verbatim from the query-execution bridge
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Element not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, MogwaiError>;

// ============================================================================
// Element Identifiers
// ============================================================================

/// Backend-assigned identifier of a vertex or edge.
///
/// Titan hands out numeric (long) ids while in-memory Rexster graphs use
/// strings, so both shapes are kept as-is and sent back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementId {
    Number(i64),
    String(String),
}

impl ElementId {
    /// Read an identifier out of a raw backend value.
    ///
    /// Returns `None` for null, empty strings and non-scalar values.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(Self::Number),
            serde_json::Value::String(s) if !s.is_empty() => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    /// Convert back into a JSON value suitable for a bound script parameter
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Self::Number(n) => serde_json::Value::from(*n),
            Self::String(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for ElementId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for ElementId {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

impl From<String> for ElementId {
    fn from(id: String) -> Self {
        Self::String(id)
    }
}

// ============================================================================
// Tests
// ============================================================================
