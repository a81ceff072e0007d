//! Mogwai Graph - Gremlin query bridge and backend clients
//!
//! Provides the boundary between Mogwai and a Gremlin-speaking graph server:
//! - [`GraphConnector`] / [`GraphConnection`]: open a connection, execute scripts
//! - [`GremlinScript`]: script text plus bound parameters
//! - [`client`]: backend flavours (Titan, Rexster) and index coordination

use std::sync::Arc;

use async_trait::async_trait;
use mogwai_core::{ConnectionSettings, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod client;
pub mod http;
pub mod query;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use client::{create_client, GraphClient, IndexPhase, IndexReport, KeyFailure};
pub use http::{HttpConnection, HttpConnector};
pub use query::GremlinScript;

/// Result envelope of one executed script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Elements or values returned by the script
    #[serde(default)]
    pub results: Vec<Value>,

    #[serde(default = "default_success")]
    pub success: bool,

    /// Server-side execution time in milliseconds, when reported
    #[serde(rename = "queryTime", default, skip_serializing_if = "Option::is_none")]
    pub query_time: Option<f64>,
}

fn default_success() -> bool {
    true
}

impl QueryResponse {
    /// Successful response carrying the given results
    pub fn with_results(results: Vec<Value>) -> Self {
        Self {
            results,
            success: true,
            query_time: None,
        }
    }

    /// First result, if any
    pub fn first(&self) -> Option<&Value> {
        self.results.first()
    }
}

impl Default for QueryResponse {
    fn default() -> Self {
        Self::with_results(Vec::new())
    }
}

/// An open connection able to execute Gremlin scripts
#[async_trait]
pub trait GraphConnection: Send + Sync {
    /// Execute a script and return the raw response
    async fn execute(&self, query: &GremlinScript) -> Result<QueryResponse>;

    /// Close the connection; later executions fail
    async fn close(&self) -> Result<()>;

    /// Connection name for logging
    fn name(&self) -> &str;
}

/// Opens connections to a graph server.
///
/// A successful `open` is the "connection open" event: the returned
/// connection is ready to execute scripts.
#[async_trait]
pub trait GraphConnector: Send + Sync {
    async fn open(&self, settings: &ConnectionSettings) -> Result<Arc<dyn GraphConnection>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_defaults() {
        let response: QueryResponse = serde_json::from_value(json!({"results": [1, 2]})).unwrap();
        assert!(response.success);
        assert_eq!(response.first(), Some(&json!(1)));
        assert_eq!(response.query_time, None);
    }

    #[test]
    fn test_response_rexster_envelope() {
        let response: QueryResponse = serde_json::from_value(json!({
            "version": "2.4.0",
            "results": [{"_id": "1", "_type": "vertex"}],
            "success": true,
            "queryTime": 12.5
        }))
        .unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.query_time, Some(12.5));
    }
}
