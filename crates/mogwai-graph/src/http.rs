//! HTTP bridge to a Rexster-compatible Gremlin endpoint
//!
//! Scripts are POSTed as `{"script": ..., "params": ...}` to
//! `http://host:port/graphs/<graph>/tp/gremlin`. Titan servers expose the
//! same extension, so one bridge serves both backend flavours.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mogwai_core::{ConnectionSettings, MogwaiError, Result};
use reqwest::Client;
use serde::Deserialize;

use crate::{GraphConnection, GraphConnector, GremlinScript, QueryResponse};

/// Opens [`HttpConnection`]s
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    /// Create a connector with a default HTTP client
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connector reusing an existing HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GraphConnector for HttpConnector {
    async fn open(&self, settings: &ConnectionSettings) -> Result<Arc<dyn GraphConnection>> {
        let graph_url = settings.graph_url();

        // Probe the graph resource so an unknown graph fails here, not on first query
        let response = self
            .client
            .get(&graph_url)
            .send()
            .await
            .map_err(|e| MogwaiError::Backend(format!("Connection to {graph_url} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MogwaiError::Backend(format!(
                "Graph {graph_url} unavailable ({status}): {error_text}"
            )));
        }

        tracing::info!("Connected to {} ({})", graph_url, settings.client);

        Ok(Arc::new(HttpConnection {
            client: self.client.clone(),
            endpoint: format!("{graph_url}/tp/gremlin"),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Connection executing scripts through the Gremlin extension endpoint
pub struct HttpConnection {
    client: Client,
    endpoint: String,
    closed: AtomicBool,
}

impl HttpConnection {
    /// Endpoint scripts are posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Error body returned by the server on failed scripts
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn describe(self) -> Option<String> {
        match (self.message, self.error) {
            (Some(m), Some(e)) if !m.is_empty() => Some(format!("{m}: {e}")),
            (_, Some(e)) => Some(e),
            (Some(m), None) => Some(m),
            (None, None) => None,
        }
    }
}

#[async_trait]
impl GraphConnection for HttpConnection {
    async fn execute(&self, query: &GremlinScript) -> Result<QueryResponse> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MogwaiError::Backend("Connection is closed".to_string()));
        }

        tracing::debug!("Executing Gremlin script: {}", query.script());

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(query)
            .send()
            .await
            .map_err(|e| MogwaiError::Backend(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&error_text)
                .ok()
                .and_then(ErrorBody::describe)
                .unwrap_or(error_text);
            return Err(MogwaiError::Backend(format!("{status}: {message}")));
        }

        let result: QueryResponse = response
            .json()
            .await
            .map_err(|e| MogwaiError::Backend(format!("Failed to parse response: {e}")))?;

        if !result.success {
            return Err(MogwaiError::Backend(
                "Script execution reported failure".to_string(),
            ));
        }

        Ok(result)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::info!("Closed connection to {}", self.endpoint);
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}
