//! Test doubles for the query-execution bridge
//!
//! Enabled for this crate's unit tests and, through the `test-utils`
//! feature, for downstream integration tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mogwai_core::{ConnectionSettings, MogwaiError, Result};

use crate::{GraphConnection, GraphConnector, GremlinScript, QueryResponse};

type Handler = dyn Fn(&GremlinScript) -> Result<QueryResponse> + Send + Sync;

/// In-memory connection recording every executed script
pub struct MockConnection {
    executed: Mutex<Vec<GremlinScript>>,
    handler: Box<Handler>,
    closed: AtomicBool,
}

impl MockConnection {
    /// Connection answering every script with an empty success
    pub fn new() -> Self {
        Self::with_handler(|_| Ok(QueryResponse::default()))
    }

    /// Connection answering every script with the same results
    pub fn replying(results: Vec<serde_json::Value>) -> Self {
        Self::with_handler(move |_| Ok(QueryResponse::with_results(results.clone())))
    }

    /// Connection delegating every script to `handler`
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&GremlinScript) -> Result<QueryResponse> + Send + Sync + 'static,
    {
        Self {
            executed: Mutex::new(Vec::new()),
            handler: Box::new(handler),
            closed: AtomicBool::new(false),
        }
    }

    /// Scripts executed so far, in call order
    pub fn executed(&self) -> Vec<GremlinScript> {
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn execution_count(&self) -> usize {
        self.executed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Executed scripts whose text contains `needle`
    pub fn scripts_containing(&self, needle: &str) -> Vec<GremlinScript> {
        self.executed()
            .into_iter()
            .filter(|s| s.script().contains(needle))
            .collect()
    }

    /// Most recently executed script
    pub fn last(&self) -> Option<GremlinScript> {
        self.executed().pop()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphConnection for MockConnection {
    async fn execute(&self, query: &GremlinScript) -> Result<QueryResponse> {
        if self.is_closed() {
            return Err(MogwaiError::Backend("Connection is closed".to_string()));
        }

        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.clone());
        (self.handler)(query)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Connector handing out a shared [`MockConnection`]
pub struct MockConnector {
    connection: Arc<MockConnection>,
    open_error: Option<String>,
    opened: AtomicUsize,
}

impl MockConnector {
    pub fn new(connection: Arc<MockConnection>) -> Self {
        Self {
            connection,
            open_error: None,
            opened: AtomicUsize::new(0),
        }
    }

    /// Connector whose `open` always fails with a backend error
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            connection: Arc::new(MockConnection::new()),
            open_error: Some(message.into()),
            opened: AtomicUsize::new(0),
        }
    }

    /// Number of successful `open` calls
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphConnector for MockConnector {
    async fn open(&self, _settings: &ConnectionSettings) -> Result<Arc<dyn GraphConnection>> {
        if let Some(message) = &self.open_error {
            return Err(MogwaiError::Backend(message.clone()));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.connection.clone())
    }
}
