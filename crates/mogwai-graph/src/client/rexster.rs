//! Generic Rexster backend
//!
//! Plain Blueprints graphs served by Rexster have no key/type system, so
//! there is nothing to declare before vertices are written.

use async_trait::async_trait;
use mogwai_core::{ClientKind, Property, Result};

use super::{GraphClient, IndexReport};
use crate::GraphConnection;

/// Client for schemaless Rexster graphs
#[derive(Debug, Default)]
pub struct RexsterClient {
    last_report: Option<IndexReport>,
}

impl RexsterClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphClient for RexsterClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Rexster
    }

    async fn initialize(
        &mut self,
        connection: &dyn GraphConnection,
        properties: &[Property],
    ) -> Result<IndexReport> {
        tracing::debug!(
            "Rexster backend over {} has no key definitions, skipping {} indexable properties",
            connection.name(),
            properties.len()
        );

        let report = IndexReport::default();
        self.last_report = Some(report.clone());
        Ok(report)
    }

    fn last_report(&self) -> Option<&IndexReport> {
        self.last_report.as_ref()
    }
}
