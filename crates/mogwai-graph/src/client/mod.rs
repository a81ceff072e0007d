//! Backend clients
//!
//! Each graph server flavour implements [`GraphClient`]. The client is built
//! once a connection is open and is responsible for preparing the backend
//! before any model is persisted (for Titan: declaring indexed keys).

use async_trait::async_trait;
use mogwai_core::{ClientKind, Property, Result};
use serde::Serialize;

use crate::GraphConnection;

pub mod rexster;
pub mod titan;

pub use rexster::RexsterClient;
pub use titan::TitanClient;

/// Backend capability interface
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Backend flavour
    fn kind(&self) -> ClientKind;

    /// Prepare the backend for the given indexable properties.
    ///
    /// `properties` holds the indexable properties of every registered model,
    /// possibly with duplicates across models.
    async fn initialize(
        &mut self,
        connection: &dyn GraphConnection,
        properties: &[Property],
    ) -> Result<IndexReport>;

    /// Report of the last initialization, kept even when it failed
    fn last_report(&self) -> Option<&IndexReport>;
}

/// Build the client for a backend flavour
pub fn create_client(kind: ClientKind) -> Box<dyn GraphClient> {
    match kind {
        ClientKind::Titan => Box::new(TitanClient::new()),
        ClientKind::Rexster => Box::new(RexsterClient::new()),
    }
}

/// Index coordination progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPhase {
    Start,
    FetchExisting,
    ComputeMissing,
    CreateDiscriminatorKey,
    CreatePropertyKeys,
    Done,
    Error,
}

impl std::fmt::Display for IndexPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::FetchExisting => "fetch_existing",
            Self::ComputeMissing => "compute_missing",
            Self::CreateDiscriminatorKey => "create_discriminator_key",
            Self::CreatePropertyKeys => "create_property_keys",
            Self::Done => "done",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// A key the backend refused to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyFailure {
    pub key: String,
    pub message: String,
}

/// Outcome of one index coordination cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Keys the backend already had when the cycle started
    pub existing: Vec<String>,

    /// Keys created during this cycle, discriminator first
    pub created: Vec<String>,

    /// Keys whose creation failed
    pub failed: Vec<KeyFailure>,
}

impl IndexReport {
    /// True when no creation failed
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
