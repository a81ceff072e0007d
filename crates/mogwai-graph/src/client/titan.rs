//! Titan backend and index coordination
//!
//! Titan requires a key to be declared before any vertex uses it
//! ("make key before using key"). On every connect the client:
//!
//! 1. fetches the keys already indexed at vertex scope,
//! 2. computes the indexable properties of all models that are missing,
//! 3. creates the `$type` discriminator key first, if absent,
//! 4. creates the remaining keys as one concurrent batch.
//!
//! Keys created by an earlier, partially failed cycle are observed in step 1
//! and never re-issued. Nothing is rolled back.

use std::collections::BTreeSet;

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexMap;
use mogwai_core::{ClientKind, MogwaiError, Property, PropertyOptions, Result, DISCRIMINATOR};

use super::{GraphClient, IndexPhase, IndexReport, KeyFailure};
use crate::{GraphConnection, GremlinScript};

/// Client for Titan graphs served through Rexster
#[derive(Debug)]
pub struct TitanClient {
    /// Keys known to be indexed for the current cycle
    indexed_keys: BTreeSet<String>,
    phase: IndexPhase,
    last_report: Option<IndexReport>,
}

impl Default for TitanClient {
    fn default() -> Self {
        Self {
            indexed_keys: BTreeSet::new(),
            phase: IndexPhase::Start,
            last_report: None,
        }
    }
}

impl TitanClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current coordination phase
    pub fn phase(&self) -> IndexPhase {
        self.phase
    }

    /// Whether a key is known to be indexed
    pub fn is_already_indexed(&self, key: &str) -> bool {
        self.indexed_keys.contains(key)
    }

    /// Keys known to be indexed
    pub fn indexed_keys(&self) -> impl Iterator<Item = &str> {
        self.indexed_keys.iter().map(String::as_str)
    }

    fn enter(&mut self, phase: IndexPhase) {
        tracing::debug!("Titan index coordination: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Create every missing key for the given properties.
    ///
    /// Fails with the first creation error once the whole batch has settled.
    /// The report of the cycle stays available via [`GraphClient::last_report`].
    pub async fn create_indexes(
        &mut self,
        connection: &dyn GraphConnection,
        properties: &[Property],
    ) -> Result<IndexReport> {
        self.phase = IndexPhase::Start;
        let mut report = IndexReport::default();

        self.enter(IndexPhase::FetchExisting);
        let existing = match Self::fetch_existing(connection).await {
            Ok(keys) => keys,
            Err(e) => return Err(self.abort(report, e)),
        };
        report.existing = existing.iter().cloned().collect();
        self.indexed_keys = existing;

        self.enter(IndexPhase::ComputeMissing);
        let missing = self.missing_keys(properties);
        tracing::info!(
            "Properties flagged for indexing: {} (missing: {})",
            properties.len(),
            missing.len()
        );

        if !self.is_already_indexed(DISCRIMINATOR) {
            self.enter(IndexPhase::CreateDiscriminatorKey);
            let discriminator = Property::discriminator();
            if let Err(e) = Self::make_key(connection, &discriminator).await {
                report.failed.push(KeyFailure {
                    key: DISCRIMINATOR.to_string(),
                    message: e.to_string(),
                });
                return Err(self.abort(report, e));
            }
            self.indexed_keys.insert(DISCRIMINATOR.to_string());
            report.created.push(DISCRIMINATOR.to_string());
        }

        self.enter(IndexPhase::CreatePropertyKeys);
        let outcomes = join_all(
            missing
                .iter()
                .map(|property| Self::make_key(connection, property)),
        )
        .await;

        let mut first_error = None;
        for (property, outcome) in missing.iter().zip(outcomes) {
            match outcome {
                Ok(()) => {
                    self.indexed_keys.insert(property.name().to_string());
                    report.created.push(property.name().to_string());
                }
                Err(e) => {
                    tracing::error!("Failed to create key '{}': {}", property.name(), e);
                    report.failed.push(KeyFailure {
                        key: property.name().to_string(),
                        message: e.to_string(),
                    });
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(self.abort(report, e)),
            None => {
                self.enter(IndexPhase::Done);
                tracing::info!("Created {} Titan keys", report.created.len());
                self.last_report = Some(report.clone());
                Ok(report)
            }
        }
    }

    fn abort(&mut self, report: IndexReport, error: MogwaiError) -> MogwaiError {
        tracing::error!(
            "Error creating indexes during {}: {}",
            self.phase,
            error
        );
        self.phase = IndexPhase::Error;
        self.last_report = Some(report);
        error
    }

    /// Indexable properties not yet known to the backend, de-duplicated by
    /// name. The first declaration wins; `unique` is merged across models.
    pub fn missing_keys(&self, properties: &[Property]) -> Vec<Property> {
        let mut merged: IndexMap<&str, Property> = IndexMap::new();

        for property in properties.iter().filter(|p| p.is_indexable()) {
            if property.name() == DISCRIMINATOR || self.is_already_indexed(property.name()) {
                continue;
            }

            match merged.get_mut(property.name()) {
                None => {
                    merged.insert(property.name(), property.clone());
                }
                Some(first) => {
                    if first.data_type() != property.data_type() {
                        tracing::warn!(
                            "Property '{}' declared as both {} and {}, keeping {}",
                            property.name(),
                            first.property_type(),
                            property.property_type(),
                            first.property_type()
                        );
                    }
                    if property.is_unique() && !first.is_unique() {
                        let options = PropertyOptions::new(first.property_type()).unique();
                        if let Ok(stricter) = Property::new(first.name(), &options) {
                            *first = stricter;
                        }
                    }
                }
            }
        }

        merged.into_values().collect()
    }

    /// Names of keys already indexed at vertex scope
    async fn fetch_existing(connection: &dyn GraphConnection) -> Result<BTreeSet<String>> {
        let response = connection
            .execute(&GremlinScript::new("g.getIndexedKeys(Vertex.class)"))
            .await?;

        Ok(response
            .results
            .iter()
            .filter_map(|key| key.as_str().map(str::to_string))
            .collect())
    }

    /// Declare one vertex-indexed key
    async fn make_key(connection: &dyn GraphConnection, property: &Property) -> Result<()> {
        connection.execute(&make_key_script(property)).await?;
        tracing::debug!("Created Titan key '{}'", property.name());
        Ok(())
    }
}

/// `makeKey` command for a property: data type, vertex scope, optional uniqueness
pub fn make_key_script(property: &Property) -> GremlinScript {
    let unique = if property.is_unique() { ".unique()" } else { "" };
    GremlinScript::new(format!(
        "g.makeKey(name).dataType({}).indexed(Vertex.class){unique}.make()",
        property.data_type()
    ))
    .with_param("name", property.name())
}

#[async_trait]
impl GraphClient for TitanClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Titan
    }

    async fn initialize(
        &mut self,
        connection: &dyn GraphConnection,
        properties: &[Property],
    ) -> Result<IndexReport> {
        self.create_indexes(connection, properties).await
    }

    fn last_report(&self) -> Option<&IndexReport> {
        self.last_report.as_ref()
    }
}
