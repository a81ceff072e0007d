//! Mogwai - object-to-graph mapper for Gremlin graph databases
//!
//! Applications declare [`Schema`]s, compile them into models through a
//! [`Mapper`], and persist model instances as vertices:
//!
//! - [`compiler`]: schema to [`ModelClass`] with generated finders
//! - [`model`]: instance runtime (save, insert, update, edges)
//! - [`scripts`]: optional server-side procedure bundles
//! - [`Mapper`]: model registry and connection lifecycle, including index
//!   preparation on Titan

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::watch;

pub mod compiler;
pub mod logging;
pub mod model;
pub mod scripts;

pub use compiler::{finder_name, ModelCompiler, RESERVED_MEMBERS};
pub use model::{EdgeEndpoint, Finder, Found, ModelClass, ModelInstance};
pub use mogwai_core::{
    ClientKind, ConfigError, ConnectionSettings, ElementId, IndexFailurePolicy, LoggingConfig,
    MogwaiConfig, MogwaiError, Property, PropertyOptions, PropertyType, Result, Schema,
    SchemaBuilder, DISCRIMINATOR,
};
pub use mogwai_graph::{
    create_client, GraphClient, GraphConnection, GraphConnector, GremlinScript, HttpConnector,
    IndexPhase, IndexReport, QueryResponse,
};
pub use scripts::{BoundProcedure, ScriptBundle};

// ============================================================================
// Mapper
// ============================================================================

/// Registry of schemas and models, and owner of the graph connection.
///
/// Registry maps are only mutated through `&mut self`; share a mapper across
/// tasks by wrapping it in the lock of your choice once models are declared.
pub struct Mapper {
    schemas: HashMap<String, Arc<Schema>>,
    models: IndexMap<String, Arc<ModelClass>>,
    compiler: ModelCompiler,
    settings: Option<ConnectionSettings>,
    client: Option<Box<dyn GraphClient>>,
    connection: Option<Arc<dyn GraphConnection>>,
    ready: watch::Sender<bool>,
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Mapper {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            schemas: HashMap::new(),
            models: IndexMap::new(),
            compiler: ModelCompiler::new(),
            settings: None,
            client: None,
            connection: None,
            ready,
        }
    }

    fn key(name: &str) -> String {
        name.trim().to_lowercase()
    }

    // ------------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------------

    /// Register a schema under a name; an already registered schema wins
    pub fn register_schema(&mut self, name: &str, schema: Schema) -> Arc<Schema> {
        let key = Self::key(name);
        self.schemas
            .entry(key.clone())
            .or_insert_with(|| Arc::new(schema.with_name(key)))
            .clone()
    }

    pub fn get_schema(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.get(&Self::key(name)).cloned()
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.schemas.contains_key(&Self::key(name))
    }

    /// Store a compiled model; an already registered model of the same name wins
    pub fn add_model(&mut self, model: ModelClass) -> Arc<ModelClass> {
        self.models
            .entry(model.name().to_string())
            .or_insert_with(|| Arc::new(model))
            .clone()
    }

    pub fn get_model(&self, name: &str) -> Option<Arc<ModelClass>> {
        self.models.get(&Self::key(name)).cloned()
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.models.contains_key(&Self::key(name))
    }

    /// Forget a model and its schema; the name can be compiled again afterwards
    pub fn remove_model(&mut self, name: &str) -> Option<Arc<ModelClass>> {
        let key = Self::key(name);
        self.schemas.remove(&key);
        self.models.shift_remove(&key)
    }

    /// Names of registered models, in registration order
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Register and compile a model, or return the one already registered
    pub fn model(&mut self, name: &str, schema: Schema) -> Result<Arc<ModelClass>> {
        self.compile_model(name, schema, None)
    }

    /// Same as [`Mapper::model`], binding a script bundle to the model
    pub fn model_with_scripts(
        &mut self,
        name: &str,
        schema: Schema,
        scripts: ScriptBundle,
    ) -> Result<Arc<ModelClass>> {
        self.compile_model(name, schema, Some(scripts))
    }

    fn compile_model(
        &mut self,
        name: &str,
        schema: Schema,
        scripts: Option<ScriptBundle>,
    ) -> Result<Arc<ModelClass>> {
        if let Some(model) = self.get_model(name) {
            tracing::debug!("Model {} already compiled", model.name());
            return Ok(model);
        }

        let key = Self::key(name);
        let schema = match self.schemas.get(&key) {
            Some(existing) => existing.clone(),
            None => Arc::new(schema.with_name(&key)),
        };
        let model = self.compiler.compile(name, schema.clone(), scripts)?;

        // Only a successful compilation registers anything
        self.schemas.insert(key, schema);
        tracing::info!("Registered model {}", model.name());
        Ok(self.add_model(model))
    }

    /// Indexable properties of every registered model, in registration order.
    /// Properties shared by several models appear once per model.
    pub fn indexable_properties(&self) -> Vec<Property> {
        self.models
            .values()
            .flat_map(|model| model.schema().indexable_properties().cloned())
            .collect()
    }

    // ------------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------------

    /// Connect over HTTP and prepare the backend
    pub async fn connect(&mut self, settings: ConnectionSettings) -> Result<IndexReport> {
        let connector = HttpConnector::new();
        self.connect_with(settings, &connector).await
    }

    /// Open a connection through `connector`, initialize the backend client,
    /// then signal readiness.
    ///
    /// Readiness is signalled only after every index command issued by the
    /// client has settled. With [`IndexFailurePolicy::Strict`] the first
    /// index error is returned and the mapper stays disconnected.
    pub async fn connect_with(
        &mut self,
        settings: ConnectionSettings,
        connector: &dyn GraphConnector,
    ) -> Result<IndexReport> {
        if self.connection.is_some() {
            self.disconnect().await?;
        }

        tracing::info!(
            "Connecting to {} ({} client)",
            settings.graph_url(),
            settings.client
        );
        let connection = connector.open(&settings).await?;
        tracing::debug!("Connection {} open", connection.name());

        let mut client = create_client(settings.client);
        let properties = self.indexable_properties();

        let report = match client.initialize(connection.as_ref(), &properties).await {
            Ok(report) => report,
            Err(e) => match settings.index_failure_policy {
                IndexFailurePolicy::Strict => {
                    if let Err(close_err) = connection.close().await {
                        tracing::warn!("Failed to close connection: {}", close_err);
                    }
                    return Err(e);
                }
                IndexFailurePolicy::Degraded => {
                    tracing::warn!("Backend initialization incomplete, continuing: {}", e);
                    client.last_report().cloned().unwrap_or_default()
                }
            },
        };

        self.client = Some(client);
        self.connection = Some(connection);
        self.settings = Some(settings);
        self.ready.send_replace(true);
        tracing::info!("Mogwai ready ({} keys created)", report.created.len());

        Ok(report)
    }

    /// Close the connection and reset readiness
    pub async fn disconnect(&mut self) -> Result<()> {
        self.ready.send_replace(false);
        self.client = None;
        self.settings = None;
        if let Some(connection) = self.connection.take() {
            connection.close().await?;
            tracing::info!("Disconnected from {}", connection.name());
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Watch readiness changes
    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    /// The open connection, for model operations
    pub fn connection(&self) -> Result<Arc<dyn GraphConnection>> {
        self.connection
            .clone()
            .ok_or_else(|| MogwaiError::Backend("Mogwai is not connected".to_string()))
    }

    /// The backend client built on the last successful connect
    pub fn client(&self) -> Option<&dyn GraphClient> {
        self.client.as_deref()
    }

    /// Settings of the current connection
    pub fn settings(&self) -> Option<&ConnectionSettings> {
        self.settings.as_ref()
    }
}
