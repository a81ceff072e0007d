//! Model classes and instances
//!
//! A [`ModelClass`] is produced by the compiler for one schema. It owns the
//! generated finders and the optional script bundle. A [`ModelInstance`] is
//! the in-memory side of one vertex: a field map plus the backend identifier
//! once persisted.
//!
//! Every operation that talks to the backend takes the connection
//! explicitly and performs exactly one round trip.

use std::sync::Arc;

use indexmap::IndexMap;
use mogwai_core::{
    ElementId, MogwaiError, Result, Schema, DISCRIMINATOR, ELEMENT_TYPE_FIELD, ID_FIELD,
};
use mogwai_graph::{GraphConnection, GremlinScript, QueryResponse};
use serde_json::{Map, Value};

use crate::scripts::ScriptBundle;

/// Name of the default finder looking a vertex up by identifier
pub const FIND_BY_ID: &str = "findById";

/// Name of the default finder looking vertices up by an arbitrary key/value
pub const FIND_BY_KEY_VALUE: &str = "findByKeyValue";

// ============================================================================
// Finders
// ============================================================================

type ScriptBuilder = dyn Fn(&[Value]) -> GremlinScript + Send + Sync;

/// A generated query method
pub struct Finder {
    name: String,
    arity: usize,
    build: Box<ScriptBuilder>,
}

impl Finder {
    pub(crate) fn new<F>(name: impl Into<String>, arity: usize, build: F) -> Self
    where
        F: Fn(&[Value]) -> GremlinScript + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arity,
            build: Box::new(build),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Build the traversal for the given arguments
    pub fn script(&self, args: &[Value]) -> Result<GremlinScript> {
        if args.len() != self.arity {
            return Err(MogwaiError::Validation(format!(
                "{} takes {} arguments, got {}",
                self.name,
                self.arity,
                args.len()
            )));
        }
        Ok((self.build)(args))
    }
}

impl std::fmt::Debug for Finder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Finder")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

// ============================================================================
// Model Class
// ============================================================================

/// Results of a raw traversal
#[derive(Debug, Clone)]
pub enum Found {
    /// Each element wrapped as a model instance
    Models(Vec<ModelInstance>),
    /// Backend elements as returned
    Raw(Vec<Value>),
}

/// A compiled model: schema, generated finders and script bundle
#[derive(Debug)]
pub struct ModelClass {
    name: String,
    schema: Arc<Schema>,
    finders: IndexMap<String, Finder>,
    scripts: Option<ScriptBundle>,
}

impl ModelClass {
    pub(crate) fn new(
        name: String,
        schema: Arc<Schema>,
        finders: IndexMap<String, Finder>,
        scripts: Option<ScriptBundle>,
    ) -> Self {
        Self {
            name,
            schema,
            finders,
            scripts,
        }
    }

    /// Canonical (lower-cased) model name, also the `$type` of its vertices
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn scripts(&self) -> Option<&ScriptBundle> {
        self.scripts.as_ref()
    }

    pub fn finder(&self, name: &str) -> Option<&Finder> {
        self.finders.get(name)
    }

    pub fn finder_names(&self) -> impl Iterator<Item = &str> {
        self.finders.keys().map(String::as_str)
    }

    /// A new, unsaved instance
    pub fn new_instance(self: &Arc<Self>) -> ModelInstance {
        ModelInstance {
            model: Arc::clone(self),
            id: None,
            fields: Map::new(),
        }
    }

    /// A new, unsaved instance initialised from a JSON object
    pub fn instance(self: &Arc<Self>, data: Value) -> Result<ModelInstance> {
        let mut instance = self.new_instance();
        match data {
            Value::Object(fields) => {
                for (name, value) in fields {
                    instance.set(name, value)?;
                }
            }
            Value::Null => {}
            other => {
                return Err(MogwaiError::Validation(format!(
                    "Model data must be an object, got {other}"
                )));
            }
        }
        Ok(instance)
    }

    /// Wrap a raw backend element
    pub fn from_element(self: &Arc<Self>, element: Value) -> Result<ModelInstance> {
        let Value::Object(mut fields) = element else {
            return Err(MogwaiError::Validation(format!(
                "Cannot build a {} from a non-element result: {element}",
                self.name
            )));
        };

        let id = fields.remove(ID_FIELD).as_ref().and_then(ElementId::from_value);
        fields.remove(ELEMENT_TYPE_FIELD);

        Ok(ModelInstance {
            model: Arc::clone(self),
            id,
            fields,
        })
    }

    /// Execute a raw traversal.
    ///
    /// With `as_models` every result is wrapped as an instance of this model,
    /// otherwise the backend elements are returned untouched.
    pub async fn find(
        self: &Arc<Self>,
        connection: &dyn GraphConnection,
        query: impl Into<GremlinScript>,
        as_models: bool,
    ) -> Result<Found> {
        let response = connection.execute(&query.into()).await?;

        if !as_models {
            return Ok(Found::Raw(response.results));
        }

        response
            .results
            .into_iter()
            .filter(|element| !element.is_null())
            .map(|element| self.from_element(element))
            .collect::<Result<Vec<_>>>()
            .map(Found::Models)
    }

    /// Invoke a generated finder by name
    pub async fn call_finder(
        self: &Arc<Self>,
        connection: &dyn GraphConnection,
        name: &str,
        args: &[Value],
    ) -> Result<Vec<ModelInstance>> {
        let finder = self.finder(name).ok_or_else(|| {
            MogwaiError::Validation(format!("Model {} has no finder {name}", self.name))
        })?;
        let script = finder.script(args)?;

        match self.find(connection, script, true).await? {
            Found::Models(models) => Ok(models),
            Found::Raw(_) => Ok(Vec::new()),
        }
    }

    /// `findById`
    pub async fn find_by_id(
        self: &Arc<Self>,
        connection: &dyn GraphConnection,
        id: impl Into<ElementId>,
    ) -> Result<Option<ModelInstance>> {
        let found = self
            .call_finder(connection, FIND_BY_ID, &[id.into().to_value()])
            .await?;
        Ok(found.into_iter().next())
    }

    /// `findByKeyValue`
    pub async fn find_by_key_value(
        self: &Arc<Self>,
        connection: &dyn GraphConnection,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<ModelInstance>> {
        self.call_finder(connection, FIND_BY_KEY_VALUE, &[Value::from(key), value.into()])
            .await
    }

    /// The generated `findBy<Property>` finder for a schema property
    pub async fn find_by(
        self: &Arc<Self>,
        connection: &dyn GraphConnection,
        property: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<ModelInstance>> {
        let declared = self.schema.property(property).ok_or_else(|| {
            MogwaiError::Validation(format!(
                "Model {} has no property '{property}'",
                self.name
            ))
        })?;
        let value = declared.to_backend(&value.into())?;
        let name = crate::compiler::finder_name(property);
        self.call_finder(connection, &name, &[value]).await
    }
}

// ============================================================================
// Model Instances
// ============================================================================

/// Endpoint of an edge: a model instance or a raw vertex identifier
#[derive(Debug, Clone, Copy)]
pub enum EdgeEndpoint<'a> {
    Instance(&'a ModelInstance),
    Id(&'a ElementId),
}

impl<'a> EdgeEndpoint<'a> {
    fn resolve(self, role: &str) -> Result<ElementId> {
        match self {
            Self::Id(id) => Ok(id.clone()),
            Self::Instance(instance) => instance.id.clone().ok_or_else(|| {
                MogwaiError::Validation(format!(
                    "Cannot create edge: {role} {} vertex is not saved",
                    instance.model.name
                ))
            }),
        }
    }
}

impl<'a> From<&'a ModelInstance> for EdgeEndpoint<'a> {
    fn from(instance: &'a ModelInstance) -> Self {
        Self::Instance(instance)
    }
}

impl<'a> From<&'a ElementId> for EdgeEndpoint<'a> {
    fn from(id: &'a ElementId) -> Self {
        Self::Id(id)
    }
}

/// One model object, backed by a vertex once saved
#[derive(Debug, Clone)]
pub struct ModelInstance {
    model: Arc<ModelClass>,
    id: Option<ElementId>,
    fields: Map<String, Value>,
}

impl ModelInstance {
    pub fn model(&self) -> &Arc<ModelClass> {
        &self.model
    }

    /// Backend identifier, `None` until saved
    pub fn id(&self) -> Option<&ElementId> {
        self.id.as_ref()
    }

    /// True until the instance has been persisted
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a field. Schema properties are type-checked; other names are kept
    /// as ad hoc fields that are never persisted.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let name = name.into();
        let value = value.into();

        if name == DISCRIMINATOR || name == ID_FIELD || name == ELEMENT_TYPE_FIELD {
            return Err(MogwaiError::Validation(format!(
                "'{name}' is managed by Mogwai and cannot be set"
            )));
        }
        if let Some(property) = self.model.schema.property(&name) {
            property.validate(&value)?;
        }

        self.fields.insert(name, value);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Shallow snapshot of the instance's own fields, `_id` included once saved
    pub fn to_object(&self) -> Map<String, Value> {
        let mut object = self.fields.clone();
        if let Some(id) = &self.id {
            object.insert(ID_FIELD.to_string(), id.to_value());
        }
        object
    }

    /// Current values of schema-declared properties, in schema order, as
    /// written to the backend. Ad hoc fields and unset properties are left out.
    fn declared_values(&self) -> Result<Vec<(String, Value)>> {
        let mut values = Vec::new();
        for property in self.model.schema.properties() {
            if let Some(value) = self.fields.get(property.name()) {
                if value.is_null() {
                    continue;
                }
                values.push((property.name().to_string(), property.to_backend(value)?));
            }
        }
        Ok(values)
    }

    /// Insert when new, update otherwise
    pub async fn save(&mut self, connection: &dyn GraphConnection) -> Result<QueryResponse> {
        if self.is_new() {
            self.insert(connection).await
        } else {
            self.update(connection).await
        }
    }

    /// Create the backing vertex and merge the stored element back in
    pub async fn insert(&mut self, connection: &dyn GraphConnection) -> Result<QueryResponse> {
        let values = self.declared_values()?;
        let mut script = GremlinScript::default();

        script.line("v = g.addVertex()");
        let key = script.bind(DISCRIMINATOR);
        let model_type = script.bind(self.model.name.as_str());
        script.line(format!("v.addProperty({key}, {model_type})"));

        for (name, value) in values {
            let indexed = self
                .model
                .schema
                .property(&name)
                .is_some_and(|p| p.is_indexed());
            let key = script.bind(name);
            let value = script.bind(value);
            // Indexed keys go through addProperty (multi-valued history on Titan)
            if indexed {
                script.line(format!("v.addProperty({key}, {value})"));
            } else {
                script.line(format!("v.setProperty({key}, {value})"));
            }
        }
        script.line("v");

        tracing::debug!("Inserting new {} vertex", self.model.name);
        let response = connection.execute(&script).await?;
        self.sync(&response)?;
        Ok(response)
    }

    /// Push schema-declared values to the existing vertex
    pub async fn update(&self, connection: &dyn GraphConnection) -> Result<QueryResponse> {
        let id = self.id.clone().ok_or_else(|| {
            MogwaiError::Validation(format!(
                "Cannot update unsaved {} instance",
                self.model.name
            ))
        })?;

        let properties: Map<String, Value> = self.declared_values()?.into_iter().collect();

        let script = match self.model.scripts.as_ref().filter(|s| s.has_procedure("update")) {
            Some(bundle) => bundle
                .call("update", vec![id.to_value(), Value::Object(properties)])?
                .script()
                .clone(),
            None => {
                let mut script = GremlinScript::default()
                    .with_param("id", id.to_value())
                    .with_param("properties", Value::Object(properties));
                script
                    .line("v = g.v(id)")
                    .line("if (v == null) { return [] }")
                    .line("properties.each { key, value -> v.setProperty(key, value) }")
                    .line("v");
                script
            }
        };

        tracing::debug!("Updating {} vertex {}", self.model.name, id);
        let response = connection.execute(&script).await?;

        match response.first() {
            None | Some(Value::Null) => Err(MogwaiError::NotFound(format!(
                "{} vertex {id}",
                self.model.name
            ))),
            Some(_) => Ok(response),
        }
    }

    /// Merge the first element of a response into this instance.
    ///
    /// Nothing is merged unless the element carries an identifier.
    pub fn sync(&mut self, response: &QueryResponse) -> Result<()> {
        let element = response
            .first()
            .and_then(Value::as_object)
            .ok_or_else(|| {
                MogwaiError::Backend(format!(
                    "Vertex creation for {} returned no element",
                    self.model.name
                ))
            })?;

        let id = element
            .get(ID_FIELD)
            .and_then(ElementId::from_value)
            .ok_or_else(|| {
                MogwaiError::Backend(format!(
                    "Element returned for {} has no identifier",
                    self.model.name
                ))
            })?;

        for (name, value) in element {
            if name != ID_FIELD && name != ELEMENT_TYPE_FIELD {
                self.fields.insert(name.clone(), value.clone());
            }
        }
        self.fields
            .entry(DISCRIMINATOR)
            .or_insert_with(|| Value::from(self.model.name.as_str()));
        self.id = Some(id);

        Ok(())
    }

    /// Create a labeled edge between two persisted vertices.
    ///
    /// Unsaved instance endpoints fail before any round trip.
    pub async fn add_edge<'a>(
        &self,
        connection: &dyn GraphConnection,
        from: impl Into<EdgeEndpoint<'a>>,
        to: impl Into<EdgeEndpoint<'a>>,
        label: &str,
        properties: Value,
    ) -> Result<QueryResponse> {
        let out_id = from.into().resolve("source")?;
        let in_id = to.into().resolve("target")?;

        let properties = match properties {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(MogwaiError::Validation(format!(
                    "Edge properties must be an object, got {other}"
                )));
            }
        };

        let mut script = GremlinScript::default()
            .with_param("outId", out_id.to_value())
            .with_param("inId", in_id.to_value())
            .with_param("label", label)
            .with_param("properties", Value::Object(properties));
        script
            .line("v1 = g.v(outId)")
            .line("v2 = g.v(inId)")
            .line("g.addEdge(v1, v2, label, properties)");

        tracing::debug!("Adding edge {} -[{}]-> {}", out_id, label, in_id);
        connection.execute(&script).await
    }

    /// Edge from this instance to `to`; fails immediately if this instance is unsaved
    pub async fn add_outgoing_edge<'a>(
        &'a self,
        connection: &dyn GraphConnection,
        to: impl Into<EdgeEndpoint<'a>>,
        label: &str,
        properties: Value,
    ) -> Result<QueryResponse> {
        self.ensure_saved()?;
        self.add_edge(connection, self, to, label, properties).await
    }

    /// Edge from `from` to this instance; fails immediately if this instance is unsaved
    pub async fn add_incoming_edge<'a>(
        &'a self,
        connection: &dyn GraphConnection,
        from: impl Into<EdgeEndpoint<'a>>,
        label: &str,
        properties: Value,
    ) -> Result<QueryResponse> {
        self.ensure_saved()?;
        self.add_edge(connection, from, self, label, properties).await
    }

    fn ensure_saved(&self) -> Result<()> {
        if self.is_new() {
            return Err(MogwaiError::Validation(format!(
                "Error creating a new edge: {} instance is not saved",
                self.model.name
            )));
        }
        Ok(())
    }
}
