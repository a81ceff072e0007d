//! Schemas
//!
//! An ordered set of [`Property`] descriptors built from a plain
//! field -> options mapping. The `$type` discriminator is implicit: it is
//! never declared by the application but always available through
//! [`Schema::discriminator`].

use indexmap::IndexMap;
use serde_json::Value;

use crate::property::{Property, PropertyOptions, PropertyType};
use crate::{MogwaiError, Result, RESERVED_PROPERTY_NAMES};

/// Ordered collection of properties describing one entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: Option<String>,
    properties: IndexMap<String, Property>,
    discriminator: Property,
}

impl Schema {
    /// Build a schema from field definitions, in declaration order.
    ///
    /// Fails with [`MogwaiError::Schema`] on reserved or duplicate names and
    /// on unique fields without an explicit type.
    pub fn new<I, K>(definition: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, PropertyOptions)>,
        K: Into<String>,
    {
        let mut properties = IndexMap::new();

        for (name, options) in definition {
            let name = name.into();

            if RESERVED_PROPERTY_NAMES.contains(&name.as_str()) {
                return Err(MogwaiError::Schema(format!(
                    "'{name}' is a reserved property name"
                )));
            }
            if properties.contains_key(&name) {
                return Err(MogwaiError::Schema(format!(
                    "Property '{name}' is declared twice"
                )));
            }

            let property = Property::new(name.clone(), &options)?;
            properties.insert(name, property);
        }

        Ok(Self {
            name: None,
            properties,
            discriminator: Property::discriminator(),
        })
    }

    /// Parse a JSON definition.
    ///
    /// Each field maps either to a type name (`{"name": "string"}`) or to an
    /// options object (`{"email": {"type": "string", "unique": true}}`).
    pub fn from_json(definition: &Value) -> Result<Self> {
        let fields = definition.as_object().ok_or_else(|| {
            MogwaiError::Schema("Schema definition must be a JSON object".to_string())
        })?;

        let mut parsed = Vec::with_capacity(fields.len());
        for (name, field) in fields {
            let options = match field {
                Value::String(type_name) => PropertyOptions::new(type_name.parse()?),
                Value::Object(map) => {
                    let property_type = match map.get("type") {
                        Some(Value::String(t)) => Some(t.parse::<PropertyType>()?),
                        Some(other) => {
                            return Err(MogwaiError::Schema(format!(
                                "Property '{name}' has an invalid type: {other}"
                            )));
                        }
                        None => None,
                    };
                    PropertyOptions {
                        property_type,
                        indexed: flag(name, map.get("indexed"))?,
                        unique: flag(name, map.get("unique"))?,
                    }
                }
                other => {
                    return Err(MogwaiError::Schema(format!(
                        "Property '{name}' has an invalid definition: {other}"
                    )));
                }
            };
            parsed.push((name.clone(), options));
        }

        Self::new(parsed)
    }

    /// Start building a schema in code
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Attach a schema name (stored lower-cased)
    pub fn with_name(mut self, name: impl AsRef<str>) -> Self {
        self.name = Some(name.as_ref().to_lowercase());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// All application-declared properties, in declaration order
    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    /// Declared properties that need a backend key (indexed or unique)
    pub fn indexable_properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values().filter(|p| p.is_indexable())
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// The implicit `$type` property
    pub fn discriminator(&self) -> &Property {
        &self.discriminator
    }
}

fn flag(name: &str, value: Option<&Value>) -> Result<bool> {
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(MogwaiError::Schema(format!(
            "Property '{name}' has a non-boolean flag: {other}"
        ))),
    }
}

/// Incremental schema construction
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    name: Option<String>,
    fields: Vec<(String, PropertyOptions)>,
}

impl SchemaBuilder {
    /// Set the schema name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declare a field with full options
    pub fn property(mut self, name: impl Into<String>, options: PropertyOptions) -> Self {
        self.fields.push((name.into(), options));
        self
    }

    /// Declare a plain, non-indexed field
    pub fn field(self, name: impl Into<String>, property_type: PropertyType) -> Self {
        self.property(name, PropertyOptions::new(property_type))
    }

    /// Declare an indexed field
    pub fn indexed(self, name: impl Into<String>, property_type: PropertyType) -> Self {
        self.property(name, PropertyOptions::new(property_type).indexed())
    }

    /// Declare a unique field
    pub fn unique(self, name: impl Into<String>, property_type: PropertyType) -> Self {
        self.property(name, PropertyOptions::new(property_type).unique())
    }

    pub fn build(self) -> Result<Schema> {
        let schema = Schema::new(self.fields)?;
        Ok(match self.name {
            Some(name) => schema.with_name(name),
            None => schema,
        })
    }
}
