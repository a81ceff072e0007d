//! Model compiler
//!
//! Turns a schema into a [`ModelClass`]: a lookup table of finder closures,
//! each bound over the property name it queries, plus the optional script
//! bundle.

use std::sync::Arc;

use indexmap::IndexMap;
use mogwai_core::{MogwaiError, Result, Schema, DISCRIMINATOR};
use mogwai_graph::GremlinScript;
use serde_json::Value;

use crate::model::{Finder, ModelClass, FIND_BY_ID, FIND_BY_KEY_VALUE};
use crate::scripts::ScriptBundle;

/// Member names of the instance runtime; properties cannot shadow them
pub const RESERVED_MEMBERS: [&str; 12] = [
    "save",
    "insert",
    "update",
    "sync",
    "toObject",
    "addEdge",
    "addOutgoingEdge",
    "addIncomingEdge",
    "find",
    "schema",
    "scripts",
    "g",
];

/// `first_name` -> `findByFirstName`
pub fn finder_name(property: &str) -> String {
    format!("findBy{}", camel_case(property))
}

fn camel_case(name: &str) -> String {
    name.split(['_', '-', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ModelCompiler;

impl ModelCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Compile a schema into a model class
    pub fn compile(
        &self,
        model_name: &str,
        schema: Arc<Schema>,
        scripts: Option<ScriptBundle>,
    ) -> Result<ModelClass> {
        let name = model_name.trim().to_lowercase();
        if name.is_empty() {
            return Err(MogwaiError::Compilation(
                "Model name must not be empty".to_string(),
            ));
        }

        let mut finders = IndexMap::new();
        finders.insert(
            FIND_BY_ID.to_string(),
            Finder::new(FIND_BY_ID, 1, |args: &[Value]| {
                GremlinScript::new("g.v(id)").with_param("id", args[0].clone())
            }),
        );
        finders.insert(
            FIND_BY_KEY_VALUE.to_string(),
            Finder::new(FIND_BY_KEY_VALUE, 2, |args: &[Value]| {
                GremlinScript::new("g.V(key, value)")
                    .with_param("key", args[0].clone())
                    .with_param("value", args[1].clone())
            }),
        );

        for property in schema.properties() {
            let property_name = property.name().to_string();

            if RESERVED_MEMBERS.contains(&property_name.as_str()) {
                return Err(MogwaiError::Compilation(format!(
                    "Property '{property_name}' of model {name} collides with a reserved member"
                )));
            }

            let finder = finder_name(&property_name);
            if finders.contains_key(&finder) {
                return Err(MogwaiError::Compilation(format!(
                    "Finder {finder} generated for '{property_name}' of model {name} is already defined"
                )));
            }

            let model_type = name.clone();
            finders.insert(
                finder.clone(),
                Finder::new(finder, 1, move |args: &[Value]| {
                    GremlinScript::new("g.V(key, value).has(typeKey, modelType)")
                        .with_param("key", property_name.as_str())
                        .with_param("value", args[0].clone())
                        .with_param("typeKey", DISCRIMINATOR)
                        .with_param("modelType", model_type.as_str())
                }),
            );
        }

        tracing::debug!(
            "Compiled model {} with finders: {:?}",
            name,
            finders.keys().collect::<Vec<_>>()
        );

        Ok(ModelClass::new(name, schema, finders, scripts))
    }
}
