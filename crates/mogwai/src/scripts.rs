//! Auxiliary server-side script bundles
//!
//! A bundle is Groovy source defining procedures (`def update(id, properties) {...}`)
//! that a model can invoke instead of rebuilding the same traversal on every
//! call. Invoking a procedure sends the bundle source followed by the call,
//! with every argument bound as a script parameter.

use indexmap::IndexMap;
use mogwai_core::{MogwaiError, Result};
use mogwai_graph::{GraphConnection, GremlinScript, QueryResponse};
use regex::Regex;
use serde_json::Value;

/// Groovy source plus the procedures it defines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBundle {
    source: String,
    /// Procedure name -> parameter names
    procedures: IndexMap<String, Vec<String>>,
}

impl ScriptBundle {
    /// Parse procedure signatures out of Groovy source
    pub fn parse(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let signature = Regex::new(r"(?m)^\s*def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(([^)]*)\)")
            .map_err(|e| MogwaiError::Compilation(format!("Invalid procedure pattern: {e}")))?;

        let mut procedures = IndexMap::new();
        for captures in signature.captures_iter(&source) {
            let name = captures[1].to_string();
            let params: Vec<String> = captures[2]
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                // "Map properties" -> "properties"
                .filter_map(|p| p.split_whitespace().last().map(str::to_string))
                .collect();

            if procedures.insert(name.clone(), params).is_some() {
                return Err(MogwaiError::Compilation(format!(
                    "Procedure '{name}' is defined twice"
                )));
            }
        }

        Ok(Self { source, procedures })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn has_procedure(&self, name: &str) -> bool {
        self.procedures.contains_key(name)
    }

    pub fn procedure_names(&self) -> impl Iterator<Item = &str> {
        self.procedures.keys().map(String::as_str)
    }

    /// Number of parameters a procedure declares
    pub fn arity(&self, name: &str) -> Option<usize> {
        self.procedures.get(name).map(Vec::len)
    }

    /// Bind arguments to a procedure.
    ///
    /// Unknown procedures and argument count mismatches fail here, before any
    /// round trip.
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<BoundProcedure> {
        let params = self.procedures.get(name).ok_or_else(|| {
            MogwaiError::Validation(format!("Script bundle has no procedure '{name}'"))
        })?;

        if params.len() != args.len() {
            return Err(MogwaiError::Validation(format!(
                "Procedure '{name}' takes {} arguments, got {}",
                params.len(),
                args.len()
            )));
        }

        let mut script = GremlinScript::default();
        let bound: Vec<String> = args.into_iter().map(|arg| script.bind(arg)).collect();
        script.line(format!("{name}({})", bound.join(", ")));
        script.prepend(&self.source);

        Ok(BoundProcedure {
            name: name.to_string(),
            script,
        })
    }
}

/// A procedure call ready to be executed
#[derive(Debug, Clone)]
pub struct BoundProcedure {
    name: String,
    script: GremlinScript,
}

impl BoundProcedure {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn script(&self) -> &GremlinScript {
        &self.script
    }

    /// Execute and return the raw response
    pub async fn execute(&self, connection: &dyn GraphConnection) -> Result<QueryResponse> {
        tracing::debug!("Calling server-side procedure {}", self.name);
        connection.execute(&self.script).await
    }

    /// Execute and return only the results
    pub async fn query(&self, connection: &dyn GraphConnection) -> Result<Vec<Value>> {
        Ok(self.execute(connection).await?.results)
    }
}
