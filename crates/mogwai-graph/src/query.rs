//! Gremlin script descriptors
//!
//! Scripts are sent as Groovy text plus a map of named parameters. Values
//! coming from application data are always bound as parameters and never
//! spliced into the script text.

use serde::Serialize;
use serde_json::{Map, Value};

/// A Gremlin script with its bound parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GremlinScript {
    script: String,
    params: Map<String, Value>,
    #[serde(skip)]
    next_param: usize,
}

impl GremlinScript {
    /// Create a script from raw Groovy text
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..Default::default()
        }
    }

    /// Append one statement, newline separated
    pub fn line(&mut self, statement: impl AsRef<str>) -> &mut Self {
        if !self.script.is_empty() && !self.script.ends_with('\n') {
            self.script.push('\n');
        }
        self.script.push_str(statement.as_ref());
        self
    }

    /// Prepend a block of Groovy (procedure definitions) to the script
    pub fn prepend(&mut self, source: impl AsRef<str>) -> &mut Self {
        let source = source.as_ref().trim();
        if !source.is_empty() {
            self.script = format!("{source}\n{}", self.script);
        }
        self
    }

    /// Bind a value under a generated name (`p0`, `p1`, ...) and return the name
    pub fn bind(&mut self, value: impl Into<Value>) -> String {
        let name = loop {
            let candidate = format!("p{}", self.next_param);
            self.next_param += 1;
            if !self.params.contains_key(&candidate) {
                break candidate;
            }
        };
        self.params.insert(name.clone(), value.into());
        name
    }

    /// Bind a value under an explicit name
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Builder form of [`GremlinScript::set_param`]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_param(name, value);
        self
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }
}

impl From<&str> for GremlinScript {
    fn from(script: &str) -> Self {
        Self::new(script)
    }
}

impl From<String> for GremlinScript {
    fn from(script: String) -> Self {
        Self::new(script)
    }
}

impl std::fmt::Display for GremlinScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.script)
    }
}
