//! Property descriptors
//!
//! A property describes one schema field: its declared type, whether the
//! backend should index it, and whether values must be unique. Properties
//! are created once at schema-definition time and never change afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{MogwaiError, Result, DISCRIMINATOR};

/// Value types a property may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Integer,
    Boolean,
    /// RFC 3339 string or epoch milliseconds
    Date,
}

impl PropertyType {
    /// Backend class token used when declaring a key for this type.
    ///
    /// Dates are stored as epoch milliseconds, hence `Long.class`.
    pub fn data_type(&self) -> &'static str {
        match self {
            Self::String => "String.class",
            Self::Number => "Double.class",
            Self::Integer => "Long.class",
            Self::Boolean => "Boolean.class",
            Self::Date => "Long.class",
        }
    }

    /// Check a value against this type. Null always passes (unset value).
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }

        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Date => match value {
                Value::String(s) => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
                other => other.is_i64(),
            },
        }
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Integer => write!(f, "integer"),
            Self::Boolean => write!(f, "boolean"),
            Self::Date => write!(f, "date"),
        }
    }
}

impl std::str::FromStr for PropertyType {
    type Err = MogwaiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "string" => Ok(Self::String),
            "number" | "float" | "double" => Ok(Self::Number),
            "integer" | "int" | "long" => Ok(Self::Integer),
            "boolean" | "bool" => Ok(Self::Boolean),
            "date" | "datetime" => Ok(Self::Date),
            _ => Err(MogwaiError::Schema(format!("Unknown property type: {s}"))),
        }
    }
}

/// Declarative options for one schema field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyOptions {
    /// Declared type; `None` means "not given" and defaults to string
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<PropertyType>,

    #[serde(default)]
    pub indexed: bool,

    #[serde(default)]
    pub unique: bool,
}

impl PropertyOptions {
    /// Options with an explicit type and no indexing
    pub fn new(property_type: PropertyType) -> Self {
        Self {
            property_type: Some(property_type),
            ..Default::default()
        }
    }

    /// Mark the field as indexed
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Mark the field as unique (and therefore indexed)
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A single, immutable schema field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Property {
    name: String,
    property_type: PropertyType,
    indexed: bool,
    unique: bool,
}

impl Property {
    /// Build a property from its declared options.
    ///
    /// `unique` requires an explicit type and forces `indexed`.
    pub fn new(name: impl Into<String>, options: &PropertyOptions) -> Result<Self> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(MogwaiError::Schema("Property name cannot be empty".to_string()));
        }

        let property_type = match options.property_type {
            Some(t) => t,
            None if options.unique => {
                return Err(MogwaiError::Schema(format!(
                    "Property '{name}' is unique but declares no type"
                )));
            }
            None => PropertyType::String,
        };

        Ok(Self {
            name,
            property_type,
            indexed: options.indexed || options.unique,
            unique: options.unique,
        })
    }

    /// The reserved `$type` discriminator.
    ///
    /// Indexed but never unique: every vertex of a model shares the same value.
    pub fn discriminator() -> Self {
        Self {
            name: DISCRIMINATOR.to_string(),
            property_type: PropertyType::String,
            indexed: true,
            unique: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    /// Backend class token derived from the declared type
    pub fn data_type(&self) -> &'static str {
        self.property_type.data_type()
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Whether the backend needs a key definition for this property
    pub fn is_indexable(&self) -> bool {
        self.indexed || self.unique
    }

    /// Validate a value against the declared type
    pub fn validate(&self, value: &Value) -> Result<()> {
        if self.property_type.accepts(value) {
            Ok(())
        } else {
            Err(MogwaiError::Validation(format!(
                "Property '{}' expects a {}, got {}",
                self.name, self.property_type, value
            )))
        }
    }

    /// Validate a value and convert it to the representation written to the
    /// backend. Dates given as RFC 3339 strings become epoch milliseconds to
    /// match their `Long.class` key.
    pub fn to_backend(&self, value: &Value) -> Result<Value> {
        self.validate(value)?;

        match (self.property_type, value) {
            (PropertyType::Date, Value::String(s)) => chrono::DateTime::parse_from_rfc3339(s)
                .map(|date| Value::from(date.timestamp_millis()))
                .map_err(|e| {
                    MogwaiError::Validation(format!("Property '{}' has an invalid date: {e}", self.name))
                }),
            _ => Ok(value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unique_implies_indexed() {
        let options = PropertyOptions::new(PropertyType::String).unique();
        let property = Property::new("email", &options).unwrap();

        assert!(property.is_unique());
        assert!(property.is_indexed());
        assert!(property.is_indexable());
    }

    #[test]
    fn test_unique_without_type_is_rejected() {
        let options = PropertyOptions {
            unique: true,
            ..Default::default()
        };

        let err = Property::new("email", &options).unwrap_err();
        assert!(matches!(err, MogwaiError::Schema(_)));
    }

    #[test]
    fn test_missing_type_defaults_to_string() {
        let property = Property::new("nickname", &PropertyOptions::default()).unwrap();
        assert_eq!(property.property_type(), PropertyType::String);
        assert!(!property.is_indexable());
    }

    #[test]
    fn test_data_type_mapping() {
        assert_eq!(PropertyType::String.data_type(), "String.class");
        assert_eq!(PropertyType::Number.data_type(), "Double.class");
        assert_eq!(PropertyType::Integer.data_type(), "Long.class");
        assert_eq!(PropertyType::Boolean.data_type(), "Boolean.class");
        assert_eq!(PropertyType::Date.data_type(), "Long.class");
    }

    #[test]
    fn test_type_parse() {
        assert_eq!("String".parse::<PropertyType>().unwrap(), PropertyType::String);
        assert_eq!("bool".parse::<PropertyType>().unwrap(), PropertyType::Boolean);
        assert!("uuid".parse::<PropertyType>().is_err());
    }

    #[test]
    fn test_validate() {
        let age = Property::new("age", &PropertyOptions::new(PropertyType::Integer)).unwrap();
        assert!(age.validate(&json!(42)).is_ok());
        assert!(age.validate(&json!(null)).is_ok());
        assert!(matches!(
            age.validate(&json!("42")),
            Err(MogwaiError::Validation(_))
        ));

        let born = Property::new("born", &PropertyOptions::new(PropertyType::Date)).unwrap();
        assert!(born.validate(&json!("2014-01-20T10:00:00Z")).is_ok());
        assert!(born.validate(&json!(1390212000000_i64)).is_ok());
        assert!(born.validate(&json!("yesterday")).is_err());
    }

    #[test]
    fn test_discriminator() {
        let discriminator = Property::discriminator();
        assert_eq!(discriminator.name(), "$type");
        assert!(discriminator.is_indexed());
        assert!(!discriminator.is_unique());
        assert_eq!(discriminator.data_type(), "String.class");
    }

    #[test]
    fn test_dates_written_as_epoch_millis() {
        let born = Property::new("born", &PropertyOptions::new(PropertyType::Date)).unwrap();

        let written = born.to_backend(&json!("2014-01-20T10:00:00Z")).unwrap();
        assert_eq!(written, json!(1390212000000_i64));
        assert_eq!(
            born.to_backend(&json!(1390212000000_i64)).unwrap(),
            json!(1390212000000_i64)
        );
        assert!(born.to_backend(&json!("yesterday")).is_err());

        let name = Property::new("name", &PropertyOptions::default()).unwrap();
        assert_eq!(name.to_backend(&json!("Bruce")).unwrap(), json!("Bruce"));
    }
}
