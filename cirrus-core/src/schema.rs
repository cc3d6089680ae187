//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type, enabling validation of
//! resource documents before any API call is made.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Unordered collection of unique items
    Set(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Nested block with its own attributes
    Object(Vec<AttributeSchema>),
}

impl AttributeType {
    /// List of nested blocks
    pub fn blocks(attributes: Vec<AttributeSchema>) -> Self {
        AttributeType::List(Box::new(AttributeType::Object(attributes)))
    }

    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { validate, base, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|message| TypeError::ValidationFailed { message })
            }

            (AttributeType::List(inner) | AttributeType::Set(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Object(fields), Value::Map(map)) => {
                for field in fields {
                    match map.get(&field.name) {
                        Some(v) => field.attr_type.validate(v).map_err(|e| {
                            TypeError::BlockError {
                                name: field.name.clone(),
                                inner: Box::new(e),
                            }
                        })?,
                        None if field.required && field.default.is_none() => {
                            return Err(TypeError::MissingRequired {
                                name: field.name.clone(),
                            });
                        }
                        None => {}
                    }
                }
                if let Some(unknown) = map.keys().find(|k| !fields.iter().any(|f| &f.name == *k))
                {
                    return Err(TypeError::UnknownAttribute {
                        name: unknown.clone(),
                    });
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Set(inner) => format!("Set<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Object(_) => "Block".to_string(),
        }
    }

    /// Whether values of this type are nested blocks
    pub fn is_block(&self) -> bool {
        match self {
            AttributeType::Object(_) => true,
            AttributeType::List(inner) | AttributeType::Set(inner) => inner.is_block(),
            _ => false,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ComputedAttribute { name: String },

    #[error("Attribute '{name}' allows at most {max} item(s), got {got}")]
    TooManyItems { name: String, max: usize, got: usize },

    #[error("Attributes '{name}' and '{other}' cannot be set together")]
    Conflict { name: String, other: String },

    #[error("Attribute '{name}' requires '{other}' to be set")]
    RequiredWith { name: String, other: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },

    #[error("Block attribute '{name}': {inner}")]
    BlockError { name: String, inner: Box<TypeError> },

    #[error("Attribute '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// The cloud fills this attribute when the user leaves it unset
    pub computed: bool,
    /// Only the cloud sets this attribute
    pub read_only: bool,
    /// Changing this attribute requires a new resource
    pub force_new: bool,
    /// Changing this attribute in place is rejected
    pub non_updatable: bool,
    pub sensitive: bool,
    /// Compare string values as JSON documents
    pub json_equivalent: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub max_items: Option<usize>,
    pub conflicts_with: Vec<String>,
    pub required_with: Vec<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            computed: false,
            read_only: false,
            force_new: false,
            non_updatable: false,
            sensitive: false,
            json_equivalent: false,
            default: None,
            description: None,
            max_items: None,
            conflicts_with: Vec::new(),
            required_with: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.computed = true;
        self.read_only = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn non_updatable(mut self) -> Self {
        self.non_updatable = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn json_equivalent(mut self) -> Self {
        self.json_equivalent = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    pub fn conflicts_with(mut self, names: &[&str]) -> Self {
        self.conflicts_with = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn required_with(mut self, names: &[&str]) -> Self {
        self.required_with = names.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Attributes sorted by name, for stable output
    pub fn sorted_attributes(&self) -> BTreeMap<&str, &AttributeSchema> {
        self.attributes
            .iter()
            .map(|(name, schema)| (name.as_str(), schema))
            .collect()
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        for (name, schema) in self.sorted_attributes() {
            let value = attributes.get(name);

            if schema.required && value.is_none() && schema.default.is_none() {
                errors.push(TypeError::MissingRequired {
                    name: name.to_string(),
                });
            }

            let Some(value) = value else { continue };

            if schema.read_only {
                errors.push(TypeError::ComputedAttribute {
                    name: name.to_string(),
                });
                continue;
            }

            if let Err(e) = schema.attr_type.validate(value) {
                errors.push(TypeError::AttributeError {
                    name: name.to_string(),
                    inner: Box::new(e),
                });
            }

            if let (Some(max), Value::List(items)) = (schema.max_items, value)
                && items.len() > max
            {
                errors.push(TypeError::TooManyItems {
                    name: name.to_string(),
                    max,
                    got: items.len(),
                });
            }

            for other in &schema.conflicts_with {
                // Report each conflicting pair once
                if attributes.contains_key(other) && name < other.as_str() {
                    errors.push(TypeError::Conflict {
                        name: name.to_string(),
                        other: other.clone(),
                    });
                }
            }

            for other in &schema.required_with {
                if !attributes.contains_key(other) {
                    errors.push(TypeError::RequiredWith {
                        name: name.to_string(),
                        other: other.clone(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Fill defaults for attributes the user left unset
    pub fn apply_defaults(&self, attributes: &mut HashMap<String, Value>) {
        for (name, schema) in &self.attributes {
            if let Some(default) = &schema.default
                && !attributes.contains_key(name)
            {
                attributes.insert(name.clone(), default.clone());
            }
        }
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match value {
                Value::Int(n) if *n > 0 => Ok(()),
                Value::Int(_) => Err("Value must be positive".to_string()),
                _ => Err("Expected integer".to_string()),
            },
        }
    }

    /// Non-negative integer type
    pub fn non_negative_int() -> AttributeType {
        AttributeType::Custom {
            name: "NonNegativeInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match value {
                Value::Int(n) if *n >= 0 => Ok(()),
                Value::Int(_) => Err("Value must not be negative".to_string()),
                _ => Err("Expected integer".to_string()),
            },
        }
    }

    /// String holding a JSON document
    pub fn json_string() -> AttributeType {
        AttributeType::Custom {
            name: "JsonString".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => serde_json::from_str::<serde_json::Value>(s)
                    .map(|_| ())
                    .map_err(|e| format!("\"{}\" contains an invalid JSON: {}", s, e)),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// `"true"` or `"false"` as a string
    pub fn bool_string() -> AttributeType {
        string_in(&["true", "false"])
    }

    /// String restricted to a fixed set of values
    pub fn string_in(values: &[&str]) -> AttributeType {
        AttributeType::Enum(values.iter().map(|s| s.to_string()).collect())
    }

    pub fn string_list() -> AttributeType {
        AttributeType::List(Box::new(AttributeType::String))
    }

    pub fn string_set() -> AttributeType {
        AttributeType::Set(Box::new(AttributeType::String))
    }

    pub fn string_map() -> AttributeType {
        AttributeType::Map(Box::new(AttributeType::String))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = types::string_in(&["OTP", "PASSWORD"]);
        assert!(t.validate(&Value::from("OTP")).is_ok());
        assert!(t.validate(&Value::from("otp")).is_err());
    }

    #[test]
    fn validate_positive_int() {
        let t = types::positive_int();
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(-1)).is_err());
        assert!(t.validate(&Value::from("1")).is_err());
    }

    #[test]
    fn validate_json_string() {
        let t = types::json_string();
        assert!(t.validate(&Value::from(r#"{"a": 1}"#)).is_ok());
        assert!(t.validate(&Value::from("{not json")).is_err());
    }

    #[test]
    fn validate_nested_block() {
        let t = AttributeType::blocks(vec![
            AttributeSchema::new("days", types::positive_int()).required(),
            AttributeSchema::new("storage_class", AttributeType::String),
        ]);

        let ok = Value::List(vec![Value::Map(HashMap::from([(
            "days".to_string(),
            Value::Int(30),
        )]))]);
        assert!(t.validate(&ok).is_ok());

        let missing = Value::List(vec![Value::Map(HashMap::new())]);
        assert!(matches!(
            t.validate(&missing),
            Err(TypeError::ListItemError { .. })
        ));

        let unknown = Value::List(vec![Value::Map(HashMap::from([
            ("days".to_string(), Value::Int(30)),
            ("size".to_string(), Value::Int(1)),
        ]))]);
        assert!(t.validate(&unknown).is_err());
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("resource")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("count", types::positive_int()))
            .attribute(AttributeSchema::new("enabled", AttributeType::Bool));

        let attrs = HashMap::from([
            ("name".to_string(), Value::from("my-resource")),
            ("count".to_string(), Value::Int(5)),
            ("enabled".to_string(), Value::Bool(true)),
        ]);

        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("bucket")
            .attribute(AttributeSchema::new("name", AttributeType::String).required());

        let result = schema.validate(&HashMap::new());
        assert!(matches!(
            result.unwrap_err().as_slice(),
            [TypeError::MissingRequired { .. }]
        ));
    }

    #[test]
    fn read_only_attribute_cannot_be_set() {
        let schema = ResourceSchema::new("user")
            .attribute(AttributeSchema::new("created_at", AttributeType::String).read_only());

        let attrs = HashMap::from([("created_at".to_string(), Value::from("now"))]);
        assert!(matches!(
            schema.validate(&attrs).unwrap_err().as_slice(),
            [TypeError::ComputedAttribute { .. }]
        ));
    }

    #[test]
    fn conflicts_and_required_with() {
        let schema = ResourceSchema::new("app")
            .attribute(
                AttributeSchema::new("display_name", AttributeType::String)
                    .required_with(&["description"]),
            )
            .attribute(AttributeSchema::new("description", AttributeType::String))
            .attribute(
                AttributeSchema::new("index_document", AttributeType::String)
                    .conflicts_with(&["redirect"]),
            )
            .attribute(
                AttributeSchema::new("redirect", AttributeType::String)
                    .conflicts_with(&["index_document"]),
            );

        let attrs = HashMap::from([
            ("display_name".to_string(), Value::from("App")),
            ("index_document".to_string(), Value::from("index.html")),
            ("redirect".to_string(), Value::from("example.com")),
        ]);
        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, TypeError::RequiredWith { .. }))
        );
        assert!(errors.iter().any(|e| matches!(e, TypeError::Conflict { .. })));
    }

    #[test]
    fn max_items_is_enforced() {
        let schema = ResourceSchema::new("bucket").attribute(
            AttributeSchema::new(
                "website",
                AttributeType::blocks(vec![AttributeSchema::new(
                    "index_document",
                    AttributeType::String,
                )]),
            )
            .max_items(1),
        );

        let block = Value::Map(HashMap::new());
        let attrs = HashMap::from([(
            "website".to_string(),
            Value::List(vec![block.clone(), block]),
        )]);
        assert!(matches!(
            schema.validate(&attrs).unwrap_err().as_slice(),
            [TypeError::TooManyItems { max: 1, got: 2, .. }]
        ));
    }

    #[test]
    fn apply_defaults_keeps_user_values() {
        let schema = ResourceSchema::new("bucket")
            .attribute(AttributeSchema::new("acl", AttributeType::String).with_default("private"))
            .attribute(
                AttributeSchema::new("storage_class", AttributeType::String)
                    .with_default("STANDARD"),
            );

        let mut attrs = HashMap::from([("acl".to_string(), Value::from("public-read"))]);
        schema.apply_defaults(&mut attrs);

        assert_eq!(attrs["acl"], Value::from("public-read"));
        assert_eq!(attrs["storage_class"], Value::from("STANDARD"));
    }
}
