//! Resource - Representing resources and their state

use std::collections::HashMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Resource type (e.g., "obs_bucket", "identitycenter_user")
    pub resource_type: String,
    /// Resource name chosen by the caller
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
///
/// Nested blocks are represented as `List(vec![Map(..)])`, mirroring how the
/// vendor APIs return single-element configuration objects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Value::from_json(&json).ok_or_else(|| D::Error::custom("null is not a valid attribute value"))
    }
}

impl Value {
    /// Convert a JSON value into an attribute value.
    ///
    /// `null` has no attribute representation and yields `None`; nulls nested
    /// in arrays and objects are dropped. Floats are truncated.
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Int(i))
                } else {
                    n.as_f64().map(|f| Value::Int(f as i64))
                }
            }
            serde_json::Value::Array(arr) => {
                Some(Value::List(arr.iter().filter_map(Value::from_json).collect()))
            }
            serde_json::Value::Object(obj) => Some(Value::Map(
                obj.iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }

    /// Convert this attribute value into JSON
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Whether this is an empty string, list or map
    pub fn is_empty(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Build a single-element block from a map
    pub fn block(fields: HashMap<String, Value>) -> Value {
        Value::List(vec![Value::Map(fields)])
    }

    /// Build a list of strings
    pub fn string_list<I, S>(items: I) -> Value
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Typed accessors over an attribute map
pub trait Attributes {
    fn get_value(&self, key: &str) -> Option<&Value>;

    fn get_str(&self, key: &str) -> Option<&str> {
        self.get_value(key).and_then(Value::as_str)
    }

    /// String attribute, treating an empty string as unset
    fn get_non_empty_str(&self, key: &str) -> Option<&str> {
        self.get_str(key).filter(|s| !s.is_empty())
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.get_value(key).and_then(Value::as_int)
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get_value(key).and_then(Value::as_bool)
    }

    fn get_list(&self, key: &str) -> &[Value] {
        self.get_value(key).and_then(Value::as_list).unwrap_or(&[])
    }

    fn get_map(&self, key: &str) -> Option<&HashMap<String, Value>> {
        self.get_value(key).and_then(Value::as_map)
    }

    /// Strings of a list attribute; non-string items are skipped
    fn get_strings(&self, key: &str) -> Vec<String> {
        self.get_list(key)
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// Blocks of a list-of-object attribute
    fn get_blocks(&self, key: &str) -> Vec<&HashMap<String, Value>> {
        self.get_list(key).iter().filter_map(Value::as_map).collect()
    }

    /// First element of a list-of-object attribute
    fn first_block(&self, key: &str) -> Option<&HashMap<String, Value>> {
        self.get_list(key).first().and_then(Value::as_map)
    }
}

impl Attributes for HashMap<String, Value> {
    fn get_value(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }
}

/// Desired configuration of a resource or data source query
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
    /// If true, this is a data source (read-only) that won't be modified
    pub read_only: bool,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
            read_only: false,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Returns true if this resource is a data source (read-only)
    pub fn is_data_source(&self) -> bool {
        self.read_only
    }
}

impl Attributes for Resource {
    fn get_value(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// Current state fetched from the cloud
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Provider identifier, e.g. a bucket name or `{instance_id}/{user_id}`
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Render the state as a JSON document
    pub fn to_json(&self) -> serde_json::Value {
        let attributes: serde_json::Map<String, serde_json::Value> = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::json!({
            "type": self.id.resource_type,
            "name": self.id.name,
            "identifier": self.identifier,
            "exists": self.exists,
            "attributes": attributes,
        })
    }
}

impl Attributes for State {
    fn get_value(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_drops_nulls() {
        let value = Value::from_json(&json!({
            "name": "demo",
            "description": null,
            "tags": ["a", null, "b"],
        }))
        .unwrap();

        let map = value.as_map().unwrap();
        assert_eq!(map.get_str("name"), Some("demo"));
        assert!(!map.contains_key("description"));
        assert_eq!(map.get_strings("tags"), vec!["a", "b"]);
    }

    #[test]
    fn from_json_truncates_floats() {
        assert_eq!(Value::from_json(&json!(1.9)), Some(Value::Int(1)));
        assert_eq!(Value::from_json(&json!(null)), None);
    }

    #[test]
    fn deserialize_resource_attributes() {
        let attrs: HashMap<String, Value> = serde_json::from_str(
            r#"{"bucket": "logs", "quota": 10, "versioning": true,
                "logging": [{"target_bucket": "audit"}]}"#,
        )
        .unwrap();

        assert_eq!(attrs.get_int("quota"), Some(10));
        assert_eq!(attrs.get_bool("versioning"), Some(true));
        assert_eq!(
            attrs.first_block("logging").and_then(|b| b.get_str("target_bucket")),
            Some("audit")
        );
    }

    #[test]
    fn deserialize_rejects_null() {
        let result: Result<Value, _> = serde_json::from_str("null");
        assert!(result.is_err());
    }

    #[test]
    fn non_empty_str_ignores_empty() {
        let resource = Resource::new("obs_bucket", "b").with_attribute("policy", "");
        assert_eq!(resource.get_non_empty_str("policy"), None);
        assert_eq!(resource.get_str("policy"), Some(""));
    }

    #[test]
    fn state_to_json_includes_identifier() {
        let state = State::existing(
            ResourceId::new("obs_bucket", "logs"),
            HashMap::from([("bucket".to_string(), Value::from("logs"))]),
        )
        .with_identifier("logs");

        let json = state.to_json();
        assert_eq!(json["identifier"], "logs");
        assert_eq!(json["attributes"]["bucket"], "logs");
        assert_eq!(json["exists"], true);
    }
}
