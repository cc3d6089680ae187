//! Differ - Compare desired attributes with current state
//!
//! Providers use this to decide which update calls to make: only the
//! sub-configurations whose attributes changed are sent to the cloud.

use std::collections::{BTreeSet, HashMap};

use crate::resource::Value;
use crate::schema::{AttributeSchema, ResourceSchema};

/// Set of attributes whose desired value differs from the current one
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeChanges {
    changed: BTreeSet<String>,
}

impl AttributeChanges {
    /// Compare the desired configuration with the current state
    ///
    /// An attribute missing from `desired` only counts as changed when it is
    /// not computed; computed attributes left unset keep their remote value.
    pub fn between(
        schema: &ResourceSchema,
        current: &HashMap<String, Value>,
        desired: &HashMap<String, Value>,
    ) -> Self {
        let mut changed = BTreeSet::new();

        for (name, attr) in &schema.attributes {
            // Skip internal attributes (starting with _)
            if name.starts_with('_') || attr.read_only {
                continue;
            }

            let current_value = current.get(name);
            let desired_value = desired.get(name).or(attr.default.as_ref());

            let is_changed = match (desired_value, current_value) {
                (Some(d), Some(c)) => !values_match(attr, d, c),
                (Some(d), None) => !d.is_empty(),
                (None, Some(c)) => !attr.computed && !c.is_empty(),
                (None, None) => false,
            };

            if is_changed {
                changed.insert(name.clone());
            }
        }

        Self { changed }
    }

    pub fn has_change(&self, name: &str) -> bool {
        self.changed.contains(name)
    }

    pub fn has_any(&self, names: &[&str]) -> bool {
        names.iter().any(|n| self.has_change(n))
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    /// Changed attribute names in sorted order
    pub fn changed(&self) -> Vec<String> {
        self.changed.iter().cloned().collect()
    }

    /// Changed attributes that force a new resource
    pub fn replacement_reasons(&self, schema: &ResourceSchema) -> Vec<String> {
        self.filter(schema, |attr| attr.force_new)
    }

    /// Changed attributes that cannot be updated in place
    pub fn non_updatable(&self, schema: &ResourceSchema) -> Vec<String> {
        self.filter(schema, |attr| attr.non_updatable)
    }

    fn filter(&self, schema: &ResourceSchema, pred: impl Fn(&AttributeSchema) -> bool) -> Vec<String> {
        self.changed
            .iter()
            .filter(|name| schema.attributes.get(*name).is_some_and(&pred))
            .cloned()
            .collect()
    }
}

/// Effective configuration for an update
///
/// Desired values win; computed attributes the user left unset keep the
/// current value; other unset attributes fall back to their default.
pub fn planned_attributes(
    schema: &ResourceSchema,
    current: &HashMap<String, Value>,
    desired: &HashMap<String, Value>,
) -> HashMap<String, Value> {
    let mut planned = desired.clone();

    for (name, attr) in &schema.attributes {
        if planned.contains_key(name) {
            continue;
        }
        if attr.computed && !attr.read_only {
            if let Some(value) = current.get(name) {
                planned.insert(name.clone(), value.clone());
            }
        } else if let Some(default) = &attr.default {
            planned.insert(name.clone(), default.clone());
        }
    }

    planned
}

/// Whether the desired value is already satisfied by the current value
fn values_match(attr: &AttributeSchema, desired: &Value, current: &Value) -> bool {
    if attr.json_equivalent
        && let (Value::String(d), Value::String(c)) = (desired, current)
    {
        return json_equivalent(d, c);
    }

    if attr.attr_type.is_block() {
        return block_matches(desired, current);
    }

    if let crate::schema::AttributeType::Set(_) = attr.attr_type
        && let (Value::List(d), Value::List(c)) = (desired, current)
    {
        return d.len() == c.len() && d.iter().all(|item| c.contains(item));
    }

    desired == current
}

/// Compare two JSON documents, falling back to string equality
pub fn json_equivalent(a: &str, b: &str) -> bool {
    match (
        serde_json::from_str::<serde_json::Value>(a),
        serde_json::from_str::<serde_json::Value>(b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Nested blocks match when every field the user set matches; fields only
/// the cloud filled in are ignored.
fn block_matches(desired: &Value, current: &Value) -> bool {
    match (desired, current) {
        (Value::Map(d), Value::Map(c)) => d.iter().all(|(k, dv)| match c.get(k) {
            Some(cv) => block_matches(dv, cv),
            None => dv.is_empty(),
        }),
        (Value::List(d), Value::List(c)) => {
            d.len() == c.len() && d.iter().zip(c).all(|(dv, cv)| block_matches(dv, cv))
        }
        _ => desired == current,
    }
}
