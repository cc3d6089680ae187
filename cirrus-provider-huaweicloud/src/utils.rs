//! Helpers for turning API responses into attributes and attributes into
//! request bodies

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::Value;
use serde_json::Value as JsonValue;

pub use cirrus_core::differ::json_equivalent;

/// Look up a dotted path with optional `[n]` indices,
/// e.g. `page_info.next_marker` or `consumers[0].location`
pub fn path_search<'a>(expr: &str, json: &'a JsonValue) -> Option<&'a JsonValue> {
    expr.split('.').try_fold(json, |current, part| {
        let (key, indices) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        let mut value = if key.is_empty() {
            current
        } else {
            current.get(key)?
        };
        for index in indices.split('[').filter(|s| !s.is_empty()) {
            let index: usize = index.strip_suffix(']')?.parse().ok()?;
            value = value.get(index)?;
        }
        Some(value)
    })
}

/// String at `expr`, if present
pub fn search_str<'a>(expr: &str, json: &'a JsonValue) -> Option<&'a str> {
    path_search(expr, json).and_then(JsonValue::as_str)
}

/// Attribute value at `expr`; JSON nulls count as absent
pub fn search_value(expr: &str, json: &JsonValue) -> Option<Value> {
    path_search(expr, json).and_then(Value::from_json)
}

/// Recursively drop nulls, empty objects and empty arrays
pub fn remove_nil(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .map(|(k, v)| (k, remove_nil(v)))
                .filter(|(_, v)| !is_nil(v))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .into_iter()
                .map(remove_nil)
                .filter(|v| !is_nil(v))
                .collect(),
        ),
        other => other,
    }
}

fn is_nil(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::Object(map) => map.is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// JSON form of an attribute, or `None` when it is unset or empty
pub fn value_ignore_empty(value: Option<&Value>) -> Option<JsonValue> {
    value.filter(|v| !v.is_empty()).map(Value::to_json)
}

/// Re-encode a JSON document compactly; invalid JSON is returned unchanged
pub fn normalize_json_string(document: &str) -> String {
    serde_json::from_str::<JsonValue>(document)
        .map(|v| v.to_string())
        .unwrap_or_else(|_| document.to_string())
}

/// Parse a JSON string attribute into a request body value
pub fn parse_json_attr(name: &str, document: &str) -> ProviderResult<JsonValue> {
    serde_json::from_str(document).map_err(|e| {
        ProviderError::new(format!("error parsing {} as JSON: {}", name, e)).with_cause(e)
    })
}

/// Render a JSON value as a string attribute, skipping null and `{}`
pub fn marshal_json(value: Option<&JsonValue>) -> Option<Value> {
    value
        .filter(|v| !is_nil(v))
        .map(|v| Value::String(v.to_string()))
}

/// Format a millisecond epoch timestamp as RFC 3339 (UTC)
pub fn format_timestamp_rfc3339(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(millis / 1000, 0).map(|t| t.to_rfc3339())
}

/// Strings of a JSON array as a list attribute
pub fn flatten_string_list(value: Option<&JsonValue>) -> Value {
    Value::string_list(
        value
            .and_then(JsonValue::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(JsonValue::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default(),
    )
}

/// Insert an attribute when the value is present
pub fn set_attr(attributes: &mut HashMap<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        attributes.insert(key.to_string(), value);
    }
}

/// Copy the listed top-level fields of a JSON object; nulls are skipped
pub fn pick_fields(json: &JsonValue, keys: &[&str]) -> HashMap<String, Value> {
    keys.iter()
        .filter_map(|key| search_value(key, json).map(|v| (key.to_string(), v)))
        .collect()
}

/// Split a composite identifier such as `{instance_id}/{permission_set_id}`
pub fn split_identifier(identifier: &str, format: &str) -> ProviderResult<Vec<String>> {
    let expected = format.split('/').count();
    let parts: Vec<String> = identifier.split('/').map(str::to_string).collect();
    if parts.len() != expected || parts.iter().any(String::is_empty) {
        return Err(ProviderError::new(format!(
            "invalid format specified for identifier '{}', want '{}'",
            identifier, format
        )));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_search_walks_objects_and_arrays() {
        let doc = json!({
            "page_info": {"next_marker": "m2"},
            "service_provider_config": {"consumers": [{"location": "https://sp/acs"}]},
        });

        assert_eq!(search_str("page_info.next_marker", &doc), Some("m2"));
        assert_eq!(
            search_str("service_provider_config.consumers[0].location", &doc),
            Some("https://sp/acs")
        );
        assert!(path_search("service_provider_config.consumers[1]", &doc).is_none());
        assert!(path_search("missing.key", &doc).is_none());
    }

    #[test]
    fn remove_nil_is_recursive() {
        let body = remove_nil(json!({
            "name": "app",
            "description": null,
            "display": {"description": null},
            "tags": [],
            "list": [null, {}, "x"],
            "flag": false,
            "empty": "",
        }));

        assert_eq!(body, json!({"name": "app", "list": ["x"], "flag": false, "empty": ""}));
    }

    #[test]
    fn value_ignore_empty_skips_empty() {
        assert_eq!(value_ignore_empty(Some(&Value::from(""))), None);
        assert_eq!(value_ignore_empty(None), None);
        assert_eq!(value_ignore_empty(Some(&Value::from("a"))), Some(json!("a")));
    }

    #[test]
    fn normalize_json_compacts() {
        assert_eq!(normalize_json_string("{ \"a\" : [1, 2] }"), r#"{"a":[1,2]}"#);
        assert_eq!(normalize_json_string("not json"), "not json");
    }

    #[test]
    fn marshal_json_skips_empty_objects() {
        assert_eq!(marshal_json(Some(&json!({}))), None);
        assert_eq!(
            marshal_json(Some(&json!({"a": 1}))),
            Some(Value::from(r#"{"a":1}"#))
        );
    }

    #[test]
    fn timestamps_are_rfc3339() {
        assert_eq!(
            format_timestamp_rfc3339(1_700_000_000_123).as_deref(),
            Some("2023-11-14T22:13:20+00:00")
        );
    }

    #[test]
    fn split_identifier_checks_parts() {
        assert_eq!(
            split_identifier("ins-1/ps-1", "<instance_id>/<permission_set_id>").unwrap(),
            vec!["ins-1", "ps-1"]
        );
        assert!(split_identifier("ins-1", "<instance_id>/<permission_set_id>").is_err());
        assert!(split_identifier("ins-1/", "<instance_id>/<permission_set_id>").is_err());
    }

    #[test]
    fn pick_fields_skips_missing_and_null() {
        let fields = pick_fields(&json!({"ttl": "PT1H", "audience": null}), &["ttl", "audience", "x"]);
        assert_eq!(fields, HashMap::from([("ttl".to_string(), Value::from("PT1H"))]));
    }

    #[test]
    fn flatten_string_list_skips_non_strings() {
        assert_eq!(
            flatten_string_list(Some(&json!(["a", 1, "b"]))),
            Value::string_list(["a", "b"])
        );
        assert_eq!(flatten_string_list(None), Value::List(vec![]));
    }
}
