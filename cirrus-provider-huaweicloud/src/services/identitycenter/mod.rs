//! IAM Identity Center
//!
//! Instances, identity store users and groups, permission sets and their
//! provisioning, account assignments, and application instances.

pub mod account_assignment;
pub mod application_instance;
pub mod data_sources;
pub mod group;
pub mod group_membership;
pub mod permission_set;
pub mod policy_attachment;
pub mod provision_permission_set;
pub mod service;
pub mod user;

use std::collections::HashMap;
use std::time::Duration;

use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::{Attributes, Value};
use cirrus_core::schema::{AttributeSchema, AttributeType};
use cirrus_core::wait::{Refresh, StateChangeConf};
use log::debug;
use serde_json::{Value as JsonValue, json};

use crate::client::{ServiceClient, build_path};
use crate::error::api_error;
use crate::provider::HuaweiCloudProvider;
use crate::utils::{format_timestamp_rfc3339, path_search, pick_fields, search_str, search_value};

pub(crate) const IDENTITY_CENTER: &str = "identitycenter";
pub(crate) const IDENTITY_STORE: &str = "identitystore";

/// Target type that reprovisions every account a permission set is deployed to
pub const ALL_PROVISIONED_ACCOUNTS: &str = "ALL_PROVISIONED_ACCOUNTS";

const PROVISION_PATH: &str = "v1/instances/{instance_id}/permission-sets/{permission_set_id}/provision";
const PROVISIONING_STATUS_PATH: &str =
    "v1/instances/{instance_id}/permission-sets/provisioning-status/{request_id}";

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// `region` attribute shared by every Identity Center resource
pub(crate) fn region_attribute() -> AttributeSchema {
    AttributeSchema::new("region", AttributeType::String)
        .computed()
        .force_new()
        .with_description("Region in which to manage the resource")
}

pub(crate) fn identity_center_client(
    provider: &HuaweiCloudProvider,
    attributes: &HashMap<String, Value>,
) -> ProviderResult<ServiceClient> {
    provider.service_client(IDENTITY_CENTER, provider.region_of(attributes))
}

pub(crate) fn identity_store_client(
    provider: &HuaweiCloudProvider,
    attributes: &HashMap<String, Value>,
) -> ProviderResult<ServiceClient> {
    provider.service_client(IDENTITY_STORE, provider.region_of(attributes))
}

/// Attribute that must be present after schema validation
pub(crate) fn required_str<'a>(attributes: &'a impl Attributes, key: &str) -> ProviderResult<&'a str> {
    attributes
        .get_non_empty_str(key)
        .ok_or_else(|| ProviderError::new(format!("{} is required", key)))
}

/// Copy user-only attributes the API never returns from a prior configuration
pub(crate) fn keep_prior(
    attributes: &mut HashMap<String, Value>,
    prior: &HashMap<String, Value>,
    keys: &[&str],
) {
    for key in keys {
        if !attributes.contains_key(*key)
            && let Some(value) = prior.get(*key)
        {
            attributes.insert(key.to_string(), value.clone());
        }
    }
}

// =============================================================================
// Permission Set Provisioning
// =============================================================================

/// Provision a permission set and wait for the request to finish
///
/// Returns the final `permission_set_provisioning_status` object.
pub async fn provision_permission_set(
    client: &ServiceClient,
    instance_id: &str,
    permission_set_id: &str,
    target_type: &str,
    target_id: Option<&str>,
) -> ProviderResult<JsonValue> {
    let path = build_path(
        PROVISION_PATH,
        &[("instance_id", instance_id), ("permission_set_id", permission_set_id)],
    );
    let mut body = json!({ "target_type": target_type });
    if let Some(target_id) = target_id {
        body["target_id"] = json!(target_id);
    }

    let response = client
        .post(&path, Some(&body))
        .await
        .map_err(|e| api_error("error provisioning Identity Center permission set", e))?;
    let request_id = search_str("permission_set_provisioning_status.request_id", &response)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ProviderError::new("unable to find the provisioning request ID from the API response")
        })?
        .to_string();
    debug!("provisioning permission set {} (request {})", permission_set_id, request_id);

    wait_provisioning(client, instance_id, &request_id).await
}

/// Wait for a provisioning request to reach `SUCCEEDED`
pub async fn wait_provisioning(
    client: &ServiceClient,
    instance_id: &str,
    request_id: &str,
) -> ProviderResult<JsonValue> {
    let path = build_path(
        PROVISIONING_STATUS_PATH,
        &[("instance_id", instance_id), ("request_id", request_id)],
    );
    let path = &path;
    StateChangeConf::new(&["IN_PROGRESS"], &["SUCCEEDED"])
        .with_poll_interval(POLL_INTERVAL)
        .wait_for_state(|| async move {
            let response = client
                .get(path, &[])
                .await
                .map_err(|e| api_error("error retrieving permission set provisioning status", e))?;
            request_status(&response, "permission_set_provisioning_status", "provisioning permission set")
        })
        .await
}

// =============================================================================
// Account Assignment Requests
// =============================================================================

/// Asynchronous account assignment operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperation {
    Creation,
    Deletion,
}

impl AssignmentOperation {
    fn status_path(self) -> &'static str {
        match self {
            AssignmentOperation::Creation => {
                "v1/instances/{instance_id}/account-assignments/creation-status/{request_id}"
            }
            AssignmentOperation::Deletion => {
                "v1/instances/{instance_id}/account-assignments/deletion-status/{request_id}"
            }
        }
    }

    /// Key of the status object in both the request and the status responses
    pub fn status_key(self) -> &'static str {
        match self {
            AssignmentOperation::Creation => "account_assignment_creation_status",
            AssignmentOperation::Deletion => "account_assignment_deletion_status",
        }
    }
}

/// Wait for an account assignment request to reach `SUCCEEDED`
pub async fn wait_account_assignment(
    client: &ServiceClient,
    instance_id: &str,
    request_id: &str,
    operation: AssignmentOperation,
) -> ProviderResult<JsonValue> {
    let path = build_path(
        operation.status_path(),
        &[("instance_id", instance_id), ("request_id", request_id)],
    );
    let action = match operation {
        AssignmentOperation::Creation => "creating account assignment",
        AssignmentOperation::Deletion => "deleting account assignment",
    };

    let path = &path;
    StateChangeConf::new(&["IN_PROGRESS"], &["SUCCEEDED"])
        .with_poll_interval(POLL_INTERVAL)
        .wait_for_state(|| async move {
            let response = client
                .get(path, &[])
                .await
                .map_err(|e| api_error("error retrieving account assignment status", e))?;
            request_status(&response, operation.status_key(), action)
        })
        .await
}

/// Status of an asynchronous request; `FAILED` becomes an error carrying
/// the reason the service reported
fn request_status(response: &JsonValue, key: &str, action: &str) -> ProviderResult<Refresh<JsonValue>> {
    let Some(status_object) = path_search(key, response) else {
        return Ok((None, String::new()));
    };
    let status = search_str("status", status_object).unwrap_or_default().to_string();
    if status == "FAILED" {
        let reason = search_str("failure_reason", status_object).unwrap_or("unknown reason");
        return Err(ProviderError::new(format!("error {}: {}", action, reason)));
    }
    Ok((Some(status_object.clone()), status))
}

// =============================================================================
// Identity Center Activation
// =============================================================================

/// Refresh used while Identity Center is being enabled
///
/// The instance list stays empty until activation finishes, so an empty list
/// reports `PENDING`; otherwise the first instance's `status` is returned
/// (`ENABLED` when the service omits it).
pub async fn identity_center_status_refresh(client: &ServiceClient) -> ProviderResult<Refresh<JsonValue>> {
    let response = client
        .get("v1/instances", &[])
        .await
        .map_err(|e| api_error("error retrieving Identity Center instances", e))?;

    match path_search("instances[0]", &response) {
        None => Ok((Some(JsonValue::Null), "PENDING".to_string())),
        Some(instance) => {
            let status = search_str("status", instance).unwrap_or("ENABLED").to_string();
            Ok((Some(instance.clone()), status))
        }
    }
}

// =============================================================================
// Application Instance Flatteners
// =============================================================================

/// Single-element `security_config` block; absent when the object is empty
pub fn flatten_security_config(config: Option<&JsonValue>) -> Option<Value> {
    let config = non_empty_object(config)?;
    Some(Value::block(pick_fields(config, &["ttl"])))
}

/// Single-element `service_provider_config` block with the first consumer
pub fn flatten_service_provider_config(config: Option<&JsonValue>) -> Option<Value> {
    let config = non_empty_object(config)?;
    let mut fields = pick_fields(config, &["audience", "require_request_signature", "start_url"]);

    if let Some(consumer) = path_search("consumers[0]", config) {
        fields.insert(
            "consumers".to_string(),
            Value::block(pick_fields(consumer, &["location", "binding", "default_value"])),
        );
    }
    Some(Value::block(fields))
}

fn non_empty_object(value: Option<&JsonValue>) -> Option<&JsonValue> {
    value.filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
}

/// Timestamp field as RFC 3339; millisecond epochs are converted, strings
/// are kept as returned
pub(crate) fn timestamp_field(json: &JsonValue, key: &str) -> Option<Value> {
    match search_value(key, json)? {
        Value::Int(millis) => format_timestamp_rfc3339(millis).map(Value::String),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_config_flattens_to_block() {
        let block = flatten_security_config(Some(&json!({"ttl": "PT1H"}))).unwrap();
        assert_eq!(
            block,
            Value::block(HashMap::from([("ttl".to_string(), Value::from("PT1H"))]))
        );

        assert_eq!(flatten_security_config(Some(&json!({}))), None);
        assert_eq!(flatten_security_config(None), None);
    }

    #[test]
    fn service_provider_config_keeps_first_consumer() {
        let config = json!({
            "audience": "urn:sp",
            "require_request_signature": false,
            "start_url": "https://sp/start",
            "consumers": [
                {"location": "https://sp/acs", "binding": "HTTP-POST", "default_value": true},
                {"location": "https://sp/other", "binding": "HTTP-Redirect"},
            ],
        });

        let block = flatten_service_provider_config(Some(&config)).unwrap();
        let fields = block.as_list().unwrap()[0].as_map().unwrap();
        assert_eq!(fields.get_str("audience"), Some("urn:sp"));
        assert_eq!(fields.get_bool("require_request_signature"), Some(false));

        let consumer = fields.first_block("consumers").unwrap();
        assert_eq!(consumer.get_str("location"), Some("https://sp/acs"));
        assert_eq!(consumer.get_bool("default_value"), Some(true));
        assert_eq!(fields.get_list("consumers").len(), 1);
    }

    #[test]
    fn service_provider_config_without_consumers() {
        let block = flatten_service_provider_config(Some(&json!({"audience": "urn:sp"}))).unwrap();
        let fields = block.as_list().unwrap()[0].as_map().unwrap();
        assert!(fields.get_value("consumers").is_none());
        assert_eq!(flatten_service_provider_config(Some(&json!(null))), None);
    }

    #[test]
    fn failed_request_reports_reason() {
        let response = json!({
            "permission_set_provisioning_status": {"status": "FAILED", "failure_reason": "quota exceeded"}
        });
        let err = request_status(&response, "permission_set_provisioning_status", "provisioning permission set")
            .unwrap_err();
        assert_eq!(err.message, "error provisioning permission set: quota exceeded");
    }

    #[test]
    fn missing_status_object_is_not_found() {
        let (object, status) = request_status(&json!({}), "account_assignment_creation_status", "x").unwrap();
        assert!(object.is_none());
        assert!(status.is_empty());
    }

    #[test]
    fn keep_prior_fills_missing_only() {
        let mut attributes = HashMap::from([("name".to_string(), Value::from("remote"))]);
        let prior = HashMap::from([
            ("name".to_string(), Value::from("local")),
            ("password_mode".to_string(), Value::from("OTP")),
        ]);
        keep_prior(&mut attributes, &prior, &["name", "password_mode"]);
        assert_eq!(attributes.get_str("name"), Some("remote"));
        assert_eq!(attributes.get_str("password_mode"), Some("OTP"));
    }

    #[test]
    fn timestamps_are_formatted() {
        let json = json!({"created_date": 1_700_000_000_000_i64});
        assert_eq!(
            timestamp_field(&json, "created_date"),
            Some(Value::from("2023-11-14T22:13:20+00:00"))
        );
        assert_eq!(timestamp_field(&json, "missing"), None);
        assert_eq!(
            timestamp_field(&json!({"created_at": "2024-01-01T00:00:00Z"}), "created_at"),
            Some(Value::from("2024-01-01T00:00:00Z"))
        );
    }
}
