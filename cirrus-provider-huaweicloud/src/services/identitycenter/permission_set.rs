//! identitycenter_permission_set - Permission sets of an Identity Center instance

use std::collections::HashMap;

use async_trait::async_trait;
use cirrus_core::differ::AttributeChanges;
use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::{Attributes, Resource, ResourceId, State, Value};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use serde_json::{Value as JsonValue, json};

use super::{
    ALL_PROVISIONED_ACCOUNTS, identity_center_client, provision_permission_set, region_attribute,
    required_str, timestamp_field,
};
use crate::client::build_path;
use crate::error::{api_error, check_deleted};
use crate::provider::HuaweiCloudProvider;
use crate::resources::ManagedResource;
use crate::utils::{path_search, remove_nil, search_str, search_value, set_attr, split_identifier};

const PERMISSION_SETS_PATH: &str = "v1/instances/{instance_id}/permission-sets";
const PERMISSION_SET_PATH: &str = "v1/instances/{instance_id}/permission-sets/{permission_set_id}";
const IDENTIFIER_FORMAT: &str = "<instance_id>/<permission_set_id>";
const UPDATABLE_ATTRIBUTES: &[&str] = &["description", "session_duration", "relay_state"];

pub struct PermissionSet;

#[async_trait]
impl ManagedResource for PermissionSet {
    fn name(&self) -> &'static str {
        "identitycenter_permission_set"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("Identity Center permission set")
            .attribute(region_attribute())
            .attribute(
                AttributeSchema::new("instance_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("description", AttributeType::String))
            .attribute(
                AttributeSchema::new("session_duration", AttributeType::String)
                    .with_default("PT1H")
                    .with_description("ISO 8601 length of a user session, e.g. PT1H"),
            )
            .attribute(AttributeSchema::new("relay_state", AttributeType::String))
            .attribute(AttributeSchema::new("permission_set_id", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("created_at", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("urn", AttributeType::String).read_only())
    }

    fn identifier_format(&self) -> Option<&'static str> {
        Some(IDENTIFIER_FORMAT)
    }

    async fn create(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let client = identity_center_client(provider, &resource.attributes)?;
        let instance_id = required_str(resource, "instance_id").map_err(|e| e.for_resource(resource.id.clone()))?;

        let path = build_path(PERMISSION_SETS_PATH, &[("instance_id", instance_id)]);
        let mut body = update_body(resource);
        body["name"] = json!(resource.get_str("name"));
        let response = client
            .post(&path, Some(&remove_nil(body)))
            .await
            .map_err(|e| api_error("error creating Identity Center permission set", e).for_resource(resource.id.clone()))?;

        let permission_set_id = search_str("permission_set.permission_set_id", &response)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ProviderError::new("unable to find the Identity Center permission set ID from the API response")
                    .for_resource(resource.id.clone())
            })?;

        let identifier = format!("{}/{}", instance_id, permission_set_id);
        self.read(provider, &resource.id, &identifier, &resource.attributes)
            .await
    }

    async fn read(
        &self,
        provider: &HuaweiCloudProvider,
        id: &ResourceId,
        identifier: &str,
        prior: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let parts = split_identifier(identifier, IDENTIFIER_FORMAT).map_err(|e| e.for_resource(id.clone()))?;
        let client = identity_center_client(provider, prior)?;

        let response = match client.get(&permission_set_path(&parts), &[]).await {
            Ok(response) => response,
            Err(e) => return check_deleted(id, e, "error retrieving Identity Center permission set"),
        };
        let Some(permission_set) = path_search("permission_set", &response) else {
            return Ok(State::not_found(id.clone()));
        };

        let mut attributes = HashMap::new();
        attributes.insert("region".to_string(), Value::from(provider.region_of(prior)));
        attributes.insert("instance_id".to_string(), Value::from(parts[0].as_str()));
        attributes.insert("permission_set_id".to_string(), Value::from(parts[1].as_str()));
        set_attr(&mut attributes, "name", search_value("name", permission_set));
        set_attr(&mut attributes, "description", search_value("description", permission_set));
        set_attr(&mut attributes, "session_duration", search_value("session_duration", permission_set));
        set_attr(&mut attributes, "relay_state", search_value("relay_state", permission_set));
        set_attr(&mut attributes, "created_at", timestamp_field(permission_set, "created_date"));
        set_attr(&mut attributes, "urn", search_value("permission_urn", permission_set));

        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    async fn update(
        &self,
        provider: &HuaweiCloudProvider,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let parts = split_identifier(identifier, IDENTIFIER_FORMAT).map_err(|e| e.for_resource(id.clone()))?;
        let changes = AttributeChanges::between(&self.schema(), &from.attributes, &to.attributes);
        if !changes.has_any(UPDATABLE_ATTRIBUTES) {
            return self.read(provider, id, identifier, &to.attributes).await;
        }

        let client = identity_center_client(provider, &to.attributes)?;
        client
            .put(&permission_set_path(&parts), Some(&remove_nil(update_body(to))))
            .await
            .map_err(|e| api_error("error updating Identity Center permission set", e).for_resource(id.clone()))?;

        // Accounts keep the old definition until the permission set is provisioned again
        provision_permission_set(&client, &parts[0], &parts[1], ALL_PROVISIONED_ACCOUNTS, None)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        self.read(provider, id, identifier, &to.attributes).await
    }

    async fn delete(
        &self,
        provider: &HuaweiCloudProvider,
        id: &ResourceId,
        identifier: &str,
        current: &State,
    ) -> ProviderResult<()> {
        let parts = split_identifier(identifier, IDENTIFIER_FORMAT).map_err(|e| e.for_resource(id.clone()))?;
        let client = identity_center_client(provider, &current.attributes)?;

        match client.delete(&permission_set_path(&parts)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(api_error("error deleting Identity Center permission set", e).for_resource(id.clone())),
        }
    }
}

fn permission_set_path(parts: &[String]) -> String {
    build_path(
        PERMISSION_SET_PATH,
        &[("instance_id", parts[0].as_str()), ("permission_set_id", parts[1].as_str())],
    )
}

/// Fields shared by the create and update requests
fn update_body(resource: &Resource) -> JsonValue {
    json!({
        "description": resource.get_str("description"),
        "session_duration": resource.get_str("session_duration"),
        "relay_state": resource.get_str("relay_state"),
    })
}
