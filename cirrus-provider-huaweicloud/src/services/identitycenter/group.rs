//! identitycenter_group - Groups of an Identity Center identity store

use std::collections::HashMap;

use async_trait::async_trait;
use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::{Attributes, Resource, ResourceId, State, Value};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use serde_json::json;

use super::{identity_store_client, region_attribute, required_str, timestamp_field};
use crate::client::build_path;
use crate::error::{api_error, check_deleted};
use crate::provider::HuaweiCloudProvider;
use crate::resources::ManagedResource;
use crate::utils::{remove_nil, search_str, search_value, set_attr, split_identifier};

const GROUPS_PATH: &str = "v1/identity-stores/{identity_store_id}/groups";
const GROUP_PATH: &str = "v1/identity-stores/{identity_store_id}/groups/{group_id}";
const IDENTIFIER_FORMAT: &str = "<identity_store_id>/<group_id>";

pub struct Group;

#[async_trait]
impl ManagedResource for Group {
    fn name(&self) -> &'static str {
        "identitycenter_group"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("Identity Center group")
            .attribute(region_attribute())
            .attribute(
                AttributeSchema::new("identity_store_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("description", AttributeType::String))
            .attribute(AttributeSchema::new("created_at", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("updated_at", AttributeType::String).read_only())
    }

    fn identifier_format(&self) -> Option<&'static str> {
        Some(IDENTIFIER_FORMAT)
    }

    async fn create(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let client = identity_store_client(provider, &resource.attributes)?;
        let store_id = required_str(resource, "identity_store_id").map_err(|e| e.for_resource(resource.id.clone()))?;

        let path = build_path(GROUPS_PATH, &[("identity_store_id", store_id)]);
        let body = remove_nil(json!({
            "name": resource.get_str("name"),
            "description": resource.get_non_empty_str("description"),
        }));
        let response = client
            .post(&path, Some(&body))
            .await
            .map_err(|e| api_error("error creating Identity Center group", e).for_resource(resource.id.clone()))?;

        let group_id = search_str("group_id", &response)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ProviderError::new("unable to find the Identity Center group ID from the API response")
                    .for_resource(resource.id.clone())
            })?;

        let identifier = format!("{}/{}", store_id, group_id);
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
        let client = identity_store_client(provider, prior)?;

        let group = match client.get(&group_path(&parts), &[]).await {
            Ok(group) => group,
            Err(e) => return check_deleted(id, e, "error retrieving Identity Center group"),
        };

        let mut attributes = HashMap::new();
        attributes.insert("region".to_string(), Value::from(provider.region_of(prior)));
        attributes.insert("identity_store_id".to_string(), Value::from(parts[0].as_str()));
        set_attr(&mut attributes, "name", search_value("name", &group));
        set_attr(&mut attributes, "description", search_value("description", &group));
        set_attr(&mut attributes, "created_at", timestamp_field(&group, "created_at"));
        set_attr(&mut attributes, "updated_at", timestamp_field(&group, "updated_at"));

        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    async fn update(
        &self,
        provider: &HuaweiCloudProvider,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let parts = split_identifier(identifier, IDENTIFIER_FORMAT).map_err(|e| e.for_resource(id.clone()))?;
        let client = identity_store_client(provider, &to.attributes)?;

        let body = json!({ "description": to.get_str("description").unwrap_or_default() });
        client
            .put(&group_path(&parts), Some(&body))
            .await
            .map_err(|e| api_error("error updating Identity Center group", e).for_resource(id.clone()))?;

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
        let client = identity_store_client(provider, &current.attributes)?;

        match client.delete(&group_path(&parts)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(api_error("error deleting Identity Center group", e).for_resource(id.clone())),
        }
    }
}

fn group_path(parts: &[String]) -> String {
    build_path(
        GROUP_PATH,
        &[("identity_store_id", parts[0].as_str()), ("group_id", parts[1].as_str())],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_required() {
        let errors = Group
            .schema()
            .validate(&HashMap::from([("identity_store_id".to_string(), Value::from("s"))]))
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("name"));
    }

    #[test]
    fn group_path_encodes_ids() {
        let parts = vec!["store-1".to_string(), "group 1".to_string()];
        assert_eq!(group_path(&parts), "v1/identity-stores/store-1/groups/group%201");
    }
}
