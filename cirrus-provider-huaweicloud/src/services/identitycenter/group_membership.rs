//! identitycenter_group_membership - Adds a user to an Identity Center group

use std::collections::HashMap;

use async_trait::async_trait;
use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::{Resource, ResourceId, State, Value};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use serde_json::json;

use super::{identity_store_client, region_attribute, required_str};
use crate::client::build_path;
use crate::error::api_error;
use crate::provider::HuaweiCloudProvider;
use crate::resources::ManagedResource;
use crate::utils::{search_str, split_identifier};

const MEMBERSHIPS_PATH: &str = "v1/identity-stores/{identity_store_id}/groups/{group_id}/group-memberships";
const MEMBERSHIP_PATH: &str = "v1/identity-stores/{identity_store_id}/group-memberships/{membership_id}";
const IDENTIFIER_FORMAT: &str = "<identity_store_id>/<group_id>/<membership_id>";

pub struct GroupMembership;

#[async_trait]
impl ManagedResource for GroupMembership {
    fn name(&self) -> &'static str {
        "identitycenter_group_membership"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("Membership of a user in an Identity Center group")
            .attribute(region_attribute())
            .attribute(
                AttributeSchema::new("identity_store_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("group_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("member_id", AttributeType::String)
                    .required()
                    .force_new()
                    .with_description("ID of the user to add"),
            )
    }

    fn identifier_format(&self) -> Option<&'static str> {
        Some(IDENTIFIER_FORMAT)
    }

    async fn create(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let client = identity_store_client(provider, &resource.attributes)?;
        let for_resource = |e: ProviderError| e.for_resource(resource.id.clone());
        let store_id = required_str(resource, "identity_store_id").map_err(for_resource)?;
        let group_id = required_str(resource, "group_id").map_err(for_resource)?;
        let member_id = required_str(resource, "member_id").map_err(for_resource)?;

        let path = build_path(MEMBERSHIPS_PATH, &[("identity_store_id", store_id), ("group_id", group_id)]);
        let body = json!({ "member_id": { "user_id": member_id } });
        let response = client
            .post(&path, Some(&body))
            .await
            .map_err(|e| api_error("error creating Identity Center group membership", e).for_resource(resource.id.clone()))?;

        let membership_id = search_str("membership_id", &response)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ProviderError::new("unable to find the group membership ID from the API response")
                    .for_resource(resource.id.clone())
            })?;

        let identifier = format!("{}/{}/{}", store_id, group_id, membership_id);
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

        let path = build_path(
            MEMBERSHIPS_PATH,
            &[("identity_store_id", parts[0].as_str()), ("group_id", parts[1].as_str())],
        );
        let memberships = match client.list_all_by_marker(&path, &[], "group_memberships").await {
            Ok(memberships) => memberships,
            Err(e) if e.is_not_found() => return Ok(State::not_found(id.clone())),
            Err(e) => {
                return Err(api_error("error retrieving Identity Center group memberships", e)
                    .for_resource(id.clone()));
            }
        };

        let Some(membership) = memberships
            .iter()
            .find(|m| search_str("membership_id", m) == Some(parts[2].as_str()))
        else {
            return Ok(State::not_found(id.clone()));
        };

        let mut attributes = HashMap::new();
        attributes.insert("region".to_string(), Value::from(provider.region_of(prior)));
        attributes.insert("identity_store_id".to_string(), Value::from(parts[0].as_str()));
        attributes.insert("group_id".to_string(), Value::from(parts[1].as_str()));
        if let Some(user_id) = search_str("member_id.user_id", membership) {
            attributes.insert("member_id".to_string(), Value::from(user_id));
        }

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

        let path = build_path(
            MEMBERSHIP_PATH,
            &[("identity_store_id", parts[0].as_str()), ("membership_id", parts[2].as_str())],
        );
        match client.delete(&path).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(api_error("error deleting Identity Center group membership", e).for_resource(id.clone())),
        }
    }
}
