//! identitycenter_provision_permission_set - Deploy a permission set to an account

use std::collections::HashMap;

use async_trait::async_trait;
use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::{Resource, ResourceId, State, Value};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use log::info;

use super::{identity_center_client, provision_permission_set, region_attribute, required_str, timestamp_field};
use crate::client::build_path;
use crate::error::check_deleted;
use crate::provider::HuaweiCloudProvider;
use crate::resources::ManagedResource;
use crate::utils::{path_search, search_str, search_value, set_attr, split_identifier};

const STATUS_PATH: &str = "v1/instances/{instance_id}/permission-sets/provisioning-status/{request_id}";
const IDENTIFIER_FORMAT: &str = "<instance_id>/<permission_set_id>/<request_id>";

pub struct ProvisionPermissionSet;

#[async_trait]
impl ManagedResource for ProvisionPermissionSet {
    fn name(&self) -> &'static str {
        "identitycenter_provision_permission_set"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("One-time provisioning of a permission set to an account")
            .attribute(region_attribute())
            .attribute(
                AttributeSchema::new("instance_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("permission_set_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("account_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("request_id", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("status", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("failure_reason", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("created_at", AttributeType::String).read_only())
    }

    fn identifier_format(&self) -> Option<&'static str> {
        Some(IDENTIFIER_FORMAT)
    }

    async fn create(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let client = identity_center_client(provider, &resource.attributes)?;
        let for_resource = |e: ProviderError| e.for_resource(resource.id.clone());
        let instance_id = required_str(resource, "instance_id").map_err(for_resource)?;
        let permission_set_id = required_str(resource, "permission_set_id").map_err(for_resource)?;
        let account_id = required_str(resource, "account_id").map_err(for_resource)?;

        let status = provision_permission_set(&client, instance_id, permission_set_id, "ACCOUNT", Some(account_id))
            .await
            .map_err(for_resource)?;
        let request_id = search_str("request_id", &status).unwrap_or_default();
        info!("permission set {} provisioned to account {}", permission_set_id, account_id);

        let identifier = format!("{}/{}/{}", instance_id, permission_set_id, request_id);
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

        let path = build_path(
            STATUS_PATH,
            &[("instance_id", parts[0].as_str()), ("request_id", parts[2].as_str())],
        );
        let response = match client.get(&path, &[]).await {
            Ok(response) => response,
            Err(e) => return check_deleted(id, e, "error retrieving permission set provisioning status"),
        };
        let Some(status) = path_search("permission_set_provisioning_status", &response) else {
            return Ok(State::not_found(id.clone()));
        };

        let mut attributes = HashMap::new();
        attributes.insert("region".to_string(), Value::from(provider.region_of(prior)));
        attributes.insert("instance_id".to_string(), Value::from(parts[0].as_str()));
        attributes.insert("permission_set_id".to_string(), Value::from(parts[1].as_str()));
        attributes.insert("request_id".to_string(), Value::from(parts[2].as_str()));
        set_attr(&mut attributes, "account_id", search_value("account_id", status));
        set_attr(&mut attributes, "status", search_value("status", status));
        set_attr(&mut attributes, "failure_reason", search_value("failure_reason", status));
        set_attr(&mut attributes, "created_at", timestamp_field(status, "created_date"));

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
        _provider: &HuaweiCloudProvider,
        id: &ResourceId,
        _identifier: &str,
        _current: &State,
    ) -> ProviderResult<()> {
        info!("{}: provisioning cannot be undone, removing it from state only", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_has_three_parts() {
        let format = ProvisionPermissionSet.identifier_format().unwrap();
        assert!(split_identifier("ins-1/ps-1/req-1", format).is_ok());
        assert!(split_identifier("ins-1/ps-1", format).is_err());
    }
}
