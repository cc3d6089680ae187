//! identitycenter_service - Enable IAM Identity Center for the account

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::{Resource, ResourceId, State, Value};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use cirrus_core::wait::StateChangeConf;
use log::{info, warn};
use serde_json::Value as JsonValue;

use super::{identity_center_client, identity_center_status_refresh, region_attribute};
use crate::error::api_error;
use crate::provider::HuaweiCloudProvider;
use crate::resources::ManagedResource;
use crate::utils::{search_str, search_value, set_attr};

const ENABLE_PATH: &str = "v1/identity-center/enable";
const INSTANCES_PATH: &str = "v1/instances";

pub struct IdentityCenterService;

#[async_trait]
impl ManagedResource for IdentityCenterService {
    fn name(&self) -> &'static str {
        "identitycenter_service"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("Enables IAM Identity Center; the service cannot be disabled through the API")
            .attribute(region_attribute())
            .attribute(AttributeSchema::new("instance_id", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("identity_store_id", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("urn", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("alias", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("status", AttributeType::String).read_only())
    }

    async fn create(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let client = identity_center_client(provider, &resource.attributes)?;

        client
            .post(ENABLE_PATH, None)
            .await
            .map_err(|e| api_error("error enabling Identity Center", e).for_resource(resource.id.clone()))?;

        let client = &client;
        let instance = StateChangeConf::new(&["PENDING"], &["ENABLED"])
            .with_timeout(Duration::from_secs(10 * 60))
            .with_poll_interval(Duration::from_secs(10))
            .wait_for_state(move || identity_center_status_refresh(client))
            .await
            .map_err(|e| {
                ProviderError::new(format!("error waiting for Identity Center to be enabled: {}", e))
                    .for_resource(resource.id.clone())
            })?;

        let instance_id = search_str("instance_id", &instance).unwrap_or_default();
        info!("Identity Center enabled, instance {}", instance_id);
        self.read(provider, &resource.id, instance_id, &resource.attributes)
            .await
    }

    async fn read(
        &self,
        provider: &HuaweiCloudProvider,
        id: &ResourceId,
        identifier: &str,
        prior: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let client = identity_center_client(provider, prior)?;
        let response = client
            .get(INSTANCES_PATH, &[])
            .await
            .map_err(|e| api_error("error retrieving Identity Center instances", e).for_resource(id.clone()))?;

        let instance = response
            .get("instances")
            .and_then(JsonValue::as_array)
            .and_then(|items| {
                items
                    .iter()
                    .find(|i| identifier.is_empty() || search_str("instance_id", i) == Some(identifier))
            });
        let Some(instance) = instance else {
            return Ok(State::not_found(id.clone()));
        };

        let mut attributes = HashMap::new();
        attributes.insert("region".to_string(), Value::from(provider.region_of(prior)));
        set_attr(&mut attributes, "instance_id", search_value("instance_id", instance));
        set_attr(&mut attributes, "identity_store_id", search_value("identity_store_id", instance));
        set_attr(&mut attributes, "urn", search_value("instance_urn", instance));
        set_attr(&mut attributes, "alias", search_value("alias", instance));
        attributes.insert(
            "status".to_string(),
            Value::from(search_str("status", instance).unwrap_or("ENABLED")),
        );

        let instance_id = search_str("instance_id", instance).unwrap_or(identifier).to_string();
        Ok(State::existing(id.clone(), attributes).with_identifier(instance_id))
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
        identifier: &str,
        _current: &State,
    ) -> ProviderResult<()> {
        warn!(
            "{}: Identity Center (instance {}) cannot be disabled through the API, it is only removed from state",
            id, identifier
        );
        Ok(())
    }
}
