//! obs_bucket_policy - Standalone bucket policy

use std::collections::HashMap;

use async_trait::async_trait;
use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::{Attributes, Resource, ResourceId, State, Value};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use log::info;

use super::{is_absent, obs_client, obs_error, region_attribute};
use crate::provider::HuaweiCloudProvider;
use crate::resources::ManagedResource;

pub struct BucketPolicy;

impl BucketPolicy {
    async fn put(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<String> {
        let bucket = resource
            .get_non_empty_str("bucket")
            .ok_or_else(|| ProviderError::new("bucket is required"))?;
        let policy = resource
            .get_non_empty_str("policy")
            .ok_or_else(|| ProviderError::new("policy is required"))?;

        let client = obs_client(provider, &resource.attributes)?;
        client
            .set_bucket_policy(bucket, policy)
            .await
            .map_err(|e| obs_error("Error setting policy of OBS bucket", bucket, e))?;
        Ok(bucket.to_string())
    }
}

#[async_trait]
impl ManagedResource for BucketPolicy {
    fn name(&self) -> &'static str {
        "obs_bucket_policy"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("Policy document of an OBS bucket")
            .attribute(region_attribute())
            .attribute(
                AttributeSchema::new("bucket", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("policy", types::json_string())
                    .required()
                    .json_equivalent(),
            )
            .attribute(
                AttributeSchema::new("policy_format", types::string_in(&["obs", "s3"])).with_default("obs"),
            )
    }

    async fn create(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let bucket = self
            .put(provider, resource)
            .await
            .map_err(|e| e.for_resource(resource.id.clone()))?;
        info!("set policy of OBS bucket {}", bucket);
        self.read(provider, &resource.id, &bucket, &resource.attributes).await
    }

    async fn read(
        &self,
        provider: &HuaweiCloudProvider,
        id: &ResourceId,
        identifier: &str,
        prior: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let client = obs_client(provider, prior)?;
        let policy = match client.get_bucket_policy(identifier).await {
            Ok(policy) if !policy.trim().is_empty() => policy,
            Ok(_) => return Ok(State::not_found(id.clone())),
            Err(e) if e.is_not_found() || is_absent(&e, &["NoSuchBucketPolicy"]) => {
                return Ok(State::not_found(id.clone()));
            }
            Err(e) => {
                return Err(obs_error("Error getting policy of OBS bucket", identifier, e).for_resource(id.clone()));
            }
        };

        let attributes = HashMap::from([
            ("region".to_string(), Value::from(provider.region_of(prior))),
            ("bucket".to_string(), Value::from(identifier)),
            ("policy".to_string(), Value::from(policy)),
            (
                "policy_format".to_string(),
                Value::from(prior.get_non_empty_str("policy_format").unwrap_or("obs")),
            ),
        ]);
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
        self.put(provider, to).await.map_err(|e| e.for_resource(id.clone()))?;
        self.read(provider, id, identifier, &to.attributes).await
    }

    async fn delete(
        &self,
        provider: &HuaweiCloudProvider,
        id: &ResourceId,
        identifier: &str,
        current: &State,
    ) -> ProviderResult<()> {
        let client = obs_client(provider, &current.attributes)?;
        match client.delete_bucket_config(identifier, "policy").await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(obs_error("Error deleting policy of OBS bucket", identifier, e).for_resource(id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_is_compared_as_json() {
        let schema = BucketPolicy.schema();
        assert!(schema.attributes["policy"].json_equivalent);
        assert!(schema.attributes["bucket"].force_new);
        assert_eq!(
            schema.attributes["policy_format"].default,
            Some(Value::from("obs"))
        );
    }
}
