//! obs_buckets - Buckets of the account

use std::collections::HashMap;

use async_trait::async_trait;
use cirrus_core::provider::ProviderResult;
use cirrus_core::resource::{Attributes, Resource, State, Value};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use log::{debug, warn};

use super::{normalize_storage_class, obs_client, region_attribute};
use crate::error::api_error;
use crate::provider::HuaweiCloudProvider;
use crate::resources::DataSource;

pub struct Buckets;

#[async_trait]
impl DataSource for Buckets {
    fn name(&self) -> &'static str {
        "obs_buckets"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("OBS buckets, optionally filtered by name or enterprise project")
            .attribute(region_attribute())
            .attribute(AttributeSchema::new("bucket", AttributeType::String))
            .attribute(AttributeSchema::new("enterprise_project_id", AttributeType::String))
            .attribute(
                AttributeSchema::new(
                    "buckets",
                    AttributeType::blocks(vec![
                        AttributeSchema::new("bucket", AttributeType::String),
                        AttributeSchema::new("region", AttributeType::String),
                        AttributeSchema::new("storage_class", AttributeType::String),
                        AttributeSchema::new("created_at", AttributeType::String),
                        AttributeSchema::new("enterprise_project_id", AttributeType::String),
                    ]),
                )
                .read_only(),
            )
    }

    async fn read(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let client = obs_client(provider, &resource.attributes)?;
        let summaries = client
            .list_buckets()
            .await
            .map_err(|e| api_error("Error listing OBS buckets", e).for_resource(resource.id.clone()))?;

        let name_filter = resource.get_non_empty_str("bucket");
        let epid_filter = resource.get_non_empty_str("enterprise_project_id");

        let mut buckets = Vec::new();
        for summary in summaries {
            if name_filter.is_some_and(|name| name != summary.name) {
                continue;
            }

            // Buckets answer HEAD only through the endpoint of their own region
            let region = if summary.location.is_empty() {
                provider.region_of(&resource.attributes).to_string()
            } else {
                summary.location.clone()
            };
            let metadata = match provider.obs_client(&region)?.head_bucket(&summary.name).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("skipping OBS bucket {}, unable to read its metadata: {}", summary.name, e);
                    continue;
                }
            };
            let epid = metadata.epid.unwrap_or_default();
            if epid_filter.is_some_and(|wanted| wanted != epid) {
                continue;
            }

            let storage_class = metadata
                .storage_class
                .map(|c| normalize_storage_class(&c))
                .unwrap_or_else(|| "STANDARD".to_string());
            buckets.push(Value::Map(HashMap::from([
                ("bucket".to_string(), Value::from(summary.name)),
                ("region".to_string(), Value::from(summary.location)),
                ("storage_class".to_string(), Value::from(storage_class)),
                ("created_at".to_string(), Value::from(summary.creation_date)),
                ("enterprise_project_id".to_string(), Value::from(epid)),
            ])));
        }
        debug!("found {} OBS buckets", buckets.len());

        let mut attributes = resource.attributes.clone();
        attributes.insert("region".to_string(), Value::from(provider.region_of(&resource.attributes)));
        attributes.insert("buckets".to_string(), Value::List(buckets));
        Ok(State::existing(resource.id.clone(), attributes))
    }
}
