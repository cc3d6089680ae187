//! obs_bucket_object - Object with inline content

use std::collections::HashMap;

use async_trait::async_trait;
use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::{Attributes, Resource, ResourceId, State, Value};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use log::info;
use reqwest::Method;

use super::{normalize_storage_class, obs_client, obs_error, region_attribute, storage_class_type};
use crate::error::check_deleted;
use crate::obs::ObsRequest;
use crate::provider::HuaweiCloudProvider;
use crate::resources::ManagedResource;
use crate::utils::set_attr;

const IDENTIFIER_FORMAT: &str = "<bucket>/<key>";
const DEFAULT_CONTENT_TYPE: &str = "binary/octet-stream";

pub struct BucketObject;

/// Split `{bucket}/{key}`; keys may contain `/` themselves
fn parse_identifier(identifier: &str) -> ProviderResult<(&str, &str)> {
    identifier
        .split_once('/')
        .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
        .ok_or_else(|| {
            ProviderError::new(format!(
                "invalid identifier {:?}, expected {}",
                identifier, IDENTIFIER_FORMAT
            ))
        })
}

/// `PUT /{bucket}/{key}` request for the configured object
fn put_request(resource: &Resource) -> ProviderResult<ObsRequest> {
    let field = |key: &str| {
        resource
            .get_non_empty_str(key)
            .ok_or_else(|| ProviderError::new(format!("{} is required", key)))
    };
    let bucket = field("bucket")?;
    let key = field("key")?;

    let content_type = resource
        .get_non_empty_str("content_type")
        .unwrap_or(DEFAULT_CONTENT_TYPE);
    let content = resource.get_str("content").unwrap_or_default();

    let mut request = ObsRequest::new(Method::PUT)
        .bucket(bucket)
        .key(key)
        .optional_header("x-obs-acl", resource.get_non_empty_str("acl"))
        .optional_header("x-obs-storage-class", resource.get_non_empty_str("storage_class"))
        .body(content_type, content.as_bytes().to_vec());
    if resource.get_bool("encryption").unwrap_or(false) {
        request = request.header("x-obs-server-side-encryption", "kms");
    }
    Ok(request)
}

#[async_trait]
impl ManagedResource for BucketObject {
    fn name(&self) -> &'static str {
        "obs_bucket_object"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("Object stored in an OBS bucket")
            .attribute(region_attribute())
            .attribute(
                AttributeSchema::new("bucket", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("key", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("content", AttributeType::String))
            .attribute(AttributeSchema::new("content_type", AttributeType::String).computed())
            .attribute(AttributeSchema::new("storage_class", storage_class_type()).computed())
            .attribute(
                AttributeSchema::new(
                    "acl",
                    types::string_in(&["private", "public-read", "public-read-write"]),
                )
                .with_default("private"),
            )
            .attribute(AttributeSchema::new("encryption", AttributeType::Bool).with_default(false))
            .attribute(AttributeSchema::new("etag", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("size", AttributeType::Int).read_only())
            .attribute(AttributeSchema::new("version_id", AttributeType::String).read_only())
    }

    async fn create(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let request = put_request(resource).map_err(|e| e.for_resource(resource.id.clone()))?;
        let bucket = resource.get_str("bucket").unwrap_or_default();
        let key = resource.get_str("key").unwrap_or_default();

        let client = obs_client(provider, &resource.attributes)?;
        client.put_object(request).await.map_err(|e| {
            obs_error("Error putting object to OBS bucket", bucket, e).for_resource(resource.id.clone())
        })?;
        info!("uploaded object {} to OBS bucket {}", key, bucket);

        let identifier = format!("{}/{}", bucket, key);
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
        let (bucket, key) = parse_identifier(identifier).map_err(|e| e.for_resource(id.clone()))?;
        let client = obs_client(provider, prior)?;

        let metadata = match client.head_object(bucket, key).await {
            Ok(metadata) => metadata,
            Err(e) => {
                return check_deleted(
                    id,
                    e,
                    &format!("Error reading object {} of OBS bucket {}", key, bucket),
                );
            }
        };

        let mut attributes = HashMap::from([
            ("region".to_string(), Value::from(provider.region_of(prior))),
            ("bucket".to_string(), Value::from(bucket)),
            ("key".to_string(), Value::from(key)),
            (
                "storage_class".to_string(),
                Value::from(normalize_storage_class(
                    metadata.storage_class.as_deref().unwrap_or("STANDARD"),
                )),
            ),
            ("encryption".to_string(), Value::from(metadata.sse.is_some())),
            (
                "acl".to_string(),
                Value::from(prior.get_non_empty_str("acl").unwrap_or("private")),
            ),
        ]);
        set_attr(&mut attributes, "content_type", metadata.content_type.map(Value::from));
        set_attr(&mut attributes, "etag", metadata.etag.map(Value::from));
        set_attr(&mut attributes, "size", metadata.content_length.map(Value::from));
        set_attr(&mut attributes, "version_id", metadata.version_id.map(Value::from));
        // Content is never read back
        set_attr(&mut attributes, "content", prior.get("content").cloned());

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
        let request = put_request(to).map_err(|e| e.for_resource(id.clone()))?;
        let (bucket, _) = parse_identifier(identifier).map_err(|e| e.for_resource(id.clone()))?;

        let client = obs_client(provider, &to.attributes)?;
        client
            .put_object(request)
            .await
            .map_err(|e| obs_error("Error putting object to OBS bucket", bucket, e).for_resource(id.clone()))?;

        self.read(provider, id, identifier, &to.attributes).await
    }

    async fn delete(
        &self,
        provider: &HuaweiCloudProvider,
        id: &ResourceId,
        identifier: &str,
        current: &State,
    ) -> ProviderResult<()> {
        let (bucket, key) = parse_identifier(identifier).map_err(|e| e.for_resource(id.clone()))?;
        let client = obs_client(provider, &current.attributes)?;

        match client.delete_object(bucket, key).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(obs_error(&format!("Error deleting object {} of OBS bucket", key), bucket, e)
                .for_resource(id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_keeps_nested_keys() {
        assert_eq!(parse_identifier("media/a/b.txt").unwrap(), ("media", "a/b.txt"));
        assert!(parse_identifier("media").is_err());
        assert!(parse_identifier("media/").is_err());
    }

    #[test]
    fn put_request_requires_key() {
        let resource = Resource::new("obs_bucket_object", "o").with_attribute("bucket", "media");
        let err = put_request(&resource).unwrap_err();
        assert_eq!(err.message, "key is required");

        let resource = resource
            .with_attribute("key", "index.html")
            .with_attribute("content", "<html/>")
            .with_attribute("encryption", true);
        assert!(put_request(&resource).is_ok());
    }
}
