//! obs_bucket - Bucket and its sub-configurations
//!
//! Creation sends `PUT /{bucket}` with the location constraint and the
//! headers only accepted at creation time, then applies every other
//! sub-configuration the same way an update does. Each sub-configuration
//! lives under its own `?sub-resource` and is put or deleted on its own.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use cirrus_core::differ::AttributeChanges;
use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::{Attributes, Resource, ResourceId, State, Value};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use cirrus_core::wait::StateChangeConf;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use super::{
    bucket_domain_name, is_absent, normalize_storage_class, obs_client, obs_error, region_attribute,
    storage_class_type,
};
use crate::client::build_path;
use crate::error::{ClientError, api_error, check_deleted};
use crate::obs::model::*;
use crate::obs::{CreateBucketInput, ObsClient};
use crate::provider::HuaweiCloudProvider;
use crate::resources::ManagedResource;
use crate::utils::remove_nil;

const DEFAULT_SSE_ALGORITHM: &str = "kms";
const DEFAULT_LOG_PREFIX: &str = "logs/";
const DEFAULT_CORS_MAX_AGE: i64 = 100;
const DELETE_BATCH_SIZE: usize = 1000;

const EPS_MIGRATE_PATH: &str = "v1.0/enterprise-projects/{enterprise_project_id}/resources-migrate";
const EPS_MIGRATE_DELAY: Duration = Duration::from_secs(10);
const EPS_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct Bucket;

#[async_trait]
impl ManagedResource for Bucket {
    fn name(&self) -> &'static str {
        "obs_bucket"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("OBS bucket")
            .attribute(
                AttributeSchema::new("bucket", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(region_attribute())
            .attribute(AttributeSchema::new("storage_class", storage_class_type()).with_default("STANDARD"))
            .attribute(
                AttributeSchema::new(
                    "acl",
                    types::string_in(&[
                        "private",
                        "public-read",
                        "public-read-write",
                        "log-delivery-write",
                    ]),
                )
                .with_default("private"),
            )
            .attribute(
                AttributeSchema::new("policy", types::json_string())
                    .computed()
                    .json_equivalent(),
            )
            .attribute(
                AttributeSchema::new("policy_format", types::string_in(&["obs", "s3"])).with_default("obs"),
            )
            .attribute(AttributeSchema::new("versioning", AttributeType::Bool).with_default(false))
            .attribute(
                AttributeSchema::new(
                    "logging",
                    AttributeType::blocks(vec![
                        AttributeSchema::new("target_bucket", AttributeType::String).required(),
                        AttributeSchema::new("target_prefix", AttributeType::String),
                        AttributeSchema::new("agency", AttributeType::String).computed(),
                    ]),
                )
                .max_items(1),
            )
            .attribute(AttributeSchema::new("quota", types::non_negative_int()).with_default(0))
            .attribute(
                AttributeSchema::new(
                    "lifecycle_rule",
                    AttributeType::blocks(vec![
                        AttributeSchema::new("name", AttributeType::String).required(),
                        AttributeSchema::new("enabled", AttributeType::Bool).required(),
                        AttributeSchema::new("prefix", AttributeType::String),
                        AttributeSchema::new("expiration", days_blocks()).max_items(1),
                        AttributeSchema::new("transition", transition_blocks()),
                        AttributeSchema::new("noncurrent_version_expiration", days_blocks()).max_items(1),
                        AttributeSchema::new("noncurrent_version_transition", transition_blocks()),
                        AttributeSchema::new("abort_incomplete_multipart_upload", days_blocks())
                            .max_items(1),
                    ]),
                ),
            )
            .attribute(
                AttributeSchema::new(
                    "website",
                    AttributeType::blocks(vec![
                        AttributeSchema::new("index_document", AttributeType::String),
                        AttributeSchema::new("error_document", AttributeType::String),
                        AttributeSchema::new("redirect_all_requests_to", AttributeType::String),
                        AttributeSchema::new("routing_rules", types::json_string()),
                    ]),
                )
                .max_items(1),
            )
            .attribute(AttributeSchema::new(
                "cors_rule",
                AttributeType::blocks(vec![
                    AttributeSchema::new("allowed_origins", types::string_list()).required(),
                    AttributeSchema::new("allowed_methods", types::string_list()).required(),
                    AttributeSchema::new("allowed_headers", types::string_list()),
                    AttributeSchema::new("expose_headers", types::string_list()),
                    AttributeSchema::new("max_age_seconds", types::non_negative_int()),
                ]),
            ))
            .attribute(AttributeSchema::new("tags", types::string_map()))
            .attribute(
                AttributeSchema::new("force_destroy", AttributeType::Bool)
                    .with_default(false)
                    .with_description("Delete every object when the bucket is destroyed"),
            )
            .attribute(
                AttributeSchema::new("multi_az", AttributeType::Bool)
                    .computed()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("parallel_fs", AttributeType::Bool).force_new())
            .attribute(AttributeSchema::new("encryption", AttributeType::Bool).with_default(false))
            .attribute(
                AttributeSchema::new("sse_algorithm", types::string_in(&["kms", "obs"]))
                    .computed()
                    .required_with(&["encryption"]),
            )
            .attribute(AttributeSchema::new("kms_key_id", AttributeType::String))
            .attribute(AttributeSchema::new("kms_key_project_id", AttributeType::String).computed())
            .attribute(AttributeSchema::new("enterprise_project_id", AttributeType::String).computed())
            .attribute(AttributeSchema::new("user_domain_names", types::string_set()).computed())
            .attribute(
                AttributeSchema::new(
                    "storage_info",
                    AttributeType::blocks(vec![
                        AttributeSchema::new("size", AttributeType::Int),
                        AttributeSchema::new("object_number", AttributeType::Int),
                    ]),
                )
                .read_only(),
            )
            .attribute(AttributeSchema::new("bucket_domain_name", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("bucket_version", AttributeType::String).read_only())
    }

    async fn create(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let attributes = &resource.attributes;
        let for_resource = |e: ProviderError| e.for_resource(resource.id.clone());
        let bucket = attributes
            .get_non_empty_str("bucket")
            .ok_or_else(|| for_resource(ProviderError::new("bucket is required")))?;
        let client = obs_client(provider, attributes)?;

        let input = CreateBucketInput {
            bucket: bucket.to_string(),
            location: provider.region_of(attributes).to_string(),
            acl: attributes.get_non_empty_str("acl").map(str::to_string),
            storage_class: attributes.get_non_empty_str("storage_class").map(str::to_string),
            epid: provider
                .config()
                .enterprise_project_of(attributes)
                .map(str::to_string),
            multi_az: attributes.get_bool("multi_az").unwrap_or(false),
            parallel_fs: attributes.get_bool("parallel_fs").unwrap_or(false),
        };
        client
            .create_bucket(&input)
            .await
            .map_err(|e| for_resource(obs_error("Error creating OBS bucket", bucket, e)))?;
        info!("created OBS bucket {}", bucket);

        let pending = PendingChanges::for_create(attributes);
        apply_changes(provider, &client, bucket, &pending, &HashMap::new(), attributes)
            .await
            .map_err(for_resource)?;

        self.read(provider, &resource.id, bucket, attributes).await
    }

    async fn read(
        &self,
        provider: &HuaweiCloudProvider,
        id: &ResourceId,
        identifier: &str,
        prior: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let client = obs_client(provider, prior)?;
        read_bucket(provider, &client, id, identifier, prior).await
    }

    async fn update(
        &self,
        provider: &HuaweiCloudProvider,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let client = obs_client(provider, &to.attributes)?;
        let pending = PendingChanges::for_update(AttributeChanges::between(
            &self.schema(),
            &from.attributes,
            &to.attributes,
        ));

        apply_changes(provider, &client, identifier, &pending, &from.attributes, &to.attributes)
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
        let client = obs_client(provider, &current.attributes)?;
        let force_destroy = current.get_bool("force_destroy").unwrap_or(false);

        match client.delete_bucket(identifier).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) if force_destroy && is_absent(&e, &["BucketNotEmpty"]) => {
                warn!("OBS bucket {} is not empty, deleting all objects", identifier);
                empty_bucket(&client, identifier)
                    .await
                    .map_err(|e| e.for_resource(id.clone()))?;
                match client.delete_bucket(identifier).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => {
                        return Err(obs_error("Error deleting OBS bucket", identifier, e).for_resource(id.clone()));
                    }
                }
            }
            Err(e) => return Err(obs_error("Error deleting OBS bucket", identifier, e).for_resource(id.clone())),
        }

        info!("deleted OBS bucket {}", identifier);
        Ok(())
    }
}

fn days_blocks() -> AttributeType {
    AttributeType::blocks(vec![AttributeSchema::new("days", types::positive_int()).required()])
}

fn transition_blocks() -> AttributeType {
    AttributeType::blocks(vec![
        AttributeSchema::new("days", types::positive_int()).required(),
        AttributeSchema::new("storage_class", types::string_in(&["WARM", "COLD", "DEEP_ARCHIVE"])).required(),
    ])
}

// =============================================================================
// Update path
// =============================================================================

/// Which sub-configurations need to be sent
///
/// A new bucket only needs the ones set to something other than their
/// zero value; an existing bucket needs the changed ones.
enum PendingChanges {
    Create(BTreeSet<String>),
    Update(AttributeChanges),
}

impl PendingChanges {
    fn for_create(attributes: &HashMap<String, Value>) -> Self {
        let set = attributes
            .iter()
            .filter(|(_, v)| !is_zero(v))
            .map(|(k, _)| k.clone())
            .collect();
        PendingChanges::Create(set)
    }

    fn for_update(changes: AttributeChanges) -> Self {
        PendingChanges::Update(changes)
    }

    fn is_new(&self) -> bool {
        matches!(self, PendingChanges::Create(_))
    }

    fn wants(&self, names: &[&str]) -> bool {
        match self {
            PendingChanges::Create(set) => names.iter().any(|n| set.contains(*n)),
            PendingChanges::Update(changes) => changes.has_any(names),
        }
    }
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !b,
        Value::Int(i) => *i == 0,
        other => other.is_empty(),
    }
}

async fn apply_changes(
    provider: &HuaweiCloudProvider,
    client: &ObsClient,
    bucket: &str,
    pending: &PendingChanges,
    current: &HashMap<String, Value>,
    desired: &HashMap<String, Value>,
) -> ProviderResult<()> {
    // ACL and storage class are create headers
    if !pending.is_new() {
        if pending.wants(&["acl"]) {
            let acl = desired.get_non_empty_str("acl").unwrap_or("private");
            client
                .set_bucket_acl(bucket, acl)
                .await
                .map_err(|e| obs_error("Error setting ACL of OBS bucket", bucket, e))?;
        }
        if pending.wants(&["storage_class"]) {
            let class = StorageClass {
                class: desired.get_non_empty_str("storage_class").unwrap_or("STANDARD").to_string(),
            };
            client
                .put_bucket_config(bucket, "storageClass", &class)
                .await
                .map_err(|e| obs_error("Error setting storage class of OBS bucket", bucket, e))?;
        }
    }

    if pending.wants(&["policy"]) {
        let result = match desired.get_non_empty_str("policy") {
            Some(policy) => client.set_bucket_policy(bucket, policy).await,
            None => client.delete_bucket_config(bucket, "policy").await,
        };
        result.map_err(|e| obs_error("Error setting policy of OBS bucket", bucket, e))?;
    }

    if pending.wants(&["tags"]) {
        let tagging = tagging(desired);
        let result = if tagging.tag_set.tags.is_empty() {
            client.delete_bucket_config(bucket, "tagging").await
        } else {
            client.put_bucket_config(bucket, "tagging", &tagging).await
        };
        result.map_err(|e| obs_error("Error updating tags of OBS bucket", bucket, e))?;
    }

    if pending.wants(&["versioning"]) {
        let status = if desired.get_bool("versioning").unwrap_or(false) {
            "Enabled"
        } else {
            "Suspended"
        };
        let config = VersioningConfiguration {
            status: status.to_string(),
        };
        client
            .put_bucket_config(bucket, "versioning", &config)
            .await
            .map_err(|e| obs_error("Error setting versioning status of OBS bucket", bucket, e))?;
    }

    if pending.wants(&["encryption", "sse_algorithm", "kms_key_id", "kms_key_project_id"]) {
        let result = match encryption_configuration(desired) {
            Some(config) => client.put_bucket_config(bucket, "encryption", &config).await,
            None if !pending.is_new() => client.delete_bucket_config(bucket, "encryption").await,
            None => Ok(()),
        };
        result.map_err(|e| obs_error("Error setting encryption of OBS bucket", bucket, e))?;
    }

    if pending.wants(&["logging"]) {
        client
            .put_bucket_config(bucket, "logging", &logging_status(desired))
            .await
            .map_err(|e| obs_error("Error setting logging of OBS bucket", bucket, e))?;
    }

    if pending.wants(&["quota"]) {
        let quota = Quota {
            storage_quota: desired.get_int("quota").unwrap_or(0),
        };
        client
            .put_bucket_config(bucket, "quota", &quota)
            .await
            .map_err(|e| obs_error("Error setting quota of OBS bucket", bucket, e))?;
    }

    if pending.wants(&["lifecycle_rule"]) {
        let lifecycle = lifecycle_configuration(desired);
        let result = if lifecycle.rules.is_empty() {
            client.delete_bucket_config(bucket, "lifecycle").await
        } else {
            client.put_bucket_config(bucket, "lifecycle", &lifecycle).await
        };
        result.map_err(|e| obs_error("Error setting lifecycle rules of OBS bucket", bucket, e))?;
    }

    if pending.wants(&["website"]) {
        let result = match desired.first_block("website") {
            Some(block) => {
                let config = website_configuration(block)?;
                client.put_bucket_config(bucket, "website", &config).await
            }
            None => client.delete_bucket_config(bucket, "website").await,
        };
        result.map_err(|e| obs_error("Error setting website configuration of OBS bucket", bucket, e))?;
    }

    if pending.wants(&["cors_rule"]) {
        let cors = cors_configuration(desired);
        let result = if cors.rules.is_empty() {
            client.delete_bucket_config(bucket, "cors").await
        } else {
            client.put_bucket_config(bucket, "cors", &cors).await
        };
        result.map_err(|e| obs_error("Error setting CORS rules of OBS bucket", bucket, e))?;
    }

    if !pending.is_new()
        && pending.wants(&["enterprise_project_id"])
        && let Some(epid) = desired.get_non_empty_str("enterprise_project_id")
    {
        migrate_enterprise_project(provider, client, bucket, epid, desired).await?;
    }

    if pending.wants(&["user_domain_names"]) {
        update_custom_domains(client, bucket, current, desired).await?;
    }

    Ok(())
}

/// Move the bucket into another enterprise project and wait for OBS to
/// report it
async fn migrate_enterprise_project(
    provider: &HuaweiCloudProvider,
    client: &ObsClient,
    bucket: &str,
    epid: &str,
    desired: &HashMap<String, Value>,
) -> ProviderResult<()> {
    let eps = provider.service_client("eps", provider.region_of(desired))?;
    let path = build_path(EPS_MIGRATE_PATH, &[("enterprise_project_id", epid)]);
    let body = json!({
        "resource_id": bucket,
        "resource_type": "bucket",
        "region_id": provider.region_of(desired),
        "project_id": provider.config().project_id.as_deref().unwrap_or_default(),
        "associated": false,
    });
    eps.post(&path, Some(&body))
        .await
        .map_err(|e| api_error(format!("failed to migrate OBS bucket {} to enterprise project {}", bucket, epid), e))?;
    debug!("migrating OBS bucket {} to enterprise project {}", bucket, epid);

    StateChangeConf::new(&["Pending"], &["Success"])
        .with_delay(EPS_MIGRATE_DELAY)
        .with_poll_interval(EPS_POLL_INTERVAL)
        .wait_for_state(|| async move {
            let metadata = client
                .head_bucket(bucket)
                .await
                .map_err(|e| obs_error("Error reading metadata of OBS bucket", bucket, e))?;
            let status = if metadata.epid.as_deref() == Some(epid) {
                "Success"
            } else {
                "Pending"
            };
            Ok((Some(()), status.to_string()))
        })
        .await
        .map_err(|e| {
            ProviderError::new(format!(
                "error waiting for migrating OBS bucket {} to enterprise project {}: {}",
                bucket, epid, e.message
            ))
        })
}

async fn update_custom_domains(
    client: &ObsClient,
    bucket: &str,
    current: &HashMap<String, Value>,
    desired: &HashMap<String, Value>,
) -> ProviderResult<()> {
    let old: BTreeSet<String> = current.get_strings("user_domain_names").into_iter().collect();
    let new: BTreeSet<String> = desired.get_strings("user_domain_names").into_iter().collect();

    for domain in old.difference(&new) {
        client
            .delete_bucket_custom_domain(bucket, domain)
            .await
            .map_err(|e| obs_error("Error deleting custom domain of OBS bucket", bucket, e))?;
    }
    for domain in new.difference(&old) {
        client
            .set_bucket_custom_domain(bucket, domain)
            .await
            .map_err(|e| obs_error("Error setting custom domain of OBS bucket", bucket, e))?;
    }
    Ok(())
}

/// Delete every object so the bucket itself can be deleted
async fn empty_bucket(client: &ObsClient, bucket: &str) -> ProviderResult<()> {
    let keys = client
        .list_object_keys(bucket)
        .await
        .map_err(|e| obs_error("Error listing objects of OBS bucket", bucket, e))?;

    let mut failed = Vec::new();
    for batch in keys.chunks(DELETE_BATCH_SIZE) {
        let result = client
            .delete_objects(bucket, batch)
            .await
            .map_err(|e| obs_error("Error deleting objects of OBS bucket", bucket, e))?;
        failed.extend(
            result
                .errors
                .into_iter()
                .map(|e| format!("{}: {} {}", e.key, e.code, e.message)),
        );
    }

    if !failed.is_empty() {
        return Err(ProviderError::new(format!(
            "error some objects are still exist in {}: {}",
            bucket,
            failed.join("; ")
        )));
    }
    debug!("deleted {} objects from OBS bucket {}", keys.len(), bucket);
    Ok(())
}

// =============================================================================
// Attributes to XML documents
// =============================================================================

fn tagging(attributes: &HashMap<String, Value>) -> Tagging {
    let mut tags: Vec<Tag> = attributes
        .get_map("tags")
        .into_iter()
        .flatten()
        .filter_map(|(key, value)| {
            Some(Tag {
                key: key.clone(),
                value: value.as_str()?.to_string(),
            })
        })
        .collect();
    tags.sort_by(|a, b| a.key.cmp(&b.key));
    Tagging {
        tag_set: TagSet { tags },
    }
}

/// `None` when encryption is disabled
fn encryption_configuration(attributes: &HashMap<String, Value>) -> Option<ServerSideEncryptionConfiguration> {
    if !attributes.get_bool("encryption").unwrap_or(false) {
        return None;
    }

    let algorithm = attributes
        .get_non_empty_str("sse_algorithm")
        .unwrap_or(DEFAULT_SSE_ALGORITHM);
    let mut default = EncryptionByDefault {
        sse_algorithm: algorithm.to_string(),
        ..Default::default()
    };
    if algorithm == DEFAULT_SSE_ALGORITHM {
        default.kms_master_key_id = attributes.get_non_empty_str("kms_key_id").map(str::to_string);
        default.project_id = attributes
            .get_non_empty_str("kms_key_project_id")
            .map(str::to_string);
    }

    Some(ServerSideEncryptionConfiguration {
        rule: EncryptionRule { default },
    })
}

fn logging_status(attributes: &HashMap<String, Value>) -> BucketLoggingStatus {
    let Some(block) = attributes.first_block("logging") else {
        return BucketLoggingStatus::default();
    };
    BucketLoggingStatus {
        agency: block.get_non_empty_str("agency").map(str::to_string),
        logging_enabled: block.get_non_empty_str("target_bucket").map(|target| LoggingEnabled {
            target_bucket: target.to_string(),
            target_prefix: Some(
                block
                    .get_non_empty_str("target_prefix")
                    .unwrap_or(DEFAULT_LOG_PREFIX)
                    .to_string(),
            ),
        }),
    }
}

fn lifecycle_configuration(attributes: &HashMap<String, Value>) -> LifecycleConfiguration {
    let days_of = |block: &HashMap<String, Value>, key: &str| {
        block.first_block(key).and_then(|b| b.get_int("days"))
    };

    let rules = attributes
        .get_blocks("lifecycle_rule")
        .into_iter()
        .map(|rule| LifecycleRule {
            id: rule.get_str("name").unwrap_or_default().to_string(),
            prefix: rule.get_str("prefix").unwrap_or_default().to_string(),
            status: if rule.get_bool("enabled").unwrap_or(false) {
                "Enabled".to_string()
            } else {
                "Disabled".to_string()
            },
            expiration: days_of(rule, "expiration").map(|days| Days { days }),
            transitions: rule
                .get_blocks("transition")
                .into_iter()
                .map(|t| Transition {
                    days: t.get_int("days").unwrap_or_default(),
                    storage_class: t.get_str("storage_class").unwrap_or_default().to_string(),
                })
                .collect(),
            noncurrent_version_expiration: days_of(rule, "noncurrent_version_expiration")
                .map(|noncurrent_days| NoncurrentDays { noncurrent_days }),
            noncurrent_version_transitions: rule
                .get_blocks("noncurrent_version_transition")
                .into_iter()
                .map(|t| NoncurrentVersionTransition {
                    noncurrent_days: t.get_int("days").unwrap_or_default(),
                    storage_class: t.get_str("storage_class").unwrap_or_default().to_string(),
                })
                .collect(),
            abort_incomplete_multipart_upload: days_of(rule, "abort_incomplete_multipart_upload")
                .map(|days_after_initiation| DaysAfterInitiation { days_after_initiation }),
        })
        .collect();

    LifecycleConfiguration { rules }
}

fn website_configuration(block: &HashMap<String, Value>) -> ProviderResult<WebsiteConfiguration> {
    let index = block.get_non_empty_str("index_document");
    let redirect = block.get_non_empty_str("redirect_all_requests_to");
    if index.is_none() && redirect.is_none() {
        return Err(ProviderError::new(
            "must specify either index_document or redirect_all_requests_to",
        ));
    }

    let routing_rules = match block.get_non_empty_str("routing_rules") {
        Some(document) => {
            let rules: Vec<RoutingRule> = serde_json::from_str(document)
                .map_err(|e| ProviderError::new(format!("routing_rules is not valid JSON: {}", e)))?;
            Some(RoutingRules { rules })
        }
        None => None,
    };

    Ok(WebsiteConfiguration {
        redirect_all_requests_to: redirect.map(redirect_target),
        index_document: index.map(|suffix| IndexDocument {
            suffix: suffix.to_string(),
        }),
        error_document: block.get_non_empty_str("error_document").map(|key| ErrorDocument {
            key: key.to_string(),
        }),
        routing_rules,
    })
}

/// `https://example.com/site` becomes host `example.com/site` with
/// protocol `https`; a bare host name has no protocol.
fn redirect_target(target: &str) -> RedirectAllRequestsTo {
    match Url::parse(target) {
        Ok(url) if url.host_str().is_some() => {
            let mut host_name = url.host_str().unwrap_or_default().to_string();
            if let Some(port) = url.port() {
                host_name.push_str(&format!(":{}", port));
            }
            if url.path() != "/" {
                host_name.push_str(url.path());
            }
            RedirectAllRequestsTo {
                host_name,
                protocol: Some(url.scheme().to_string()),
            }
        }
        _ => RedirectAllRequestsTo {
            host_name: target.to_string(),
            protocol: None,
        },
    }
}

fn cors_configuration(attributes: &HashMap<String, Value>) -> CorsConfiguration {
    let rules = attributes
        .get_blocks("cors_rule")
        .into_iter()
        .map(|rule| CorsRule {
            allowed_methods: rule.get_strings("allowed_methods"),
            allowed_origins: rule.get_strings("allowed_origins"),
            allowed_headers: rule.get_strings("allowed_headers"),
            max_age_seconds: rule.get_int("max_age_seconds").unwrap_or(DEFAULT_CORS_MAX_AGE),
            expose_headers: rule.get_strings("expose_headers"),
        })
        .collect();
    CorsConfiguration { rules }
}

// =============================================================================
// Read
// =============================================================================

/// Read a sub-configuration; the given error codes mean it is not set
async fn optional_config<T: DeserializeOwned>(
    client: &ObsClient,
    bucket: &str,
    sub_resource: &str,
    absent: &[&str],
) -> Result<Option<T>, ClientError> {
    match client.get_bucket_config(bucket, sub_resource).await {
        Ok(document) => Ok(Some(document)),
        Err(e) if is_absent(&e, absent) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn read_bucket(
    provider: &HuaweiCloudProvider,
    client: &ObsClient,
    id: &ResourceId,
    bucket: &str,
    prior: &HashMap<String, Value>,
) -> ProviderResult<State> {
    let metadata = match client.head_bucket(bucket).await {
        Ok(metadata) => metadata,
        Err(e) => return check_deleted(id, e, &format!("Error reading OBS bucket {}", bucket)),
    };
    let for_resource = |e: ProviderError| e.for_resource(id.clone());

    let region = metadata
        .location
        .clone()
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| provider.region_of(prior).to_string());

    let mut attributes = HashMap::new();
    attributes.insert("bucket".to_string(), Value::from(bucket));
    attributes.insert(
        "bucket_domain_name".to_string(),
        Value::from(bucket_domain_name(bucket, &region, provider.config().cloud())),
    );
    attributes.insert("region".to_string(), Value::from(region));

    // Settings OBS never returns
    attributes.insert(
        "acl".to_string(),
        Value::from(prior.get_non_empty_str("acl").unwrap_or("private")),
    );
    attributes.insert(
        "policy_format".to_string(),
        Value::from(prior.get_non_empty_str("policy_format").unwrap_or("obs")),
    );
    attributes.insert(
        "force_destroy".to_string(),
        Value::from(prior.get_bool("force_destroy").unwrap_or(false)),
    );

    let storage_class = match client.get_bucket_config::<StorageClass>(bucket, "storageClass").await {
        Ok(class) => Some(class.class),
        Err(e) => {
            warn!("error getting storage class of OBS bucket {}: {}", bucket, e);
            metadata.storage_class.clone()
        }
    };
    if let Some(class) = storage_class.filter(|c| !c.is_empty()) {
        attributes.insert("storage_class".to_string(), Value::from(normalize_storage_class(&class)));
    }

    if let Some(epid) = metadata.epid.as_deref() {
        attributes.insert("enterprise_project_id".to_string(), Value::from(epid));
    }
    attributes.insert(
        "multi_az".to_string(),
        Value::from(metadata.az_redundancy.as_deref() == Some("3az")),
    );
    let parallel_fs = metadata.fs_status.as_deref() == Some("Enabled");
    attributes.insert("parallel_fs".to_string(), Value::from(parallel_fs));
    if let Some(version) = metadata.version.as_deref() {
        attributes.insert("bucket_version".to_string(), Value::from(version));
    }

    let versioning: VersioningConfiguration = client
        .get_bucket_config(bucket, "versioning")
        .await
        .map_err(|e| for_resource(obs_error("Error getting versioning state of OBS bucket", bucket, e)))?;
    attributes.insert("versioning".to_string(), Value::from(versioning.status == "Enabled"));

    let encryption: Option<ServerSideEncryptionConfiguration> = optional_config(
        client,
        bucket,
        "encryption",
        &["NoSuchEncryptionConfiguration", "FsNotSupport"],
    )
    .await
    .map_err(|e| for_resource(obs_error("Error getting encryption configuration of OBS bucket", bucket, e)))?;
    flatten_encryption(&mut attributes, encryption.as_ref());

    let logging: BucketLoggingStatus = client
        .get_bucket_config(bucket, "logging")
        .await
        .map_err(|e| for_resource(obs_error("Error getting logging configuration of OBS bucket", bucket, e)))?;
    if let Some(block) = flatten_logging(&logging) {
        attributes.insert("logging".to_string(), block);
    }

    let quota: Quota = client
        .get_bucket_config(bucket, "quota")
        .await
        .map_err(|e| for_resource(obs_error("Error getting quota of OBS bucket", bucket, e)))?;
    attributes.insert("quota".to_string(), Value::from(quota.storage_quota));

    let lifecycle: Option<LifecycleConfiguration> =
        optional_config(client, bucket, "lifecycle", &["NoSuchLifecycleConfiguration"])
            .await
            .map_err(|e| for_resource(obs_error("Error getting lifecycle configuration of OBS bucket", bucket, e)))?;
    if let Some(lifecycle) = lifecycle.filter(|l| !l.rules.is_empty()) {
        attributes.insert("lifecycle_rule".to_string(), flatten_lifecycle(&lifecycle));
    }

    let website: Option<WebsiteConfiguration> =
        optional_config(client, bucket, "website", &["NoSuchWebsiteConfiguration"])
            .await
            .map_err(|e| for_resource(obs_error("Error getting website configuration of OBS bucket", bucket, e)))?;
    if let Some(website) = website {
        attributes.insert("website".to_string(), flatten_website(&website).map_err(for_resource)?);
    }

    let cors: Option<CorsConfiguration> = optional_config(client, bucket, "cors", &["NoSuchCORSConfiguration"])
        .await
        .map_err(|e| for_resource(obs_error("Error getting CORS configuration of OBS bucket", bucket, e)))?;
    if let Some(cors) = cors.filter(|c| !c.rules.is_empty()) {
        attributes.insert("cors_rule".to_string(), flatten_cors(&cors));
    }

    match client.get_bucket_policy(bucket).await {
        Ok(policy) if !policy.trim().is_empty() => {
            attributes.insert("policy".to_string(), Value::from(policy));
        }
        Ok(_) => {}
        Err(e) if is_absent(&e, &["NoSuchBucketPolicy"]) => {}
        Err(e) => return Err(for_resource(obs_error("Error getting policy of OBS bucket", bucket, e))),
    }

    let tagging: Option<Tagging> = optional_config(client, bucket, "tagging", &["NoSuchTagSet"])
        .await
        .map_err(|e| for_resource(obs_error("Error getting tags of OBS bucket", bucket, e)))?;
    let tags: HashMap<String, Value> = tagging
        .map(|t| t.tag_set.tags)
        .unwrap_or_default()
        .into_iter()
        .map(|tag| (tag.key, Value::from(tag.value)))
        .collect();
    attributes.insert("tags".to_string(), Value::Map(tags));

    let storage: GetBucketStorageInfoResult = client
        .get_bucket_config(bucket, "storageinfo")
        .await
        .map_err(|e| for_resource(obs_error("Error getting storage info of OBS bucket", bucket, e)))?;
    attributes.insert(
        "storage_info".to_string(),
        Value::block(HashMap::from([
            ("size".to_string(), Value::from(storage.size)),
            ("object_number".to_string(), Value::from(storage.object_number)),
        ])),
    );

    match client
        .get_bucket_config::<ListBucketCustomDomainsResult>(bucket, "customdomain")
        .await
    {
        Ok(result) => {
            attributes.insert(
                "user_domain_names".to_string(),
                Value::string_list(result.domains.into_iter().map(|d| d.domain_name)),
            );
        }
        Err(e) => warn!("error getting custom domains of OBS bucket {}: {}", bucket, e),
    }

    Ok(State::existing(id.clone(), attributes).with_identifier(bucket))
}

// =============================================================================
// XML documents to attributes
// =============================================================================

fn flatten_encryption(
    attributes: &mut HashMap<String, Value>,
    config: Option<&ServerSideEncryptionConfiguration>,
) {
    let Some(default) = config.map(|c| &c.rule.default) else {
        attributes.insert("encryption".to_string(), Value::from(false));
        return;
    };
    attributes.insert("encryption".to_string(), Value::from(true));
    attributes.insert("sse_algorithm".to_string(), Value::from(default.sse_algorithm.clone()));
    if let Some(key) = &default.kms_master_key_id {
        attributes.insert("kms_key_id".to_string(), Value::from(key.clone()));
    }
    if let Some(project) = &default.project_id {
        attributes.insert("kms_key_project_id".to_string(), Value::from(project.clone()));
    }
}

fn flatten_logging(status: &BucketLoggingStatus) -> Option<Value> {
    let enabled = status
        .logging_enabled
        .as_ref()
        .filter(|l| !l.target_bucket.is_empty())?;

    let mut block = HashMap::from([
        ("target_bucket".to_string(), Value::from(enabled.target_bucket.clone())),
        (
            "target_prefix".to_string(),
            Value::from(enabled.target_prefix.clone().unwrap_or_default()),
        ),
    ]);
    if let Some(agency) = &status.agency {
        block.insert("agency".to_string(), Value::from(agency.clone()));
    }
    Some(Value::block(block))
}

fn flatten_lifecycle(config: &LifecycleConfiguration) -> Value {
    let days = |days: i64| Value::block(HashMap::from([("days".to_string(), Value::from(days))]));
    let transition = |days: i64, class: &str| {
        Value::Map(HashMap::from([
            ("days".to_string(), Value::from(days)),
            ("storage_class".to_string(), Value::from(normalize_storage_class(class))),
        ]))
    };

    let rules = config
        .rules
        .iter()
        .map(|rule| {
            let mut block = HashMap::from([
                ("name".to_string(), Value::from(rule.id.clone())),
                ("prefix".to_string(), Value::from(rule.prefix.clone())),
                ("enabled".to_string(), Value::from(rule.status == "Enabled")),
            ]);
            if let Some(expiration) = &rule.expiration {
                block.insert("expiration".to_string(), days(expiration.days));
            }
            if !rule.transitions.is_empty() {
                block.insert(
                    "transition".to_string(),
                    Value::List(
                        rule.transitions
                            .iter()
                            .map(|t| transition(t.days, &t.storage_class))
                            .collect(),
                    ),
                );
            }
            if let Some(expiration) = &rule.noncurrent_version_expiration {
                block.insert(
                    "noncurrent_version_expiration".to_string(),
                    days(expiration.noncurrent_days),
                );
            }
            if !rule.noncurrent_version_transitions.is_empty() {
                block.insert(
                    "noncurrent_version_transition".to_string(),
                    Value::List(
                        rule.noncurrent_version_transitions
                            .iter()
                            .map(|t| transition(t.noncurrent_days, &t.storage_class))
                            .collect(),
                    ),
                );
            }
            if let Some(abort) = &rule.abort_incomplete_multipart_upload {
                block.insert(
                    "abort_incomplete_multipart_upload".to_string(),
                    days(abort.days_after_initiation),
                );
            }
            Value::Map(block)
        })
        .collect();

    Value::List(rules)
}

fn flatten_website(config: &WebsiteConfiguration) -> ProviderResult<Value> {
    let mut block = HashMap::new();
    if let Some(index) = &config.index_document {
        block.insert("index_document".to_string(), Value::from(index.suffix.clone()));
    }
    if let Some(error) = &config.error_document {
        block.insert("error_document".to_string(), Value::from(error.key.clone()));
    }
    if let Some(redirect) = &config.redirect_all_requests_to {
        let target = match &redirect.protocol {
            Some(protocol) if !protocol.is_empty() => format!("{}://{}", protocol, redirect.host_name),
            _ => redirect.host_name.clone(),
        };
        block.insert("redirect_all_requests_to".to_string(), Value::from(target));
    }
    if let Some(routing) = config.routing_rules.as_ref().filter(|r| !r.rules.is_empty()) {
        let json = serde_json::to_value(&routing.rules)
            .map_err(|e| ProviderError::new(format!("error encoding routing rules: {}", e)))?;
        block.insert(
            "routing_rules".to_string(),
            Value::from(remove_nil(json).to_string()),
        );
    }
    Ok(Value::block(block))
}

fn flatten_cors(config: &CorsConfiguration) -> Value {
    Value::List(
        config
            .rules
            .iter()
            .map(|rule| {
                Value::Map(HashMap::from([
                    (
                        "allowed_origins".to_string(),
                        Value::string_list(rule.allowed_origins.iter().cloned()),
                    ),
                    (
                        "allowed_methods".to_string(),
                        Value::string_list(rule.allowed_methods.iter().cloned()),
                    ),
                    (
                        "allowed_headers".to_string(),
                        Value::string_list(rule.allowed_headers.iter().cloned()),
                    ),
                    (
                        "expose_headers".to_string(),
                        Value::string_list(rule.expose_headers.iter().cloned()),
                    ),
                    ("max_age_seconds".to_string(), Value::from(rule.max_age_seconds)),
                ]))
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: Vec<(&str, Value)>) -> HashMap<String, Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn block(pairs: Vec<(&str, Value)>) -> Value {
        Value::Map(attrs(pairs))
    }

    #[test]
    fn schema_defaults() {
        let schema = Bucket.schema();
        let mut attributes = attrs(vec![("bucket", Value::from("media"))]);
        schema.apply_defaults(&mut attributes);

        assert_eq!(attributes.get_str("storage_class"), Some("STANDARD"));
        assert_eq!(attributes.get_str("acl"), Some("private"));
        assert_eq!(attributes.get_str("policy_format"), Some("obs"));
        assert_eq!(attributes.get_int("quota"), Some(0));
        assert_eq!(attributes.get_bool("force_destroy"), Some(false));
        assert!(schema.attributes["bucket"].force_new);
        assert!(schema.attributes["multi_az"].force_new);
    }

    #[test]
    fn create_skips_zero_values() {
        let attributes = attrs(vec![
            ("bucket", Value::from("media")),
            ("versioning", Value::from(false)),
            ("quota", Value::from(0)),
            ("tags", Value::Map(HashMap::new())),
            ("encryption", Value::from(true)),
        ]);
        let pending = PendingChanges::for_create(&attributes);

        assert!(pending.is_new());
        assert!(!pending.wants(&["versioning"]));
        assert!(!pending.wants(&["quota"]));
        assert!(!pending.wants(&["tags"]));
        assert!(pending.wants(&["encryption", "sse_algorithm"]));
    }

    #[test]
    fn kms_encryption_carries_key() {
        let attributes = attrs(vec![
            ("encryption", Value::from(true)),
            ("kms_key_id", Value::from("key-1")),
        ]);
        let config = encryption_configuration(&attributes).unwrap();
        assert_eq!(config.rule.default.sse_algorithm, "kms");
        assert_eq!(config.rule.default.kms_master_key_id.as_deref(), Some("key-1"));

        let attributes = attrs(vec![
            ("encryption", Value::from(true)),
            ("sse_algorithm", Value::from("obs")),
            ("kms_key_id", Value::from("key-1")),
        ]);
        let config = encryption_configuration(&attributes).unwrap();
        assert_eq!(config.rule.default.sse_algorithm, "obs");
        assert!(config.rule.default.kms_master_key_id.is_none());

        assert!(encryption_configuration(&attrs(vec![("encryption", Value::from(false))])).is_none());
    }

    #[test]
    fn logging_defaults_prefix() {
        let attributes = attrs(vec![(
            "logging",
            Value::List(vec![block(vec![("target_bucket", Value::from("logs"))])]),
        )]);
        let status = logging_status(&attributes);
        let enabled = status.logging_enabled.unwrap();
        assert_eq!(enabled.target_bucket, "logs");
        assert_eq!(enabled.target_prefix.as_deref(), Some("logs/"));

        assert_eq!(logging_status(&HashMap::new()), BucketLoggingStatus::default());
    }

    #[test]
    fn lifecycle_rules_round_trip_through_attributes() {
        let rule = block(vec![
            ("name", Value::from("archive")),
            ("enabled", Value::from(true)),
            ("prefix", Value::from("logs/")),
            (
                "expiration",
                Value::block(attrs(vec![("days", Value::from(365))])),
            ),
            (
                "transition",
                Value::List(vec![block(vec![
                    ("days", Value::from(30)),
                    ("storage_class", Value::from("WARM")),
                ])]),
            ),
        ]);
        let attributes = attrs(vec![("lifecycle_rule", Value::List(vec![rule]))]);

        let config = lifecycle_configuration(&attributes);
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].status, "Enabled");
        assert_eq!(config.rules[0].expiration, Some(Days { days: 365 }));
        assert!(config.rules[0].noncurrent_version_expiration.is_none());

        let flattened = flatten_lifecycle(&config);
        let rules = flattened.as_list().unwrap();
        let rule = rules[0].as_map().unwrap();
        assert_eq!(rule.get_str("name"), Some("archive"));
        assert_eq!(rule.get_bool("enabled"), Some(true));
        assert_eq!(
            rule.first_block("expiration").and_then(|b| b.get_int("days")),
            Some(365)
        );
        assert_eq!(rule.get_blocks("transition")[0].get_str("storage_class"), Some("WARM"));
    }

    #[test]
    fn website_requires_index_or_redirect() {
        let err = website_configuration(&attrs(vec![("error_document", Value::from("404.html"))]))
            .unwrap_err();
        assert_eq!(err.message, "must specify either index_document or redirect_all_requests_to");
    }

    #[test]
    fn website_routing_rules_parse_json() {
        let website = attrs(vec![
            ("index_document", Value::from("index.html")),
            (
                "routing_rules",
                Value::from(r#"[{"Condition":{"KeyPrefixEquals":"docs/"},"Redirect":{"ReplaceKeyPrefixWith":"documents/"}}]"#),
            ),
        ]);
        let config = website_configuration(&website).unwrap();
        let rules = config.routing_rules.unwrap().rules;
        assert_eq!(rules.len(), 1);
        assert_eq!(
            rules[0].condition.as_ref().unwrap().key_prefix_equals.as_deref(),
            Some("docs/")
        );

        let flattened = flatten_website(&website_configuration(&website).unwrap()).unwrap();
        let block = flattened.as_list().unwrap()[0].as_map().unwrap();
        assert_eq!(
            block.get_str("routing_rules"),
            Some(r#"[{"Condition":{"KeyPrefixEquals":"docs/"},"Redirect":{"ReplaceKeyPrefixWith":"documents/"}}]"#)
        );

        let invalid = attrs(vec![
            ("index_document", Value::from("index.html")),
            ("routing_rules", Value::from("[")),
        ]);
        assert!(website_configuration(&invalid).is_err());
    }

    #[test]
    fn redirect_targets_split_protocol() {
        assert_eq!(
            redirect_target("https://example.com/site"),
            RedirectAllRequestsTo {
                host_name: "example.com/site".to_string(),
                protocol: Some("https".to_string()),
            }
        );
        assert_eq!(
            redirect_target("https://example.com"),
            RedirectAllRequestsTo {
                host_name: "example.com".to_string(),
                protocol: Some("https".to_string()),
            }
        );
        assert_eq!(
            redirect_target("example.com"),
            RedirectAllRequestsTo {
                host_name: "example.com".to_string(),
                protocol: None,
            }
        );
    }

    #[test]
    fn cors_rules_default_max_age() {
        let attributes = attrs(vec![(
            "cors_rule",
            Value::List(vec![block(vec![
                ("allowed_origins", Value::string_list(["*"])),
                ("allowed_methods", Value::string_list(["GET", "PUT"])),
            ])]),
        )]);
        let cors = cors_configuration(&attributes);
        assert_eq!(cors.rules[0].max_age_seconds, 100);
        assert_eq!(cors.rules[0].allowed_methods, vec!["GET", "PUT"]);

        let flattened = flatten_cors(&cors);
        let rule = flattened.as_list().unwrap()[0].as_map().unwrap();
        assert_eq!(rule.get_int("max_age_seconds"), Some(100));
    }

    #[test]
    fn tags_are_sorted() {
        let attributes = attrs(vec![(
            "tags",
            Value::Map(attrs(vec![("owner", Value::from("ops")), ("env", Value::from("prod"))])),
        )]);
        let keys: Vec<_> = tagging(&attributes)
            .tag_set
            .tags
            .into_iter()
            .map(|t| t.key)
            .collect();
        assert_eq!(keys, vec!["env", "owner"]);
    }

    #[test]
    fn missing_encryption_reads_as_disabled() {
        let mut attributes = HashMap::new();
        flatten_encryption(&mut attributes, None);
        assert_eq!(attributes.get_bool("encryption"), Some(false));
        assert!(!attributes.contains_key("sse_algorithm"));
    }
}
