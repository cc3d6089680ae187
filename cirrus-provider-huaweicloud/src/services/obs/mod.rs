//! Object Storage Service
//!
//! Buckets with their sub-configurations, bucket policies, objects, and the
//! bucket list data source.

pub mod bucket;
pub mod bucket_object;
pub mod bucket_policy;
pub mod buckets;

use std::collections::HashMap;

use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::Value;
use cirrus_core::schema::{AttributeSchema, AttributeType, types};

use crate::error::ClientError;
use crate::obs::ObsClient;
use crate::provider::HuaweiCloudProvider;

pub(crate) const STORAGE_CLASSES: &[&str] = &["STANDARD", "WARM", "COLD", "DEEP_ARCHIVE"];

pub(crate) fn region_attribute() -> AttributeSchema {
    AttributeSchema::new("region", AttributeType::String)
        .computed()
        .force_new()
        .with_description("Region of the bucket")
}

pub(crate) fn storage_class_type() -> AttributeType {
    types::string_in(STORAGE_CLASSES)
}

pub(crate) fn obs_client(
    provider: &HuaweiCloudProvider,
    attributes: &HashMap<String, Value>,
) -> ProviderResult<ObsClient> {
    provider.obs_client(provider.region_of(attributes))
}

/// `"{action} {bucket}: {err}"`
pub(crate) fn obs_error(action: &str, bucket: &str, err: ClientError) -> ProviderError {
    ProviderError::new(format!("{} {}: {}", action, bucket, err)).with_cause(err)
}

/// Whether an error carries one of the "no such configuration" codes
pub(crate) fn is_absent(err: &ClientError, codes: &[&str]) -> bool {
    err.code().is_some_and(|code| codes.contains(&code))
}

/// Map the S3 storage class names to the OBS ones
pub(crate) fn normalize_storage_class(class: &str) -> String {
    match class {
        "STANDARD_IA" => "WARM".to_string(),
        "GLACIER" => "COLD".to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn bucket_domain_name(bucket: &str, region: &str, cloud: &str) -> String {
    format!("{}.obs.{}.{}", bucket, region, cloud)
}
