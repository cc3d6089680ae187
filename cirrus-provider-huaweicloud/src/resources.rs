//! Resource and data source registry
//!
//! This module defines:
//! - The `ManagedResource` and `DataSource` traits every service implements
//! - Lookup tables from type names to implementations

use std::collections::HashMap;

use async_trait::async_trait;
use cirrus_core::provider::{ProviderResult, ResourceKind, ResourceType};
use cirrus_core::resource::{Resource, ResourceId, State, Value};
use cirrus_core::schema::ResourceSchema;

use crate::provider::HuaweiCloudProvider;
use crate::services::identitycenter::{
    account_assignment::AccountAssignment, application_instance::ApplicationInstance,
    data_sources, group::Group, group_membership::GroupMembership, permission_set::PermissionSet,
    policy_attachment::{CustomPolicyAttachment, SystemPolicyAttachment},
    provision_permission_set::ProvisionPermissionSet, service::IdentityCenterService, user::User,
};
use crate::services::obs::{
    bucket::Bucket, bucket_object::BucketObject, bucket_policy::BucketPolicy, buckets::Buckets,
};

/// A resource with a create/read/update/delete lifecycle
#[async_trait]
pub trait ManagedResource: Send + Sync {
    fn name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    /// Format of composite identifiers, e.g. `<instance_id>/<user_id>`
    fn identifier_format(&self) -> Option<&'static str> {
        None
    }

    async fn create(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State>;

    /// Read the remote object
    ///
    /// `prior` carries attributes known from configuration or a previous
    /// state (region, formats); it is empty for plain reads and imports.
    async fn read(
        &self,
        provider: &HuaweiCloudProvider,
        id: &ResourceId,
        identifier: &str,
        prior: &HashMap<String, Value>,
    ) -> ProviderResult<State>;

    async fn update(
        &self,
        provider: &HuaweiCloudProvider,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State>;

    async fn delete(
        &self,
        provider: &HuaweiCloudProvider,
        id: &ResourceId,
        identifier: &str,
        current: &State,
    ) -> ProviderResult<()>;
}

/// A read-only query
#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    async fn read(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State>;
}

// =============================================================================
// Registry
// =============================================================================

static MANAGED: &[&dyn ManagedResource] = &[
    &IdentityCenterService,
    &User,
    &Group,
    &GroupMembership,
    &PermissionSet,
    &ProvisionPermissionSet,
    &AccountAssignment,
    &SystemPolicyAttachment,
    &CustomPolicyAttachment,
    &ApplicationInstance,
    &Bucket,
    &BucketPolicy,
    &BucketObject,
];

static DATA_SOURCES: &[&dyn DataSource] = &[
    &data_sources::Instance,
    &data_sources::Users,
    &data_sources::Groups,
    &data_sources::PermissionSets,
    &data_sources::PermissionSetProvisionings,
    &Buckets,
];

/// Managed resource implementation for a type name
pub fn managed(resource_type: &str) -> Option<&'static dyn ManagedResource> {
    MANAGED.iter().copied().find(|r| r.name() == resource_type)
}

/// Data source implementation for a type name
pub fn data_source(resource_type: &str) -> Option<&'static dyn DataSource> {
    DATA_SOURCES.iter().copied().find(|d| d.name() == resource_type)
}

/// Schema of a resource or data source
pub fn schema_of(resource_type: &str) -> Option<ResourceSchema> {
    managed(resource_type)
        .map(|r| r.schema())
        .or_else(|| data_source(resource_type).map(|d| d.schema()))
}

// =============================================================================
// Resource Type Definitions
// =============================================================================

struct RegisteredType {
    name: &'static str,
    kind: ResourceKind,
}

impl ResourceType for RegisteredType {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn schema(&self) -> ResourceSchema {
        schema_of(self.name).unwrap_or_else(|| ResourceSchema::new(self.name))
    }
}

/// Returns all resource types and data sources supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    let managed = MANAGED.iter().map(|r| RegisteredType {
        name: r.name(),
        kind: ResourceKind::Managed,
    });
    let data_sources = DATA_SOURCES.iter().map(|d| RegisteredType {
        name: d.name(),
        kind: ResourceKind::DataSource,
    });

    managed
        .chain(data_sources)
        .map(|t| Box::new(t) as Box<dyn ResourceType>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn type_names_are_unique() {
        let names: Vec<_> = resource_types().iter().map(|t| t.name()).collect();
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(names.len(), unique.len());
    }

    #[test]
    fn schemas_match_type_names() {
        for t in resource_types() {
            assert_eq!(t.schema().resource_type, t.name());
        }
    }

    #[test]
    fn lookup_by_kind() {
        assert!(managed("obs_bucket").is_some());
        assert!(managed("obs_buckets").is_none());
        assert!(data_source("obs_buckets").is_some());
        assert!(data_source("identitycenter_instance").is_some());
        assert!(schema_of("identitycenter_application_instance").is_some());
        assert!(schema_of("unknown").is_none());
    }

    #[test]
    fn kinds_are_reported() {
        let types = resource_types();
        let kind_of = |name: &str| types.iter().find(|t| t.name() == name).map(|t| t.kind());
        assert_eq!(kind_of("identitycenter_user"), Some(ResourceKind::Managed));
        assert_eq!(kind_of("identitycenter_users"), Some(ResourceKind::DataSource));
    }
}
