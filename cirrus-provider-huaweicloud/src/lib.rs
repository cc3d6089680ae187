//! Cirrus HuaweiCloud Provider
//!
//! Identity Center and Object Storage Service (OBS) resources.
//!
//! ## Module Structure
//!
//! - `config` - Provider settings from a file and `HW_*` variables
//! - `signer` - API Gateway and OBS request signatures
//! - `client` - Signed JSON client with retries and marker pagination
//! - `obs` - OBS XML client
//! - `resources` - Resource and data source registry
//! - `services` - Identity Center and OBS implementations

pub mod client;
pub mod config;
pub mod error;
pub mod obs;
pub mod provider;
pub mod resources;
pub mod services;
pub mod signer;
pub mod utils;

// Re-export main types
pub use config::Config;
pub use provider::HuaweiCloudProvider;

use std::collections::HashMap;

use cirrus_core::differ::AttributeChanges;
use cirrus_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult, ResourceType};
use cirrus_core::resource::{Resource, ResourceId, State};
use cirrus_core::schema::ResourceSchema;

use resources::{ManagedResource, data_source, managed, resource_types};

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for HuaweiCloudProvider {
    fn name(&self) -> &'static str {
        "huaweicloud"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move {
            let resource = managed_resource(&id)?;
            let Some(identifier) = identifier else {
                return Ok(State::not_found(id));
            };
            resource.read(self, &id, &identifier, &HashMap::new()).await
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            let implementation = managed_resource(&resource.id)?;
            let resource = prepare(&implementation.schema(), resource)?;
            implementation.create(self, &resource).await
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move {
            let implementation = managed_resource(&id)?;
            let schema = implementation.schema();
            let to = prepare(&schema, to)?;
            check_updatable(&schema, &id, &from, &to)?;
            implementation.update(self, &id, &identifier, &from, &to).await
        })
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        current: &State,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let current = current.clone();
        Box::pin(async move {
            let implementation = managed_resource(&id)?;
            implementation.delete(self, &id, &identifier, &current).await
        })
    }

    fn import(&self, id: &ResourceId, import_id: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let import_id = import_id.to_string();
        Box::pin(async move {
            let implementation = managed_resource(&id)?;
            if let Some(format) = implementation.identifier_format() {
                utils::split_identifier(&import_id, format)
                    .map_err(|e| e.for_resource(id.clone()))?;
            }

            let state = implementation
                .read(self, &id, &import_id, &HashMap::new())
                .await?;
            if !state.exists {
                return Err(ProviderError::new(format!(
                    "cannot import non-existent remote object '{}'",
                    import_id
                ))
                .for_resource(id));
            }
            Ok(state)
        })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            let implementation = data_source(&resource.id.resource_type).ok_or_else(|| {
                ProviderError::new(format!(
                    "Unknown data source type: {}",
                    resource.id.resource_type
                ))
                .for_resource(resource.id.clone())
            })?;
            let resource = prepare(&implementation.schema(), resource)?;
            implementation.read(self, &resource).await
        })
    }
}

fn managed_resource(id: &ResourceId) -> ProviderResult<&'static dyn ManagedResource> {
    managed(&id.resource_type).ok_or_else(|| {
        ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
            .for_resource(id.clone())
    })
}

/// Validate the attributes and fill in defaults
fn prepare(schema: &ResourceSchema, mut resource: Resource) -> ProviderResult<Resource> {
    if let Err(errors) = schema.validate(&resource.attributes) {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(ProviderError::new(format!(
            "invalid configuration: {}",
            messages.join("; ")
        ))
        .for_resource(resource.id));
    }
    schema.apply_defaults(&mut resource.attributes);
    Ok(resource)
}

/// Reject changes that cannot be applied in place
fn check_updatable(
    schema: &ResourceSchema,
    id: &ResourceId,
    from: &State,
    to: &Resource,
) -> ProviderResult<()> {
    let changes = AttributeChanges::between(schema, &from.attributes, &to.attributes);

    let mut replace = changes.replacement_reasons(schema);
    let non_updatable = changes.non_updatable(schema);
    if !non_updatable.is_empty() {
        if to.attributes.get("enable_force_new").and_then(|v| v.as_str()) == Some("true") {
            replace.extend(non_updatable);
        } else {
            return Err(ProviderError::new(format!(
                "{} can't be updated",
                non_updatable.join(", ")
            ))
            .for_resource(id.clone()));
        }
    }

    if !replace.is_empty() {
        replace.sort();
        return Err(ProviderError::new(format!(
            "changing {} requires replacing the resource, delete and create it instead",
            replace.join(", ")
        ))
        .for_resource(id.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_core::resource::Value;

    fn provider() -> HuaweiCloudProvider {
        HuaweiCloudProvider::new(Config {
            region: Some("cn-north-4".to_string()),
            access_key: Some("AK".to_string()),
            secret_key: Some("SK".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    fn app_state(name: &str) -> State {
        State::existing(
            ResourceId::new("identitycenter_application_instance", "app"),
            HashMap::from([
                ("instance_id".to_string(), Value::from("ins-1")),
                ("name".to_string(), Value::from(name)),
                ("template_id".to_string(), Value::from("tpl-1")),
            ]),
        )
    }

    fn app_resource(name: &str) -> Resource {
        Resource::new("identitycenter_application_instance", "app")
            .with_attribute("instance_id", "ins-1")
            .with_attribute("name", name)
            .with_attribute("template_id", "tpl-1")
    }

    #[test]
    fn non_updatable_change_is_rejected() {
        let schema = managed("identitycenter_application_instance").unwrap().schema();
        let to = app_resource("renamed");

        let err = check_updatable(&schema, &to.id, &app_state("app"), &to).unwrap_err();
        assert!(err.message.contains("name can't be updated"));
    }

    #[test]
    fn enable_force_new_turns_into_replacement() {
        let schema = managed("identitycenter_application_instance").unwrap().schema();
        let to = app_resource("renamed").with_attribute("enable_force_new", "true");

        let err = check_updatable(&schema, &to.id, &app_state("app"), &to).unwrap_err();
        assert!(err.message.contains("requires replacing the resource"));
    }

    #[test]
    fn prepare_reports_validation_errors() {
        let schema = managed("identitycenter_group").unwrap().schema();
        let err = prepare(&schema, Resource::new("identitycenter_group", "g")).unwrap_err();
        assert!(err.message.starts_with("invalid configuration"));
    }

    #[tokio::test]
    async fn unknown_type_is_an_error() {
        let id = ResourceId::new("vpc", "main");
        let err = provider().read(&id, Some("vpc-1")).await.unwrap_err();
        assert_eq!(err.message, "Unknown resource type: vpc");
    }

    #[tokio::test]
    async fn read_without_identifier_is_not_found() {
        let id = ResourceId::new("obs_bucket", "logs");
        let state = provider().read(&id, None).await.unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn import_checks_identifier_format() {
        let id = ResourceId::new("identitycenter_user", "alice");
        let err = provider().import(&id, "only-one-part").await.unwrap_err();
        assert!(err.message.contains("invalid format specified"));
    }
}
