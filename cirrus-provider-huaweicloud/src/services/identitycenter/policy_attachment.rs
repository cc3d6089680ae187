//! Policies attached to a permission set
//!
//! - `identitycenter_system_policy_attachment` - system-defined roles and policies
//! - `identitycenter_custom_policy_attachment` - one inline custom policy document
//!
//! Both reprovision the permission set after every change so the accounts it
//! is deployed to pick the new policies up.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use cirrus_core::provider::ProviderResult;
use cirrus_core::resource::{Attributes, Resource, ResourceId, State, Value};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use log::debug;
use serde_json::{Value as JsonValue, json};

use super::{ALL_PROVISIONED_ACCOUNTS, identity_center_client, provision_permission_set, region_attribute, required_str};
use crate::client::{ServiceClient, build_path};
use crate::error::api_error;
use crate::provider::HuaweiCloudProvider;
use crate::resources::ManagedResource;
use crate::utils::{normalize_json_string, parse_json_attr, pick_fields, split_identifier};

const MANAGED_ROLES_PATH: &str = "v1/instances/{instance_id}/permission-sets/{permission_set_id}/managed-roles";
const ATTACH_PATH: &str = "v1/instances/{instance_id}/permission-sets/{permission_set_id}/managed-roles/attach";
const DETACH_PATH: &str = "v1/instances/{instance_id}/permission-sets/{permission_set_id}/managed-roles/detach";
const CUSTOM_POLICY_PATH: &str = "v1/instances/{instance_id}/permission-sets/{permission_set_id}/custom-policy";
const IDENTIFIER_FORMAT: &str = "<instance_id>/<permission_set_id>";

fn permission_set_attributes(schema: ResourceSchema) -> ResourceSchema {
    schema
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
}

fn identifier_of(resource: &Resource) -> ProviderResult<(String, String)> {
    let instance_id = required_str(resource, "instance_id")?;
    let permission_set_id = required_str(resource, "permission_set_id")?;
    Ok((instance_id.to_string(), permission_set_id.to_string()))
}

fn path(template: &str, instance_id: &str, permission_set_id: &str) -> String {
    build_path(
        template,
        &[("instance_id", instance_id), ("permission_set_id", permission_set_id)],
    )
}

async fn reprovision(client: &ServiceClient, instance_id: &str, permission_set_id: &str) -> ProviderResult<()> {
    provision_permission_set(client, instance_id, permission_set_id, ALL_PROVISIONED_ACCOUNTS, None).await?;
    Ok(())
}

// =============================================================================
// System Policies
// =============================================================================

pub struct SystemPolicyAttachment;

impl SystemPolicyAttachment {
    async fn attach(
        client: &ServiceClient,
        instance_id: &str,
        permission_set_id: &str,
        policy_ids: impl IntoIterator<Item = &String>,
        detach: bool,
    ) -> ProviderResult<()> {
        let (template, action) = if detach {
            (DETACH_PATH, "error detaching system policy from permission set")
        } else {
            (ATTACH_PATH, "error attaching system policy to permission set")
        };
        let path = path(template, instance_id, permission_set_id);

        for policy_id in policy_ids {
            debug!("{} {}", if detach { "detaching" } else { "attaching" }, policy_id);
            client
                .post(&path, Some(&json!({ "managed_role_id": policy_id })))
                .await
                .map_err(|e| api_error(format!("{} ({})", action, policy_id), e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ManagedResource for SystemPolicyAttachment {
    fn name(&self) -> &'static str {
        "identitycenter_system_policy_attachment"
    }

    fn schema(&self) -> ResourceSchema {
        permission_set_attributes(ResourceSchema::new(self.name()))
            .with_description("System policies attached to a permission set")
            .attribute(
                AttributeSchema::new("policy_ids", types::string_set())
                    .required()
                    .with_description("IDs of the system-defined policies and roles"),
            )
            .attribute(
                AttributeSchema::new(
                    "attached_policies",
                    AttributeType::blocks(vec![
                        AttributeSchema::new("id", AttributeType::String),
                        AttributeSchema::new("name", AttributeType::String),
                    ]),
                )
                .read_only(),
            )
    }

    fn identifier_format(&self) -> Option<&'static str> {
        Some(IDENTIFIER_FORMAT)
    }

    async fn create(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let client = identity_center_client(provider, &resource.attributes)?;
        let (instance_id, permission_set_id) =
            identifier_of(resource).map_err(|e| e.for_resource(resource.id.clone()))?;

        let policy_ids: BTreeSet<String> = resource.get_strings("policy_ids").into_iter().collect();
        Self::attach(&client, &instance_id, &permission_set_id, &policy_ids, false)
            .await
            .map_err(|e| e.for_resource(resource.id.clone()))?;
        reprovision(&client, &instance_id, &permission_set_id)
            .await
            .map_err(|e| e.for_resource(resource.id.clone()))?;

        let identifier = format!("{}/{}", instance_id, permission_set_id);
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

        let path = path(MANAGED_ROLES_PATH, &parts[0], &parts[1]);
        let roles = match client.list_all_by_marker(&path, &[], "attached_managed_roles").await {
            Ok(roles) => roles,
            Err(e) if e.is_not_found() => return Ok(State::not_found(id.clone())),
            Err(e) => {
                return Err(api_error("error retrieving permission set system policies", e)
                    .for_resource(id.clone()));
            }
        };
        if roles.is_empty() {
            return Ok(State::not_found(id.clone()));
        }

        let policy_ids: Vec<String> = roles
            .iter()
            .filter_map(|r| r.get("role_id").and_then(JsonValue::as_str).map(str::to_string))
            .collect();
        let attached = roles
            .iter()
            .map(|r| {
                let mut fields = pick_fields(r, &["role_id", "role_name"]);
                let mut block = HashMap::new();
                if let Some(v) = fields.remove("role_id") {
                    block.insert("id".to_string(), v);
                }
                if let Some(v) = fields.remove("role_name") {
                    block.insert("name".to_string(), v);
                }
                Value::Map(block)
            })
            .collect();

        let attributes = HashMap::from([
            ("region".to_string(), Value::from(provider.region_of(prior))),
            ("instance_id".to_string(), Value::from(parts[0].as_str())),
            ("permission_set_id".to_string(), Value::from(parts[1].as_str())),
            ("policy_ids".to_string(), Value::string_list(policy_ids)),
            ("attached_policies".to_string(), Value::List(attached)),
        ]);
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    async fn update(
        &self,
        provider: &HuaweiCloudProvider,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let parts = split_identifier(identifier, IDENTIFIER_FORMAT).map_err(|e| e.for_resource(id.clone()))?;
        let client = identity_center_client(provider, &to.attributes)?;

        let old: BTreeSet<String> = from.get_strings("policy_ids").into_iter().collect();
        let new: BTreeSet<String> = to.get_strings("policy_ids").into_iter().collect();
        let removed: Vec<&String> = old.difference(&new).collect();
        let added: Vec<&String> = new.difference(&old).collect();

        if !removed.is_empty() || !added.is_empty() {
            Self::attach(&client, &parts[0], &parts[1], removed, true)
                .await
                .map_err(|e| e.for_resource(id.clone()))?;
            Self::attach(&client, &parts[0], &parts[1], added, false)
                .await
                .map_err(|e| e.for_resource(id.clone()))?;
            reprovision(&client, &parts[0], &parts[1])
                .await
                .map_err(|e| e.for_resource(id.clone()))?;
        }

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
        let client = identity_center_client(provider, &current.attributes)?;

        let policy_ids = current.get_strings("policy_ids");
        Self::attach(&client, &parts[0], &parts[1], &policy_ids, true)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;
        reprovision(&client, &parts[0], &parts[1])
            .await
            .map_err(|e| e.for_resource(id.clone()))
    }
}

// =============================================================================
// Custom Policy
// =============================================================================

pub struct CustomPolicyAttachment;

#[async_trait]
impl ManagedResource for CustomPolicyAttachment {
    fn name(&self) -> &'static str {
        "identitycenter_custom_policy_attachment"
    }

    fn schema(&self) -> ResourceSchema {
        permission_set_attributes(ResourceSchema::new(self.name()))
            .with_description("Custom policy document attached to a permission set")
            .attribute(
                AttributeSchema::new("custom_policy", types::json_string())
                    .required()
                    .json_equivalent()
                    .with_description("Policy document in JSON"),
            )
    }

    fn identifier_format(&self) -> Option<&'static str> {
        Some(IDENTIFIER_FORMAT)
    }

    async fn create(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let client = identity_center_client(provider, &resource.attributes)?;
        let (instance_id, permission_set_id) =
            identifier_of(resource).map_err(|e| e.for_resource(resource.id.clone()))?;

        put_custom_policy(&client, &instance_id, &permission_set_id, resource)
            .await
            .map_err(|e| e.for_resource(resource.id.clone()))?;

        let identifier = format!("{}/{}", instance_id, permission_set_id);
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

        let path = path(CUSTOM_POLICY_PATH, &parts[0], &parts[1]);
        let response = match client.get(&path, &[]).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(State::not_found(id.clone())),
            Err(e) => {
                return Err(api_error("error retrieving permission set custom policy", e).for_resource(id.clone()));
            }
        };

        let Some(policy) = custom_policy_document(&response) else {
            return Ok(State::not_found(id.clone()));
        };

        let attributes = HashMap::from([
            ("region".to_string(), Value::from(provider.region_of(prior))),
            ("instance_id".to_string(), Value::from(parts[0].as_str())),
            ("permission_set_id".to_string(), Value::from(parts[1].as_str())),
            ("custom_policy".to_string(), Value::from(policy)),
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
        let parts = split_identifier(identifier, IDENTIFIER_FORMAT).map_err(|e| e.for_resource(id.clone()))?;
        let client = identity_center_client(provider, &to.attributes)?;

        put_custom_policy(&client, &parts[0], &parts[1], to)
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
        let parts = split_identifier(identifier, IDENTIFIER_FORMAT).map_err(|e| e.for_resource(id.clone()))?;
        let client = identity_center_client(provider, &current.attributes)?;

        let path = path(CUSTOM_POLICY_PATH, &parts[0], &parts[1]);
        match client.delete(&path).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => {
                return Err(api_error("error deleting permission set custom policy", e).for_resource(id.clone()));
            }
        }
        reprovision(&client, &parts[0], &parts[1])
            .await
            .map_err(|e| e.for_resource(id.clone()))
    }
}

async fn put_custom_policy(
    client: &ServiceClient,
    instance_id: &str,
    permission_set_id: &str,
    resource: &Resource,
) -> ProviderResult<()> {
    let document = required_str(resource, "custom_policy")?;
    let policy = parse_json_attr("custom_policy", document)?;

    let path = path(CUSTOM_POLICY_PATH, instance_id, permission_set_id);
    client
        .put(&path, Some(&json!({ "custom_policy": policy })))
        .await
        .map_err(|e| api_error("error attaching custom policy to permission set", e))?;
    reprovision(client, instance_id, permission_set_id).await
}

/// Custom policy of a response as a compact JSON string
///
/// The service returns the document either as an object or as an encoded
/// string; an empty document means no policy is attached.
fn custom_policy_document(response: &JsonValue) -> Option<String> {
    match response.get("custom_policy")? {
        JsonValue::String(s) if s.trim().is_empty() => None,
        JsonValue::String(s) => Some(normalize_json_string(s)),
        JsonValue::Object(o) if o.is_empty() => None,
        JsonValue::Null => None,
        other => Some(other.to_string()),
    }
}
