//! Identity Center data sources
//!
//! List queries fetch every page, then apply the optional filters locally.

use std::collections::HashMap;

use async_trait::async_trait;
use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::{Attributes, Resource, State, Value};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use serde_json::Value as JsonValue;

use super::{identity_center_client, identity_store_client, region_attribute, required_str, timestamp_field};
use crate::client::build_path;
use crate::error::api_error;
use crate::provider::HuaweiCloudProvider;
use crate::resources::DataSource;
use crate::utils::{path_search, search_str, search_value, set_attr};

/// Keep items whose `field` equals the filter attribute, when it is set
fn matches_filter(item: &JsonValue, resource: &Resource, filter: &str, field: &str) -> bool {
    match resource.get_non_empty_str(filter) {
        Some(wanted) => search_str(field, item) == Some(wanted),
        None => true,
    }
}

fn base_attributes(provider: &HuaweiCloudProvider, resource: &Resource) -> HashMap<String, Value> {
    let mut attributes = resource.attributes.clone();
    attributes.insert("region".to_string(), Value::from(provider.region_of(&resource.attributes)));
    attributes
}

fn string_filter(name: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::String)
}

// =============================================================================
// Instance
// =============================================================================

/// `identitycenter_instance` - the Identity Center instance of the account
pub struct Instance;

#[async_trait]
impl DataSource for Instance {
    fn name(&self) -> &'static str {
        "identitycenter_instance"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("Identity Center instance of the current account")
            .attribute(region_attribute())
            .attribute(AttributeSchema::new("id", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("identity_store_id", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("urn", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("alias", AttributeType::String).read_only())
    }

    async fn read(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let client = identity_center_client(provider, &resource.attributes)?;
        let response = client.get("v1/instances", &[]).await.map_err(|e| {
            api_error("error retrieving Identity Center instances", e).for_resource(resource.id.clone())
        })?;

        let instance = path_search("instances[0]", &response).ok_or_else(|| {
            ProviderError::new("Identity Center is not enabled, no instance found").for_resource(resource.id.clone())
        })?;

        let mut attributes = base_attributes(provider, resource);
        set_attr(&mut attributes, "id", search_value("instance_id", instance));
        set_attr(&mut attributes, "identity_store_id", search_value("identity_store_id", instance));
        set_attr(&mut attributes, "urn", search_value("instance_urn", instance));
        set_attr(&mut attributes, "alias", search_value("alias", instance));

        let identifier = search_str("instance_id", instance).unwrap_or_default().to_string();
        Ok(State::existing(resource.id.clone(), attributes).with_identifier(identifier))
    }
}

// =============================================================================
// Users
// =============================================================================

/// `identitycenter_users` - users of an identity store
pub struct Users;

#[async_trait]
impl DataSource for Users {
    fn name(&self) -> &'static str {
        "identitycenter_users"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("Users of an Identity Center identity store")
            .attribute(region_attribute())
            .attribute(AttributeSchema::new("identity_store_id", AttributeType::String).required())
            .attribute(string_filter("user_name"))
            .attribute(string_filter("display_name"))
            .attribute(
                AttributeSchema::new(
                    "users",
                    AttributeType::blocks(vec![
                        AttributeSchema::new("id", AttributeType::String),
                        AttributeSchema::new("user_name", AttributeType::String),
                        AttributeSchema::new("display_name", AttributeType::String),
                        AttributeSchema::new("family_name", AttributeType::String),
                        AttributeSchema::new("given_name", AttributeType::String),
                        AttributeSchema::new("email", AttributeType::String),
                        AttributeSchema::new("phone_number", AttributeType::String),
                        AttributeSchema::new("enabled", AttributeType::Bool),
                        AttributeSchema::new("created_at", AttributeType::String),
                    ]),
                )
                .read_only(),
            )
    }

    async fn read(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let store_id = required_str(resource, "identity_store_id").map_err(|e| e.for_resource(resource.id.clone()))?;
        let client = identity_store_client(provider, &resource.attributes)?;

        let path = build_path("v1/identity-stores/{identity_store_id}/users", &[("identity_store_id", store_id)]);
        let users = client
            .list_all_by_marker(&path, &[], "users")
            .await
            .map_err(|e| api_error("error retrieving Identity Center users", e).for_resource(resource.id.clone()))?;

        let users = users
            .iter()
            .filter(|u| matches_filter(u, resource, "user_name", "user_name"))
            .filter(|u| matches_filter(u, resource, "display_name", "display_name"))
            .map(|u| {
                let mut fields = HashMap::new();
                set_attr(&mut fields, "id", search_value("user_id", u));
                set_attr(&mut fields, "user_name", search_value("user_name", u));
                set_attr(&mut fields, "display_name", search_value("display_name", u));
                set_attr(&mut fields, "family_name", search_value("name.family_name", u));
                set_attr(&mut fields, "given_name", search_value("name.given_name", u));
                set_attr(&mut fields, "email", search_value("emails[0].email", u));
                set_attr(&mut fields, "phone_number", search_value("phone_numbers[0].phone_number", u));
                set_attr(&mut fields, "enabled", search_value("enabled", u));
                set_attr(&mut fields, "created_at", timestamp_field(u, "created_at"));
                Value::Map(fields)
            })
            .collect();

        let mut attributes = base_attributes(provider, resource);
        attributes.insert("users".to_string(), Value::List(users));
        Ok(State::existing(resource.id.clone(), attributes).with_identifier(store_id))
    }
}

// =============================================================================
// Groups
// =============================================================================

/// `identitycenter_groups` - groups of an identity store
pub struct Groups;

#[async_trait]
impl DataSource for Groups {
    fn name(&self) -> &'static str {
        "identitycenter_groups"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("Groups of an Identity Center identity store")
            .attribute(region_attribute())
            .attribute(AttributeSchema::new("identity_store_id", AttributeType::String).required())
            .attribute(string_filter("name"))
            .attribute(
                AttributeSchema::new(
                    "groups",
                    AttributeType::blocks(vec![
                        AttributeSchema::new("id", AttributeType::String),
                        AttributeSchema::new("name", AttributeType::String),
                        AttributeSchema::new("description", AttributeType::String),
                        AttributeSchema::new("created_at", AttributeType::String),
                        AttributeSchema::new("updated_at", AttributeType::String),
                    ]),
                )
                .read_only(),
            )
    }

    async fn read(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let store_id = required_str(resource, "identity_store_id").map_err(|e| e.for_resource(resource.id.clone()))?;
        let client = identity_store_client(provider, &resource.attributes)?;

        let path = build_path("v1/identity-stores/{identity_store_id}/groups", &[("identity_store_id", store_id)]);
        let groups = client
            .list_all_by_marker(&path, &[], "groups")
            .await
            .map_err(|e| api_error("error retrieving Identity Center groups", e).for_resource(resource.id.clone()))?;

        let groups = groups
            .iter()
            .filter(|g| matches_filter(g, resource, "name", "name"))
            .map(|g| {
                let mut fields = HashMap::new();
                set_attr(&mut fields, "id", search_value("group_id", g));
                set_attr(&mut fields, "name", search_value("name", g));
                set_attr(&mut fields, "description", search_value("description", g));
                set_attr(&mut fields, "created_at", timestamp_field(g, "created_at"));
                set_attr(&mut fields, "updated_at", timestamp_field(g, "updated_at"));
                Value::Map(fields)
            })
            .collect();

        let mut attributes = base_attributes(provider, resource);
        attributes.insert("groups".to_string(), Value::List(groups));
        Ok(State::existing(resource.id.clone(), attributes).with_identifier(store_id))
    }
}

// =============================================================================
// Permission Sets
// =============================================================================

/// `identitycenter_permission_sets` - permission sets of an instance
pub struct PermissionSets;

#[async_trait]
impl DataSource for PermissionSets {
    fn name(&self) -> &'static str {
        "identitycenter_permission_sets"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("Permission sets of an Identity Center instance")
            .attribute(region_attribute())
            .attribute(AttributeSchema::new("instance_id", AttributeType::String).required())
            .attribute(string_filter("permission_set_id"))
            .attribute(string_filter("name"))
            .attribute(
                AttributeSchema::new(
                    "permission_sets",
                    AttributeType::blocks(vec![
                        AttributeSchema::new("id", AttributeType::String),
                        AttributeSchema::new("name", AttributeType::String),
                        AttributeSchema::new("description", AttributeType::String),
                        AttributeSchema::new("session_duration", AttributeType::String),
                        AttributeSchema::new("relay_state", AttributeType::String),
                        AttributeSchema::new("urn", AttributeType::String),
                        AttributeSchema::new("created_at", AttributeType::String),
                    ]),
                )
                .read_only(),
            )
    }

    async fn read(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let instance_id = required_str(resource, "instance_id").map_err(|e| e.for_resource(resource.id.clone()))?;
        let client = identity_center_client(provider, &resource.attributes)?;

        let path = build_path("v1/instances/{instance_id}/permission-sets", &[("instance_id", instance_id)]);
        let permission_sets = client
            .list_all_by_marker(&path, &[], "permission_sets")
            .await
            .map_err(|e| {
                api_error("error retrieving Identity Center permission sets", e).for_resource(resource.id.clone())
            })?;

        let permission_sets = permission_sets
            .iter()
            .filter(|p| matches_filter(p, resource, "permission_set_id", "permission_set_id"))
            .filter(|p| matches_filter(p, resource, "name", "name"))
            .map(|p| {
                let mut fields = HashMap::new();
                set_attr(&mut fields, "id", search_value("permission_set_id", p));
                set_attr(&mut fields, "name", search_value("name", p));
                set_attr(&mut fields, "description", search_value("description", p));
                set_attr(&mut fields, "session_duration", search_value("session_duration", p));
                set_attr(&mut fields, "relay_state", search_value("relay_state", p));
                set_attr(&mut fields, "urn", search_value("permission_urn", p));
                set_attr(&mut fields, "created_at", timestamp_field(p, "created_date"));
                Value::Map(fields)
            })
            .collect();

        let mut attributes = base_attributes(provider, resource);
        attributes.insert("permission_sets".to_string(), Value::List(permission_sets));
        Ok(State::existing(resource.id.clone(), attributes).with_identifier(instance_id))
    }
}

// =============================================================================
// Permission Set Provisionings
// =============================================================================

/// `identitycenter_permission_set_provisionings` - provisioning requests of an instance
pub struct PermissionSetProvisionings;

#[async_trait]
impl DataSource for PermissionSetProvisionings {
    fn name(&self) -> &'static str {
        "identitycenter_permission_set_provisionings"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("Permission set provisioning requests of an Identity Center instance")
            .attribute(region_attribute())
            .attribute(AttributeSchema::new("instance_id", AttributeType::String).required())
            .attribute(string_filter("status").with_description("IN_PROGRESS, FAILED or SUCCEEDED"))
            .attribute(
                AttributeSchema::new(
                    "provisionings",
                    AttributeType::blocks(vec![
                        AttributeSchema::new("request_id", AttributeType::String),
                        AttributeSchema::new("status", AttributeType::String),
                        AttributeSchema::new("created_at", AttributeType::String),
                    ]),
                )
                .read_only(),
            )
    }

    async fn read(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let instance_id = required_str(resource, "instance_id").map_err(|e| e.for_resource(resource.id.clone()))?;
        let client = identity_center_client(provider, &resource.attributes)?;

        let path = build_path(
            "v1/instances/{instance_id}/permission-sets/provisioning-status",
            &[("instance_id", instance_id)],
        );
        let query: Vec<(&str, String)> = resource
            .get_non_empty_str("status")
            .map(|status| ("status", status.to_string()))
            .into_iter()
            .collect();
        let requests = client
            .list_all_by_marker(&path, &query, "permission_sets_provisioning_status")
            .await
            .map_err(|e| {
                api_error("error retrieving permission set provisioning requests", e).for_resource(resource.id.clone())
            })?;

        let provisionings = requests
            .iter()
            .filter(|r| matches_filter(r, resource, "status", "status"))
            .map(|r| {
                let mut fields = HashMap::new();
                set_attr(&mut fields, "request_id", search_value("request_id", r));
                set_attr(&mut fields, "status", search_value("status", r));
                set_attr(&mut fields, "created_at", timestamp_field(r, "created_date"));
                Value::Map(fields)
            })
            .collect();

        let mut attributes = base_attributes(provider, resource);
        attributes.insert("provisionings".to_string(), Value::List(provisionings));
        Ok(State::existing(resource.id.clone(), attributes).with_identifier(instance_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unset_filter_matches_everything() {
        let resource = Resource::new("identitycenter_users", "all").with_read_only(true);
        assert!(matches_filter(&json!({"user_name": "alice"}), &resource, "user_name", "user_name"));
    }

    #[test]
    fn filter_compares_field() {
        let resource = Resource::new("identitycenter_users", "alice")
            .with_read_only(true)
            .with_attribute("user_name", "alice");
        assert!(matches_filter(&json!({"user_name": "alice"}), &resource, "user_name", "user_name"));
        assert!(!matches_filter(&json!({"user_name": "bob"}), &resource, "user_name", "user_name"));
        assert!(!matches_filter(&json!({}), &resource, "user_name", "user_name"));
    }

    #[test]
    fn result_lists_are_read_only() {
        assert!(Users.schema().attributes["users"].read_only);
        assert!(Groups.schema().attributes["groups"].read_only);
        assert!(PermissionSets.schema().attributes["permission_sets"].read_only);
        assert!(PermissionSetProvisionings.schema().attributes["provisionings"].read_only);
    }
}
