//! identitycenter_user - Users of an Identity Center identity store

use std::collections::HashMap;

use async_trait::async_trait;
use cirrus_core::differ::AttributeChanges;
use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::{Attributes, Resource, ResourceId, State, Value};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use log::debug;
use serde_json::{Value as JsonValue, json};

use super::{identity_store_client, keep_prior, region_attribute, required_str, timestamp_field};
use crate::client::build_path;
use crate::error::{api_error, check_deleted};
use crate::provider::HuaweiCloudProvider;
use crate::resources::ManagedResource;
use crate::utils::{remove_nil, search_str, search_value, set_attr, split_identifier};

const USERS_PATH: &str = "v1/identity-stores/{identity_store_id}/users";
const USER_PATH: &str = "v1/identity-stores/{identity_store_id}/users/{user_id}";
const IDENTIFIER_FORMAT: &str = "<identity_store_id>/<user_id>";

/// Updatable attributes and the key the update API knows them by
const ATTRIBUTE_KEYS: &[(&str, &str)] = &[
    ("family_name", "name.family_name"),
    ("given_name", "name.given_name"),
    ("display_name", "display_name"),
    ("email", "emails"),
    ("phone_number", "phone_numbers"),
];

pub struct User;

#[async_trait]
impl ManagedResource for User {
    fn name(&self) -> &'static str {
        "identitycenter_user"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("Identity Center user")
            .attribute(region_attribute())
            .attribute(
                AttributeSchema::new("identity_store_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("user_name", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("password_mode", types::string_in(&["OTP", "DISABLE"]))
                    .force_new()
                    .with_default("OTP")
                    .with_description("How the initial password is delivered"),
            )
            .attribute(AttributeSchema::new("family_name", AttributeType::String).required())
            .attribute(AttributeSchema::new("given_name", AttributeType::String).required())
            .attribute(AttributeSchema::new("display_name", AttributeType::String).required())
            .attribute(AttributeSchema::new("email", AttributeType::String).required())
            .attribute(AttributeSchema::new("phone_number", AttributeType::String))
            .attribute(AttributeSchema::new("created_at", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("updated_at", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("enabled", AttributeType::Bool).read_only())
    }

    fn identifier_format(&self) -> Option<&'static str> {
        Some(IDENTIFIER_FORMAT)
    }

    async fn create(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let client = identity_store_client(provider, &resource.attributes)?;
        let store_id = required_str(resource, "identity_store_id").map_err(|e| e.for_resource(resource.id.clone()))?;

        let path = build_path(USERS_PATH, &[("identity_store_id", store_id)]);
        let body = create_body(resource);
        let response = client
            .post(&path, Some(&body))
            .await
            .map_err(|e| api_error("error creating Identity Center user", e).for_resource(resource.id.clone()))?;

        let user_id = search_str("user_id", &response)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ProviderError::new("unable to find the Identity Center user ID from the API response")
                    .for_resource(resource.id.clone())
            })?;

        let identifier = format!("{}/{}", store_id, user_id);
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
        let client = identity_store_client(provider, prior)?;

        let path = user_path(&parts);
        let user = match client.get(&path, &[]).await {
            Ok(user) => user,
            Err(e) => return check_deleted(id, e, "error retrieving Identity Center user"),
        };

        let mut attributes = HashMap::new();
        attributes.insert("region".to_string(), Value::from(provider.region_of(prior)));
        attributes.insert("identity_store_id".to_string(), Value::from(parts[0].as_str()));
        set_attr(&mut attributes, "user_name", search_value("user_name", &user));
        set_attr(&mut attributes, "family_name", search_value("name.family_name", &user));
        set_attr(&mut attributes, "given_name", search_value("name.given_name", &user));
        set_attr(&mut attributes, "display_name", search_value("display_name", &user));
        set_attr(&mut attributes, "email", search_value("emails[0].email", &user));
        set_attr(&mut attributes, "phone_number", search_value("phone_numbers[0].phone_number", &user));
        set_attr(&mut attributes, "created_at", timestamp_field(&user, "created_at"));
        set_attr(&mut attributes, "updated_at", timestamp_field(&user, "updated_at"));
        set_attr(&mut attributes, "enabled", search_value("enabled", &user));
        keep_prior(&mut attributes, prior, &["password_mode"]);

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
        let changes = AttributeChanges::between(&self.schema(), &from.attributes, &to.attributes);

        let operations = attribute_operations(&changes, to);
        if !operations.is_empty() {
            let client = identity_store_client(provider, &to.attributes)?;
            let path = user_path(&parts);
            debug!("updating user {} attributes: {:?}", parts[1], changes.changed());
            client
                .put(&path, Some(&json!({ "attribute_operations": operations })))
                .await
                .map_err(|e| api_error("error updating Identity Center user", e).for_resource(id.clone()))?;
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
        let client = identity_store_client(provider, &current.attributes)?;

        let path = user_path(&parts);
        match client.delete(&path).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(api_error("error deleting Identity Center user", e).for_resource(id.clone())),
        }
    }
}

fn user_path(parts: &[String]) -> String {
    build_path(USER_PATH, &[("identity_store_id", parts[0].as_str()), ("user_id", parts[1].as_str())])
}

fn create_body(resource: &Resource) -> JsonValue {
    let mut body = json!({
        "user_name": resource.get_str("user_name"),
        "password_mode": resource.get_str("password_mode"),
        "display_name": resource.get_str("display_name"),
        "name": {
            "family_name": resource.get_str("family_name"),
            "given_name": resource.get_str("given_name"),
        },
    });
    if let Some(email) = resource.get_non_empty_str("email") {
        body["emails"] = json!([{ "email": email, "primary": true }]);
    }
    if let Some(phone) = resource.get_non_empty_str("phone_number") {
        body["phone_numbers"] = json!([{ "phone_number": phone, "primary": true }]);
    }
    remove_nil(body)
}

/// One operation per changed attribute
fn attribute_operations(changes: &AttributeChanges, to: &Resource) -> Vec<JsonValue> {
    ATTRIBUTE_KEYS
        .iter()
        .filter(|(name, _)| changes.has_change(name))
        .map(|(name, key)| {
            let value = to.get_non_empty_str(name);
            let value = match (*name, value) {
                // Removing the only address clears the list
                ("email" | "phone_number", None) => json!([]),
                ("email", Some(email)) => json!([{ "email": email, "primary": true }]),
                ("phone_number", Some(phone)) => json!([{ "phone_number": phone, "primary": true }]),
                (_, value) => json!(value.unwrap_or_default()),
            };
            json!({ "attribute_key": key, "attribute_value": value })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource() -> Resource {
        Resource::new("identitycenter_user", "alice")
            .with_attribute("identity_store_id", "store-1")
            .with_attribute("user_name", "alice")
            .with_attribute("password_mode", "OTP")
            .with_attribute("family_name", "Liddell")
            .with_attribute("given_name", "Alice")
            .with_attribute("display_name", "Alice L")
            .with_attribute("email", "alice@example.com")
    }

    #[test]
    fn create_body_nests_name_and_email() {
        let body = create_body(&resource());
        assert_eq!(
            body,
            json!({
                "user_name": "alice",
                "password_mode": "OTP",
                "display_name": "Alice L",
                "name": {"family_name": "Liddell", "given_name": "Alice"},
                "emails": [{"email": "alice@example.com", "primary": true}],
            })
        );
    }

    #[test]
    fn only_changed_attributes_are_sent() {
        let from = State::existing(resource().id, resource().attributes);
        let to = resource()
            .with_attribute("display_name", "Alice Liddell")
            .with_attribute("email", "alice@corp.example.com");

        let changes = AttributeChanges::between(&User.schema(), &from.attributes, &to.attributes);
        let operations = attribute_operations(&changes, &to);

        assert_eq!(
            operations,
            vec![
                json!({"attribute_key": "display_name", "attribute_value": "Alice Liddell"}),
                json!({
                    "attribute_key": "emails",
                    "attribute_value": [{"email": "alice@corp.example.com", "primary": true}],
                }),
            ]
        );
    }

    #[test]
    fn removed_phone_number_clears_the_list() {
        let current = resource().with_attribute("phone_number", "+86-13800000000");
        let from = State::existing(current.id.clone(), current.attributes);
        let to = resource();

        let changes = AttributeChanges::between(&User.schema(), &from.attributes, &to.attributes);
        assert_eq!(
            attribute_operations(&changes, &to),
            vec![json!({"attribute_key": "phone_numbers", "attribute_value": []})]
        );
    }

    #[test]
    fn schema_defaults_password_mode() {
        let schema = User.schema();
        let mut attributes = resource().attributes;
        attributes.remove("password_mode");
        schema.apply_defaults(&mut attributes);
        assert_eq!(attributes.get_str("password_mode"), Some("OTP"));
    }
}
