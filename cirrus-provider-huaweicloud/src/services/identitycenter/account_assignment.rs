//! identitycenter_account_assignment - Grant a user or group a permission set
//! on an account

use std::collections::HashMap;

use async_trait::async_trait;
use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::{Attributes, Resource, ResourceId, State, Value};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use serde_json::{Value as JsonValue, json};

use super::{
    AssignmentOperation, identity_center_client, region_attribute, required_str, wait_account_assignment,
};
use crate::client::{ServiceClient, build_path};
use crate::error::api_error;
use crate::provider::HuaweiCloudProvider;
use crate::resources::ManagedResource;
use crate::utils::{search_str, split_identifier};

const ASSIGNMENTS_PATH: &str = "v1/instances/{instance_id}/account-assignments";
const CREATE_PATH: &str = "v1/instances/{instance_id}/account-assignments/create";
const DELETE_PATH: &str = "v1/instances/{instance_id}/account-assignments/delete";
const IDENTIFIER_FORMAT: &str = "<instance_id>/<permission_set_id>/<target_id>/<principal_type>/<principal_id>";

pub struct AccountAssignment;

/// Fields identifying one assignment
#[derive(Debug, Clone, PartialEq)]
struct Assignment {
    instance_id: String,
    permission_set_id: String,
    target_id: String,
    target_type: String,
    principal_type: String,
    principal_id: String,
}

impl Assignment {
    fn from_identifier(identifier: &str, target_type: &str) -> ProviderResult<Self> {
        let mut parts = split_identifier(identifier, IDENTIFIER_FORMAT)?.into_iter();
        let mut next = || parts.next().unwrap_or_default();
        Ok(Self {
            instance_id: next(),
            permission_set_id: next(),
            target_id: next(),
            principal_type: next(),
            principal_id: next(),
            target_type: target_type.to_string(),
        })
    }

    fn from_resource(resource: &Resource) -> ProviderResult<Self> {
        let field = |key: &str| required_str(resource, key).map(str::to_string);
        Ok(Self {
            instance_id: field("instance_id")?,
            permission_set_id: field("permission_set_id")?,
            target_id: field("target_id")?,
            target_type: field("target_type")?,
            principal_type: field("principal_type")?,
            principal_id: field("principal_id")?,
        })
    }

    fn identifier(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.instance_id, self.permission_set_id, self.target_id, self.principal_type, self.principal_id
        )
    }

    fn body(&self) -> JsonValue {
        json!({
            "permission_set_id": self.permission_set_id,
            "principal_id": self.principal_id,
            "principal_type": self.principal_type,
            "target_id": self.target_id,
            "target_type": self.target_type,
        })
    }

    fn matches(&self, item: &JsonValue) -> bool {
        search_str("principal_type", item) == Some(self.principal_type.as_str())
            && search_str("principal_id", item) == Some(self.principal_id.as_str())
    }

    /// Send a create or delete request and wait for it to finish
    async fn submit(&self, client: &ServiceClient, operation: AssignmentOperation) -> ProviderResult<()> {
        let (template, action) = match operation {
            AssignmentOperation::Creation => (CREATE_PATH, "error creating Identity Center account assignment"),
            AssignmentOperation::Deletion => (DELETE_PATH, "error deleting Identity Center account assignment"),
        };
        let path = build_path(template, &[("instance_id", self.instance_id.as_str())]);
        let response = client
            .post(&path, Some(&self.body()))
            .await
            .map_err(|e| api_error(action, e))?;

        let request_id = search_str(&format!("{}.request_id", operation.status_key()), &response)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::new(format!("{}: request ID not found in the API response", action)))?;

        wait_account_assignment(client, &self.instance_id, request_id, operation).await?;
        Ok(())
    }
}

#[async_trait]
impl ManagedResource for AccountAssignment {
    fn name(&self) -> &'static str {
        "identitycenter_account_assignment"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("Assignment of a permission set to a user or group on an account")
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
            .attribute(
                AttributeSchema::new("target_id", AttributeType::String)
                    .required()
                    .force_new()
                    .with_description("Account ID"),
            )
            .attribute(
                AttributeSchema::new("target_type", types::string_in(&["ACCOUNT"]))
                    .force_new()
                    .with_default("ACCOUNT"),
            )
            .attribute(
                AttributeSchema::new("principal_type", types::string_in(&["USER", "GROUP"]))
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("principal_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
    }

    fn identifier_format(&self) -> Option<&'static str> {
        Some(IDENTIFIER_FORMAT)
    }

    async fn create(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let client = identity_center_client(provider, &resource.attributes)?;
        let assignment = Assignment::from_resource(resource).map_err(|e| e.for_resource(resource.id.clone()))?;

        assignment
            .submit(&client, AssignmentOperation::Creation)
            .await
            .map_err(|e| e.for_resource(resource.id.clone()))?;

        self.read(provider, &resource.id, &assignment.identifier(), &resource.attributes)
            .await
    }

    async fn read(
        &self,
        provider: &HuaweiCloudProvider,
        id: &ResourceId,
        identifier: &str,
        prior: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let target_type = prior.get_non_empty_str("target_type").unwrap_or("ACCOUNT");
        let assignment =
            Assignment::from_identifier(identifier, target_type).map_err(|e| e.for_resource(id.clone()))?;
        let client = identity_center_client(provider, prior)?;

        let path = build_path(ASSIGNMENTS_PATH, &[("instance_id", assignment.instance_id.as_str())]);
        let query = [
            ("account_id", assignment.target_id.clone()),
            ("permission_set_id", assignment.permission_set_id.clone()),
        ];
        let items = match client.list_all_by_marker(&path, &query, "account_assignments").await {
            Ok(items) => items,
            Err(e) if e.is_not_found() => return Ok(State::not_found(id.clone())),
            Err(e) => {
                return Err(api_error("error retrieving Identity Center account assignments", e)
                    .for_resource(id.clone()));
            }
        };

        if !items.iter().any(|item| assignment.matches(item)) {
            return Ok(State::not_found(id.clone()));
        }

        let attributes = HashMap::from([
            ("region".to_string(), Value::from(provider.region_of(prior))),
            ("instance_id".to_string(), Value::from(assignment.instance_id.clone())),
            ("permission_set_id".to_string(), Value::from(assignment.permission_set_id.clone())),
            ("target_id".to_string(), Value::from(assignment.target_id.clone())),
            ("target_type".to_string(), Value::from(assignment.target_type.clone())),
            ("principal_type".to_string(), Value::from(assignment.principal_type.clone())),
            ("principal_id".to_string(), Value::from(assignment.principal_id.clone())),
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
        self.read(provider, id, identifier, &to.attributes).await
    }

    async fn delete(
        &self,
        provider: &HuaweiCloudProvider,
        id: &ResourceId,
        identifier: &str,
        current: &State,
    ) -> ProviderResult<()> {
        let target_type = current.get_non_empty_str("target_type").unwrap_or("ACCOUNT");
        let assignment =
            Assignment::from_identifier(identifier, target_type).map_err(|e| e.for_resource(id.clone()))?;
        let client = identity_center_client(provider, &current.attributes)?;

        assignment
            .submit(&client, AssignmentOperation::Deletion)
            .await
            .map_err(|e| e.for_resource(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_round_trips_through_parts() {
        let assignment = Assignment::from_identifier("ins-1/ps-1/acct-1/USER/user-1", "ACCOUNT").unwrap();
        assert_eq!(assignment.principal_type, "USER");
        assert_eq!(assignment.identifier(), "ins-1/ps-1/acct-1/USER/user-1");
        assert!(Assignment::from_identifier("ins-1/ps-1/acct-1", "ACCOUNT").is_err());
    }

    #[test]
    fn matches_principal() {
        let assignment = Assignment::from_identifier("ins-1/ps-1/acct-1/GROUP/grp-1", "ACCOUNT").unwrap();
        assert!(assignment.matches(&json!({"principal_type": "GROUP", "principal_id": "grp-1"})));
        assert!(!assignment.matches(&json!({"principal_type": "USER", "principal_id": "grp-1"})));
    }

    #[test]
    fn request_body_names_target() {
        let resource = Resource::new("identitycenter_account_assignment", "a")
            .with_attribute("instance_id", "ins-1")
            .with_attribute("permission_set_id", "ps-1")
            .with_attribute("target_id", "acct-1")
            .with_attribute("target_type", "ACCOUNT")
            .with_attribute("principal_type", "USER")
            .with_attribute("principal_id", "user-1");

        let body = Assignment::from_resource(&resource).unwrap().body();
        assert_eq!(body["target_type"], "ACCOUNT");
        assert_eq!(body["principal_id"], "user-1");
    }
}
