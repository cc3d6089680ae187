//! identitycenter_application_instance - SAML applications of an Identity
//! Center instance
//!
//! The application is created from a template, then each optional
//! sub-configuration is applied through its own API call.

use std::collections::HashMap;

use async_trait::async_trait;
use cirrus_core::differ::AttributeChanges;
use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::{Attributes, Resource, ResourceId, State, Value};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use log::debug;
use reqwest::Method;
use serde_json::{Value as JsonValue, json};

use super::{
    flatten_security_config, flatten_service_provider_config, identity_center_client, region_attribute,
    required_str, timestamp_field,
};
use crate::client::{ServiceClient, build_path};
use crate::error::{api_error, check_deleted};
use crate::provider::HuaweiCloudProvider;
use crate::resources::ManagedResource;
use crate::utils::{
    marshal_json, parse_json_attr, path_search, pick_fields, remove_nil, search_str, search_value, set_attr,
    split_identifier,
};

const APPLICATIONS_PATH: &str = "v1/instances/{instance_id}/application-instances";
const APPLICATION_PATH: &str = "v1/instances/{instance_id}/application-instances/{application_instance_id}";
const IDENTIFIER_FORMAT: &str = "<instance_id>/<application_instance_id>";

pub struct ApplicationInstance;

/// Optional sub-configurations, in the order they are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubConfig {
    DisplayData,
    Metadata,
    Status,
    Security,
    Response,
    ResponseSchema,
    ServiceProvider,
}

impl SubConfig {
    const ALL: [SubConfig; 7] = [
        SubConfig::DisplayData,
        SubConfig::Metadata,
        SubConfig::Status,
        SubConfig::Security,
        SubConfig::Response,
        SubConfig::ResponseSchema,
        SubConfig::ServiceProvider,
    ];

    fn attributes(self) -> &'static [&'static str] {
        match self {
            SubConfig::DisplayData => &["display_name", "description"],
            SubConfig::Metadata => &["metadata"],
            SubConfig::Status => &["status"],
            SubConfig::Security => &["security_config"],
            SubConfig::Response => &["response_config"],
            SubConfig::ResponseSchema => &["response_schema_config"],
            SubConfig::ServiceProvider => &["service_provider_config"],
        }
    }

    fn method(self) -> Method {
        match self {
            SubConfig::Metadata => Method::POST,
            _ => Method::PUT,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            SubConfig::DisplayData => "display-data",
            SubConfig::Metadata => "metadata",
            SubConfig::Status => "status",
            SubConfig::Security => "security-configuration",
            SubConfig::Response => "response-configuration",
            SubConfig::ResponseSchema => "response-schema-configuration",
            SubConfig::ServiceProvider => "service-provider-configuration",
        }
    }

    fn action(self) -> &'static str {
        match self {
            SubConfig::DisplayData => "error updating IdentityCenter application instance display data",
            SubConfig::Metadata => "error importing IdentityCenter application instance metadata",
            SubConfig::Status => "error updating IdentityCenter application instance status",
            SubConfig::Security => "error updating IdentityCenter application instance security configuration",
            SubConfig::Response => "error updating IdentityCenter application instance response configuration",
            SubConfig::ResponseSchema => {
                "error updating IdentityCenter application instance response schema configuration"
            }
            SubConfig::ServiceProvider => {
                "error updating IdentityCenter application instance service provider configuration"
            }
        }
    }

    /// Whether the configuration sets this part at creation
    fn is_configured(self, resource: &Resource) -> bool {
        match self {
            // Display data needs both fields
            SubConfig::DisplayData => self
                .attributes()
                .iter()
                .all(|key| resource.get_non_empty_str(key).is_some()),
            _ => self
                .attributes()
                .iter()
                .any(|key| resource.get_value(key).is_some_and(|v| !v.is_empty())),
        }
    }

    /// Request body, or `None` when a block is absent and there is nothing to send
    fn body(self, resource: &Resource) -> ProviderResult<Option<JsonValue>> {
        let body = match self {
            SubConfig::DisplayData => json!({
                "display_name": resource.get_non_empty_str("display_name"),
                "description": resource.get_non_empty_str("description"),
            }),
            SubConfig::Metadata => json!({ "metadata": resource.get_non_empty_str("metadata") }),
            SubConfig::Status => json!({ "status": resource.get_non_empty_str("status") }),
            SubConfig::Security => {
                let Some(config) = resource.first_block("security_config") else {
                    return Ok(None);
                };
                json!({ "security_config": { "ttl": config.get_non_empty_str("ttl") } })
            }
            SubConfig::Response => json!({ "response_config": json_attr(resource, "response_config")? }),
            SubConfig::ResponseSchema => {
                json!({ "response_schema_config": json_attr(resource, "response_schema_config")? })
            }
            SubConfig::ServiceProvider => {
                let Some(config) = resource.first_block("service_provider_config") else {
                    return Ok(None);
                };
                json!({ "service_provider_config": service_provider_body(config) })
            }
        };
        Ok(Some(remove_nil(body)))
    }

    async fn apply(
        self,
        client: &ServiceClient,
        instance_id: &str,
        application_id: &str,
        resource: &Resource,
    ) -> ProviderResult<()> {
        let Some(body) = self.body(resource)? else {
            debug!("no {} to apply to application instance {}", self.suffix(), application_id);
            return Ok(());
        };
        let path = format!("{}/{}", application_path(instance_id, application_id), self.suffix());
        debug!("applying {} to application instance {}", self.suffix(), application_id);

        client
            .request(self.method(), &path, &[], Some(&body))
            .await
            .map_err(|e| api_error(self.action(), e))?;
        Ok(())
    }
}

/// Parsed JSON document of a string attribute; empty strings are omitted
fn json_attr(resource: &Resource, key: &str) -> ProviderResult<Option<JsonValue>> {
    resource
        .get_non_empty_str(key)
        .map(|document| parse_json_attr(key, document))
        .transpose()
}

fn service_provider_body(config: &HashMap<String, Value>) -> JsonValue {
    let consumers: Vec<JsonValue> = config
        .get_blocks("consumers")
        .first()
        .map(|consumer| {
            json!({
                "location": consumer.get_non_empty_str("location"),
                "binding": consumer.get_non_empty_str("binding"),
                "default_value": consumer.get_bool("default_value"),
            })
        })
        .into_iter()
        .collect();

    json!({
        "audience": config.get_non_empty_str("audience"),
        "require_request_signature": config.get_bool("require_request_signature"),
        "consumers": consumers,
        "start_url": config.get_non_empty_str("start_url"),
    })
}

fn application_path(instance_id: &str, application_id: &str) -> String {
    build_path(
        APPLICATION_PATH,
        &[("instance_id", instance_id), ("application_instance_id", application_id)],
    )
}

#[async_trait]
impl ManagedResource for ApplicationInstance {
    fn name(&self) -> &'static str {
        "identitycenter_application_instance"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
            .with_description("Identity Center application instance")
            .attribute(region_attribute())
            .attribute(
                AttributeSchema::new("instance_id", AttributeType::String)
                    .required()
                    .non_updatable(),
            )
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .non_updatable(),
            )
            .attribute(
                AttributeSchema::new("template_id", AttributeType::String)
                    .required()
                    .non_updatable()
                    .with_description("ID of the application template"),
            )
            .attribute(
                AttributeSchema::new("enable_force_new", types::bool_string())
                    .with_description("Replace the resource when a non-updatable attribute changes"),
            )
            .attribute(
                AttributeSchema::new("description", AttributeType::String)
                    .computed()
                    .required_with(&["display_name"]),
            )
            .attribute(
                AttributeSchema::new("display_name", AttributeType::String)
                    .computed()
                    .required_with(&["description"]),
            )
            .attribute(
                AttributeSchema::new("metadata", AttributeType::String)
                    .with_description("SAML metadata document of the application"),
            )
            .attribute(AttributeSchema::new("status", AttributeType::String).computed())
            .attribute(
                AttributeSchema::new("response_config", types::json_string())
                    .computed()
                    .json_equivalent(),
            )
            .attribute(
                AttributeSchema::new("response_schema_config", types::json_string())
                    .computed()
                    .json_equivalent(),
            )
            .attribute(
                AttributeSchema::new(
                    "security_config",
                    AttributeType::blocks(vec![AttributeSchema::new("ttl", AttributeType::String)]),
                )
                .computed()
                .max_items(1),
            )
            .attribute(
                AttributeSchema::new(
                    "service_provider_config",
                    AttributeType::blocks(vec![
                        AttributeSchema::new("audience", AttributeType::String),
                        AttributeSchema::new("require_request_signature", AttributeType::Bool),
                        AttributeSchema::new(
                            "consumers",
                            AttributeType::blocks(vec![
                                AttributeSchema::new("location", AttributeType::String),
                                AttributeSchema::new("binding", AttributeType::String),
                                AttributeSchema::new("default_value", AttributeType::Bool),
                            ]),
                        ),
                        AttributeSchema::new("start_url", AttributeType::String),
                    ]),
                )
                .computed()
                .max_items(1),
            )
            .attribute(
                AttributeSchema::new(
                    "identity_provider_config",
                    AttributeType::blocks(vec![
                        AttributeSchema::new("issuer_url", AttributeType::String),
                        AttributeSchema::new("metadata_url", AttributeType::String),
                        AttributeSchema::new("remote_login_url", AttributeType::String),
                        AttributeSchema::new("remote_logout_url", AttributeType::String),
                    ]),
                )
                .read_only(),
            )
            .attribute(
                AttributeSchema::new(
                    "active_certificate",
                    AttributeType::blocks(vec![
                        AttributeSchema::new("algorithm", AttributeType::String),
                        AttributeSchema::new("certificate", AttributeType::String),
                        AttributeSchema::new("certificate_id", AttributeType::String),
                        AttributeSchema::new("status", AttributeType::String),
                        AttributeSchema::new("key_size", AttributeType::String),
                        AttributeSchema::new("expiry_date", AttributeType::String),
                        AttributeSchema::new("issue_date", AttributeType::String),
                    ]),
                )
                .read_only(),
            )
            .attribute(AttributeSchema::new("visible", AttributeType::Bool).read_only())
            .attribute(AttributeSchema::new("client_id", AttributeType::String).read_only())
            .attribute(AttributeSchema::new("end_user_visible", AttributeType::Bool).read_only())
            .attribute(AttributeSchema::new("managed_account", AttributeType::String).read_only())
    }

    fn identifier_format(&self) -> Option<&'static str> {
        Some(IDENTIFIER_FORMAT)
    }

    async fn create(&self, provider: &HuaweiCloudProvider, resource: &Resource) -> ProviderResult<State> {
        let client = identity_center_client(provider, &resource.attributes)?;
        let instance_id = required_str(resource, "instance_id").map_err(|e| e.for_resource(resource.id.clone()))?;

        let path = build_path(APPLICATIONS_PATH, &[("instance_id", instance_id)]);
        let body = json!({
            "name": resource.get_non_empty_str("name"),
            "template_id": resource.get_non_empty_str("template_id"),
        });
        let response = client
            .post(&path, Some(&remove_nil(body)))
            .await
            .map_err(|e| {
                api_error("error creating Identity Center application instance", e).for_resource(resource.id.clone())
            })?;

        let application_id = search_str("application_instance.application_instance_id", &response)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ProviderError::new("unable to find the Identity Center application instance ID from the API response")
                    .for_resource(resource.id.clone())
            })?;

        for part in SubConfig::ALL {
            if part.is_configured(resource) {
                part.apply(&client, instance_id, application_id, resource)
                    .await
                    .map_err(|e| e.for_resource(resource.id.clone()))?;
            }
        }

        let identifier = format!("{}/{}", instance_id, application_id);
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

        let response = match client.get(&application_path(&parts[0], &parts[1]), &[]).await {
            Ok(response) => response,
            Err(e) => return check_deleted(id, e, "error retrieving Identity Center application instance"),
        };
        let Some(application) = path_search("application_instance", &response) else {
            return Ok(State::not_found(id.clone()));
        };

        let mut attributes = application_attributes(application);
        attributes.insert("region".to_string(), Value::from(provider.region_of(prior)));
        attributes.insert("instance_id".to_string(), Value::from(parts[0].as_str()));
        // Not returned by the API
        for key in ["template_id", "metadata", "enable_force_new"] {
            if let Some(value) = prior.get(key) {
                attributes.insert(key.to_string(), value.clone());
            }
        }

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
        let changes = AttributeChanges::between(&self.schema(), &from.attributes, &to.attributes);

        for part in SubConfig::ALL {
            if changes.has_any(part.attributes()) {
                part.apply(&client, &parts[0], &parts[1], to)
                    .await
                    .map_err(|e| e.for_resource(id.clone()))?;
            }
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

        match client.delete(&application_path(&parts[0], &parts[1])).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(api_error("error deleting IdentityCenter application instance", e).for_resource(id.clone())),
        }
    }
}

/// Attributes of an `application_instance` response object
fn application_attributes(application: &JsonValue) -> HashMap<String, Value> {
    let mut attributes = pick_fields(
        application,
        &["name", "status", "visible", "client_id", "end_user_visible", "managed_account"],
    );
    set_attr(&mut attributes, "display_name", search_value("display.display_name", application));
    set_attr(&mut attributes, "description", search_value("display.description", application));
    set_attr(
        &mut attributes,
        "active_certificate",
        flatten_active_certificate(application.get("active_certificate")),
    );
    set_attr(
        &mut attributes,
        "identity_provider_config",
        flatten_block(
            application.get("identity_provider_config"),
            &["issuer_url", "metadata_url", "remote_login_url", "remote_logout_url"],
        ),
    );
    set_attr(
        &mut attributes,
        "security_config",
        flatten_security_config(application.get("security_config")),
    );
    set_attr(
        &mut attributes,
        "service_provider_config",
        flatten_service_provider_config(application.get("service_provider_config")),
    );
    set_attr(&mut attributes, "response_config", marshal_json(application.get("response_config")));
    set_attr(
        &mut attributes,
        "response_schema_config",
        marshal_json(application.get("response_schema_config")),
    );
    attributes
}

fn flatten_block(value: Option<&JsonValue>, keys: &[&str]) -> Option<Value> {
    let object = value.filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))?;
    Some(Value::block(pick_fields(object, keys)))
}

/// Certificate block with millisecond dates rendered as RFC 3339
fn flatten_active_certificate(value: Option<&JsonValue>) -> Option<Value> {
    let certificate = value.filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))?;
    let mut fields = pick_fields(certificate, &["algorithm", "certificate", "certificate_id", "status"]);
    if let Some(key_size) = certificate.get("key_size").and_then(Value::from_json) {
        // Numeric in responses, string in the schema
        let key_size = match key_size {
            Value::Int(n) => Value::String(n.to_string()),
            other => other,
        };
        fields.insert("key_size".to_string(), key_size);
    }
    set_attr(&mut fields, "expiry_date", timestamp_field(certificate, "expiry_date"));
    set_attr(&mut fields, "issue_date", timestamp_field(certificate, "issue_date"));
    Some(Value::block(fields))
}
