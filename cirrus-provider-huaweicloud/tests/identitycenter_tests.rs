//! Identity Center resources against a mock API

mod common;

use std::collections::HashMap;

use cirrus_core::provider::Provider;
use cirrus_core::resource::{Attributes, Resource, ResourceId, State, Value};
use common::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USERS_PATH: &str = "/v1/identity-stores/d-1/users";
const USER_PATH: &str = "/v1/identity-stores/d-1/users/u-1";

fn user_json() -> serde_json::Value {
    json!({
        "user_id": "u-1",
        "user_name": "alice",
        "display_name": "Alice",
        "name": {"family_name": "Liddell", "given_name": "Alice"},
        "emails": [{"email": "alice@example.com", "primary": true}],
        "enabled": true,
        "created_at": 1700000000000_i64,
    })
}

#[tokio::test]
async fn user_lifecycle() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(USERS_PATH))
        .and(body_partial_json(json!({
            "user_name": "alice",
            "display_name": "Alice",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user_id": "u-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(USER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(USER_PATH))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let resource = Resource::new("identitycenter_user", "alice")
        .with_attribute("identity_store_id", "d-1")
        .with_attribute("user_name", "alice")
        .with_attribute("family_name", "Liddell")
        .with_attribute("given_name", "Alice")
        .with_attribute("display_name", "Alice")
        .with_attribute("email", "alice@example.com");

    let provider = provider(&server);
    let state = provider.create(&resource).await.unwrap();

    assert_eq!(state.identifier.as_deref(), Some("d-1/u-1"));
    assert_eq!(state.get_str("email"), Some("alice@example.com"));
    assert_eq!(state.get_str("family_name"), Some("Liddell"));
    assert_eq!(state.get_str("password_mode"), Some("OTP"));
    assert_eq!(state.get_bool("enabled"), Some(true));
    assert_eq!(state.get_str("created_at"), Some("2023-11-14T22:13:20+00:00"));

    provider.delete(&state.id, "d-1/u-1", &state).await.unwrap();
}

#[tokio::test]
async fn deleted_user_reads_as_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(USER_PATH))
        .respond_with(api_error(404, "IdentityStore.1004", "user not found"))
        .mount(&server)
        .await;

    let id = ResourceId::new("identitycenter_user", "alice");
    let state = provider(&server).read(&id, Some("d-1/u-1")).await.unwrap();
    assert!(!state.exists);
}

#[tokio::test]
async fn import_rejects_malformed_identifier() {
    let server = MockServer::start().await;
    let id = ResourceId::new("identitycenter_user", "alice");

    let err = provider(&server).import(&id, "u-1").await.unwrap_err();
    assert!(err.message.contains("invalid format specified for identifier"));
}

#[tokio::test]
async fn api_errors_carry_code_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/identity-stores/d-1/groups"))
        .respond_with(api_error(400, "IdentityStore.1002", "group name already exists"))
        .mount(&server)
        .await;

    let resource = Resource::new("identitycenter_group", "ops")
        .with_attribute("identity_store_id", "d-1")
        .with_attribute("name", "ops");
    let err = provider(&server).create(&resource).await.unwrap_err();

    assert!(err.message.starts_with("error creating Identity Center group"));
    assert!(err.message.contains("IdentityStore.1002"));
    assert!(err.message.contains("group name already exists"));
}

#[tokio::test]
async fn instance_data_source_reads_first_instance() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/instances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "instances": [{
                "instance_id": "ins-1",
                "identity_store_id": "d-1",
                "instance_urn": "IdentityCenter::domain-1:instance:ins-1",
                "alias": "corp",
            }]
        })))
        .mount(&server)
        .await;

    let query = Resource::new("identitycenter_instance", "this").with_read_only(true);
    let state = provider(&server).read_data_source(&query).await.unwrap();

    assert_eq!(state.identifier.as_deref(), Some("ins-1"));
    assert_eq!(state.get_str("identity_store_id"), Some("d-1"));
    assert_eq!(state.get_str("alias"), Some("corp"));
}

#[tokio::test]
async fn instance_data_source_requires_enabled_service() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/instances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"instances": []})))
        .mount(&server)
        .await;

    let query = Resource::new("identitycenter_instance", "this").with_read_only(true);
    let err = provider(&server).read_data_source(&query).await.unwrap_err();
    assert!(err.message.contains("Identity Center is not enabled"));
}

#[tokio::test]
async fn users_data_source_follows_markers_and_filters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(USERS_PATH))
        .and(query_param("marker", "m2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{"user_id": "u-2", "user_name": "bob", "display_name": "Bob"}],
            "page_info": {"current_count": 1},
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(USERS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [user_json()],
            "page_info": {"next_marker": "m2", "current_count": 1},
        })))
        .mount(&server)
        .await;

    let query = Resource::new("identitycenter_users", "bob")
        .with_attribute("identity_store_id", "d-1")
        .with_attribute("user_name", "bob")
        .with_read_only(true);
    let state = provider(&server).read_data_source(&query).await.unwrap();

    let users = state.get_blocks("users");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].get_str("id"), Some("u-2"));
}

#[tokio::test]
async fn enabling_service_waits_for_instance() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/identity-center/enable"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/instances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "instances": [{"instance_id": "ins-1", "identity_store_id": "d-1"}]
        })))
        .mount(&server)
        .await;

    let resource = Resource::new("identitycenter_service", "this");
    let state = provider(&server).create(&resource).await.unwrap();

    assert_eq!(state.identifier.as_deref(), Some("ins-1"));
    assert_eq!(state.get_str("status"), Some("ENABLED"));
}

#[tokio::test]
async fn provisioning_waits_for_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/instances/ins-1/permission-sets/ps-1/provision"))
        .and(body_partial_json(json!({"target_type": "ACCOUNT", "target_id": "acct-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "permission_set_provisioning_status": {"request_id": "req-1", "status": "IN_PROGRESS"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/instances/ins-1/permission-sets/provisioning-status/req-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "permission_set_provisioning_status": {
                "request_id": "req-1",
                "account_id": "acct-1",
                "status": "SUCCEEDED",
            }
        })))
        .mount(&server)
        .await;

    let resource = Resource::new("identitycenter_provision_permission_set", "deploy")
        .with_attribute("instance_id", "ins-1")
        .with_attribute("permission_set_id", "ps-1")
        .with_attribute("account_id", "acct-1");
    let state = provider(&server).create(&resource).await.unwrap();

    assert_eq!(state.identifier.as_deref(), Some("ins-1/ps-1/req-1"));
    assert_eq!(state.get_str("status"), Some("SUCCEEDED"));
}

#[tokio::test]
async fn failed_provisioning_reports_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/instances/ins-1/permission-sets/ps-1/provision"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "permission_set_provisioning_status": {"request_id": "req-1", "status": "IN_PROGRESS"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/instances/ins-1/permission-sets/provisioning-status/req-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "permission_set_provisioning_status": {
                "request_id": "req-1",
                "status": "FAILED",
                "failure_reason": "account is suspended",
            }
        })))
        .mount(&server)
        .await;

    let resource = Resource::new("identitycenter_provision_permission_set", "deploy")
        .with_attribute("instance_id", "ins-1")
        .with_attribute("permission_set_id", "ps-1")
        .with_attribute("account_id", "acct-1");
    let err = provider(&server).create(&resource).await.unwrap_err();
    assert!(err.message.contains("account is suspended"));
}

#[tokio::test]
async fn account_assignment_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/instances/ins-1/account-assignments/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "account_assignment_creation_status": {"request_id": "req-1", "status": "IN_PROGRESS"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/instances/ins-1/account-assignments/creation-status/req-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "account_assignment_creation_status": {"request_id": "req-1", "status": "SUCCEEDED"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/instances/ins-1/account-assignments"))
        .and(query_param("account_id", "acct-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "account_assignments": [
                {"principal_type": "USER", "principal_id": "u-1", "permission_set_id": "ps-1"}
            ],
            "page_info": {},
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/instances/ins-1/account-assignments/delete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "account_assignment_deletion_status": {"request_id": "req-2", "status": "IN_PROGRESS"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/instances/ins-1/account-assignments/deletion-status/req-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "account_assignment_deletion_status": {"request_id": "req-2", "status": "SUCCEEDED"}
        })))
        .mount(&server)
        .await;

    let resource = Resource::new("identitycenter_account_assignment", "alice-admin")
        .with_attribute("instance_id", "ins-1")
        .with_attribute("permission_set_id", "ps-1")
        .with_attribute("target_id", "acct-1")
        .with_attribute("principal_type", "USER")
        .with_attribute("principal_id", "u-1");

    let provider = provider(&server);
    let state = provider.create(&resource).await.unwrap();
    assert_eq!(state.identifier.as_deref(), Some("ins-1/ps-1/acct-1/USER/u-1"));
    assert_eq!(state.get_str("target_type"), Some("ACCOUNT"));

    provider
        .delete(&state.id, "ins-1/ps-1/acct-1/USER/u-1", &state)
        .await
        .unwrap();
}

const PERMISSION_SET_PATH: &str = "/v1/instances/ins-1/permission-sets/ps-1";

/// Provisioning to every account the permission set is deployed to
async fn mount_reprovision(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/instances/ins-1/permission-sets/ps-1/provision"))
        .and(body_partial_json(json!({"target_type": "ALL_PROVISIONED_ACCOUNTS"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "permission_set_provisioning_status": {"request_id": "req-9", "status": "IN_PROGRESS"}
        })))
        .expect(times)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/instances/ins-1/permission-sets/provisioning-status/req-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "permission_set_provisioning_status": {"request_id": "req-9", "status": "SUCCEEDED"}
        })))
        .mount(server)
        .await;
}

fn permission_set_state(attributes: &[(&str, Value)]) -> State {
    let mut attrs = HashMap::from([
        ("instance_id".to_string(), Value::from("ins-1")),
        ("permission_set_id".to_string(), Value::from("ps-1")),
    ]);
    attrs.extend(attributes.iter().map(|(k, v)| (k.to_string(), v.clone())));
    State::existing(ResourceId::new("identitycenter_permission_set", "admins"), attrs).with_identifier("ins-1/ps-1")
}

async fn mount_permission_set_read(server: &MockServer, description: &str) {
    Mock::given(method("GET"))
        .and(path(PERMISSION_SET_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "permission_set": {
                "permission_set_id": "ps-1",
                "name": "admins",
                "description": description,
                "session_duration": "PT1H",
                "permission_urn": "iam::123:permissionSet:ins-1/ps-1",
            }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn permission_set_update_reprovisions_all_accounts() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(PERMISSION_SET_PATH))
        .and(body_partial_json(json!({"description": "operators", "session_duration": "PT1H"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    mount_reprovision(&server, 1).await;
    mount_permission_set_read(&server, "operators").await;

    let from = permission_set_state(&[
        ("name", Value::from("admins")),
        ("description", Value::from("admins")),
        ("session_duration", Value::from("PT1H")),
    ]);
    let to = Resource::new("identitycenter_permission_set", "admins")
        .with_attribute("instance_id", "ins-1")
        .with_attribute("name", "admins")
        .with_attribute("description", "operators");

    let state = provider(&server)
        .update(&from.id, "ins-1/ps-1", &from, &to)
        .await
        .unwrap();
    assert_eq!(state.get_str("description"), Some("operators"));
    assert_eq!(state.get_str("urn"), Some("iam::123:permissionSet:ins-1/ps-1"));
}

#[tokio::test]
async fn unchanged_permission_set_is_not_reprovisioned() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(PERMISSION_SET_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;
    mount_reprovision(&server, 0).await;
    mount_permission_set_read(&server, "admins").await;

    let from = permission_set_state(&[
        ("name", Value::from("admins")),
        ("description", Value::from("admins")),
        ("session_duration", Value::from("PT1H")),
    ]);
    let to = Resource::new("identitycenter_permission_set", "admins")
        .with_attribute("instance_id", "ins-1")
        .with_attribute("name", "admins")
        .with_attribute("description", "admins");

    let state = provider(&server)
        .update(&from.id, "ins-1/ps-1", &from, &to)
        .await
        .unwrap();
    assert!(state.exists);
}

#[tokio::test]
async fn system_policy_update_detaches_and_attaches_the_difference() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/instances/ins-1/permission-sets/ps-1/managed-roles/detach"))
        .and(body_partial_json(json!({"managed_role_id": "role-readonly"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/instances/ins-1/permission-sets/ps-1/managed-roles/attach"))
        .and(body_partial_json(json!({"managed_role_id": "role-admin"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    mount_reprovision(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/instances/ins-1/permission-sets/ps-1/managed-roles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "attached_managed_roles": [
                {"role_id": "role-billing", "role_name": "BillingFullAccess"},
                {"role_id": "role-admin", "role_name": "AdministratorAccess"},
            ],
            "page_info": {},
        })))
        .mount(&server)
        .await;

    let from = State::existing(
        ResourceId::new("identitycenter_system_policy_attachment", "admins"),
        HashMap::from([
            ("instance_id".to_string(), Value::from("ins-1")),
            ("permission_set_id".to_string(), Value::from("ps-1")),
            ("policy_ids".to_string(), Value::string_list(["role-billing", "role-readonly"])),
        ]),
    )
    .with_identifier("ins-1/ps-1");
    let to = Resource::new("identitycenter_system_policy_attachment", "admins")
        .with_attribute("instance_id", "ins-1")
        .with_attribute("permission_set_id", "ps-1")
        .with_attribute("policy_ids", Value::string_list(["role-billing", "role-admin"]));

    let state = provider(&server)
        .update(&from.id, "ins-1/ps-1", &from, &to)
        .await
        .unwrap();

    let mut policy_ids = state.get_strings("policy_ids");
    policy_ids.sort();
    assert_eq!(policy_ids, vec!["role-admin".to_string(), "role-billing".to_string()]);
    assert_eq!(state.get_blocks("attached_policies").len(), 2);
}

#[tokio::test]
async fn custom_policy_delete_reprovisions() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/instances/ins-1/permission-sets/ps-1/custom-policy"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    mount_reprovision(&server, 1).await;

    let state = State::existing(
        ResourceId::new("identitycenter_custom_policy_attachment", "admins"),
        HashMap::from([
            ("instance_id".to_string(), Value::from("ins-1")),
            ("permission_set_id".to_string(), Value::from("ps-1")),
            (
                "custom_policy".to_string(),
                Value::from(r#"{"Version":"5.0","Statement":[{"Effect":"Allow","Action":["obs:*:*"]}]}"#),
            ),
        ]),
    )
    .with_identifier("ins-1/ps-1");

    provider(&server)
        .delete(&state.id, "ins-1/ps-1", &state)
        .await
        .unwrap();
}

#[tokio::test]
async fn application_instance_applies_sub_configurations_in_order() {
    let server = MockServer::start().await;
    const APP_PATH: &str = "/v1/instances/ins-1/application-instances/app-1";

    Mock::given(method("POST"))
        .and(path("/v1/instances/ins-1/application-instances"))
        .and(body_partial_json(json!({"name": "jira", "template_id": "tpl-saml"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "application_instance": {"application_instance_id": "app-1"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    for (verb, suffix, body, times) in [
        ("PUT", "display-data", json!({"display_name": "Jira", "description": "Issue tracker"}), 1),
        ("POST", "metadata", json!({"metadata": "<EntityDescriptor/>"}), 1),
        ("PUT", "status", json!({"status": "DISABLED"}), 1),
        ("PUT", "response-configuration", json!({"response_config": {"subject": "email"}}), 1),
        ("PUT", "security-configuration", json!({}), 0),
        ("PUT", "service-provider-configuration", json!({}), 0),
    ] {
        Mock::given(method(verb))
            .and(path(format!("{}/{}", APP_PATH, suffix)))
            .and(body_partial_json(body))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(times)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(APP_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "application_instance": {
                "name": "jira",
                "status": "DISABLED",
                "display": {"display_name": "Jira", "description": "Issue tracker"},
                "response_config": {"subject": "email"},
            }
        })))
        .mount(&server)
        .await;

    let resource = Resource::new("identitycenter_application_instance", "jira")
        .with_attribute("instance_id", "ins-1")
        .with_attribute("name", "jira")
        .with_attribute("template_id", "tpl-saml")
        .with_attribute("display_name", "Jira")
        .with_attribute("description", "Issue tracker")
        .with_attribute("metadata", "<EntityDescriptor/>")
        .with_attribute("status", "DISABLED")
        .with_attribute("response_config", r#"{"subject": "email"}"#);

    let state = provider(&server).create(&resource).await.unwrap();
    assert_eq!(state.identifier.as_deref(), Some("ins-1/app-1"));
    assert_eq!(state.get_str("template_id"), Some("tpl-saml"));
    assert_eq!(state.get_str("status"), Some("DISABLED"));

    let requests = server.received_requests().await.unwrap();
    let applied: Vec<String> = requests
        .iter()
        .filter(|r| r.method.as_str() != "GET")
        .filter_map(|r| r.url.path().strip_prefix(&format!("{}/", APP_PATH)).map(str::to_string))
        .collect();
    assert_eq!(
        applied,
        vec!["display-data", "metadata", "status", "response-configuration"]
    );
}

#[tokio::test]
async fn group_membership_lifecycle() {
    let server = MockServer::start().await;
    const MEMBERSHIPS_PATH: &str = "/v1/identity-stores/d-1/groups/g-1/group-memberships";

    Mock::given(method("POST"))
        .and(path(MEMBERSHIPS_PATH))
        .and(body_partial_json(json!({"member_id": {"user_id": "u-1"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"membership_id": "m-1"})))
        .expect(1)
        .mount(&server)
        .await;
    // The membership is on the second page
    Mock::given(method("GET"))
        .and(path(MEMBERSHIPS_PATH))
        .and(query_param("marker", "next-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "group_memberships": [{"membership_id": "m-1", "member_id": {"user_id": "u-1"}}],
            "page_info": {},
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(MEMBERSHIPS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "group_memberships": [{"membership_id": "m-0", "member_id": {"user_id": "u-0"}}],
            "page_info": {"next_marker": "next-1"},
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/identity-stores/d-1/group-memberships/m-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let resource = Resource::new("identitycenter_group_membership", "alice-devs")
        .with_attribute("identity_store_id", "d-1")
        .with_attribute("group_id", "g-1")
        .with_attribute("member_id", "u-1");

    let provider = provider(&server);
    let state = provider.create(&resource).await.unwrap();
    assert_eq!(state.identifier.as_deref(), Some("d-1/g-1/m-1"));
    assert_eq!(state.get_str("member_id"), Some("u-1"));

    provider.delete(&state.id, "d-1/g-1/m-1", &state).await.unwrap();
}

#[tokio::test]
async fn missing_group_membership_reads_as_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/identity-stores/d-1/groups/g-1/group-memberships"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "group_memberships": [],
            "page_info": {},
        })))
        .mount(&server)
        .await;

    let id = ResourceId::new("identitycenter_group_membership", "alice-devs");
    let state = provider(&server).read(&id, Some("d-1/g-1/m-1")).await.unwrap();
    assert!(!state.exists);
}
