//! Shared helpers for the provider integration tests
//!
//! Every service endpoint points at a local wiremock server.

#![allow(dead_code)]

use std::collections::HashMap;

use cirrus_provider_huaweicloud::{Config, HuaweiCloudProvider};
use wiremock::{Match, MockServer, Request, ResponseTemplate};

pub const REGION: &str = "cn-north-4";

/// Provider whose Identity Center, identity store, EPS and OBS endpoints are
/// the mock server
pub fn provider(server: &MockServer) -> HuaweiCloudProvider {
    let endpoints: HashMap<String, String> = ["identitycenter", "identitystore", "eps", "obs"]
        .iter()
        .map(|service| (service.to_string(), server.uri()))
        .collect();

    let config = Config {
        region: Some(REGION.to_string()),
        access_key: Some("AK".to_string()),
        secret_key: Some("SK".to_string()),
        project_id: Some("project-1".to_string()),
        domain_id: Some("domain-1".to_string()),
        max_retries: Some(0),
        endpoints,
        obs_path_style: Some(true),
        ..Default::default()
    };
    HuaweiCloudProvider::new(config).expect("valid test config")
}

/// Matches OBS requests addressing `?{name}` or `?{name}=value`
pub struct SubResource(pub &'static str);

impl Match for SubResource {
    fn matches(&self, request: &Request) -> bool {
        request.url.query().is_some_and(|query| {
            query
                .split('&')
                .any(|part| part == self.0 || part.starts_with(&format!("{}=", self.0)))
        })
    }
}

/// Matches requests without a query string
pub struct NoQuery;

impl Match for NoQuery {
    fn matches(&self, request: &Request) -> bool {
        request.url.query().is_none_or(str::is_empty)
    }
}

/// OBS XML error document
pub fn obs_error(status: u16, code: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_raw(
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>{}</Code><Message>{}</Message></Error>",
            code, code
        ),
        "application/xml",
    )
}

pub fn xml(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/xml")
}

/// JSON error document of the Identity Center APIs
pub fn api_error(status: u16, code: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(serde_json::json!({
        "error_code": code,
        "error_msg": message,
    }))
}
