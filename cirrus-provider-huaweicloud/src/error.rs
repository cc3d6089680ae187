//! Client errors and their mapping into provider errors

use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::{ResourceId, State};
use reqwest::Method;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{method} {url}: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url}: status {status}, code {code:?}, message {message:?}")]
    Api {
        status: u16,
        code: String,
        message: String,
        method: String,
        url: String,
    },

    #[error("failed to decode response of {url}: {message}")]
    Decode { url: String, message: String },

    #[error("XML error: {0}")]
    Xml(String),

    #[error("failed to sign request: {0}")]
    Signing(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Vendor error code, e.g. `NoSuchBucketPolicy` or `IdentityCenter.1001`
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Also treat `status` responses carrying one of `codes` as not found
    pub fn is_not_found_with_codes(&self, status: u16, codes: &[&str]) -> bool {
        self.is_not_found()
            || (self.status() == Some(status) && self.code().is_some_and(|c| codes.contains(&c)))
    }

    /// Whether a `method` request failing this way may be sent again
    ///
    /// A transport error on a POST is only retried when the connection was
    /// never made; the service may already have accepted the request.
    pub fn is_retryable(&self, method: &Method) -> bool {
        match self {
            ClientError::Transport { source, .. } => is_idempotent(method) || source.is_connect(),
            ClientError::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// Build an `Api` error from a failed response body
    pub fn from_response(status: u16, method: &str, url: &str, body: &str) -> Self {
        let (code, message) = parse_error_body(body);
        ClientError::Api {
            status,
            code,
            message,
            method: method.to_string(),
            url: url.to_string(),
        }
    }
}

fn is_idempotent(method: &Method) -> bool {
    [Method::GET, Method::HEAD, Method::PUT, Method::DELETE, Method::OPTIONS].contains(method)
}

/// Extract the error code and message from a JSON or OBS XML error document
fn parse_error_body(body: &str) -> (String, String) {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let pick = |value: &serde_json::Value, keys: &[&str]| {
            keys.iter()
                .find_map(|k| value.get(*k).and_then(|v| v.as_str()))
                .map(str::to_string)
        };
        let nested = json.get("error").filter(|e| e.is_object());
        let code = pick(&json, &["error_code", "code"])
            .or_else(|| nested.and_then(|e| pick(e, &["code", "error_code"])));
        let message = pick(&json, &["error_msg", "message"])
            .or_else(|| nested.and_then(|e| pick(e, &["message", "error_msg"])));
        if code.is_some() || message.is_some() {
            return (code.unwrap_or_default(), message.unwrap_or_default());
        }
    }

    if body.trim_start().starts_with('<')
        && let Ok(error) = quick_xml::de::from_str::<XmlError>(body)
        && !(error.code.is_empty() && error.message.is_empty())
    {
        return (error.code, error.message);
    }

    (String::new(), body.trim().to_string())
}

#[derive(serde::Deserialize)]
struct XmlError {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Wrap a client error into a provider error: `"{action}: {err}"`
pub fn api_error(action: impl std::fmt::Display, err: ClientError) -> ProviderError {
    ProviderError::new(format!("{}: {}", action, err)).with_cause(err)
}

/// Not-found errors mean the resource is gone; everything else is an error
pub fn check_deleted(id: &ResourceId, err: ClientError, action: &str) -> ProviderResult<State> {
    if err.is_not_found() {
        log::warn!("{} is gone, removing it from state", id);
        Ok(State::not_found(id.clone()))
    } else {
        Err(api_error(action, err).for_resource(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, code: &str) -> ClientError {
        ClientError::Api {
            status,
            code: code.to_string(),
            message: String::new(),
            method: "GET".to_string(),
            url: "https://example.com".to_string(),
        }
    }

    #[test]
    fn parses_flat_json_error() {
        let (code, message) =
            parse_error_body(r#"{"error_code":"IdentityCenter.1001","error_msg":"not exist"}"#);
        assert_eq!(code, "IdentityCenter.1001");
        assert_eq!(message, "not exist");
    }

    #[test]
    fn parses_nested_json_error() {
        let (code, message) =
            parse_error_body(r#"{"error":{"code":"EPS.0004","message":"bad request"}}"#);
        assert_eq!(code, "EPS.0004");
        assert_eq!(message, "bad request");
    }

    #[test]
    fn parses_obs_xml_error() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>NoSuchBucketPolicy</Code><Message>The bucket policy does not exist</Message><RequestId>1</RequestId></Error>"#;
        let (code, message) = parse_error_body(body);
        assert_eq!(code, "NoSuchBucketPolicy");
        assert_eq!(message, "The bucket policy does not exist");
    }

    #[test]
    fn unknown_body_becomes_message() {
        assert_eq!(parse_error_body("boom\n"), (String::new(), "boom".to_string()));
    }

    #[test]
    fn not_found_checks() {
        assert!(api(404, "").is_not_found());
        assert!(!api(400, "IdentityCenter.1001").is_not_found());
        assert!(api(400, "IdentityCenter.1001").is_not_found_with_codes(400, &["IdentityCenter.1001"]));
        assert!(!api(403, "IdentityCenter.1001").is_not_found_with_codes(400, &["IdentityCenter.1001"]));
    }

    #[test]
    fn retryable_statuses() {
        assert!(api(429, "").is_retryable(&Method::POST));
        assert!(api(503, "").is_retryable(&Method::GET));
        assert!(!api(400, "").is_retryable(&Method::GET));
        assert!(!ClientError::Xml("bad".to_string()).is_retryable(&Method::GET));
        assert!(is_idempotent(&Method::PUT));
        assert!(!is_idempotent(&Method::POST));
    }

    #[test]
    fn check_deleted_maps_404() {
        let id = ResourceId::new("identitycenter_user", "alice");
        let state = check_deleted(&id, api(404, ""), "error retrieving user").unwrap();
        assert!(!state.exists);

        let err = check_deleted(&id, api(500, "SYS.0001"), "error retrieving user").unwrap_err();
        assert!(err.message.starts_with("error retrieving user: GET https://example.com"));
        assert_eq!(err.resource_id, Some(id));
    }
}
