//! JSON service client
//!
//! Signs requests with the API Gateway scheme, retries throttling and server
//! errors, and follows `page_info.next_marker` pagination.

use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, warn};
use reqwest::Method;
use serde_json::Value as JsonValue;
use url::Url;

use crate::error::ClientError;
use crate::signer::{Credentials, sign_sdk_request};
use crate::utils::path_search;

/// Page size sent by `list_all_by_marker` unless the caller set one
pub const DEFAULT_PAGE_LIMIT: &str = "100";

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Query parameters of a request
pub type Query<'a> = [(&'a str, String)];

/// Client bound to one service endpoint
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    endpoint: Url,
    credentials: Credentials,
    /// `x-project-id` or `x-domain-id`
    scope_headers: BTreeMap<String, String>,
    max_retries: u32,
    retry_delay: Duration,
}

impl ServiceClient {
    pub fn new(http: reqwest::Client, endpoint: &str, credentials: Credentials) -> Result<Self, ClientError> {
        let endpoint = Url::parse(endpoint).map_err(|e| ClientError::Decode {
            url: endpoint.to_string(),
            message: format!("invalid endpoint: {}", e),
        })?;
        Ok(Self {
            http,
            endpoint,
            credentials,
            scope_headers: BTreeMap::new(),
            max_retries: 0,
            retry_delay: Duration::from_secs(1),
        })
    }

    pub fn with_project_id(mut self, project_id: Option<&str>) -> Self {
        if let Some(id) = project_id.filter(|s| !s.is_empty()) {
            self.scope_headers.insert("x-project-id".to_string(), id.to_string());
        }
        self
    }

    pub fn with_domain_id(mut self, domain_id: Option<&str>) -> Self {
        if let Some(id) = domain_id.filter(|s| !s.is_empty()) {
            self.scope_headers.insert("x-domain-id".to_string(), id.to_string());
        }
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn get(&self, path: &str, query: &Query<'_>) -> Result<JsonValue, ClientError> {
        self.request(Method::GET, path, query, None).await
    }

    pub async fn post(&self, path: &str, body: Option<&JsonValue>) -> Result<JsonValue, ClientError> {
        self.request(Method::POST, path, &[], body).await
    }

    pub async fn put(&self, path: &str, body: Option<&JsonValue>) -> Result<JsonValue, ClientError> {
        self.request(Method::PUT, path, &[], body).await
    }

    pub async fn delete(&self, path: &str) -> Result<JsonValue, ClientError> {
        self.request(Method::DELETE, path, &[], None).await
    }

    /// Send a signed request, retrying throttling, server and transport errors
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &Query<'_>,
        body: Option<&JsonValue>,
    ) -> Result<JsonValue, ClientError> {
        let url = self.url(path, query)?;
        let body = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| ClientError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })?
            .unwrap_or_default();

        let mut attempt = 0;
        loop {
            match self.send(&method, &url, &body).await {
                Err(err) if err.is_retryable(&method) && attempt < self.max_retries => {
                    let delay = retry_backoff(self.retry_delay, attempt);
                    warn!("{} {} failed, retrying in {:?}: {}", method, url, delay, err);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn send(&self, method: &Method, url: &Url, body: &[u8]) -> Result<JsonValue, ClientError> {
        let mut headers = self.scope_headers.clone();
        headers.insert("content-type".to_string(), "application/json".to_string());
        sign_sdk_request(
            &self.credentials,
            method.as_str(),
            url,
            &mut headers,
            body,
            chrono::Utc::now(),
        )?;

        debug!("{} {}", method, url);
        if !body.is_empty() {
            debug!("request body: {}", String::from_utf8_lossy(body));
        }

        let mut request = self.http.request(method.clone(), url.clone());
        for (name, value) in headers.iter().filter(|(name, _)| name.as_str() != "host") {
            request = request.header(name.as_str(), value.as_str());
        }
        if !body.is_empty() {
            request = request.body(body.to_vec());
        }

        let transport = |source| ClientError::Transport {
            method: method.to_string(),
            url: url.to_string(),
            source,
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let text = response.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(ClientError::from_response(
                status.as_u16(),
                method.as_str(),
                url.as_str(),
                &text,
            ));
        }

        if text.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    fn url(&self, path: &str, query: &Query<'_>) -> Result<Url, ClientError> {
        let mut url = self.endpoint.join(path).map_err(|e| ClientError::Decode {
            url: format!("{}{}", self.endpoint, path),
            message: e.to_string(),
        })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Fetch every page of a list API
    ///
    /// Items are read from `items_key` of each page; the next page is
    /// requested with `marker` until `page_info.next_marker` is empty.
    pub async fn list_all_by_marker(
        &self,
        path: &str,
        query: &Query<'_>,
        items_key: &str,
    ) -> Result<Vec<JsonValue>, ClientError> {
        let mut base: Vec<(&str, String)> = query.to_vec();
        if !base.iter().any(|(k, _)| *k == "limit") {
            base.push(("limit", DEFAULT_PAGE_LIMIT.to_string()));
        }

        let mut items = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut page_query = base.clone();
            if let Some(marker) = &marker {
                page_query.push(("marker", marker.clone()));
            }

            let page = self.get(path, &page_query).await?;
            if let Some(page_items) = page.get(items_key).and_then(JsonValue::as_array) {
                items.extend(page_items.iter().cloned());
            }

            match path_search("page_info.next_marker", &page).and_then(JsonValue::as_str) {
                Some(next) if !next.is_empty() && marker.as_deref() != Some(next) => {
                    marker = Some(next.to_string());
                }
                _ => break,
            }
        }

        Ok(items)
    }
}

/// Exponential backoff from `base`, capped at 30 seconds
pub(crate) fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt)).min(MAX_RETRY_DELAY)
}

/// Replace `{name}` placeholders with percent-encoded values
pub fn build_path(template: &str, params: &[(&str, &str)]) -> String {
    params.iter().fold(template.to_string(), |path, (name, value)| {
        path.replace(&format!("{{{}}}", name), &urlencoding::encode(value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_path_encodes_values() {
        let path = build_path(
            "v1/instances/{instance_id}/permission-sets/{permission_set_id}",
            &[("instance_id", "ins-1"), ("permission_set_id", "ps a/b")],
        );
        assert_eq!(path, "v1/instances/ins-1/permission-sets/ps%20a%2Fb");
    }

    #[test]
    fn backoff_is_capped() {
        let base = Duration::from_secs(1);
        assert_eq!(retry_backoff(base, 0), Duration::from_secs(1));
        assert_eq!(retry_backoff(base, 3), Duration::from_secs(8));
        assert_eq!(retry_backoff(base, 10), MAX_RETRY_DELAY);
    }

    #[test]
    fn url_joins_path_and_query() {
        let client = ServiceClient::new(
            reqwest::Client::new(),
            "https://identitycenter.myhuaweicloud.com/",
            Credentials::new("AK", "SK"),
        )
        .unwrap();

        let url = client
            .url("v1/instances/ins-1/users", &[("limit", "100".to_string())])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://identitycenter.myhuaweicloud.com/v1/instances/ins-1/users?limit=100"
        );
    }

    #[test]
    fn scope_headers_skip_empty_ids() {
        let client = ServiceClient::new(
            reqwest::Client::new(),
            "https://obs.example.com/",
            Credentials::new("AK", "SK"),
        )
        .unwrap()
        .with_project_id(Some(""))
        .with_domain_id(Some("domain-1"));

        assert_eq!(
            client.scope_headers,
            BTreeMap::from([("x-domain-id".to_string(), "domain-1".to_string())])
        );
    }

    async fn timing_out_client(server: &wiremock::MockServer) -> ServiceClient {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        ServiceClient::new(http, &format!("{}/", server.uri()), Credentials::new("AK", "SK"))
            .unwrap()
            .with_max_retries(2)
            .with_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn post_is_not_resent_after_transport_error() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/instances/ins-1/account-assignments/create"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .expect(1)
            .mount(&server)
            .await;

        let client = timing_out_client(&server).await;
        let err = client
            .post("v1/instances/ins-1/account-assignments/create", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Transport { .. }));
    }

    #[tokio::test]
    async fn get_is_resent_after_transport_error() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/instances"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .expect(3)
            .mount(&server)
            .await;

        let client = timing_out_client(&server).await;
        assert!(client.get("v1/instances", &[]).await.is_err());
    }

    #[tokio::test]
    async fn post_is_resent_after_throttling() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/identity-center/enable"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/identity-center/enable"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = timing_out_client(&server).await;
        let response = client.post("v1/identity-center/enable", None).await.unwrap();
        assert_eq!(response["ok"], true);
    }
}
