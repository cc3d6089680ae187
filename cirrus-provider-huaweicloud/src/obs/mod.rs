//! OBS client
//!
//! Speaks the XML bucket API with native OBS signatures. Buckets are
//! addressed virtual-hosted style (`https://{bucket}.obs.{region}.{cloud}/`)
//! unless path-style addressing is enabled.

pub mod model;

use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, warn};
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::client::retry_backoff;
use crate::error::ClientError;
use crate::signer::{Credentials, content_md5, encode_object_key, obs_canonical_resource, sign_obs_request};

use model::*;

/// A single OBS request
#[derive(Debug, Clone)]
pub struct ObsRequest {
    method: Method,
    bucket: Option<String>,
    key: Option<String>,
    /// Signed sub-resource such as `acl` or `customdomain=www.example.com`
    sub_resource: Option<(String, Option<String>)>,
    /// Unsigned query parameters
    query: Vec<(String, String)>,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl ObsRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            bucket: None,
            key: None,
            sub_resource: None,
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn sub_resource(mut self, name: &str) -> Self {
        self.sub_resource = Some((name.to_string(), None));
        self
    }

    pub fn sub_resource_value(mut self, name: &str, value: impl Into<String>) -> Self {
        self.sub_resource = Some((name.to_string(), Some(value.into())));
        self
    }

    pub fn query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((name.to_string(), value.into()));
        self
    }

    /// Header names are stored lower-case
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn optional_header(self, name: &str, value: Option<&str>) -> Self {
        match value.filter(|v| !v.is_empty()) {
            Some(value) => self.header(name, value),
            None => self,
        }
    }

    pub fn body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self.header("content-type", content_type)
    }

    pub fn xml_body<T: Serialize>(self, document: &T) -> Result<Self, ClientError> {
        let xml = quick_xml::se::to_string(document).map_err(|e| ClientError::Xml(e.to_string()))?;
        Ok(self.body("application/xml", xml))
    }
}

/// Status, headers and body of a successful response
#[derive(Debug)]
pub struct ObsResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl ObsResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn xml<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        quick_xml::de::from_str(&self.body).map_err(|e| ClientError::Xml(e.to_string()))
    }
}

/// Bucket metadata returned by `HEAD /{bucket}`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketMetadata {
    pub location: Option<String>,
    pub storage_class: Option<String>,
    pub epid: Option<String>,
    pub az_redundancy: Option<String>,
    pub fs_status: Option<String>,
    pub version: Option<String>,
}

/// Options of `PUT /{bucket}`
#[derive(Debug, Clone, Default)]
pub struct CreateBucketInput {
    pub bucket: String,
    pub location: String,
    pub acl: Option<String>,
    pub storage_class: Option<String>,
    pub epid: Option<String>,
    pub multi_az: bool,
    pub parallel_fs: bool,
}

/// Object metadata returned by `HEAD /{bucket}/{key}`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
    pub etag: Option<String>,
    pub storage_class: Option<String>,
    pub version_id: Option<String>,
    pub sse: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ObsClient {
    http: reqwest::Client,
    endpoint: Url,
    credentials: Credentials,
    path_style: bool,
    max_retries: u32,
    retry_delay: Duration,
}

impl ObsClient {
    pub fn new(http: reqwest::Client, endpoint: &str, credentials: Credentials) -> Result<Self, ClientError> {
        let endpoint = Url::parse(endpoint).map_err(|e| ClientError::Decode {
            url: endpoint.to_string(),
            message: format!("invalid endpoint: {}", e),
        })?;
        Ok(Self {
            http,
            endpoint,
            credentials,
            path_style: false,
            max_retries: 0,
            retry_delay: Duration::from_secs(1),
        })
    }

    pub fn with_path_style(mut self, path_style: bool) -> Self {
        self.path_style = path_style;
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

    /// Send a request, retrying throttling, server and transport errors
    pub async fn send(&self, request: ObsRequest) -> Result<ObsResponse, ClientError> {
        let mut attempt = 0;
        loop {
            match self.send_once(&request).await {
                Err(err) if err.is_retryable(&request.method) && attempt < self.max_retries => {
                    let delay = retry_backoff(self.retry_delay, attempt);
                    warn!("OBS {} failed, retrying in {:?}: {}", request.method, delay, err);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn send_once(&self, request: &ObsRequest) -> Result<ObsResponse, ClientError> {
        let url = self.url(request)?;

        let mut headers = request.headers.clone();
        if !request.body.is_empty() {
            headers.insert("content-md5".to_string(), content_md5(&request.body));
        }
        let resource = obs_canonical_resource(
            request.bucket.as_deref(),
            request.key.as_deref(),
            request
                .sub_resource
                .as_ref()
                .map(|(name, value)| (name.as_str(), value.as_deref())),
        );
        sign_obs_request(
            &self.credentials,
            request.method.as_str(),
            &resource,
            &mut headers,
            chrono::Utc::now(),
        )?;

        debug!("OBS {} {}", request.method, url);

        let mut builder = self.http.request(request.method.clone(), url.clone());
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let transport = |source| ClientError::Transport {
            method: request.method.to_string(),
            url: url.to_string(),
            source,
        };
        let response = builder.send().await.map_err(transport)?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let body = response.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(ClientError::from_response(
                status.as_u16(),
                request.method.as_str(),
                url.as_str(),
                &body,
            ));
        }

        Ok(ObsResponse {
            status: status.as_u16(),
            headers: response_headers,
            body,
        })
    }

    fn url(&self, request: &ObsRequest) -> Result<Url, ClientError> {
        let mut url = self.endpoint.clone();
        let key = request.key.as_deref().map(encode_object_key).unwrap_or_default();

        match &request.bucket {
            Some(bucket) if self.path_style => {
                let base = self.endpoint.path().trim_end_matches('/');
                url.set_path(&format!("{}/{}/{}", base, bucket, key));
            }
            Some(bucket) => {
                let host = self.endpoint.host_str().unwrap_or_default();
                url.set_host(Some(&format!("{}.{}", bucket, host)))
                    .map_err(|e| ClientError::Decode {
                        url: self.endpoint.to_string(),
                        message: format!("invalid bucket host: {}", e),
                    })?;
                url.set_path(&format!("/{}", key));
            }
            None => url.set_path("/"),
        }

        let mut query: Vec<String> = Vec::new();
        match &request.sub_resource {
            Some((name, Some(value))) => {
                query.push(format!("{}={}", name, urlencoding::encode(value)))
            }
            Some((name, None)) => query.push(name.clone()),
            None => {}
        }
        for (name, value) in &request.query {
            query.push(format!(
                "{}={}",
                urlencoding::encode(name),
                urlencoding::encode(value)
            ));
        }
        url.set_query((!query.is_empty()).then(|| query.join("&")).as_deref());

        Ok(url)
    }

    // ------------------------------------------------------------------
    // Buckets
    // ------------------------------------------------------------------

    pub async fn create_bucket(&self, input: &CreateBucketInput) -> Result<(), ClientError> {
        let mut request = ObsRequest::new(Method::PUT)
            .bucket(&input.bucket)
            .optional_header("x-obs-acl", input.acl.as_deref())
            .optional_header("x-obs-storage-class", input.storage_class.as_deref())
            .optional_header("x-obs-epid", input.epid.as_deref());
        if input.multi_az {
            request = request.header("x-obs-az-redundancy", "3az");
        }
        if input.parallel_fs {
            request = request.header("x-obs-fs-file-interface", "Enabled");
        }
        if !input.location.is_empty() {
            request = request.xml_body(&CreateBucketConfiguration {
                location: input.location.clone(),
            })?;
        }
        self.send(request).await.map(|_| ())
    }

    pub async fn head_bucket(&self, bucket: &str) -> Result<BucketMetadata, ClientError> {
        let response = self.send(ObsRequest::new(Method::HEAD).bucket(bucket)).await?;
        let header = |name: &str| response.header(name).map(str::to_string);
        Ok(BucketMetadata {
            location: header("x-obs-bucket-location"),
            storage_class: header("x-obs-storage-class"),
            epid: header("x-obs-epid"),
            az_redundancy: header("x-obs-az-redundancy"),
            fs_status: header("x-obs-fs-file-interface"),
            version: header("x-obs-version"),
        })
    }

    pub async fn delete_bucket(&self, bucket: &str) -> Result<(), ClientError> {
        self.send(ObsRequest::new(Method::DELETE).bucket(bucket))
            .await
            .map(|_| ())
    }

    pub async fn list_buckets(&self) -> Result<Vec<BucketSummary>, ClientError> {
        let response = self
            .send(ObsRequest::new(Method::GET).header("x-obs-bucket-type", "OBJECT"))
            .await?;
        let result: ListAllMyBucketsResult = response.xml()?;
        Ok(result.buckets.buckets)
    }

    /// Read an XML sub-resource such as `?versioning`
    pub async fn get_bucket_config<T: DeserializeOwned>(
        &self,
        bucket: &str,
        sub_resource: &str,
    ) -> Result<T, ClientError> {
        self.send(ObsRequest::new(Method::GET).bucket(bucket).sub_resource(sub_resource))
            .await?
            .xml()
    }

    /// Replace an XML sub-resource
    pub async fn put_bucket_config<T: Serialize>(
        &self,
        bucket: &str,
        sub_resource: &str,
        document: &T,
    ) -> Result<(), ClientError> {
        let request = ObsRequest::new(Method::PUT)
            .bucket(bucket)
            .sub_resource(sub_resource)
            .xml_body(document)?;
        self.send(request).await.map(|_| ())
    }

    pub async fn delete_bucket_config(&self, bucket: &str, sub_resource: &str) -> Result<(), ClientError> {
        self.send(ObsRequest::new(Method::DELETE).bucket(bucket).sub_resource(sub_resource))
            .await
            .map(|_| ())
    }

    pub async fn set_bucket_acl(&self, bucket: &str, acl: &str) -> Result<(), ClientError> {
        self.send(
            ObsRequest::new(Method::PUT)
                .bucket(bucket)
                .sub_resource("acl")
                .header("x-obs-acl", acl),
        )
        .await
        .map(|_| ())
    }

    pub async fn get_bucket_policy(&self, bucket: &str) -> Result<String, ClientError> {
        self.send(ObsRequest::new(Method::GET).bucket(bucket).sub_resource("policy"))
            .await
            .map(|r| r.body)
    }

    pub async fn set_bucket_policy(&self, bucket: &str, policy: &str) -> Result<(), ClientError> {
        self.send(
            ObsRequest::new(Method::PUT)
                .bucket(bucket)
                .sub_resource("policy")
                .body("application/json", policy),
        )
        .await
        .map(|_| ())
    }

    pub async fn set_bucket_custom_domain(&self, bucket: &str, domain: &str) -> Result<(), ClientError> {
        self.send(
            ObsRequest::new(Method::PUT)
                .bucket(bucket)
                .sub_resource_value("customdomain", domain),
        )
        .await
        .map(|_| ())
    }

    pub async fn delete_bucket_custom_domain(&self, bucket: &str, domain: &str) -> Result<(), ClientError> {
        self.send(
            ObsRequest::new(Method::DELETE)
                .bucket(bucket)
                .sub_resource_value("customdomain", domain),
        )
        .await
        .map(|_| ())
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    /// Keys of every object in a bucket
    pub async fn list_object_keys(&self, bucket: &str) -> Result<Vec<String>, ClientError> {
        let mut keys = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut request = ObsRequest::new(Method::GET).bucket(bucket).query("max-keys", "1000");
            if let Some(marker) = &marker {
                request = request.query("marker", marker.clone());
            }
            let page: ListBucketResult = self.send(request).await?.xml()?;

            let last_key = page.contents.last().map(|o| o.key.clone());
            keys.extend(page.contents.into_iter().map(|o| o.key));

            match page.next_marker.filter(|m| !m.is_empty()).or(last_key) {
                Some(next) if page.is_truncated && marker.as_deref() != Some(next.as_str()) => {
                    marker = Some(next);
                }
                _ => break,
            }
        }
        Ok(keys)
    }

    /// Delete objects in one multi-object request
    pub async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<DeleteResult, ClientError> {
        let document = DeleteObjects {
            quiet: true,
            objects: keys
                .iter()
                .map(|key| ObjectToDelete { key: key.clone() })
                .collect(),
        };
        let request = ObsRequest::new(Method::POST)
            .bucket(bucket)
            .sub_resource("delete")
            .xml_body(&document)?;
        let response = self.send(request).await?;
        if response.body.trim().is_empty() {
            return Ok(DeleteResult::default());
        }
        response.xml()
    }

    pub async fn put_object(&self, request: ObsRequest) -> Result<ObjectMetadata, ClientError> {
        let response = self.send(request).await?;
        Ok(ObjectMetadata {
            etag: response.header("etag").map(|e| e.trim_matches('"').to_string()),
            version_id: response.header("x-obs-version-id").map(str::to_string),
            ..Default::default()
        })
    }

    pub async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, ClientError> {
        let response = self
            .send(ObsRequest::new(Method::HEAD).bucket(bucket).key(key))
            .await?;
        let header = |name: &str| response.header(name).map(str::to_string);
        Ok(ObjectMetadata {
            content_type: header("content-type"),
            content_length: response.header("content-length").and_then(|v| v.parse().ok()),
            etag: response.header("etag").map(|e| e.trim_matches('"').to_string()),
            storage_class: header("x-obs-storage-class"),
            version_id: header("x-obs-version-id"),
            sse: header("x-obs-server-side-encryption"),
        })
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ClientError> {
        self.send(ObsRequest::new(Method::DELETE).bucket(bucket).key(key))
            .await
            .map(|_| ())
    }
}
