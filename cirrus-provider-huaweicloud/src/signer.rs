//! Request signing
//!
//! JSON services use the API Gateway `SDK-HMAC-SHA256` scheme. OBS uses its
//! native `OBS {ak}:{signature}` scheme (HMAC-SHA1 over a canonical string).

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::{Config, ConfigError};
use crate::error::ClientError;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

pub const SDK_SIGN_ALGORITHM: &str = "SDK-HMAC-SHA256";
pub const HEADER_SDK_DATE: &str = "x-sdk-date";
pub const HEADER_SECURITY_TOKEN: &str = "x-security-token";
pub const HEADER_OBS_SECURITY_TOKEN: &str = "x-obs-security-token";

/// Access key credentials
#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub security_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            security_token: None,
        }
    }

    pub fn with_security_token(mut self, token: impl Into<String>) -> Self {
        self.security_token = Some(token.into());
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        match (&config.access_key, &config.secret_key) {
            (Some(ak), Some(sk)) if !ak.is_empty() && !sk.is_empty() => {
                let credentials = Credentials::new(ak.clone(), sk.clone());
                Ok(match &config.security_token {
                    Some(token) if !token.is_empty() => credentials.with_security_token(token.clone()),
                    _ => credentials,
                })
            }
            _ => Err(ConfigError::MissingCredentials),
        }
    }
}

/// Sign a JSON service request
///
/// `headers` uses lower-case names. The `host`, `x-sdk-date`,
/// `x-security-token` and `authorization` headers are added.
pub fn sign_sdk_request(
    credentials: &Credentials,
    method: &str,
    url: &Url,
    headers: &mut BTreeMap<String, String>,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<(), ClientError> {
    headers.insert("host".to_string(), host_header(url));
    headers.insert(
        HEADER_SDK_DATE.to_string(),
        now.format("%Y%m%dT%H%M%SZ").to_string(),
    );
    if let Some(token) = &credentials.security_token {
        headers.insert(HEADER_SECURITY_TOKEN.to_string(), token.clone());
    }

    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");
    let canonical_request = canonical_sdk_request(method, url, headers, &signed_headers, body);
    let string_to_sign = format!(
        "{}\n{}\n{}",
        SDK_SIGN_ALGORITHM,
        headers[HEADER_SDK_DATE],
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );
    let signature = hex::encode(hmac_sha256(credentials.secret_key.as_bytes(), &string_to_sign)?);

    headers.insert(
        "authorization".to_string(),
        format!(
            "{} Access={}, SignedHeaders={}, Signature={}",
            SDK_SIGN_ALGORITHM, credentials.access_key, signed_headers, signature
        ),
    );
    Ok(())
}

fn canonical_sdk_request(
    method: &str,
    url: &Url,
    headers: &BTreeMap<String, String>,
    signed_headers: &str,
    body: &[u8],
) -> String {
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();

    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        canonical_uri(url),
        canonical_query(url),
        canonical_headers,
        signed_headers,
        hex::encode(Sha256::digest(body))
    )
}

/// Path with every segment percent-encoded and a trailing slash
fn canonical_uri(url: &Url) -> String {
    let mut uri: String = url
        .path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(|s| {
                    let decoded = urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_else(|_| s.to_string());
                    format!("/{}", urlencoding::encode(&decoded))
                })
                .collect()
        })
        .unwrap_or_default();
    uri.push('/');
    uri
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            (
                urlencoding::encode(&k).into_owned(),
                urlencoding::encode(&v).into_owned(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn host_header(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    }
}

fn hmac_sha256(key: &[u8], data: &str) -> Result<Vec<u8>, ClientError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| ClientError::Signing(e.to_string()))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Canonical resource of an OBS request: `/{bucket}/{key}?{sub_resource}`
pub fn obs_canonical_resource(
    bucket: Option<&str>,
    key: Option<&str>,
    sub_resource: Option<(&str, Option<&str>)>,
) -> String {
    let mut resource = String::from("/");
    if let Some(bucket) = bucket {
        resource.push_str(bucket);
        resource.push('/');
        if let Some(key) = key {
            resource.push_str(&encode_object_key(key));
        }
    }
    match sub_resource {
        Some((name, Some(value))) => resource.push_str(&format!("?{}={}", name, value)),
        Some((name, None)) => resource.push_str(&format!("?{}", name)),
        None => {}
    }
    resource
}

/// Percent-encode an object key, keeping `/` separators
pub fn encode_object_key(key: &str) -> String {
    key.split('/')
        .map(|part| urlencoding::encode(part).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Sign an OBS request
///
/// `headers` uses lower-case names. The `date`, `x-obs-security-token` and
/// `authorization` headers are added.
pub fn sign_obs_request(
    credentials: &Credentials,
    method: &str,
    canonical_resource: &str,
    headers: &mut BTreeMap<String, String>,
    now: DateTime<Utc>,
) -> Result<(), ClientError> {
    headers.insert(
        "date".to_string(),
        now.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
    );
    if let Some(token) = &credentials.security_token {
        headers.insert(HEADER_OBS_SECURITY_TOKEN.to_string(), token.clone());
    }

    let string_to_sign = obs_string_to_sign(method, canonical_resource, headers);
    let signature = BASE64.encode(hmac_sha1(credentials.secret_key.as_bytes(), &string_to_sign)?);

    headers.insert(
        "authorization".to_string(),
        format!("OBS {}:{}", credentials.access_key, signature),
    );
    Ok(())
}

fn obs_string_to_sign(
    method: &str,
    canonical_resource: &str,
    headers: &BTreeMap<String, String>,
) -> String {
    let header = |name: &str| headers.get(name).map(String::as_str).unwrap_or_default();

    let canonical_headers: String = headers
        .iter()
        .filter(|(k, _)| k.starts_with("x-obs-"))
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();

    format!(
        "{}\n{}\n{}\n{}\n{}{}",
        method,
        header("content-md5"),
        header("content-type"),
        header("date"),
        canonical_headers,
        canonical_resource
    )
}

fn hmac_sha1(key: &[u8], data: &str) -> Result<Vec<u8>, ClientError> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|e| ClientError::Signing(e.to_string()))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Base64 MD5 digest for the `Content-MD5` header
pub fn content_md5(body: &[u8]) -> String {
    BASE64.encode(Md5::digest(body))
}
