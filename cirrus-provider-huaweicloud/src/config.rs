//! Provider configuration
//!
//! Settings come from a JSON file and from `HW_*` environment variables;
//! values from the file win.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use cirrus_core::resource::{Attributes, Value};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CLOUD: &str = "myhuaweicloud.com";
pub const DEFAULT_MAX_RETRIES: i64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for environment variable {var}")]
    InvalidEnv { var: String, value: String },

    #[error("region must be specified, set `region` or HW_REGION_NAME")]
    MissingRegion,

    #[error("missing credentials, need access_key and secret_key values for provider")]
    MissingCredentials,

    #[error("access_key and secret_key must be specified together")]
    IncompleteCredentials,

    #[error("security_token requires access_key and secret_key")]
    TokenWithoutKey,

    #[error("max_retries should be a positive value")]
    NegativeRetries,

    #[error("service type {0} is invalid or not supported")]
    UnknownService(String),
}

/// Where a service endpoint lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// `https://{name}.{cloud}/`
    Global,
    /// `https://{name}.{region}.{cloud}/`
    Regional,
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceCatalog {
    pub name: &'static str,
    pub scope: Scope,
}

const SERVICE_CATALOG: &[ServiceCatalog] = &[
    ServiceCatalog {
        name: "identitycenter",
        scope: Scope::Global,
    },
    ServiceCatalog {
        name: "identitystore",
        scope: Scope::Global,
    },
    ServiceCatalog {
        name: "eps",
        scope: Scope::Global,
    },
    ServiceCatalog {
        name: "obs",
        scope: Scope::Regional,
    },
];

pub fn service_catalog(service: &str) -> Option<ServiceCatalog> {
    SERVICE_CATALOG.iter().find(|c| c.name == service).copied()
}

/// Provider settings
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub security_token: Option<String>,
    pub project_id: Option<String>,
    pub domain_id: Option<String>,
    pub cloud: Option<String>,
    pub insecure: Option<bool>,
    pub max_retries: Option<i64>,
    pub enterprise_project_id: Option<String>,
    /// Per-service endpoint overrides, e.g. `{"obs": "http://127.0.0.1:9000/"}`
    pub endpoints: HashMap<String, String>,
    pub obs_path_style: Option<bool>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &redact(&self.secret_key))
            .field("security_token", &redact(&self.security_token))
            .field("project_id", &self.project_id)
            .field("domain_id", &self.domain_id)
            .field("cloud", &self.cloud)
            .field("insecure", &self.insecure)
            .field("max_retries", &self.max_retries)
            .field("enterprise_project_id", &self.enterprise_project_id)
            .field("endpoints", &self.endpoints)
            .field("obs_path_style", &self.obs_path_style)
            .finish()
    }
}

impl Config {
    /// Load settings from the `HW_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load settings through a variable lookup function
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.is_empty());

        let insecure = match get("HW_INSECURE") {
            Some(v) => Some(parse_env(&v, "HW_INSECURE")?),
            None => None,
        };
        let max_retries = match get("HW_MAX_RETRIES") {
            Some(v) => Some(parse_env(&v, "HW_MAX_RETRIES")?),
            None => None,
        };

        Ok(Self {
            region: get("HW_REGION_NAME"),
            access_key: get("HW_ACCESS_KEY"),
            secret_key: get("HW_SECRET_KEY"),
            security_token: get("HW_SECURITY_TOKEN"),
            project_id: get("HW_PROJECT_ID"),
            domain_id: get("HW_DOMAIN_ID"),
            cloud: get("HW_CLOUD"),
            insecure,
            max_retries,
            enterprise_project_id: get("HW_ENTERPRISE_PROJECT_ID"),
            endpoints: HashMap::new(),
            obs_path_style: None,
        })
    }

    /// Load settings from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Overlay `other` on top of `self`; values set in `other` win
    pub fn merge(self, other: Config) -> Config {
        let mut endpoints = self.endpoints;
        endpoints.extend(other.endpoints);

        Config {
            region: other.region.or(self.region),
            access_key: other.access_key.or(self.access_key),
            secret_key: other.secret_key.or(self.secret_key),
            security_token: other.security_token.or(self.security_token),
            project_id: other.project_id.or(self.project_id),
            domain_id: other.domain_id.or(self.domain_id),
            cloud: other.cloud.or(self.cloud),
            insecure: other.insecure.or(self.insecure),
            max_retries: other.max_retries.or(self.max_retries),
            enterprise_project_id: other.enterprise_project_id.or(self.enterprise_project_id),
            endpoints,
            obs_path_style: other.obs_path_style.or(self.obs_path_style),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingRegion);
        }
        match (&self.access_key, &self.secret_key) {
            (Some(_), Some(_)) => {}
            (None, None) if self.security_token.is_some() => {
                return Err(ConfigError::TokenWithoutKey);
            }
            (None, None) => return Err(ConfigError::MissingCredentials),
            _ => return Err(ConfigError::IncompleteCredentials),
        }
        if self.max_retries.is_some_and(|n| n < 0) {
            return Err(ConfigError::NegativeRetries);
        }
        Ok(())
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or_default()
    }

    pub fn cloud(&self) -> &str {
        self.cloud.as_deref().unwrap_or(DEFAULT_CLOUD)
    }

    pub fn max_retries(&self) -> u32 {
        u32::try_from(self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)).unwrap_or(0)
    }

    pub fn insecure(&self) -> bool {
        self.insecure.unwrap_or(false)
    }

    pub fn obs_path_style(&self) -> bool {
        self.obs_path_style.unwrap_or(false)
    }

    /// Region of a resource: its `region` attribute, else the provider region
    pub fn region_of<'a>(&'a self, attributes: &'a HashMap<String, Value>) -> &'a str {
        attributes
            .get_non_empty_str("region")
            .unwrap_or_else(|| self.region())
    }

    /// Enterprise project of a resource, else the provider default
    pub fn enterprise_project_of<'a>(
        &'a self,
        attributes: &'a HashMap<String, Value>,
    ) -> Option<&'a str> {
        attributes
            .get_non_empty_str("enterprise_project_id")
            .or(self.enterprise_project_id.as_deref())
    }

    /// Base URL of a service, always ending with `/`
    pub fn endpoint(&self, service: &str, region: &str) -> Result<String, ConfigError> {
        if let Some(endpoint) = self.endpoints.get(service) {
            return Ok(with_trailing_slash(endpoint));
        }

        let catalog =
            service_catalog(service).ok_or_else(|| ConfigError::UnknownService(service.to_string()))?;
        Ok(match catalog.scope {
            Scope::Global => format!("https://{}.{}/", catalog.name, self.cloud()),
            Scope::Regional => format!("https://{}.{}.{}/", catalog.name, region, self.cloud()),
        })
    }
}

fn parse_env<T: std::str::FromStr>(value: &str, var: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn with_trailing_slash(endpoint: &str) -> String {
    if endpoint.ends_with('/') {
        endpoint.to_string()
    } else {
        format!("{}/", endpoint)
    }
}
