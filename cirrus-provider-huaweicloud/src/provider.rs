//! HuaweiCloud provider
//!
//! Holds the validated configuration and the shared HTTP client, and hands
//! out per-service clients.

use std::collections::HashMap;

use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::Value;
use log::debug;

use crate::client::ServiceClient;
use crate::config::{Config, Scope, service_catalog};
use crate::obs::ObsClient;
use crate::signer::Credentials;

/// HuaweiCloud Provider
pub struct HuaweiCloudProvider {
    config: Config,
    credentials: Credentials,
    http: reqwest::Client,
}

impl HuaweiCloudProvider {
    /// Create a provider from a configuration
    pub fn new(config: Config) -> ProviderResult<Self> {
        config
            .validate()
            .map_err(|e| ProviderError::new(format!("invalid provider configuration: {}", e)).with_cause(e))?;
        let credentials = Credentials::from_config(&config)
            .map_err(|e| ProviderError::new(e.to_string()).with_cause(e))?;

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.insecure())
            .user_agent(concat!("cirrus-provider-huaweicloud/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::new("failed to build HTTP client").with_cause(e))?;

        debug!("provider configured for region {}", config.region());
        Ok(Self {
            config,
            credentials,
            http,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Region of a resource: its `region` attribute, else the provider region
    pub fn region_of<'a>(&'a self, attributes: &'a HashMap<String, Value>) -> &'a str {
        self.config.region_of(attributes)
    }

    /// Client for a JSON service such as `identitycenter` or `eps`
    pub fn service_client(&self, service: &str, region: &str) -> ProviderResult<ServiceClient> {
        let endpoint = self.config.endpoint(service, region).map_err(|e| {
            ProviderError::new(format!("error creating {} client: {}", service, e)).with_cause(e)
        })?;

        let client = ServiceClient::new(self.http.clone(), &endpoint, self.credentials.clone())
            .map_err(|e| ProviderError::new(format!("error creating {} client: {}", service, e)).with_cause(e))?
            .with_max_retries(self.config.max_retries());

        let scope = service_catalog(service).map(|c| c.scope).unwrap_or(Scope::Regional);
        Ok(match scope {
            Scope::Global => client.with_domain_id(self.config.domain_id.as_deref()),
            Scope::Regional => client.with_project_id(self.config.project_id.as_deref()),
        })
    }

    /// Client for OBS in `region`
    pub fn obs_client(&self, region: &str) -> ProviderResult<ObsClient> {
        let endpoint = self.config.endpoint("obs", region).map_err(|e| {
            ProviderError::new(format!("error creating OBS client: {}", e)).with_cause(e)
        })?;

        Ok(ObsClient::new(self.http.clone(), &endpoint, self.credentials.clone())
            .map_err(|e| ProviderError::new(format!("error creating OBS client: {}", e)).with_cause(e))?
            .with_path_style(self.config.obs_path_style())
            .with_max_retries(self.config.max_retries()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            region: Some("cn-north-4".to_string()),
            access_key: Some("AK".to_string()),
            secret_key: Some("SK".to_string()),
            domain_id: Some("domain-1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let err = HuaweiCloudProvider::new(Config::default()).err().unwrap();
        assert!(err.message.starts_with("invalid provider configuration"));
    }

    #[test]
    fn service_clients_use_catalog_endpoints() {
        let provider = HuaweiCloudProvider::new(config()).unwrap();

        let client = provider.service_client("identitycenter", "cn-north-4").unwrap();
        assert_eq!(
            client.endpoint().as_str(),
            "https://identitycenter.myhuaweicloud.com/"
        );
        assert!(provider.service_client("unknown", "cn-north-4").is_err());
    }

    #[test]
    fn region_falls_back_to_provider() {
        let provider = HuaweiCloudProvider::new(config()).unwrap();
        let mut attributes = HashMap::new();
        assert_eq!(provider.region_of(&attributes), "cn-north-4");

        attributes.insert("region".to_string(), Value::from("cn-south-1"));
        assert_eq!(provider.region_of(&attributes), "cn-south-1");
    }
}
