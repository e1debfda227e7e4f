/// Configuration management for cluster-broker
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::broker::ProviderKind;
use crate::session::SessionContext;

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Identity the dispatcher acts for
    pub session: SessionContext,

    /// Native-compute provider endpoint
    pub native: NativeConfig,

    /// External-service accounts and placement (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_service: Option<ExternalServiceConfig>,

    /// Organizations and their virtual datacenters
    #[serde(default)]
    pub orgs: Vec<OrgConfig>,

    /// Fan-out search tuning
    #[serde(default)]
    pub search: SearchConfig,
}

/// Native-compute provider API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeConfig {
    /// Base URL of the native cluster API (e.g., "https://vcd.example.com/api/cse")
    pub endpoint: String,

    /// API token (can also be set via NATIVE_API_TOKEN env var)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// External-service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalServiceConfig {
    /// Service accounts, optionally dedicated to one organization
    pub accounts: Vec<AccountConfig>,

    /// Provider vdcs backing tenant vdcs
    #[serde(default)]
    pub provider_vdcs: Vec<ProviderVdcConfig>,

    /// Network managers per compute endpoint
    #[serde(default)]
    pub network_managers: Vec<NetworkManagerConfig>,
}

impl ExternalServiceConfig {
    /// Whether any account is dedicated to an organization
    pub fn has_exclusive_accounts(&self) -> bool {
        self.accounts.iter().any(|a| a.org.is_some())
    }

    /// Account placing clusters on `compute_endpoint` for `org`.
    ///
    /// Once any account is dedicated, only the org's own dedicated account
    /// qualifies; otherwise the shared account of the endpoint is used.
    pub fn account_for(&self, org: &str, compute_endpoint: &str) -> Option<&AccountConfig> {
        let exclusive = self.has_exclusive_accounts();
        self.accounts.iter().find(|a| {
            a.compute_endpoint == compute_endpoint
                && if exclusive {
                    a.org.as_deref() == Some(org)
                } else {
                    a.org.is_none()
                }
        })
    }
}

/// One external-service account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub name: String,

    /// API host (e.g., "pks.example.com")
    pub host: String,

    #[serde(default = "default_api_port")]
    pub port: u16,

    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Compute endpoint this account places clusters on (e.g., "vc1")
    pub compute_endpoint: String,

    /// Organization this account is dedicated to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
}

/// Provider vdc placement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderVdcConfig {
    pub id: String,
    pub name: String,
    pub compute_endpoint: String,
    pub datacenter: String,
    pub cluster: String,
    /// Control-plane-interface id
    pub cpi: String,
}

/// Network manager of a compute endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkManagerConfig {
    pub compute_endpoint: String,
    pub host: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Organization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgConfig {
    pub name: String,

    #[serde(default)]
    pub vdcs: Vec<VdcConfig>,
}

/// Virtual datacenter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VdcConfig {
    /// Unique vdc identifier
    pub id: String,

    pub name: String,

    /// Provider vdc id, required for external-service ownership
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_vdc: Option<String>,

    /// Initial owner of the vdc
    #[serde(default)]
    pub container_provider: ProviderKind,

    /// External-service plans bound to the vdc
    #[serde(default)]
    pub plans: Vec<String>,
}

/// Fan-out search tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Per-probe timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Maximum number of provider probes in flight
    #[serde(default = "default_concurrency")]
    pub max_concurrent_probes: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout(),
            max_concurrent_probes: default_concurrency(),
        }
    }
}

impl SearchConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

fn default_api_port() -> u16 {
    9021
}

fn default_probe_timeout() -> u64 {
    30
}

fn default_concurrency() -> usize {
    4
}

impl ServiceConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ServiceConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.session.org.is_empty() {
            anyhow::bail!("session.org cannot be empty");
        }

        if !self.native.endpoint.contains("://") {
            anyhow::bail!("Invalid native endpoint: {}", self.native.endpoint);
        }

        if self.search.max_concurrent_probes == 0 {
            anyhow::bail!("search.max_concurrent_probes must be at least 1");
        }

        if self.search.probe_timeout_secs == 0 {
            anyhow::bail!("search.probe_timeout_secs must be at least 1");
        }

        let mut vdc_ids = HashSet::new();
        for org in &self.orgs {
            for vdc in &org.vdcs {
                if !vdc_ids.insert(vdc.id.as_str()) {
                    anyhow::bail!("duplicate vdc id: {}", vdc.id);
                }
                if vdc.container_provider == ProviderKind::External {
                    self.validate_external_vdc(&org.name, vdc)?;
                }
            }
        }

        Ok(())
    }

    /// An externally owned vdc needs a provider vdc and a matching account
    fn validate_external_vdc(&self, org: &str, vdc: &VdcConfig) -> anyhow::Result<()> {
        let external = self.external_service.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "vdc '{}' is owned by the external service but external_service is not configured",
                vdc.name
            )
        })?;

        let pvdc_id = vdc
            .provider_vdc
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("vdc '{}' has no provider_vdc", vdc.name))?;

        let pvdc = external
            .provider_vdcs
            .iter()
            .find(|p| p.id == pvdc_id)
            .ok_or_else(|| anyhow::anyhow!("unknown provider_vdc '{}'", pvdc_id))?;

        if external.account_for(org, &pvdc.compute_endpoint).is_none() {
            anyhow::bail!(
                "no external-service account for org '{}' on compute endpoint '{}'",
                org,
                pvdc.compute_endpoint
            );
        }

        Ok(())
    }

    /// Get native API token from config or environment
    pub fn get_native_token(&self) -> anyhow::Result<String> {
        self.native.token
            .clone()
            .or_else(|| std::env::var("NATIVE_API_TOKEN").ok())
            .ok_or_else(|| anyhow::anyhow!(
                "Native API token not found. Set NATIVE_API_TOKEN environment variable or specify in config"
            ))
    }

    /// Generate an example configuration file
    pub fn example() -> Self {
        Self {
            session: SessionContext::new("operator", "Acme"),
            native: NativeConfig {
                endpoint: "https://vcd.example.com/api/cluster".to_string(),
                token: None,
            },
            external_service: Some(ExternalServiceConfig {
                accounts: vec![AccountConfig {
                    name: "pks-account-1".to_string(),
                    host: "pks.example.com".to_string(),
                    port: 9021,
                    username: "broker".to_string(),
                    secret: None,
                    compute_endpoint: "vc1".to_string(),
                    org: None,
                }],
                provider_vdcs: vec![ProviderVdcConfig {
                    id: "pvdc-1".to_string(),
                    name: "pvdc-gold".to_string(),
                    compute_endpoint: "vc1".to_string(),
                    datacenter: "dc1".to_string(),
                    cluster: "cluster-a".to_string(),
                    cpi: "cpi-1".to_string(),
                }],
                network_managers: vec![NetworkManagerConfig {
                    compute_endpoint: "vc1".to_string(),
                    host: "nsxt.example.com".to_string(),
                    username: "admin".to_string(),
                    password: None,
                }],
            }),
            orgs: vec![OrgConfig {
                name: "Acme".to_string(),
                vdcs: vec![
                    VdcConfig {
                        id: "vdc-1".to_string(),
                        name: "vdc1".to_string(),
                        provider_vdc: Some("pvdc-1".to_string()),
                        container_provider: ProviderKind::Native,
                        plans: vec![],
                    },
                    VdcConfig {
                        id: "vdc-2".to_string(),
                        name: "vdc2".to_string(),
                        provider_vdc: Some("pvdc-1".to_string()),
                        container_provider: ProviderKind::External,
                        plans: vec!["small".to_string()],
                    },
                ],
            }],
            search: SearchConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let mut config = ServiceConfig::example();
        assert!(config.validate().is_ok());

        config.session.org = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_external_vdc_requires_account() {
        let mut config = ServiceConfig::example();
        if let Some(external) = config.external_service.as_mut() {
            external.accounts[0].compute_endpoint = "vc9".to_string();
        }
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("vc1"));

        let mut config = ServiceConfig::example();
        config.external_service = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dedicated_account_elsewhere_hides_shared_one() {
        let mut config = ServiceConfig::example();
        if let Some(external) = config.external_service.as_mut() {
            let mut dedicated = external.accounts[0].clone();
            dedicated.name = "other-only".to_string();
            dedicated.org = Some("Other".to_string());
            external.accounts.push(dedicated);
        }
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("'Acme'"));

        if let Some(external) = config.external_service.as_mut() {
            let mut dedicated = external.accounts[0].clone();
            dedicated.name = "acme-only".to_string();
            dedicated.org = Some("Acme".to_string());
            external.accounts.push(dedicated);
        }
        assert!(config.validate().is_ok());
        let external = config.external_service.as_ref().unwrap();
        assert_eq!(
            external.account_for("Acme", "vc1").map(|a| a.name.as_str()),
            Some("acme-only")
        );
    }

    #[test]
    fn test_duplicate_vdc_ids_rejected() {
        let mut config = ServiceConfig::example();
        let dup = config.orgs[0].vdcs[0].clone();
        config.orgs[0].vdcs.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_search_defaults_from_yaml() {
        let yaml = r#"
session:
  user: admin
  org: System
  sysadmin: true
native:
  endpoint: https://vcd.example.com/api/cluster
"#;
        let config: ServiceConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.session.is_sysadmin());
        assert_eq!(config.search.probe_timeout(), Duration::from_secs(30));
        assert_eq!(config.search.max_concurrent_probes, 4);
        assert!(config.external_service.is_none());
    }

    #[test]
    fn test_example_round_trips_through_yaml() {
        let yaml = serde_yaml::to_string(&ServiceConfig::example()).unwrap();
        let config: ServiceConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.orgs[0].vdcs.len(), 2);
        assert_eq!(
            config.orgs[0].vdcs[1].container_provider,
            ProviderKind::External
        );
    }
}
