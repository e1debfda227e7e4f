/// Provider driver contract and its REST implementations
pub mod client;
pub mod external;
pub mod models;
pub mod native;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::directory::ProviderContext;
use crate::error::Result;
use models::{ClusterSpec, ComputeProfileParams, ProviderCluster, ResizeSpec, TaskHandle};

pub use external::ExternalBroker;
pub use native::NativeBroker;

/// Which backend owns a virtual datacenter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// The platform's own cluster hosting
    Native,
    /// Third-party managed cluster service reached through accounts
    External,
    #[default]
    #[serde(rename = "none")]
    Unset,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Native => write!(f, "native"),
            ProviderKind::External => write!(f, "external"),
            ProviderKind::Unset => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(ProviderKind::Native),
            "external" => Ok(ProviderKind::External),
            "none" | "unset" => Ok(ProviderKind::Unset),
            other => Err(format!(
                "unknown provider '{}', expected one of: native, external, none",
                other
            )),
        }
    }
}

/// Uniform operation contract implemented once per provider kind.
///
/// The dispatcher only ever talks to backends through this trait.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Provider kind this driver talks to
    fn kind(&self) -> ProviderKind;

    /// Human readable endpoint, used in logs
    fn endpoint(&self) -> String;

    /// Fetch one cluster. Missing clusters yield `Error::ClusterNotFound`.
    async fn get_cluster_info(&self, name: &str) -> Result<ProviderCluster>;

    /// Provider-native records of every cluster visible to this driver
    async fn list_clusters(&self) -> Result<Vec<ProviderCluster>>;

    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<ProviderCluster>;

    /// Resize using the record resolved by a previous lookup
    async fn resize_cluster(
        &self,
        current: &ProviderCluster,
        spec: &ResizeSpec,
    ) -> Result<ProviderCluster>;

    async fn delete_cluster(&self, name: &str) -> Result<TaskHandle>;

    /// Opaque kubeconfig blob
    async fn get_cluster_config(&self, name: &str) -> Result<String>;

    /// Submit a compute profile. An existing profile yields
    /// `Error::ProvisioningConflict`.
    async fn create_compute_profile(&self, params: &ComputeProfileParams) -> Result<()>;
}

/// Builds drivers for the dispatcher.
pub trait BrokerFactory: Send + Sync {
    /// The single native-compute driver
    fn native(&self) -> Result<Arc<dyn Broker>>;

    /// A driver bound to one external-service account
    fn external(&self, ctx: &ProviderContext) -> Result<Arc<dyn Broker>>;
}

/// Factory producing the REST drivers from configuration
pub struct RestBrokerFactory {
    native: Arc<NativeBroker>,
    timeout: std::time::Duration,
}

impl RestBrokerFactory {
    pub fn new(native: NativeBroker, timeout: std::time::Duration) -> Self {
        Self {
            native: Arc::new(native),
            timeout,
        }
    }
}

impl BrokerFactory for RestBrokerFactory {
    fn native(&self) -> Result<Arc<dyn Broker>> {
        let broker: Arc<dyn Broker> = self.native.clone();
        Ok(broker)
    }

    fn external(&self, ctx: &ProviderContext) -> Result<Arc<dyn Broker>> {
        let broker: Arc<dyn Broker> = Arc::new(ExternalBroker::new(ctx.clone(), self.timeout)?);
        Ok(broker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("native".parse::<ProviderKind>(), Ok(ProviderKind::Native));
        assert_eq!("External".parse::<ProviderKind>(), Ok(ProviderKind::External));
        assert_eq!("none".parse::<ProviderKind>(), Ok(ProviderKind::Unset));
        assert!("vsphere".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_kind_serde() {
        let json = serde_json::to_string(&ProviderKind::Unset).unwrap();
        assert_eq!(json, "\"none\"");
        let kind: ProviderKind = serde_json::from_str("\"external\"").unwrap();
        assert_eq!(kind, ProviderKind::External);
    }
}
