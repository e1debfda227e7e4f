/// Projection of provider-native clusters into one common shape
use serde::{Deserialize, Serialize};

use crate::broker::models::{ExternalCluster, NativeCluster, ProviderCluster};
use crate::broker::ProviderKind;
use crate::directory::PROFILE_DELIMITER;

/// Provider-agnostic cluster record used by aggregated listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub name: String,
    pub vdc: Option<String>,
    pub status: Option<String>,
    pub container_provider: ProviderKind,
}

impl From<&NativeCluster> for ClusterRecord {
    fn from(cluster: &NativeCluster) -> Self {
        Self {
            name: cluster.name.clone(),
            vdc: cluster.vdc.clone(),
            status: cluster.status.clone(),
            container_provider: ProviderKind::Native,
        }
    }
}

impl From<&ExternalCluster> for ClusterRecord {
    fn from(cluster: &ExternalCluster) -> Self {
        Self {
            name: cluster.name.clone(),
            vdc: Some(vdc_from_compute_profile(
                cluster.compute_profile_name.as_deref(),
            )),
            status: Some(combined_status(
                cluster.last_action.as_deref(),
                cluster.status.as_deref(),
            )),
            container_provider: ProviderKind::External,
        }
    }
}

impl From<&ProviderCluster> for ClusterRecord {
    fn from(cluster: &ProviderCluster) -> Self {
        match cluster {
            ProviderCluster::Native(c) => c.into(),
            ProviderCluster::External(c) => c.into(),
        }
    }
}

/// The vdc name is the last segment of the compute profile name, e.g.
/// `cp--f3272127-9b7f-4f90-8849-0ee70a28be56--vdc-PKS1` belongs to `vdc-PKS1`.
pub fn vdc_from_compute_profile(profile: Option<&str>) -> String {
    profile
        .and_then(|p| p.rsplit(PROFILE_DELIMITER).next())
        .unwrap_or_default()
        .to_string()
}

/// External clusters keep last action and status apart; listings join them.
pub fn combined_status(last_action: Option<&str>, status: Option<&str>) -> String {
    format!(
        "{} {}",
        last_action.unwrap_or_default().to_lowercase(),
        status.unwrap_or_default().to_lowercase()
    )
}
