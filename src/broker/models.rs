/// Provider driver data models
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Cluster as reported by the native-compute provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeCluster {
    pub name: String,
    #[serde(default)]
    pub vdc: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Remaining provider fields, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Cluster as reported by an external-service account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCluster {
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "last-action", default)]
    pub last_action: Option<String>,
    #[serde(rename = "compute-profile-name", default)]
    pub compute_profile_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Provider-native cluster record in either raw shape
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProviderCluster {
    Native(NativeCluster),
    External(ExternalCluster),
}

impl ProviderCluster {
    pub fn name(&self) -> &str {
        match self {
            ProviderCluster::Native(c) => &c.name,
            ProviderCluster::External(c) => &c.name,
        }
    }
}

/// Parameters for creating a cluster
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vdc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// External-service plan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// External-service master host name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_host: Option<String>,
}

/// Parameters for resizing a cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeSpec {
    pub name: String,
    pub node_count: u32,
}

/// Handle of an asynchronous task started by a provider or the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_href: String,
}

/// One-time placement descriptor for an external-service vdc
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeProfileParams {
    pub cp_name: String,
    pub az_name: String,
    pub description: String,
    pub cpi: String,
    pub datacenter_name: String,
    pub cluster_name: String,
    pub ovdc_rp_name: String,
}

impl std::fmt::Display for ComputeProfileParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cp_name:{}, az_name:{}, description:{}, cpi:{}, datacenter_name:{}, cluster_name:{}, ovdc_rp_name:{}",
            self.cp_name,
            self.az_name,
            self.description,
            self.cpi,
            self.datacenter_name,
            self.cluster_name,
            self.ovdc_rp_name
        )
    }
}

/// Compute profile request body of the external-service API
#[derive(Debug, Serialize)]
pub struct ComputeProfileRequest {
    pub name: String,
    pub description: String,
    pub parameters: ComputeProfileParameters,
}

#[derive(Debug, Serialize)]
pub struct ComputeProfileParameters {
    pub azs: Vec<AvailabilityZone>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityZone {
    pub name: String,
    pub cpi: String,
    pub cloud_properties: CloudProperties,
}

#[derive(Debug, Serialize)]
pub struct CloudProperties {
    pub datacenters: Vec<DatacenterPlacement>,
}

#[derive(Debug, Serialize)]
pub struct DatacenterPlacement {
    pub name: String,
    pub clusters: Vec<std::collections::BTreeMap<String, ResourcePool>>,
}

#[derive(Debug, Serialize)]
pub struct ResourcePool {
    pub resource_pool: String,
}

impl From<&ComputeProfileParams> for ComputeProfileRequest {
    fn from(params: &ComputeProfileParams) -> Self {
        let cluster = [(
            params.cluster_name.clone(),
            ResourcePool {
                resource_pool: params.ovdc_rp_name.clone(),
            },
        )]
        .into_iter()
        .collect();

        Self {
            name: params.cp_name.clone(),
            description: params.description.clone(),
            parameters: ComputeProfileParameters {
                azs: vec![AvailabilityZone {
                    name: params.az_name.clone(),
                    cpi: params.cpi.clone(),
                    cloud_properties: CloudProperties {
                        datacenters: vec![DatacenterPlacement {
                            name: params.datacenter_name.clone(),
                            clusters: vec![cluster],
                        }],
                    },
                }],
            },
        }
    }
}

/// Error response from a provider API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ApiError,
}

/// API error details
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}
