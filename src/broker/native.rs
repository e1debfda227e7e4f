/// Native-compute provider driver
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::client::ApiClient;
use super::models::{
    ClusterSpec, ComputeProfileParams, NativeCluster, ProviderCluster, ResizeSpec, TaskHandle,
};
use super::{Broker, ProviderKind};
use crate::error::{Error, Result};

/// Driver for the platform's own cluster API
#[derive(Clone)]
pub struct NativeBroker {
    client: ApiClient,
}

impl NativeBroker {
    pub fn new(endpoint: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = ApiClient::new(endpoint, Some(&format!("Bearer {}", token)), timeout)?;
        Ok(Self { client })
    }
}

/// Map a 404 from the provider to a missing cluster
pub(crate) fn not_found_as_missing(name: &str) -> impl FnOnce(Error) -> Error + '_ {
    move |err| match err.api_status() {
        Some(404) => Error::ClusterNotFound {
            name: name.to_string(),
        },
        _ => err,
    }
}

/// Task handle from a DELETE body, falling back to the resource URL
pub(crate) fn task_from_body(body: &str, resource: &str) -> TaskHandle {
    serde_json::from_str(body).unwrap_or_else(|_| TaskHandle {
        task_href: resource.to_string(),
    })
}

#[async_trait]
impl Broker for NativeBroker {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Native
    }

    fn endpoint(&self) -> String {
        self.client.base_url().to_string()
    }

    async fn get_cluster_info(&self, name: &str) -> Result<ProviderCluster> {
        let cluster: NativeCluster = self
            .client
            .get(&["clusters", name])
            .await
            .map_err(not_found_as_missing(name))?;
        Ok(ProviderCluster::Native(cluster))
    }

    async fn list_clusters(&self) -> Result<Vec<ProviderCluster>> {
        let clusters: Vec<NativeCluster> = self.client.get(&["clusters"]).await?;
        Ok(clusters.into_iter().map(ProviderCluster::Native).collect())
    }

    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<ProviderCluster> {
        info!("Creating native cluster: {}", spec.name);
        let cluster: NativeCluster = self.client.post(&["clusters"], spec).await?;
        Ok(ProviderCluster::Native(cluster))
    }

    async fn resize_cluster(
        &self,
        current: &ProviderCluster,
        spec: &ResizeSpec,
    ) -> Result<ProviderCluster> {
        info!(
            "Resizing native cluster {} to {} nodes",
            current.name(),
            spec.node_count
        );
        let cluster: NativeCluster = self
            .client
            .patch(
                &["clusters", current.name()],
                &serde_json::json!({ "node_count": spec.node_count }),
            )
            .await
            .map_err(not_found_as_missing(current.name()))?;
        Ok(ProviderCluster::Native(cluster))
    }

    async fn delete_cluster(&self, name: &str) -> Result<TaskHandle> {
        info!("Deleting native cluster: {}", name);
        let resource = format!("clusters/{}", name);
        let body = self
            .client
            .delete(&["clusters", name])
            .await
            .map_err(not_found_as_missing(name))?;
        Ok(task_from_body(&body, &resource))
    }

    async fn get_cluster_config(&self, name: &str) -> Result<String> {
        self.client
            .get_text(&["clusters", name, "config"])
            .await
            .map_err(not_found_as_missing(name))
    }

    async fn create_compute_profile(&self, params: &ComputeProfileParams) -> Result<()> {
        Err(Error::Configuration(format!(
            "compute profile {} requested from the native provider",
            params.cp_name
        )))
    }
}
