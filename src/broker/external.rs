/// External-service provider driver
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use super::client::ApiClient;
use super::models::{
    ClusterSpec, ComputeProfileParams, ComputeProfileRequest, ExternalCluster, ProviderCluster,
    ResizeSpec, TaskHandle,
};
use super::native::{not_found_as_missing, task_from_body};
use super::{Broker, ProviderKind};
use crate::directory::ProviderContext;
use crate::error::{Error, Result};

/// Driver bound to one external-service account
pub struct ExternalBroker {
    ctx: ProviderContext,
    client: ApiClient,
}

/// Cluster creation body of the external-service API
#[derive(Debug, Serialize)]
struct CreateClusterRequest<'a> {
    name: &'a str,
    plan_name: &'a str,
    parameters: CreateClusterParameters<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compute_profile_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CreateClusterParameters<'a> {
    kubernetes_master_host: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kubernetes_worker_instances: Option<u32>,
}

impl ExternalBroker {
    pub fn new(ctx: ProviderContext, timeout: Duration) -> Result<Self> {
        let authorization = ctx.secret.as_ref().map(|secret| {
            format!(
                "Basic {}",
                STANDARD.encode(format!("{}:{}", ctx.username, secret))
            )
        });
        let client = ApiClient::new(&ctx.api_url(), authorization.as_deref(), timeout)?;
        Ok(Self { ctx, client })
    }
}

#[async_trait]
impl Broker for ExternalBroker {
    fn kind(&self) -> ProviderKind {
        ProviderKind::External
    }

    fn endpoint(&self) -> String {
        format!("{} ({})", self.ctx.host, self.ctx.name)
    }

    async fn get_cluster_info(&self, name: &str) -> Result<ProviderCluster> {
        let cluster: ExternalCluster = self
            .client
            .get(&["clusters", name])
            .await
            .map_err(not_found_as_missing(name))?;
        Ok(ProviderCluster::External(cluster))
    }

    async fn list_clusters(&self) -> Result<Vec<ProviderCluster>> {
        let clusters: Vec<ExternalCluster> = self.client.get(&["clusters"]).await?;
        Ok(clusters.into_iter().map(ProviderCluster::External).collect())
    }

    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<ProviderCluster> {
        let plan_name = spec.plan.as_deref().ok_or_else(|| {
            Error::InvalidRequest("a plan is required for external-service clusters".to_string())
        })?;
        let master_host = spec.external_host.as_deref().ok_or_else(|| {
            Error::InvalidRequest(
                "an external host is required for external-service clusters".to_string(),
            )
        })?;

        info!(
            "Creating external cluster {} on {} with plan {}",
            spec.name, self.ctx.host, plan_name
        );

        let request = CreateClusterRequest {
            name: &spec.name,
            plan_name,
            parameters: CreateClusterParameters {
                kubernetes_master_host: master_host,
                kubernetes_worker_instances: spec.node_count,
            },
            compute_profile_name: self.ctx.compute_profile_name.as_deref(),
        };

        let cluster: ExternalCluster = self.client.post(&["clusters"], &request).await?;
        Ok(ProviderCluster::External(cluster))
    }

    async fn resize_cluster(
        &self,
        current: &ProviderCluster,
        spec: &ResizeSpec,
    ) -> Result<ProviderCluster> {
        info!(
            "Resizing external cluster {} to {} workers",
            current.name(),
            spec.node_count
        );
        let cluster: ExternalCluster = self
            .client
            .patch(
                &["clusters", current.name()],
                &serde_json::json!({ "kubernetes_worker_instances": spec.node_count }),
            )
            .await
            .map_err(not_found_as_missing(current.name()))?;
        Ok(ProviderCluster::External(cluster))
    }

    async fn delete_cluster(&self, name: &str) -> Result<TaskHandle> {
        info!("Deleting external cluster {} on {}", name, self.ctx.host);
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
            .post_text(
                &["clusters", name, "binds"],
                &serde_json::json!({ "user_name": self.ctx.username }),
            )
            .await
            .map_err(not_found_as_missing(name))
    }

    async fn create_compute_profile(&self, params: &ComputeProfileParams) -> Result<()> {
        debug!("Submitting compute profile {}", params);
        let request = ComputeProfileRequest::from(params);

        match self.client.post_text(&["compute-profiles"], &request).await {
            Ok(_) => Ok(()),
            Err(err) if err.api_status() == Some(409) => Err(Error::ProvisioningConflict {
                profile: params.cp_name.clone(),
            }),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ProviderContext {
        ProviderContext {
            name: "pks-account-1".into(),
            host: "pks.example.com".into(),
            port: 9021,
            username: "broker".into(),
            secret: Some("secret".into()),
            compute_endpoint: "vc1".into(),
            placement: None,
            compute_profile_name: Some("cp--vdc-2--vdc2".into()),
            plans: vec![],
            network: None,
        }
    }

    #[test]
    fn test_broker_creation() {
        let broker = ExternalBroker::new(context(), Duration::from_secs(30)).unwrap();
        assert_eq!(broker.kind(), ProviderKind::External);
        assert_eq!(broker.endpoint(), "pks.example.com (pks-account-1)");
    }

    #[tokio::test]
    async fn test_create_requires_plan() {
        let broker = ExternalBroker::new(context(), Duration::from_secs(1)).unwrap();
        let spec = ClusterSpec {
            name: "web".into(),
            external_host: Some("web.example.com".into()),
            ..Default::default()
        };
        let err = broker.create_cluster(&spec).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_create_request_body() {
        let request = CreateClusterRequest {
            name: "web",
            plan_name: "small",
            parameters: CreateClusterParameters {
                kubernetes_master_host: "web.example.com",
                kubernetes_worker_instances: Some(3),
            },
            compute_profile_name: Some("cp--vdc-2--vdc2"),
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["parameters"]["kubernetes_worker_instances"], 3);
        assert_eq!(body["compute_profile_name"], "cp--vdc-2--vdc2");
    }
}
