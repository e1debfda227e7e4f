/// Dispatch of cluster operations across provider drivers
pub mod accounts;
pub mod compute_profile;
pub mod normalize;
pub mod search;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::broker::models::{ClusterSpec, ResizeSpec};
use crate::broker::{Broker, BrokerFactory, ProviderKind};
use crate::config::SearchConfig;
use crate::directory::{Directory, LookupFlags, ProviderContext};
use crate::error::{Error, Result};
use crate::session::SessionContext;
use accounts::{AccountEnumerator, OwnershipCache};
use normalize::ClusterRecord;
use search::Hit;

/// The nine operations the dispatcher handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateCluster,
    DeleteCluster,
    GetCluster,
    ListClusters,
    ResizeCluster,
    ListOvdcs,
    EnableOvdc,
    InfoOvdc,
    GetClusterConfig,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::CreateCluster => "create cluster",
            Operation::DeleteCluster => "delete cluster",
            Operation::GetCluster => "get cluster info",
            Operation::ListClusters => "list clusters",
            Operation::ResizeCluster => "resize cluster",
            Operation::ListOvdcs => "list ovdcs",
            Operation::EnableOvdc => "enable ovdc",
            Operation::InfoOvdc => "info ovdc",
            Operation::GetClusterConfig => "get cluster config",
        };
        write!(f, "{}", name)
    }
}

/// Flat request parameters of one operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationRequest {
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub vdc: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub node_count: Option<u32>,
    /// Target provider of an enable-vdc request
    #[serde(default)]
    pub container_provider: Option<ProviderKind>,
    #[serde(default)]
    pub ovdc_id: Option<String>,
    #[serde(default)]
    pub ovdc_name: Option<String>,
    #[serde(default)]
    pub org_name: Option<String>,
    /// External-service plans to bind on enable
    #[serde(default)]
    pub plans: Vec<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub external_host: Option<String>,
    #[serde(default)]
    pub storage_profile: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
}

impl OperationRequest {
    pub fn for_cluster(name: impl Into<String>) -> Self {
        Self {
            cluster_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn in_vdc(mut self, vdc: impl Into<String>) -> Self {
        self.vdc = Some(vdc.into());
        self
    }

    pub fn in_org(mut self, org: impl Into<String>) -> Self {
        self.org = Some(org.into());
        self
    }

    pub fn with_node_count(mut self, count: u32) -> Self {
        self.node_count = Some(count);
        self
    }

    fn cluster_name(&self) -> Result<&str> {
        self.cluster_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::InvalidRequest("cluster_name is required".to_string()))
    }

    fn ovdc_id(&self) -> Result<&str> {
        self.ovdc_id
            .as_deref()
            .ok_or_else(|| Error::InvalidRequest("ovdc_id is required".to_string()))
    }

    fn cluster_spec(&self) -> Result<ClusterSpec> {
        Ok(ClusterSpec {
            name: self.cluster_name()?.to_string(),
            vdc: self.vdc.clone(),
            node_count: self.node_count,
            storage_profile: self.storage_profile.clone(),
            network: self.network.clone(),
            template: self.template.clone(),
            plan: self.plan.clone(),
            external_host: self.external_host.clone(),
        })
    }
}

/// Completion mode of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    /// Completed synchronously
    Ok,
    /// An asynchronous task was started
    Accepted,
}

/// Result of one dispatch
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub body: Value,
    pub status_code: StatusCode,
}

impl Response {
    fn ok(body: Value) -> Self {
        Self {
            body,
            status_code: StatusCode::Ok,
        }
    }

    fn accepted(body: Value) -> Self {
        Self {
            body,
            status_code: StatusCode::Accepted,
        }
    }
}

/// Routes operations to the driver owning, or able to own, the cluster.
///
/// Holds no per-request state: every `invoke` builds a fresh [`Dispatch`]
/// whose ownership cache is dropped when the call returns.
pub struct BrokerManager {
    directory: Arc<dyn Directory>,
    brokers: Arc<dyn BrokerFactory>,
    session: SessionContext,
    search: SearchConfig,
}

impl BrokerManager {
    pub fn new(
        directory: Arc<dyn Directory>,
        brokers: Arc<dyn BrokerFactory>,
        session: SessionContext,
        search: SearchConfig,
    ) -> Self {
        Self {
            directory,
            brokers,
            session,
            search,
        }
    }

    /// Perform `op` with the parameters in `request`
    pub async fn invoke(&self, op: Operation, request: &OperationRequest) -> Result<Response> {
        debug!("invoking {} for {}", op, self.session.user);
        let dispatch = Dispatch {
            manager: self,
            request,
            cache: OwnershipCache::default(),
        };

        match op {
            Operation::InfoOvdc => dispatch.info_ovdc().await,
            Operation::EnableOvdc => dispatch.enable_ovdc().await,
            Operation::ListOvdcs => dispatch.list_ovdcs().await,
            Operation::GetCluster => dispatch.get_cluster().await,
            Operation::ListClusters => dispatch.list_clusters().await,
            Operation::DeleteCluster => dispatch.delete_cluster().await,
            Operation::ResizeCluster => dispatch.resize_cluster().await,
            Operation::GetClusterConfig => dispatch.get_cluster_config().await,
            Operation::CreateCluster => dispatch.create_cluster().await,
        }
    }
}

/// State of a single `invoke` call
struct Dispatch<'a> {
    manager: &'a BrokerManager,
    request: &'a OperationRequest,
    cache: OwnershipCache,
}

impl Dispatch<'_> {
    fn directory(&self) -> &dyn Directory {
        self.manager.directory.as_ref()
    }

    fn brokers(&self) -> &dyn BrokerFactory {
        self.manager.brokers.as_ref()
    }

    fn session(&self) -> &SessionContext {
        &self.manager.session
    }

    fn vdc_in_request(&self) -> bool {
        self.request.vdc.as_deref().is_some_and(|v| !v.is_empty())
    }

    async fn info_ovdc(&self) -> Result<Response> {
        let ownership = self
            .directory()
            .get_ownership_by_id(self.request.ovdc_id()?)
            .await?;
        Ok(Response::ok(serde_json::to_value(ownership)?))
    }

    /// Bind a vdc to a provider, provisioning its compute profile first
    /// when the target is the external service
    async fn enable_ovdc(&self) -> Result<Response> {
        let provider = self.request.container_provider.ok_or_else(|| {
            Error::InvalidRequest("container_provider is required".to_string())
        })?;
        let vdc = self.directory().get_vdc(self.request.ovdc_id()?).await?;
        let org = self.request.org_name.clone().unwrap_or_else(|| vdc.org.clone());
        if let Some(name) = self.request.ovdc_name.as_deref() {
            if name != vdc.name {
                return Err(Error::InvalidRequest(format!(
                    "ovdc_name '{}' does not match vdc '{}' with id {}",
                    name, vdc.name, vdc.id
                )));
            }
        }

        let context = match provider {
            ProviderKind::External => {
                if !self.directory().external_configured() {
                    return Err(Error::Configuration(
                        "external service config does not exist".to_string(),
                    ));
                }
                let ctx = self
                    .directory()
                    .external_context_for_vdc(&vdc, &org, &self.request.plans)
                    .await?;
                let params = compute_profile::profile_params(&ctx, &org, &vdc)?;
                let broker = self.brokers().external(&ctx)?;
                compute_profile::ensure_compute_profile(broker.as_ref(), &params).await?;
                Some(ctx)
            }
            ProviderKind::Native | ProviderKind::Unset => None,
        };

        let task = self
            .directory()
            .set_ownership(&vdc, provider, context)
            .await?;
        info!("vdc {} enable task: {}", vdc.name, task.task_href);
        Ok(Response::accepted(json!({ "task_href": task.task_href })))
    }

    /// Every vdc of every org for sysadmins, else of the session org
    async fn list_ovdcs(&self) -> Result<Response> {
        let orgs = if self.session().is_sysadmin() {
            self.directory().list_orgs().await?
        } else {
            vec![self.session().org.clone()]
        };

        let mut ovdcs = Vec::new();
        for org in &orgs {
            for vdc in self.directory().list_vdcs(org).await? {
                let ownership = self
                    .cache
                    .get(self.directory(), &vdc.name, org, LookupFlags::PLAIN)
                    .await?;
                ovdcs.push(json!({
                    "org": org,
                    "name": vdc.name,
                    "container_provider": ownership.container_provider,
                }));
            }
        }

        Ok(Response::ok(Value::Array(ovdcs)))
    }

    async fn get_cluster(&self) -> Result<Response> {
        let hit = self.cluster_info(self.request.cluster_name()?).await?;
        Ok(Response::ok(serde_json::to_value(&hit.cluster)?))
    }

    async fn list_clusters(&self) -> Result<Response> {
        if self.vdc_in_request() {
            let broker = self.broker_for_vdc().await?;
            let clusters = broker.list_clusters().await?;
            return Ok(Response::ok(serde_json::to_value(clusters)?));
        }

        let records = self.aggregate_clusters().await?;
        Ok(Response::ok(serde_json::to_value(records)?))
    }

    async fn delete_cluster(&self) -> Result<Response> {
        let name = self.request.cluster_name()?;
        let hit = self.cluster_info(name).await?;
        let task = hit.broker.delete_cluster(name).await?;
        Ok(Response::accepted(serde_json::to_value(task)?))
    }

    async fn resize_cluster(&self) -> Result<Response> {
        let name = self.request.cluster_name()?;
        let node_count = self
            .request
            .node_count
            .ok_or_else(|| Error::InvalidRequest("node_count is required".to_string()))?;
        let hit = self.cluster_info(name).await?;
        let spec = ResizeSpec {
            name: name.to_string(),
            node_count,
        };
        let cluster = hit.broker.resize_cluster(&hit.cluster, &spec).await?;
        Ok(Response::accepted(serde_json::to_value(cluster)?))
    }

    async fn get_cluster_config(&self) -> Result<Response> {
        let name = self.request.cluster_name()?;
        let config = if self.vdc_in_request() {
            self.broker_for_vdc().await?.get_cluster_config(name).await?
        } else {
            let hit = self
                .find_cluster(name)
                .await?
                .ok_or_else(|| Error::ClusterNotFound {
                    name: name.to_string(),
                })?;
            hit.broker.get_cluster_config(hit.cluster.name()).await?
        };
        Ok(Response::ok(Value::String(config)))
    }

    /// Reject names already taken on any reachable provider, then create
    /// on the destination named by the request
    async fn create_cluster(&self) -> Result<Response> {
        let spec = self.request.cluster_spec()?;
        if let Some(existing) = self.find_cluster(&spec.name).await? {
            info!(
                "Cluster {} already exists on {} provider {}",
                spec.name,
                existing.broker.kind(),
                existing.broker.endpoint()
            );
            return Err(Error::DuplicateCluster { name: spec.name });
        }

        let broker = self.broker_for_vdc().await?;
        let cluster = broker.create_cluster(&spec).await?;
        Ok(Response::accepted(serde_json::to_value(cluster)?))
    }

    /// Resolve `name` directly when the request names a vdc, by search otherwise
    async fn cluster_info(&self, name: &str) -> Result<Hit> {
        if self.vdc_in_request() {
            let broker = self.broker_for_vdc().await?;
            let cluster = broker.get_cluster_info(name).await?;
            return Ok(Hit { cluster, broker });
        }

        self.find_cluster(name)
            .await?
            .ok_or_else(|| Error::ClusterNotFound {
                name: name.to_string(),
            })
    }

    /// Search the native provider, then every reachable external account
    async fn find_cluster(&self, name: &str) -> Result<Option<Hit>> {
        let settings = &self.manager.search;
        let native = self.brokers().native()?;
        if let Some(cluster) = search::probe(&native, name, settings.probe_timeout()).await {
            return Ok(Some(Hit {
                cluster,
                broker: native,
            }));
        }

        let externals = self.external_brokers().await?;
        Ok(search::first_hit(externals, name, settings).await)
    }

    async fn external_brokers(&self) -> Result<Vec<Arc<dyn Broker>>> {
        let accounts =
            AccountEnumerator::new(self.directory(), self.session(), &self.cache)
                .accounts()
                .await?;
        accounts
            .iter()
            .map(|ctx| self.brokers().external(ctx))
            .collect()
    }

    /// Common-shape records of every reachable provider, native first.
    ///
    /// Providers that fail or time out are skipped, as is the external side
    /// when its accounts cannot be enumerated. If every listed provider
    /// failed the last failure is returned.
    async fn aggregate_clusters(&self) -> Result<Vec<ClusterRecord>> {
        let settings = &self.manager.search;
        let native = self.brokers().native()?;
        let native_endpoint = native.endpoint();

        let (native_listing, external_listings) = tokio::join!(
            search::with_timeout(
                &native_endpoint,
                settings.probe_timeout(),
                native.list_clusters()
            ),
            async {
                match self.external_brokers().await {
                    Ok(brokers) => search::list_all(brokers, settings).await,
                    Err(e) => {
                        warn!("Enumerating external accounts failed: {}", e);
                        vec![]
                    }
                }
            },
        );

        let listings = std::iter::once((native.clone(), native_listing)).chain(external_listings);

        let mut records = Vec::new();
        let mut succeeded = 0usize;
        let mut last_error = None;
        for (broker, listing) in listings {
            match listing {
                Ok(clusters) => {
                    succeeded += 1;
                    records.extend(clusters.iter().map(ClusterRecord::from));
                }
                Err(e) => {
                    warn!("Listing clusters on {} failed: {}", broker.endpoint(), e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if succeeded == 0 => Err(e),
            _ => Ok(records),
        }
    }

    /// Driver for the vdc named in the request.
    ///
    /// Without a vdc the native provider is the destination.
    async fn broker_for_vdc(&self) -> Result<Arc<dyn Broker>> {
        let vdc = self.request.vdc.as_deref().filter(|v| !v.is_empty());
        let org = self
            .request
            .org
            .as_deref()
            .filter(|o| !o.is_empty())
            .unwrap_or(&self.session().org);

        let Some(vdc) = vdc else {
            return self.brokers().native();
        };

        debug!("org_name={};vdc_name='{}'", org, vdc);
        let ownership = self
            .cache
            .get(self.directory(), vdc, org, LookupFlags::FULL)
            .await?;

        match ownership.container_provider {
            ProviderKind::External => {
                let ctx: ProviderContext = ownership.context.ok_or_else(|| {
                    Error::Configuration(format!(
                        "vdc '{}' is owned by the external service but has no account context",
                        vdc
                    ))
                })?;
                self.brokers().external(&ctx)
            }
            ProviderKind::Native => self.brokers().native(),
            ProviderKind::Unset => Err(Error::Configuration(format!(
                "vdc '{}' is not enabled for Kubernetes cluster deployment",
                vdc
            ))),
        }
    }
}
