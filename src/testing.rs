/// Fake drivers and directory fixtures shared by unit tests
use async_trait::async_trait;
use serde_json::Map;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::broker::models::{
    ClusterSpec, ComputeProfileParams, ExternalCluster, NativeCluster, ProviderCluster,
    ResizeSpec, TaskHandle,
};
use crate::broker::{Broker, BrokerFactory, ProviderKind};
use crate::config::{
    AccountConfig, ExternalServiceConfig, OrgConfig, ProviderVdcConfig, VdcConfig,
};
use crate::directory::{InMemoryDirectory, ProviderContext};
use crate::error::{Error, Result};

/// Driver double recording every call it receives
pub struct FakeBroker {
    kind: ProviderKind,
    endpoint: String,
    clusters: Mutex<Vec<ProviderCluster>>,
    delay: Mutex<Option<Duration>>,
    failing: AtomicBool,
    profile_conflict: AtomicBool,
    calls: Mutex<Vec<String>>,
    journal: Mutex<Option<Journal>>,
}

/// Call log shared by several fakes, entries prefixed with the endpoint
pub type Journal = Arc<Mutex<Vec<String>>>;

impl FakeBroker {
    fn new(kind: ProviderKind, endpoint: &str) -> Arc<Self> {
        Arc::new(Self {
            kind,
            endpoint: endpoint.to_string(),
            clusters: Mutex::new(vec![]),
            delay: Mutex::new(None),
            failing: AtomicBool::new(false),
            profile_conflict: AtomicBool::new(false),
            calls: Mutex::new(vec![]),
            journal: Mutex::new(None),
        })
    }

    pub fn native() -> Arc<Self> {
        Self::new(ProviderKind::Native, "native")
    }

    pub fn external(endpoint: &str) -> Arc<Self> {
        Self::new(ProviderKind::External, endpoint)
    }

    /// Add a cluster of this driver's shape
    pub fn with_cluster(self: Arc<Self>, name: &str) -> Arc<Self> {
        let cluster = match self.kind {
            ProviderKind::External => ProviderCluster::External(ExternalCluster {
                name: name.to_string(),
                status: Some("SUCCEEDED".to_string()),
                last_action: Some("CREATE".to_string()),
                compute_profile_name: Some(format!("cp--{}-id--vdc-{}", self.endpoint, self.endpoint)),
                extra: Map::new(),
            }),
            _ => ProviderCluster::Native(NativeCluster {
                name: name.to_string(),
                vdc: Some("vdc1".to_string()),
                status: Some("POWERED_ON".to_string()),
                extra: Map::new(),
            }),
        };
        self.with_record(cluster)
    }

    pub fn with_record(self: Arc<Self>, cluster: ProviderCluster) -> Arc<Self> {
        self.clusters.lock().unwrap().push(cluster);
        self
    }

    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn failing(self: Arc<Self>) -> Arc<Self> {
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_profile_conflict(self: Arc<Self>) -> Arc<Self> {
        self.profile_conflict.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_journal(self: Arc<Self>, journal: &Journal) -> Arc<Self> {
        *self.journal.lock().unwrap() = Some(journal.clone());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        if let Some(journal) = self.journal.lock().unwrap().as_ref() {
            journal
                .lock()
                .unwrap()
                .push(format!("{}: {}", self.endpoint, call));
        }
        self.calls.lock().unwrap().push(call);
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_failing(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Api {
                status: 503,
                message: format!("{} unavailable", self.endpoint),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Broker for FakeBroker {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn get_cluster_info(&self, name: &str) -> Result<ProviderCluster> {
        self.record(format!("get {}", name));
        self.pause().await;
        self.check_failing()?;
        self.clusters
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .ok_or_else(|| Error::ClusterNotFound {
                name: name.to_string(),
            })
    }

    async fn list_clusters(&self) -> Result<Vec<ProviderCluster>> {
        self.record("list".to_string());
        self.pause().await;
        self.check_failing()?;
        Ok(self.clusters.lock().unwrap().clone())
    }

    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<ProviderCluster> {
        self.record(format!("create {}", spec.name));
        self.check_failing()?;
        let cluster = ProviderCluster::Native(NativeCluster {
            name: spec.name.clone(),
            vdc: spec.vdc.clone(),
            status: Some("CREATING".to_string()),
            extra: Map::new(),
        });
        self.clusters.lock().unwrap().push(cluster.clone());
        Ok(cluster)
    }

    async fn resize_cluster(
        &self,
        current: &ProviderCluster,
        spec: &ResizeSpec,
    ) -> Result<ProviderCluster> {
        self.record(format!("resize {} {}", current.name(), spec.node_count));
        self.check_failing()?;
        Ok(current.clone())
    }

    async fn delete_cluster(&self, name: &str) -> Result<TaskHandle> {
        self.record(format!("delete {}", name));
        self.check_failing()?;
        Ok(TaskHandle {
            task_href: format!("{}/task/delete-{}", self.endpoint, name),
        })
    }

    async fn get_cluster_config(&self, name: &str) -> Result<String> {
        self.record(format!("config {}", name));
        self.check_failing()?;
        Ok(format!("kubeconfig of {} on {}", name, self.endpoint))
    }

    async fn create_compute_profile(&self, params: &ComputeProfileParams) -> Result<()> {
        self.record(format!("profile {}", params.cp_name));
        self.check_failing()?;
        if self.profile_conflict.load(Ordering::SeqCst) {
            return Err(Error::ProvisioningConflict {
                profile: params.cp_name.clone(),
            });
        }
        Ok(())
    }
}

/// Factory handing out fakes; external drivers are keyed by account name
pub struct FakeFactory {
    native: Arc<FakeBroker>,
    external: HashMap<String, Arc<FakeBroker>>,
}

impl FakeFactory {
    pub fn new(native: Arc<FakeBroker>) -> Self {
        Self {
            native,
            external: HashMap::new(),
        }
    }

    pub fn with_account(mut self, account: &str, broker: Arc<FakeBroker>) -> Self {
        self.external.insert(account.to_string(), broker);
        self
    }
}

impl BrokerFactory for FakeFactory {
    fn native(&self) -> Result<Arc<dyn Broker>> {
        let broker: Arc<dyn Broker> = self.native.clone();
        Ok(broker)
    }

    fn external(&self, ctx: &ProviderContext) -> Result<Arc<dyn Broker>> {
        let broker: Arc<dyn Broker> = self.external.get(&ctx.name).cloned().ok_or_else(|| {
            Error::Configuration(format!("no fake driver for account {}", ctx.name))
        })?;
        Ok(broker)
    }
}

/// Shared account on compute endpoint `endpoint`, or dedicated to `org`
pub fn account(name: &str, endpoint: &str, org: Option<&str>) -> AccountConfig {
    AccountConfig {
        name: name.to_string(),
        host: format!("{}.example.com", name),
        port: 9021,
        username: "broker".to_string(),
        secret: Some(format!("{}-secret", name)),
        compute_endpoint: endpoint.to_string(),
        org: org.map(String::from),
    }
}

pub fn native_vdc(name: &str) -> VdcConfig {
    VdcConfig {
        id: format!("{}-id", name),
        name: name.to_string(),
        provider_vdc: Some("pvdc-1".to_string()),
        container_provider: ProviderKind::Native,
        plans: vec![],
    }
}

pub fn external_vdc(name: &str, provider_vdc: &str) -> VdcConfig {
    VdcConfig {
        id: format!("{}-id", name),
        name: name.to_string(),
        provider_vdc: Some(provider_vdc.to_string()),
        container_provider: ProviderKind::External,
        plans: vec!["small".to_string()],
    }
}

pub fn unset_vdc(name: &str) -> VdcConfig {
    VdcConfig {
        container_provider: ProviderKind::Unset,
        ..native_vdc(name)
    }
}

/// Directory with one org. Provider vdcs `pvdc-N` sit on compute endpoint
/// `vcN`; external config exists only when `accounts` is non-empty.
pub fn directory_with(
    org: &str,
    vdcs: Vec<VdcConfig>,
    accounts: Vec<AccountConfig>,
) -> InMemoryDirectory {
    let external = (!accounts.is_empty()).then(|| ExternalServiceConfig {
        accounts,
        provider_vdcs: (1..=4)
            .map(|n| ProviderVdcConfig {
                id: format!("pvdc-{}", n),
                name: format!("pvdc-{}", n),
                compute_endpoint: format!("vc{}", n),
                datacenter: format!("dc{}", n),
                cluster: format!("cluster-{}", n),
                cpi: format!("cpi-{}", n),
            })
            .collect(),
        network_managers: vec![],
    });

    InMemoryDirectory::new(
        &[OrgConfig {
            name: org.to_string(),
            vdcs,
        }],
        external,
    )
}
