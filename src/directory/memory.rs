/// In-memory directory seeded from the service configuration
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

use super::{
    compute_profile_name, AccountScope, Directory, LookupFlags, NetworkManagerInfo, Placement,
    ProviderContext, ProviderOwnership, VdcRef,
};
use crate::broker::models::TaskHandle;
use crate::broker::ProviderKind;
use crate::config::{AccountConfig, ExternalServiceConfig, OrgConfig, ServiceConfig};
use crate::error::{Error, Result};

/// Ownership record of one vdc
#[derive(Debug, Clone)]
struct VdcEntry {
    vdc: VdcRef,
    provider_vdc: Option<String>,
    provider: ProviderKind,
    plans: Vec<String>,
    /// Context persisted by `set_ownership`; derived from config when absent
    context: Option<ProviderContext>,
}

/// Directory answering lookups from configuration, with ownership changes
/// kept in memory for the lifetime of the process
#[derive(Debug)]
pub struct InMemoryDirectory {
    orgs: Vec<String>,
    vdcs: RwLock<Vec<VdcEntry>>,
    external: Option<ExternalServiceConfig>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::Directory("directory lock poisoned".to_string())
}

impl InMemoryDirectory {
    pub fn new(orgs: &[OrgConfig], external: Option<ExternalServiceConfig>) -> Self {
        let vdcs = orgs
            .iter()
            .flat_map(|org| {
                org.vdcs.iter().map(move |vdc| VdcEntry {
                    vdc: VdcRef {
                        id: vdc.id.clone(),
                        name: vdc.name.clone(),
                        org: org.name.clone(),
                    },
                    provider_vdc: vdc.provider_vdc.clone(),
                    provider: vdc.container_provider,
                    plans: vdc.plans.clone(),
                    context: None,
                })
            })
            .collect();

        Self {
            orgs: orgs.iter().map(|o| o.name.clone()).collect(),
            vdcs: RwLock::new(vdcs),
            external,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(&config.orgs, config.external_service.clone())
    }

    fn external_config(&self) -> Result<&ExternalServiceConfig> {
        self.external.as_ref().ok_or_else(|| {
            Error::Configuration("external service config does not exist".to_string())
        })
    }

    fn find_entry<F>(&self, predicate: F) -> Result<Option<VdcEntry>>
    where
        F: Fn(&VdcEntry) -> bool,
    {
        let vdcs = self.vdcs.read().map_err(poison_err)?;
        Ok(vdcs.iter().find(|e| predicate(e)).cloned())
    }

    fn find_account(&self, org: &str, compute_endpoint: &str) -> Result<&AccountConfig> {
        self.external_config()?
            .account_for(org, compute_endpoint)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "no external-service account for org '{}' on compute endpoint '{}'",
                    org, compute_endpoint
                ))
            })
    }

    fn account_context(account: &AccountConfig) -> ProviderContext {
        ProviderContext {
            name: account.name.clone(),
            host: account.host.clone(),
            port: account.port,
            username: account.username.clone(),
            secret: account.secret.clone(),
            compute_endpoint: account.compute_endpoint.clone(),
            placement: None,
            compute_profile_name: None,
            plans: vec![],
            network: None,
        }
    }

    fn build_external_context(
        &self,
        vdc: &VdcRef,
        org: &str,
        provider_vdc: Option<&str>,
        plans: &[String],
    ) -> Result<ProviderContext> {
        let external = self.external_config()?;
        let pvdc_id = provider_vdc.ok_or_else(|| {
            Error::Configuration(format!("vdc '{}' has no provider vdc", vdc.name))
        })?;
        let pvdc = external
            .provider_vdcs
            .iter()
            .find(|p| p.id == pvdc_id)
            .ok_or_else(|| Error::Directory(format!("provider vdc '{}' not found", pvdc_id)))?;

        let account = self.find_account(org, &pvdc.compute_endpoint)?;
        let network = external
            .network_managers
            .iter()
            .find(|n| n.compute_endpoint == pvdc.compute_endpoint)
            .map(|n| NetworkManagerInfo {
                host: n.host.clone(),
                username: n.username.clone(),
                password: n.password.clone(),
            });

        let mut ctx = Self::account_context(account);
        ctx.placement = Some(Placement {
            datacenter: pvdc.datacenter.clone(),
            cluster: pvdc.cluster.clone(),
            cpi: pvdc.cpi.clone(),
        });
        ctx.compute_profile_name = Some(compute_profile_name(&vdc.id, &vdc.name));
        ctx.plans = plans.to_vec();
        ctx.network = network;
        Ok(ctx)
    }

    /// Drop what the caller did not ask for
    fn apply_flags(mut ctx: ProviderContext, flags: LookupFlags) -> ProviderContext {
        if !flags.extra_info_required {
            ctx.network = None;
        }
        if !flags.credentials_required {
            ctx.secret = None;
            if let Some(network) = ctx.network.as_mut() {
                network.password = None;
            }
        }
        ctx
    }

    fn ownership_of(&self, entry: VdcEntry, flags: LookupFlags) -> Result<ProviderOwnership> {
        match entry.provider {
            ProviderKind::External => {
                let ctx = match entry.context {
                    Some(ctx) => ctx,
                    None => self.build_external_context(
                        &entry.vdc,
                        &entry.vdc.org,
                        entry.provider_vdc.as_deref(),
                        &entry.plans,
                    )?,
                };
                Ok(ProviderOwnership::external(Self::apply_flags(ctx, flags)))
            }
            ProviderKind::Native => Ok(ProviderOwnership::native()),
            ProviderKind::Unset => Ok(ProviderOwnership::default()),
        }
    }

    fn new_task_href() -> String {
        let suffix: u32 = rand::thread_rng().gen();
        format!(
            "urn:task:{}-{:08x}",
            Utc::now().format("%Y%m%dT%H%M%S"),
            suffix
        )
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn get_ownership(
        &self,
        vdc: &str,
        org: &str,
        flags: LookupFlags,
    ) -> Result<ProviderOwnership> {
        let entry = self
            .find_entry(|e| e.vdc.name == vdc && e.vdc.org == org)?
            .ok_or_else(|| {
                Error::Directory(format!("vdc '{}' not found in org '{}'", vdc, org))
            })?;
        debug!("ownership lookup {}/{} => {}", org, vdc, entry.provider);
        self.ownership_of(entry, flags)
    }

    async fn get_ownership_by_id(&self, vdc_id: &str) -> Result<ProviderOwnership> {
        let entry = self
            .find_entry(|e| e.vdc.id == vdc_id)?
            .ok_or_else(|| Error::Directory(format!("vdc with id '{}' not found", vdc_id)))?;
        self.ownership_of(entry, LookupFlags::PLAIN)
    }

    async fn enumerate_accounts(&self, scope: AccountScope<'_>) -> Result<Vec<ProviderContext>> {
        let Some(external) = self.external.as_ref() else {
            return Ok(vec![]);
        };

        Ok(external
            .accounts
            .iter()
            .filter(|a| match scope {
                AccountScope::System => true,
                AccountScope::Exclusive(org) => a.org.as_deref() == Some(org),
            })
            .map(Self::account_context)
            .collect())
    }

    async fn set_ownership(
        &self,
        vdc: &VdcRef,
        provider: ProviderKind,
        data: Option<ProviderContext>,
    ) -> Result<TaskHandle> {
        let mut vdcs = self.vdcs.write().map_err(poison_err)?;
        let entry = vdcs
            .iter_mut()
            .find(|e| e.vdc.id == vdc.id)
            .ok_or_else(|| Error::Directory(format!("vdc with id '{}' not found", vdc.id)))?;

        entry.provider = provider;
        if let Some(ctx) = data.as_ref() {
            entry.plans = ctx.plans.clone();
        }
        entry.context = data;
        drop(vdcs);

        info!("vdc '{}' of org '{}' bound to {}", vdc.name, vdc.org, provider);

        Ok(TaskHandle {
            task_href: Self::new_task_href(),
        })
    }

    fn external_configured(&self) -> bool {
        self.external.is_some()
    }

    fn orgs_have_exclusive_accounts(&self) -> bool {
        self.external
            .as_ref()
            .map_or(false, ExternalServiceConfig::has_exclusive_accounts)
    }

    async fn list_orgs(&self) -> Result<Vec<String>> {
        Ok(self.orgs.clone())
    }

    async fn list_vdcs(&self, org: &str) -> Result<Vec<VdcRef>> {
        if !self.orgs.iter().any(|o| o == org) {
            return Err(Error::Directory(format!("org '{}' not found", org)));
        }
        let vdcs = self.vdcs.read().map_err(poison_err)?;
        Ok(vdcs
            .iter()
            .filter(|e| e.vdc.org == org)
            .map(|e| e.vdc.clone())
            .collect())
    }

    async fn get_vdc(&self, vdc_id: &str) -> Result<VdcRef> {
        self.find_entry(|e| e.vdc.id == vdc_id)?
            .map(|e| e.vdc)
            .ok_or_else(|| Error::Directory(format!("vdc with id '{}' not found", vdc_id)))
    }

    async fn external_context_for_vdc(
        &self,
        vdc: &VdcRef,
        org: &str,
        plans: &[String],
    ) -> Result<ProviderContext> {
        let entry = self
            .find_entry(|e| e.vdc.id == vdc.id)?
            .ok_or_else(|| Error::Directory(format!("vdc with id '{}' not found", vdc.id)))?;
        self.build_external_context(vdc, org, entry.provider_vdc.as_deref(), plans)
    }
}
