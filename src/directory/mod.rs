/// Tenant and account directory contract
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::broker::models::TaskHandle;
use crate::broker::ProviderKind;
use crate::error::Result;

pub use memory::InMemoryDirectory;

/// Separator between the parts of a compute profile name
pub const PROFILE_DELIMITER: &str = "--";

/// Compute profile name of a vdc: `cp--<vdc id>--<vdc name>`.
///
/// Cluster listings recover the vdc name from the last segment, so the
/// layout must stay in step with the external service's naming.
pub fn compute_profile_name(vdc_id: &str, vdc_name: &str) -> String {
    format!(
        "cp{d}{}{d}{}",
        vdc_id,
        vdc_name,
        d = PROFILE_DELIMITER
    )
}

/// Credentialed connection context of one external-service account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderContext {
    /// Account name
    pub name: String,

    /// API host of the external service
    pub host: String,

    #[serde(default = "default_api_port")]
    pub port: u16,

    pub username: String,

    /// Only present when credentials were requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Identity of the compute endpoint backing this account
    pub compute_endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_profile_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plans: Vec<String>,

    /// Only present when extra info was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkManagerInfo>,
}

fn default_api_port() -> u16 {
    9021
}

impl ProviderContext {
    /// Base URL of the account's API
    pub fn api_url(&self) -> String {
        format!("https://{}:{}/v1", self.host, self.port)
    }
}

/// Placement of a provider vdc on the compute endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub datacenter: String,
    pub cluster: String,
    /// Control-plane-interface id registered with the external service
    pub cpi: String,
}

/// Network manager backing a compute endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkManagerInfo {
    pub host: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Binding of a vdc to one provider kind
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProviderOwnership {
    pub container_provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ProviderContext>,
}

impl ProviderOwnership {
    pub fn native() -> Self {
        Self {
            container_provider: ProviderKind::Native,
            context: None,
        }
    }

    pub fn external(context: ProviderContext) -> Self {
        Self {
            container_provider: ProviderKind::External,
            context: Some(context),
        }
    }
}

/// Reference to a virtual datacenter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdcRef {
    pub id: String,
    pub name: String,
    pub org: String,
}

/// Which external-service accounts to enumerate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountScope<'a> {
    /// Every account configured system-wide
    System,
    /// Accounts dedicated exclusively to one organization
    Exclusive(&'a str),
}

/// Flags for an ownership lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LookupFlags {
    pub credentials_required: bool,
    pub extra_info_required: bool,
}

impl LookupFlags {
    pub const PLAIN: LookupFlags = LookupFlags {
        credentials_required: false,
        extra_info_required: false,
    };

    pub const CREDENTIALS: LookupFlags = LookupFlags {
        credentials_required: true,
        extra_info_required: false,
    };

    pub const FULL: LookupFlags = LookupFlags {
        credentials_required: true,
        extra_info_required: true,
    };
}

/// Directory service mapping tenants to provider ownership and accounts
#[async_trait]
pub trait Directory: Send + Sync {
    /// Ownership of the vdc `vdc` in organization `org`
    async fn get_ownership(
        &self,
        vdc: &str,
        org: &str,
        flags: LookupFlags,
    ) -> Result<ProviderOwnership>;

    /// Ownership of the vdc with id `vdc_id`, without credentials
    async fn get_ownership_by_id(&self, vdc_id: &str) -> Result<ProviderOwnership>;

    async fn enumerate_accounts(&self, scope: AccountScope<'_>) -> Result<Vec<ProviderContext>>;

    /// Persist the ownership of `vdc`
    async fn set_ownership(
        &self,
        vdc: &VdcRef,
        provider: ProviderKind,
        data: Option<ProviderContext>,
    ) -> Result<TaskHandle>;

    /// Whether any external-service configuration exists
    fn external_configured(&self) -> bool;

    /// Whether organizations have accounts dedicated to them
    fn orgs_have_exclusive_accounts(&self) -> bool;

    async fn list_orgs(&self) -> Result<Vec<String>>;

    async fn list_vdcs(&self, org: &str) -> Result<Vec<VdcRef>>;

    async fn get_vdc(&self, vdc_id: &str) -> Result<VdcRef>;

    /// Credentialed external-service context for binding `vdc`, including
    /// placement, network info and the compute profile name
    async fn external_context_for_vdc(
        &self,
        vdc: &VdcRef,
        org: &str,
        plans: &[String],
    ) -> Result<ProviderContext>;
}
