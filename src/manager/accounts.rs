/// Enumeration of the external-service accounts reachable by a caller
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::broker::ProviderKind;
use crate::directory::{AccountScope, Directory, LookupFlags, ProviderContext, ProviderOwnership};
use crate::error::Result;
use crate::session::SessionContext;

/// Ownership lookups memoized for the lifetime of one dispatch
#[derive(Default)]
pub struct OwnershipCache {
    entries: Mutex<HashMap<(String, String, LookupFlags), ProviderOwnership>>,
}

impl OwnershipCache {
    pub async fn get(
        &self,
        directory: &dyn Directory,
        vdc: &str,
        org: &str,
        flags: LookupFlags,
    ) -> Result<ProviderOwnership> {
        let key = (org.to_string(), vdc.to_string(), flags);
        if let Some(hit) = self.lock().get(&key) {
            return Ok(hit.clone());
        }

        let ownership = directory.get_ownership(vdc, org, flags).await?;
        self.lock().insert(key, ownership.clone());
        Ok(ownership)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String, LookupFlags), ProviderOwnership>> {
        // Entries are plain clones; a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Produces the ordered candidate accounts for fan-out
pub struct AccountEnumerator<'a> {
    directory: &'a dyn Directory,
    session: &'a SessionContext,
    cache: &'a OwnershipCache,
}

impl<'a> AccountEnumerator<'a> {
    pub fn new(
        directory: &'a dyn Directory,
        session: &'a SessionContext,
        cache: &'a OwnershipCache,
    ) -> Self {
        Self {
            directory,
            session,
            cache,
        }
    }

    /// Accounts visible to the caller, in stable order.
    ///
    /// Sysadmins get every account in the system. Otherwise dedicated
    /// accounts of the org win; failing that, the accounts behind the
    /// org's externally owned vdcs, one per compute endpoint.
    pub async fn accounts(&self) -> Result<Vec<ProviderContext>> {
        if !self.directory.external_configured() {
            return Ok(vec![]);
        }

        if self.session.is_sysadmin() {
            return self.directory.enumerate_accounts(AccountScope::System).await;
        }

        let org = self.session.org.as_str();
        if self.directory.orgs_have_exclusive_accounts() {
            return self
                .directory
                .enumerate_accounts(AccountScope::Exclusive(org))
                .await;
        }

        let vdcs = self.directory.list_vdcs(org).await?;
        let lookups = vdcs.iter().map(|vdc| {
            self.cache
                .get(self.directory, &vdc.name, org, LookupFlags::CREDENTIALS)
        });
        let ownerships = try_join_all(lookups).await?;

        let contexts = ownerships
            .into_iter()
            .filter(|o| o.container_provider == ProviderKind::External)
            .filter_map(|o| o.context);
        let accounts = dedupe_by_endpoint(contexts);
        debug!(
            "{} external account(s) behind {} vdc(s) of org {}",
            accounts.len(),
            vdcs.len(),
            org
        );
        Ok(accounts)
    }
}

/// One context per compute endpoint. Position is that of the first
/// occurrence; the context kept is the last one seen.
pub fn dedupe_by_endpoint<I>(contexts: I) -> Vec<ProviderContext>
where
    I: IntoIterator<Item = ProviderContext>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<ProviderContext> = Vec::new();

    for ctx in contexts {
        match index.get(&ctx.compute_endpoint) {
            Some(&pos) => unique[pos] = ctx,
            None => {
                index.insert(ctx.compute_endpoint.clone(), unique.len());
                unique.push(ctx);
            }
        }
    }

    unique
}
