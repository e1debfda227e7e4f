/// Caller identity for one dispatch
use serde::{Deserialize, Serialize};

/// Authenticated caller as seen by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    /// User name of the caller
    pub user: String,

    /// Organization the caller is logged into
    pub org: String,

    /// System administrators see every organization and every account
    #[serde(default)]
    pub sysadmin: bool,
}

impl SessionContext {
    pub fn new(user: impl Into<String>, org: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            org: org.into(),
            sysadmin: false,
        }
    }

    pub fn sysadmin(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            org: "System".to_string(),
            sysadmin: true,
        }
    }

    pub fn is_sysadmin(&self) -> bool {
        self.sysadmin
    }
}
