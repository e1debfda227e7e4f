/// Error taxonomy for cluster dispatch
use std::time::Duration;

/// The result type used by the dispatcher, directory and drivers.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while routing a cluster operation.
///
/// Only [`Error::ClusterNotFound`], [`Error::DuplicateCluster`] and
/// [`Error::Configuration`] are meant to reach the caller of a fan-out
/// search. Provider failures met while searching or listing are logged and
/// treated as misses.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The cluster was absent from every probed provider.
    #[error("cluster {name} not found on any reachable provider")]
    ClusterNotFound { name: String },

    /// A cluster with the requested name already exists somewhere reachable.
    #[error("cluster with name: {name} already found")]
    DuplicateCluster { name: String },

    /// Ownership resolved to `none`, or required provider config is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An individual driver call failed.
    #[error("provider {provider} failed: {message}")]
    ProviderTransient { provider: String, message: String },

    /// The compute profile already exists on the external service.
    #[error("compute profile {profile} already exists")]
    ProvisioningConflict { profile: String },

    /// A driver call did not finish within the probe timeout.
    #[error("probe of {provider} timed out after {}s", .after.as_secs())]
    ProbeTimeout { provider: String, after: Duration },

    /// The request is missing a field the operation needs.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The account directory could not answer a lookup.
    #[error("directory lookup failed: {0}")]
    Directory(String),

    /// A provider API answered with a non-success status.
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Wrap any driver failure with the provider it came from.
    pub fn transient(provider: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::ProviderTransient {
            provider: provider.into(),
            message: err.to_string(),
        }
    }

    /// HTTP status carried by an API failure, if any.
    pub fn api_status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether this error terminates a dispatch rather than counting as a miss.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ClusterNotFound { .. } | Self::DuplicateCluster { .. } | Self::Configuration(_)
        )
    }
}
