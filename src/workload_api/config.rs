//! Client configuration.

use crate::endpoint::Endpoint;
use crate::workload_api::backoff::BackoffConfig;
use crate::workload_api::error::WorkloadApiError;

/// Everything needed to connect a [`WorkloadApiClient`](crate::WorkloadApiClient).
///
/// Configuration is always explicit: the environment is only consulted by
/// [`ClientConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Address of the agent.
    pub endpoint: Endpoint,
    /// Reconnect policy used by watches.
    pub backoff: BackoffConfig,
}

impl ClientConfig {
    /// Configuration for `endpoint` with the default backoff policy.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            backoff: BackoffConfig::default(),
        }
    }

    /// Parses `endpoint` and uses the default backoff policy.
    ///
    /// # Errors
    ///
    /// Fails if `endpoint` is not a valid endpoint URI.
    pub fn parse(endpoint: &str) -> Result<Self, WorkloadApiError> {
        Ok(Self::new(Endpoint::parse(endpoint)?))
    }

    /// Reads the endpoint from `SPIFFE_ENDPOINT_SOCKET`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkloadApiError::MissingEndpointSocket`] if the variable is unset,
    /// or [`WorkloadApiError::Endpoint`] if it is invalid.
    pub fn from_env() -> Result<Self, WorkloadApiError> {
        Endpoint::from_env()?
            .map(Self::new)
            .ok_or(WorkloadApiError::MissingEndpointSocket)
    }

    /// Replaces the backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}
