//! Workload API client for fetching and watching SPIFFE X.509 and JWT material.
//!
//! `WorkloadApiClient` provides one-shot calls, which read a single message and
//! never retry, and watches, which keep a stream open and reconnect with backoff
//! until they are cancelled.
//!
//! A workload may be issued **multiple SVIDs**. The agent may attach an optional
//! **hint** to each of them to help distinguish identities. Hints are not part of
//! the cryptographic material and have no security meaning.

mod jwt;
mod x509;

use std::sync::Arc;

use futures::StreamExt as _;

use crate::workload_api::backoff::{BackoffConfig, Sleeper, TokioSleeper};
use crate::workload_api::config::ClientConfig;
use crate::workload_api::error::WorkloadApiError;
use crate::workload_api::transport::{GrpcTransport, ResponseStream, WorkloadApiTransport};

/// Client for the SPIFFE Workload API.
///
/// Cloning is cheap and clones share the underlying connection, so one-shot calls
/// and watches can run concurrently on the same client.
#[derive(Debug, Clone)]
pub struct WorkloadApiClient {
    transport: Arc<dyn WorkloadApiTransport>,
    backoff: BackoffConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl WorkloadApiClient {
    /// Connects to the agent described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the endpoint cannot be reached or the gRPC
    /// connection fails.
    pub async fn connect(config: ClientConfig) -> Result<Self, WorkloadApiError> {
        let transport = GrpcTransport::connect(&config.endpoint).await?;
        Ok(Self::from_transport(Arc::new(transport), config.backoff))
    }

    /// Connects to the given endpoint with the default backoff policy.
    ///
    /// Examples:
    /// - `unix:/tmp/spire-agent/public/api.sock` or `unix:///tmp/spire-agent/public/api.sock`
    /// - `tcp:127.0.0.1:8081` or `tcp://127.0.0.1:8081`
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the endpoint string is invalid, the endpoint
    /// cannot be reached, or the gRPC connection fails.
    pub async fn connect_to(endpoint: impl AsRef<str>) -> Result<Self, WorkloadApiError> {
        Self::connect(ClientConfig::parse(endpoint.as_ref())?).await
    }

    /// Connects to the endpoint named by `SPIFFE_ENDPOINT_SOCKET`.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkloadApiError`] if the variable is not set or invalid, the
    /// endpoint cannot be reached, or the gRPC connection fails.
    pub async fn connect_env() -> Result<Self, WorkloadApiError> {
        Self::connect(ClientConfig::from_env()?).await
    }

    /// Creates a client on top of any transport, such as an
    /// [`InMemoryTransport`](crate::InMemoryTransport).
    pub fn from_transport(transport: Arc<dyn WorkloadApiTransport>, backoff: BackoffConfig) -> Self {
        Self {
            transport,
            backoff,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Creates a client from an existing gRPC channel.
    ///
    /// Intended for transport customization (custom connectors, load balancing). The
    /// channel must already point at the agent.
    ///
    /// ```no_run
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # use spiffe_workload::WorkloadApiClient;
    /// # use tonic::transport::Channel;
    /// let channel = Channel::from_shared("http://127.0.0.1:8081")?
    ///     .connect()
    ///     .await?;
    /// let client = WorkloadApiClient::new_with_channel(channel);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new_with_channel(channel: tonic::transport::Channel) -> Self {
        Self::from_transport(
            Arc::new(GrpcTransport::new(channel)),
            BackoffConfig::default(),
        )
    }

    /// Replaces the sleeper watches wait on between reconnects.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// The reconnect policy used by watches.
    pub fn backoff(&self) -> BackoffConfig {
        self.backoff
    }
}

impl WorkloadApiClient {
    /// Waits for the first message of a freshly opened stream.
    ///
    /// Returns `WorkloadApiError::EmptyResponse` if the stream ends without a message.
    async fn first_message<T>(mut stream: ResponseStream<T>) -> Result<T, WorkloadApiError> {
        stream
            .next()
            .await
            .transpose()?
            .ok_or(WorkloadApiError::EmptyResponse)
    }
}
