use std::net::IpAddr;
use std::path::Path;

use futures::future::BoxFuture;
use futures::{FutureExt as _, StreamExt as _};
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, Endpoint as TonicEndpoint};
use tonic::Status;

use crate::endpoint::Endpoint;
use crate::prelude::{debug, info};
use crate::workload_api::error::TransportError;
use crate::workload_api::pb::spiffe_workload_api_client::SpiffeWorkloadApiClient;
use crate::workload_api::pb::{
    JwtBundlesRequest, JwtBundlesResponse, JwtsvidRequest, JwtsvidResponse,
    ValidateJwtsvidRequest, ValidateJwtsvidResponse, X509svidRequest, X509svidResponse,
};
use crate::workload_api::transport::header::MetadataAdder;
use crate::workload_api::transport::{ResponseStream, WorkloadApiTransport};

// tonic requires a well-formed URI even when the connector ignores it.
#[cfg(unix)]
const UNIX_PLACEHOLDER_URI: &str = "http://[::]:50051";

type GrpcClient = SpiffeWorkloadApiClient<InterceptedService<Channel, MetadataAdder>>;

/// [`WorkloadApiTransport`] over a tonic channel to a real agent.
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    client: GrpcClient,
}

impl GrpcTransport {
    /// Wraps an established channel. Every call carries the Workload API header.
    pub fn new(channel: Channel) -> Self {
        Self {
            client: SpiffeWorkloadApiClient::with_interceptor(channel, MetadataAdder),
        }
    }

    /// Connects to `endpoint`.
    ///
    /// # Errors
    ///
    /// Fails if the endpoint cannot be reached.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, TransportError> {
        Ok(Self::new(connect(endpoint).await?))
    }
}

impl WorkloadApiTransport for GrpcTransport {
    fn fetch_x509_svid(&self) -> BoxFuture<'_, Result<ResponseStream<X509svidResponse>, Status>> {
        let mut client = self.client.clone();
        async move {
            let response = client.fetch_x509svid(X509svidRequest::default()).await?;
            Ok(response.into_inner().boxed())
        }
        .boxed()
    }

    fn fetch_jwt_bundles(
        &self,
    ) -> BoxFuture<'_, Result<ResponseStream<JwtBundlesResponse>, Status>> {
        let mut client = self.client.clone();
        async move {
            let response = client.fetch_jwt_bundles(JwtBundlesRequest::default()).await?;
            Ok(response.into_inner().boxed())
        }
        .boxed()
    }

    fn fetch_jwt_svid(
        &self,
        request: JwtsvidRequest,
    ) -> BoxFuture<'_, Result<JwtsvidResponse, Status>> {
        let mut client = self.client.clone();
        async move { Ok(client.fetch_jwtsvid(request).await?.into_inner()) }.boxed()
    }

    fn validate_jwt_svid(
        &self,
        request: ValidateJwtsvidRequest,
    ) -> BoxFuture<'_, Result<ValidateJwtsvidResponse, Status>> {
        let mut client = self.client.clone();
        async move { Ok(client.validate_jwtsvid(request).await?.into_inner()) }.boxed()
    }
}

/// Opens a tonic channel to `endpoint`.
///
/// # Errors
///
/// Fails if the endpoint cannot be reached, or names a UNIX socket on a platform
/// without UNIX sockets.
pub async fn connect(endpoint: &Endpoint) -> Result<Channel, TransportError> {
    debug!("Connecting to Workload API at {endpoint}");
    let channel = match endpoint {
        Endpoint::Unix(path) => connect_unix(path).await?,
        Endpoint::Tcp { host, port } => connect_tcp(*host, *port).await?,
    };
    info!("Connected to Workload API at {endpoint}");
    Ok(channel)
}

async fn connect_tcp(host: IpAddr, port: u16) -> Result<Channel, TransportError> {
    let uri = match host {
        IpAddr::V4(v4) => format!("http://{v4}:{port}"),
        IpAddr::V6(v6) => format!("http://[{v6}]:{port}"),
    };
    Ok(TonicEndpoint::try_from(uri)?.connect().await?)
}

#[cfg(unix)]
async fn connect_unix(path: &Path) -> Result<Channel, TransportError> {
    use std::sync::Arc;

    use hyper_util::rt::TokioIo;
    use tokio::net::UnixStream;
    use tonic::transport::Uri;
    use tower::service_fn;

    let path: Arc<Path> = Arc::from(path);
    let channel = TonicEndpoint::try_from(UNIX_PLACEHOLDER_URI)?
        .connect_with_connector(service_fn(move |_: Uri| {
            let path = Arc::clone(&path);
            async move {
                let stream = UnixStream::connect(&*path).await?;
                Ok::<_, std::io::Error>(TokioIo::new(stream))
            }
        }))
        .await?;
    Ok(channel)
}

#[cfg(not(unix))]
async fn connect_unix(_path: &Path) -> Result<Channel, TransportError> {
    Err(TransportError::UnsupportedEndpointTransport { scheme: "unix" })
}
