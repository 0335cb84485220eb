//! Transports carrying Workload API calls.
//!
//! [`WorkloadApiTransport`] is the seam between the client and the wire. The gRPC
//! implementation talks to a real agent; the in-memory one replays scripted
//! responses.

use std::fmt;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tonic::Status;

use crate::workload_api::pb::{
    JwtBundlesResponse, JwtsvidRequest, JwtsvidResponse, ValidateJwtsvidRequest,
    ValidateJwtsvidResponse, X509svidResponse,
};

mod grpc;
mod header;
pub mod memory;

pub use grpc::{connect, GrpcTransport};
pub use memory::InMemoryTransport;

/// Messages of an open server-streaming call.
pub type ResponseStream<T> = BoxStream<'static, Result<T, Status>>;

/// The Workload API calls the client issues.
///
/// Streaming calls resolve once the stream is open; the stream then yields messages
/// until the agent fails or closes it. Dropping a returned future or stream cancels
/// the call.
pub trait WorkloadApiTransport: Send + Sync + fmt::Debug {
    /// Opens the `FetchX509SVID` stream.
    fn fetch_x509_svid(&self) -> BoxFuture<'_, Result<ResponseStream<X509svidResponse>, Status>>;

    /// Opens the `FetchJWTBundles` stream.
    fn fetch_jwt_bundles(
        &self,
    ) -> BoxFuture<'_, Result<ResponseStream<JwtBundlesResponse>, Status>>;

    /// Calls `FetchJWTSVID`.
    fn fetch_jwt_svid(
        &self,
        request: JwtsvidRequest,
    ) -> BoxFuture<'_, Result<JwtsvidResponse, Status>>;

    /// Calls `ValidateJWTSVID`.
    fn validate_jwt_svid(
        &self,
        request: ValidateJwtsvidRequest,
    ) -> BoxFuture<'_, Result<ValidateJwtsvidResponse, Status>>;
}
