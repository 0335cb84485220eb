//! Workload API errors and their retry classification.

use thiserror::Error;
use tonic::Code;

use crate::endpoint::EndpointError;
use crate::spiffe_id::{SpiffeIdError, TrustDomain};
use crate::{JwtBundleError, JwtSvidError, X509BundleError, X509SvidError};

/// Errors raised by the transport layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The endpoint's transport is unavailable on this platform.
    #[error("unsupported endpoint transport: {scheme}")]
    UnsupportedEndpointTransport {
        /// The unsupported scheme.
        scheme: &'static str,
    },

    /// A gRPC status returned by the agent.
    #[error(transparent)]
    Status(#[from] tonic::Status),

    /// The connection to the agent could not be established.
    #[error(transparent)]
    Tonic(#[from] tonic::transport::Error),
}

/// Errors produced by Workload API operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkloadApiError {
    /// `SPIFFE_ENDPOINT_SOCKET` is not set.
    #[error("missing SPIFFE endpoint socket path (SPIFFE_ENDPOINT_SOCKET)")]
    MissingEndpointSocket,

    /// The agent sent a message with no entries.
    #[error("empty Workload API response")]
    EmptyResponse,

    /// The agent closed the stream.
    #[error("Workload API stream ended")]
    StreamEnded,

    /// The operation was cancelled by the caller.
    #[error("Workload API operation cancelled")]
    Cancelled,

    /// The endpoint address is invalid.
    #[error("invalid workload api endpoint: {0}")]
    Endpoint(#[from] EndpointError),

    /// The agent did not match the workload to any registration entry.
    #[error("no identity issued")]
    NoIdentityIssued,

    /// The agent denied the request for another reason.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No SVID carries the requested hint.
    #[error("no SVID found with hint: {0}")]
    HintNotFound(String),

    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An X.509-SVID in the response is malformed.
    #[error("failed to parse X.509 SVID: {0}")]
    X509Svid(#[from] X509SvidError),

    /// A JWT-SVID in the response is malformed or failed validation.
    #[error("failed to parse JWT-SVID: {0}")]
    JwtSvid(#[from] JwtSvidError),

    /// An X.509 bundle in the response is malformed.
    #[error("failed to parse X.509 bundle: {0}")]
    X509Bundle(#[from] X509BundleError),

    /// A JWT bundle in the response is malformed.
    #[error("failed to parse JWT bundle: {0}")]
    JwtBundle(#[from] JwtBundleError),

    /// A SPIFFE ID in the response is malformed.
    #[error("failed to parse SPIFFE ID: {0}")]
    SpiffeId(#[from] SpiffeIdError),

    /// A bundle key in the response is not a trust domain.
    #[error("invalid trust domain {trust_domain:?}: {source}")]
    InvalidTrustDomain {
        /// The key as sent by the agent.
        trust_domain: String,
        /// Why it was rejected.
        source: SpiffeIdError,
    },

    /// A bundle in the response has no authorities.
    #[error("empty X.509 bundle for trust domain: {0}")]
    EmptyBundle(TrustDomain),
}

/// How a watch reacts to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The caller cancelled: stop.
    Cancelled,
    /// The agent rejected the request as malformed: stop, retrying cannot help.
    InvalidRequest,
    /// Anything else: back off and reconnect.
    Transient,
}

impl WorkloadApiError {
    /// Classifies the error for retry decisions.
    pub fn class(&self) -> ErrorClass {
        let code = match self {
            Self::Cancelled => return ErrorClass::Cancelled,
            Self::Transport(TransportError::Status(status)) => status.code(),
            _ => return ErrorClass::Transient,
        };

        match code {
            Code::Cancelled => ErrorClass::Cancelled,
            Code::InvalidArgument => ErrorClass::InvalidRequest,
            _ => ErrorClass::Transient,
        }
    }

    /// The gRPC status code carried by the error, if it came from the agent.
    pub fn status_code(&self) -> Option<Code> {
        match self {
            Self::Transport(TransportError::Status(status)) => Some(status.code()),
            Self::NoIdentityIssued | Self::PermissionDenied(_) => Some(Code::PermissionDenied),
            _ => None,
        }
    }
}

impl From<tonic::Status> for WorkloadApiError {
    fn from(status: tonic::Status) -> Self {
        if status.code() == Code::PermissionDenied {
            let message = status.message();
            if message.contains("no identity issued") {
                return Self::NoIdentityIssued;
            }
            return Self::PermissionDenied(message.to_owned());
        }

        Self::Transport(TransportError::Status(status))
    }
}

impl From<tonic::transport::Error> for WorkloadApiError {
    fn from(e: tonic::transport::Error) -> Self {
        Self::Transport(TransportError::Tonic(e))
    }
}
