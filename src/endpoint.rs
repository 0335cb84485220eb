//! Workload API endpoint addresses.
//!
//! The agent listens on a UNIX domain socket or, less commonly, on a TCP port bound
//! to an IP address. Addresses are written as URIs:
//!
//! - `unix:///run/spire/agent.sock` or the shorthand `unix:/run/spire/agent.sock`
//! - `tcp://127.0.0.1:8081` or the shorthand `tcp:127.0.0.1:8081`

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

use crate::constants::SPIFFE_SOCKET_ENV;

/// A parsed Workload API endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// UNIX domain socket at an absolute path.
    Unix(PathBuf),

    /// TCP socket; the host is always an IP address.
    Tcp {
        /// IP address of the agent.
        host: IpAddr,
        /// TCP port of the agent.
        port: u16,
    },
}

/// Reasons an endpoint address is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum EndpointError {
    /// The input is not a URI.
    #[error("endpoint socket is not a valid URI")]
    Parse(#[from] url::ParseError),

    /// The scheme is neither `unix` nor `tcp`.
    #[error("endpoint socket URI scheme must be unix: or tcp:")]
    InvalidScheme,

    /// The URI carries `user:pass@`.
    #[error("endpoint socket URI must not include user info")]
    HasUserInfo,

    /// The URI carries a query.
    #[error("endpoint socket URI must not include query values")]
    HasQuery,

    /// The URI carries a fragment.
    #[error("endpoint socket URI must not include a fragment")]
    HasFragment,

    /// A `unix:` URI names a host.
    #[error("unix: endpoint socket URI must not include an authority")]
    UnixAuthorityNotAllowed,

    /// A `unix:` URI has no path.
    #[error("unix: endpoint socket URI must include a path")]
    UnixMissingPath,

    /// A `unix:` URI path is relative.
    #[error("unix: endpoint socket URI path must be absolute")]
    UnixRelativePath,

    /// A `tcp:` URI host is a name rather than an IP address.
    #[error("tcp: endpoint socket URI host must be an IP address")]
    TcpHostNotIp,

    /// A `tcp:` URI has no port.
    #[error("tcp: endpoint socket URI must include a port")]
    TcpMissingPort,

    /// A `tcp:` URI has a path.
    #[error("tcp: endpoint socket URI must not include a path")]
    TcpUnexpectedPath,
}

impl Endpoint {
    /// Parses and validates an endpoint URI.
    ///
    /// ```
    /// use spiffe_workload::Endpoint;
    ///
    /// let unix = Endpoint::parse("unix:/tmp/agent.sock").unwrap();
    /// assert_eq!(unix.to_string(), "unix:///tmp/agent.sock");
    ///
    /// let tcp = Endpoint::parse("tcp:127.0.0.1:8081").unwrap();
    /// assert_eq!(tcp.to_string(), "tcp://127.0.0.1:8081");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the [`EndpointError`] for the first rule the input violates.
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let url = Url::parse(&expand_shorthand(input))?;

        if !url.username().is_empty() || url.password().is_some() {
            return Err(EndpointError::HasUserInfo);
        }
        if url.query().is_some() {
            return Err(EndpointError::HasQuery);
        }
        if url.fragment().is_some() {
            return Err(EndpointError::HasFragment);
        }

        match url.scheme() {
            "unix" => {
                if url.host_str().is_some_and(|h| !h.is_empty()) {
                    return Err(EndpointError::UnixAuthorityNotAllowed);
                }
                match url.path() {
                    "" | "/" => Err(EndpointError::UnixMissingPath),
                    path if !path.starts_with('/') => Err(EndpointError::UnixRelativePath),
                    path => Ok(Self::Unix(PathBuf::from(path))),
                }
            }
            "tcp" => {
                let host = url
                    .host_str()
                    .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
                    .and_then(|h| IpAddr::from_str(h).ok())
                    .ok_or(EndpointError::TcpHostNotIp)?;
                let port = url.port().ok_or(EndpointError::TcpMissingPort)?;
                if !matches!(url.path(), "" | "/") {
                    return Err(EndpointError::TcpUnexpectedPath);
                }
                Ok(Self::Tcp { host, port })
            }
            _ => Err(EndpointError::InvalidScheme),
        }
    }

    /// Reads and parses the endpoint from `SPIFFE_ENDPOINT_SOCKET`.
    ///
    /// Returns `None` if the variable is unset.
    ///
    /// # Errors
    ///
    /// Fails if the variable is set to an invalid endpoint.
    pub fn from_env() -> Result<Option<Self>, EndpointError> {
        std::env::var(SPIFFE_SOCKET_ENV)
            .ok()
            .map(|raw| Self::parse(&raw))
            .transpose()
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp {
                host: IpAddr::V6(host),
                port,
            } => write!(f, "tcp://[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

// `unix:/path` and `tcp:host:port` are common in the wild but are not
// hierarchical URLs; rewrite them before handing them to `url`.
fn expand_shorthand(input: &str) -> String {
    if let Some(path) = input.strip_prefix("unix:/") {
        if !path.starts_with('/') {
            return format!("unix:///{path}");
        }
    }
    if let Some(rest) = input.strip_prefix("tcp:") {
        if !rest.starts_with("//") {
            return format!("tcp://{rest}");
        }
    }
    input.to_owned()
}
