//! Constants shared across the crate.

/// Index of the default SVID within the list returned by the Workload API.
///
/// The first SVID in a response is the default one for operations that need a
/// single identity.
pub const DEFAULT_SVID: usize = 0;

/// Name of the environment variable conventionally holding the Workload API endpoint.
///
/// It is only read by the explicit `from_env`/`connect_env` constructors.
pub const SPIFFE_SOCKET_ENV: &str = "SPIFFE_ENDPOINT_SOCKET";

/// Metadata key every Workload API call must carry.
pub const WORKLOAD_API_HEADER_KEY: &str = "workload.spiffe.io";

/// Value paired with [`WORKLOAD_API_HEADER_KEY`].
pub const WORKLOAD_API_HEADER_VALUE: &str = "true";
