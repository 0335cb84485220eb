//! Client for the SPIFFE Workload API.
//!
//! [`WorkloadApiClient`] offers one-shot fetches and long-lived watches. Watches are
//! driven by [`watch`], which reconnects with [`backoff`] after transient failures and
//! hands each message to [`translate`] before notifying the caller.

/// Generated protobuf bindings for `workload.proto`.
#[allow(missing_docs, missing_debug_implementations, clippy::all)]
pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/_.rs"));
}

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod translate;
pub mod transport;
pub mod watch;
pub mod x509_context;

pub use client::WorkloadApiClient;
pub use error::{ErrorClass, WorkloadApiError};
pub use x509_context::X509Context;
