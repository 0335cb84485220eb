#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! Rust client for the
//! [SPIFFE Workload API](https://github.com/spiffe/spiffe/blob/main/standards/SPIFFE_Workload_API.md).
//!
//! A workload uses this crate to ask the local agent for its identity documents
//! (X.509-SVIDs with their trust bundles, JWT-SVIDs and JWT bundles) and to be
//! notified when they rotate.
//!
//! The long-lived entry points are the watches on [`WorkloadApiClient`]: they keep a
//! streaming call open, hand every validated update to a caller-supplied watcher and
//! reconnect with exponential backoff when the stream fails for a transient reason.
//!
//! ## Watching the X.509 context
//!
//! ```no_run
//! use spiffe_workload::{WorkloadApiClient, WorkloadApiError, X509Context, X509ContextWatcher};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Printer;
//!
//! impl X509ContextWatcher for Printer {
//!     fn on_x509_context_update(&mut self, context: X509Context) {
//!         for svid in context.svids() {
//!             println!("SVID updated: {}", svid.spiffe_id());
//!         }
//!     }
//!
//!     fn on_x509_context_watch_error(&mut self, error: &WorkloadApiError) {
//!         eprintln!("watch error: {error}");
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = WorkloadApiClient::connect_to("unix:/tmp/spire-agent/public/api.sock").await?;
//! let cancel = CancellationToken::new();
//!
//! // Runs until `cancel` is triggered or the agent rejects the request.
//! let terminal = client.watch_x509_context(&mut Printer, cancel.clone()).await;
//! eprintln!("watch ended: {terminal}");
//! # Ok(())
//! # }
//! ```
//!
//! ## One-shot fetches
//!
//! ```no_run
//! use spiffe_workload::{TrustDomain, WorkloadApiClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = WorkloadApiClient::connect_env().await?;
//!
//! let context = client.fetch_x509_context().await?;
//! let svid = context.default_svid().ok_or("missing svid")?;
//! let trust_domain = TrustDomain::new("example.org")?;
//! let bundle = context.bundle_set().get(&trust_domain);
//!
//! let jwt_svid = client.fetch_jwt_svid(&["service-a"], None).await?;
//! let claims = jwt_svid.claims();
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **`logging`** (default): emit diagnostics through the `log` facade
//! - **`tracing`**: emit diagnostics as `tracing` events instead

mod observability;
mod prelude;

pub mod bundle;
pub mod cert;
pub mod constants;
pub mod endpoint;
pub mod spiffe_id;
pub mod svid;
pub mod workload_api;

// -----------------------
// Re-exports
// -----------------------

/// Core SPIFFE types re-exported for simplified access.
pub use crate::{
    bundle::jwt::{JwtBundle, JwtBundleError, JwtBundleSet},
    bundle::x509::{X509Bundle, X509BundleError, X509BundleSet},
    bundle::BundleSource,
    endpoint::{Endpoint, EndpointError},
    spiffe_id::{SpiffeId, SpiffeIdError, TrustDomain},
    svid::jwt::{JwtSvid, JwtSvidError},
    svid::x509::{X509Svid, X509SvidError},
};

/// Workload API client types re-exported for simplified access.
pub use crate::workload_api::{
    backoff::{Backoff, BackoffConfig, Sleeper, TokioSleeper},
    client::WorkloadApiClient,
    config::ClientConfig,
    error::{ErrorClass, WorkloadApiError},
    transport::{GrpcTransport, InMemoryTransport, WorkloadApiTransport},
    watch::{JwtBundleWatcher, X509ContextWatcher},
    x509_context::X509Context,
};
