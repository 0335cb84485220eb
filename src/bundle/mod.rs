//! Trust bundles: the authorities each trust domain publishes.
//!
//! [`x509::X509BundleSet`] and [`jwt::JwtBundleSet`] are both [`BundleSource`]s, so
//! verification code can be written against the trait and fed either a set taken
//! from the Workload API or a caller-maintained store.

use std::error::Error;
use std::sync::Arc;

use crate::spiffe_id::TrustDomain;

pub mod jwt;
pub mod x509;

/// Lookup of bundles by [`TrustDomain`].
pub trait BundleSource {
    /// Bundle type handed out.
    type Item: Send + Sync + 'static;

    /// Failure to consult the source.
    type Error: Error + Send + Sync + 'static;

    /// The bundle of `trust_domain`, `Ok(None)` when the source has none.
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` if the source itself cannot be read.
    fn bundle_for_trust_domain(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<Option<Arc<Self::Item>>, Self::Error>;
}

impl<S: BundleSource + ?Sized> BundleSource for Arc<S> {
    type Item = S::Item;
    type Error = S::Error;

    fn bundle_for_trust_domain(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<Option<Arc<Self::Item>>, Self::Error> {
        (**self).bundle_for_trust_domain(trust_domain)
    }
}
