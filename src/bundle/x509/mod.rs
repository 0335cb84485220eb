//! X.509 bundle types.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use crate::bundle::BundleSource;
use crate::cert::error::CertificateError;
use crate::cert::parsing::split_der_certificates;
use crate::cert::Certificate;
use crate::spiffe_id::TrustDomain;

/// The X.509 authorities trusted for one [`TrustDomain`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct X509Bundle {
    trust_domain: TrustDomain,
    x509_authorities: Vec<Certificate>,
}

/// A set of [`X509Bundle`]s, at most one per [`TrustDomain`].
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct X509BundleSet {
    bundles: BTreeMap<TrustDomain, Arc<X509Bundle>>,
}

/// An error that may arise parsing an [`X509Bundle`].
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum X509BundleError {
    /// An authority is not a valid DER-encoded certificate.
    #[error(transparent)]
    Certificate(#[from] CertificateError),
}

impl X509Bundle {
    /// Creates a bundle with no authorities.
    pub fn new(trust_domain: TrustDomain) -> Self {
        Self {
            trust_domain,
            x509_authorities: Vec::new(),
        }
    }

    /// Parses a bundle from concatenated DER certificates.
    ///
    /// Empty input yields an empty bundle; callers that require authorities check
    /// [`X509Bundle::is_empty`].
    ///
    /// # Errors
    ///
    /// Fails if any certificate cannot be parsed.
    pub fn parse_from_der(
        trust_domain: TrustDomain,
        bundle_der: &[u8],
    ) -> Result<Self, X509BundleError> {
        Ok(Self {
            trust_domain,
            x509_authorities: split_der_certificates(bundle_der, None)?,
        })
    }

    /// Adds one DER-encoded authority.
    ///
    /// # Errors
    ///
    /// Fails if `authority_der` is not a DER-encoded certificate.
    pub fn add_authority(&mut self, authority_der: &[u8]) -> Result<(), X509BundleError> {
        self.x509_authorities
            .push(Certificate::try_from(authority_der)?);
        Ok(())
    }

    /// The trust domain of the bundle.
    pub fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    /// The trusted authorities.
    pub fn authorities(&self) -> &[Certificate] {
        &self.x509_authorities
    }

    /// Returns `true` if the bundle holds no authorities.
    pub fn is_empty(&self) -> bool {
        self.x509_authorities.is_empty()
    }
}

impl X509BundleSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `bundle`, replacing any bundle for the same trust domain.
    pub fn add_bundle(&mut self, bundle: X509Bundle) {
        self.bundles
            .insert(bundle.trust_domain().clone(), Arc::new(bundle));
    }

    /// The bundle for `trust_domain`.
    pub fn get(&self, trust_domain: &TrustDomain) -> Option<&X509Bundle> {
        self.bundles.get(trust_domain).map(Arc::as_ref)
    }

    /// Iterates the bundles ordered by trust domain.
    pub fn iter(&self) -> impl Iterator<Item = &X509Bundle> {
        self.bundles.values().map(Arc::as_ref)
    }

    /// Number of trust domains in the set.
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    /// Returns `true` if the set holds no bundles.
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

impl FromIterator<X509Bundle> for X509BundleSet {
    fn from_iter<I: IntoIterator<Item = X509Bundle>>(iter: I) -> Self {
        let mut set = Self::new();
        for bundle in iter {
            set.add_bundle(bundle);
        }
        set
    }
}

impl BundleSource for X509BundleSet {
    type Item = X509Bundle;
    type Error = Infallible;

    fn bundle_for_trust_domain(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<Option<Arc<Self::Item>>, Self::Error> {
        Ok(self.bundles.get(trust_domain).cloned())
    }
}
