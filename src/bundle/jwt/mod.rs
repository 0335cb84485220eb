//! JWT bundle types.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::sync::Arc;

use jsonwebtoken::jwk::Jwk;
use serde::Deserialize;
use thiserror::Error;

use crate::bundle::BundleSource;
use crate::spiffe_id::TrustDomain;

/// A JWT signing authority: one public key from a trust domain's JWKS.
#[derive(Debug, Clone, PartialEq)]
pub struct JwtAuthority {
    key_id: String,
    jwk: Jwk,
}

impl JwtAuthority {
    /// Builds an authority from a single JWK object.
    ///
    /// # Errors
    ///
    /// Fails if the JSON is not a JWK or has no `kid`.
    pub fn from_jwk_json(jwk_json: &[u8]) -> Result<Self, JwtBundleError> {
        Self::from_jwk(serde_json::from_slice(jwk_json)?)
    }

    fn from_jwk(jwk: Jwk) -> Result<Self, JwtBundleError> {
        let key_id = jwk
            .common
            .key_id
            .clone()
            .filter(|kid| !kid.is_empty())
            .ok_or(JwtBundleError::MissingKeyId)?;
        Ok(Self { key_id, jwk })
    }

    /// The key ID (`kid`) tokens reference in their header.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// The parsed JWK.
    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }
}

/// The JWT authorities trusted for one [`TrustDomain`], keyed by key ID.
#[derive(Debug, Clone, PartialEq)]
pub struct JwtBundle {
    trust_domain: TrustDomain,
    jwt_authorities: HashMap<String, Arc<JwtAuthority>>,
}

/// A set of [`JwtBundle`]s, at most one per [`TrustDomain`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JwtBundleSet {
    bundles: BTreeMap<TrustDomain, Arc<JwtBundle>>,
}

/// An error that may arise parsing a [`JwtBundle`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JwtBundleError {
    /// A JWK has no `kid`.
    #[error("missing key ID")]
    MissingKeyId,

    /// The bytes are not a JWKS document.
    #[error("cannot deserialize json jwk set")]
    Deserialize(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct JwkSetDocument {
    keys: Vec<Jwk>,
}

impl JwtBundle {
    /// Creates a bundle with no authorities.
    pub fn new(trust_domain: TrustDomain) -> Self {
        Self {
            trust_domain,
            jwt_authorities: HashMap::new(),
        }
    }

    /// Parses a bundle from an RFC 7517 JWK Set document.
    ///
    /// ```
    /// use spiffe_workload::{JwtBundle, TrustDomain};
    ///
    /// let jwks = br#"{"keys": [{
    ///     "kty": "EC",
    ///     "kid": "authority-1",
    ///     "crv": "P-256",
    ///     "x": "tiwPLnWBgmZmpPDpITg-hr65jOgyx_aGjE7_0G3ZIYQ",
    ///     "y": "41iO01qbVJ17h5kw9DW0Vl0g5DovNr7ja2Yft2jPHHI"
    /// }]}"#;
    ///
    /// let trust_domain = TrustDomain::new("example.org").unwrap();
    /// let bundle = JwtBundle::from_jwt_authorities(trust_domain, jwks).unwrap();
    /// assert!(bundle.find_jwt_authority("authority-1").is_some());
    /// ```
    ///
    /// # Errors
    ///
    /// Fails if the document is not a JWKS or any key lacks a `kid`.
    pub fn from_jwt_authorities(
        trust_domain: TrustDomain,
        jwks: &[u8],
    ) -> Result<Self, JwtBundleError> {
        let document: JwkSetDocument = serde_json::from_slice(jwks)?;

        let mut bundle = Self::new(trust_domain);
        for jwk in document.keys {
            bundle.add_jwt_authority(JwtAuthority::from_jwk(jwk)?);
        }
        Ok(bundle)
    }

    /// The trust domain of the bundle.
    pub fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    /// The authority with key ID `key_id`.
    pub fn find_jwt_authority(&self, key_id: &str) -> Option<&JwtAuthority> {
        self.jwt_authorities.get(key_id).map(Arc::as_ref)
    }

    /// Inserts `authority`, replacing any authority with the same key ID.
    pub fn add_jwt_authority(&mut self, authority: JwtAuthority) {
        self.jwt_authorities
            .insert(authority.key_id().to_owned(), Arc::new(authority));
    }

    /// Iterates the authorities in no particular order.
    pub fn jwt_authorities(&self) -> impl Iterator<Item = &JwtAuthority> {
        self.jwt_authorities.values().map(Arc::as_ref)
    }

    /// Returns `true` if the bundle holds no authorities.
    pub fn is_empty(&self) -> bool {
        self.jwt_authorities.is_empty()
    }
}

impl JwtBundleSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `bundle`, replacing any bundle for the same trust domain.
    pub fn add_bundle(&mut self, bundle: JwtBundle) {
        self.bundles
            .insert(bundle.trust_domain().clone(), Arc::new(bundle));
    }

    /// The bundle for `trust_domain`.
    pub fn get(&self, trust_domain: &TrustDomain) -> Option<&JwtBundle> {
        self.bundles.get(trust_domain).map(Arc::as_ref)
    }

    /// Iterates the bundles ordered by trust domain.
    pub fn iter(&self) -> impl Iterator<Item = &JwtBundle> {
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

impl FromIterator<JwtBundle> for JwtBundleSet {
    fn from_iter<I: IntoIterator<Item = JwtBundle>>(iter: I) -> Self {
        let mut set = Self::new();
        for bundle in iter {
            set.add_bundle(bundle);
        }
        set
    }
}

impl BundleSource for JwtBundleSet {
    type Item = JwtBundle;
    type Error = Infallible;

    fn bundle_for_trust_domain(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<Option<Arc<Self::Item>>, Self::Error> {
        Ok(self.bundles.get(trust_domain).cloned())
    }
}
