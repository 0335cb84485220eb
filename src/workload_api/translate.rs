//! Translation of Workload API messages into validated domain types.
//!
//! Every function is pure and all-or-nothing: a single malformed entry fails the
//! whole message, so callers never see a partially parsed state.

use crate::bundle::jwt::{JwtBundle, JwtBundleSet};
use crate::bundle::x509::{X509Bundle, X509BundleSet};
use crate::spiffe_id::TrustDomain;
use crate::svid::jwt::JwtSvid;
use crate::svid::x509::X509Svid;
use crate::workload_api::error::WorkloadApiError;
use crate::workload_api::pb::{JwtBundlesResponse, JwtsvidResponse, X509svidResponse};
use crate::workload_api::x509_context::X509Context;

/// Decodes the SVIDs of `response`: only the first entry if `first_only` is set,
/// otherwise all of them in order.
///
/// # Errors
///
/// Returns [`WorkloadApiError::EmptyResponse`] if the message has no entries, or
/// [`WorkloadApiError::X509Svid`] if a decoded entry is malformed.
pub fn parse_x509_svids(
    response: &X509svidResponse,
    first_only: bool,
) -> Result<Vec<X509Svid>, WorkloadApiError> {
    if response.svids.is_empty() {
        return Err(WorkloadApiError::EmptyResponse);
    }

    let take = if first_only { 1 } else { response.svids.len() };
    response
        .svids
        .iter()
        .take(take)
        .map(|entry| -> Result<X509Svid, WorkloadApiError> {
            Ok(X509Svid::parse_from_der(&entry.x509_svid, &entry.x509_svid_key)?
                .with_hint(entry.hint.as_str()))
        })
        .collect()
}

/// Builds the bundle set carried by `response`.
///
/// Each SVID entry contributes the bundle of the trust domain named by its
/// `spiffe_id`; every federated bundle is added under its own key. Later entries
/// for the same trust domain replace earlier ones.
///
/// # Errors
///
/// Returns [`WorkloadApiError::InvalidTrustDomain`] for an unusable key,
/// [`WorkloadApiError::X509Bundle`] for undecodable DER, and
/// [`WorkloadApiError::EmptyBundle`] for a bundle without authorities.
pub fn parse_x509_bundles(response: &X509svidResponse) -> Result<X509BundleSet, WorkloadApiError> {
    let own = response
        .svids
        .iter()
        .map(|entry| (entry.spiffe_id.as_str(), entry.bundle.as_slice()));
    let federated = response
        .federated_bundles
        .iter()
        .map(|(key, der)| (key.as_str(), der.as_slice()));

    own.chain(federated)
        .map(|(key, der)| parse_x509_bundle(key, der))
        .collect()
}

/// Decodes all SVIDs and the bundle set of the same message.
///
/// # Errors
///
/// Fails if either [`parse_x509_svids`] or [`parse_x509_bundles`] fails.
pub fn parse_x509_context(response: &X509svidResponse) -> Result<X509Context, WorkloadApiError> {
    let svids = parse_x509_svids(response, false)?;
    let bundles = parse_x509_bundles(response)?;
    Ok(X509Context::new(svids, bundles))
}

/// Builds the JWT bundle set carried by `response`.
///
/// # Errors
///
/// Returns [`WorkloadApiError::InvalidTrustDomain`] for an unusable key or
/// [`WorkloadApiError::JwtBundle`] for a document that is not a JWKS.
pub fn parse_jwt_bundles(response: &JwtBundlesResponse) -> Result<JwtBundleSet, WorkloadApiError> {
    response
        .bundles
        .iter()
        .map(|(key, jwks)| -> Result<JwtBundle, WorkloadApiError> {
            let trust_domain = trust_domain_from_key(key)?;
            Ok(JwtBundle::from_jwt_authorities(trust_domain, jwks)?)
        })
        .collect()
}

/// Decodes the JWT-SVIDs of `response`, checking each against `audience`.
///
/// # Errors
///
/// Returns [`WorkloadApiError::EmptyResponse`] if the message has no entries, or
/// [`WorkloadApiError::JwtSvid`] if a decoded token is malformed, expired or lacks
/// an audience.
pub fn parse_jwt_svids<T: AsRef<str>>(
    response: &JwtsvidResponse,
    audience: &[T],
    first_only: bool,
) -> Result<Vec<JwtSvid>, WorkloadApiError> {
    if response.svids.is_empty() {
        return Err(WorkloadApiError::EmptyResponse);
    }

    let take = if first_only { 1 } else { response.svids.len() };
    response
        .svids
        .iter()
        .take(take)
        .map(|entry| -> Result<JwtSvid, WorkloadApiError> {
            Ok(JwtSvid::parse_insecure(&entry.svid, audience)?.with_hint(entry.hint.as_str()))
        })
        .collect()
}

fn parse_x509_bundle(key: &str, der: &[u8]) -> Result<X509Bundle, WorkloadApiError> {
    let trust_domain = trust_domain_from_key(key)?;
    let bundle = X509Bundle::parse_from_der(trust_domain, der)?;
    if bundle.is_empty() {
        return Err(WorkloadApiError::EmptyBundle(bundle.trust_domain().clone()));
    }
    Ok(bundle)
}

fn trust_domain_from_key(key: &str) -> Result<TrustDomain, WorkloadApiError> {
    TrustDomain::new(key).map_err(|source| WorkloadApiError::InvalidTrustDomain {
        trust_domain: key.to_owned(),
        source,
    })
}
