mod common;

use common::*;
use spiffe_workload::cert::error::{CertificateError, PrivateKeyError};
use spiffe_workload::{SpiffeId, X509Svid, X509SvidError};

#[test]
fn test_x509_svid_parse_from_single_der() {
    let svid = X509Svid::parse_from_der(WORKLOAD_CERT, WORKLOAD_KEY).unwrap();

    assert_eq!(
        svid.spiffe_id(),
        &SpiffeId::new("spiffe://example.org/workload").unwrap()
    );
    assert_eq!(svid.cert_chain().len(), 1);
    assert_eq!(svid.leaf().as_bytes(), WORKLOAD_CERT);
    assert_eq!(svid.private_key().as_bytes(), WORKLOAD_KEY);
    assert_eq!(svid.hint(), None);
}

#[test]
fn test_x509_svid_parse_from_der_chain() {
    let svid = X509Svid::parse_from_der(SERVICE_CHAIN, SERVICE_KEY).unwrap();

    assert_eq!(svid.spiffe_id().to_string(), "spiffe://example.org/service");
    assert_eq!(svid.cert_chain().len(), 2);

    let chain: Vec<u8> = svid
        .cert_chain()
        .iter()
        .flat_map(|cert| cert.as_bytes().to_vec())
        .collect();
    assert_eq!(chain, SERVICE_CHAIN);
}

#[test]
fn test_x509_svid_with_hint() {
    let svid = X509Svid::parse_from_der(WORKLOAD_CERT, WORKLOAD_KEY)
        .unwrap()
        .with_hint("internal");
    assert_eq!(svid.hint(), Some("internal"));

    let svid = svid.with_hint("");
    assert_eq!(svid.hint(), None);
}

#[test]
fn test_x509_svid_parse_from_der_empty_chain() {
    let err = X509Svid::parse_from_der(&[], WORKLOAD_KEY).unwrap_err();
    assert!(matches!(err, X509SvidError::EmptyChain));
}

#[test]
fn test_x509_svid_parse_from_der_corrupted_cert() {
    let err = X509Svid::parse_from_der(b"corrupted", WORKLOAD_KEY).unwrap_err();
    assert!(matches!(
        err,
        X509SvidError::Certificate(CertificateError::ParseX509Certificate(_))
    ));
}

#[test]
fn test_x509_svid_parse_from_der_corrupted_private_key() {
    let err = X509Svid::parse_from_der(WORKLOAD_CERT, b"corrupted").unwrap_err();
    assert!(matches!(
        err,
        X509SvidError::PrivateKey(PrivateKeyError::DecodePkcs8(_))
    ));
}

#[test]
fn test_x509_svid_parse_from_der_missing_spiffe_id() {
    let err = X509Svid::parse_from_der(NO_SPIFFE_ID_CERT, NO_SPIFFE_ID_KEY).unwrap_err();
    assert!(matches!(
        err,
        X509SvidError::Certificate(CertificateError::MissingSpiffeId)
    ));
}

#[test]
fn test_x509_svid_parse_from_der_ca_as_leaf() {
    // A trust root has keyCertSign but no digitalSignature.
    let err = X509Svid::parse_from_der(BUNDLE, WORKLOAD_KEY).unwrap_err();
    assert!(matches!(
        err,
        X509SvidError::LeafCertificateMissingDigitalSignature
    ));
}

#[test]
fn test_x509_svid_parse_from_der_leaf_as_signer() {
    let chain = [WORKLOAD_CERT, WORKLOAD2_CERT].concat();
    let err = X509Svid::parse_from_der(&chain, WORKLOAD_KEY).unwrap_err();
    assert!(matches!(err, X509SvidError::SigningCertificateMissingCaFlag));
}

#[test]
fn test_x509_svid_parse_from_der_too_long_chain() {
    let chain = SERVICE_CHAIN.repeat(9);
    let err = X509Svid::parse_from_der(&chain, SERVICE_KEY).unwrap_err();
    assert!(matches!(
        err,
        X509SvidError::Certificate(CertificateError::TooManyCertificates { max: 16 })
    ));
}

#[test]
fn test_x509_svid_parse_from_der_mismatched_key() {
    let err = X509Svid::parse_from_der(WORKLOAD_CERT, WORKLOAD2_KEY).unwrap_err();
    assert_eq!(err, X509SvidError::KeyMismatch);

    let err = X509Svid::parse_from_der(SERVICE_CHAIN, WORKLOAD_KEY).unwrap_err();
    assert_eq!(err, X509SvidError::KeyMismatch);
}
