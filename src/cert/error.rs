//! Certificate and private key errors.

use crate::spiffe_id::SpiffeIdError;
use x509_parser::der_parser::oid::Oid;
use x509_parser::error::X509Error;

/// An error that may arise parsing or inspecting an X.509 certificate.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum CertificateError {
    /// The bytes are not a DER-encoded X.509 certificate.
    #[error("failed parsing X.509 certificate")]
    ParseX509Certificate(#[from] X509Error),

    /// A required X.509 extension is absent.
    #[error("X.509 extension is missing: {0}")]
    MissingX509Extension(Oid<'static>),

    /// An extension is present but its content could not be decoded.
    #[error("X.509 extension could not be parsed: {extension}")]
    UnparseableExtension {
        /// Name of the extension.
        extension: &'static str,
    },

    /// A certificate chain holds more certificates than accepted.
    #[error("certificate chain has too many certificates (max {max})")]
    TooManyCertificates {
        /// Maximum accepted chain length.
        max: usize,
    },

    /// The certificate carries more URI SAN entries than are inspected.
    #[error("certificate has too many URI SAN entries (max {max})")]
    TooManyUriSanEntries {
        /// Maximum number of URI SAN entries inspected.
        max: usize,
    },

    /// No URI SAN of the certificate is a SPIFFE ID.
    #[error("certificate is missing SPIFFE ID in URI SAN")]
    MissingSpiffeId,

    /// More than one URI SAN of the certificate is a SPIFFE ID.
    #[error("certificate contains multiple SPIFFE IDs in URI SAN")]
    MultipleSpiffeIds,

    /// A `spiffe://` URI SAN failed to parse.
    #[error("failed to parse SPIFFE ID from URI SAN")]
    InvalidSpiffeId(#[from] SpiffeIdError),
}

/// An error that may arise decoding a private key.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum PrivateKeyError {
    /// The bytes are not an unencrypted PKCS#8 private key.
    #[error("failed decoding PKCS#8 private key")]
    DecodePkcs8(pkcs8::Error),

    /// The algorithm-specific key inside the PKCS#8 envelope is malformed.
    #[error("failed decoding private key material")]
    DecodeKeyMaterial(pkcs8::der::Error),
}
