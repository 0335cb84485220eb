//! X.509-SVID type.

mod validations;

use crate::cert::error::{CertificateError, PrivateKeyError};
use crate::cert::parsing::{split_der_certificates, MAX_CHAIN_LENGTH};
use crate::cert::{Certificate, PrivateKey};
use crate::spiffe_id::SpiffeId;
use crate::svid::x509::validations::{
    validate_key_pair, validate_leaf, validate_signing_certificates,
};

/// A [SPIFFE X.509-SVID](https://github.com/spiffe/spiffe/blob/main/standards/X509-SVID.md).
///
/// Holds the SPIFFE ID taken from the leaf certificate, the certificate chain (leaf
/// first), the PKCS#8 private key and the operator-provided hint, if any.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct X509Svid {
    spiffe_id: SpiffeId,
    cert_chain: Vec<Certificate>,
    private_key: PrivateKey,
    hint: Option<String>,
}

/// An error that may arise parsing an [`X509Svid`] from DER data.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum X509SvidError {
    /// The certificate chain is empty.
    #[error("no certificates found in chain")]
    EmptyChain,

    /// The leaf certificate is a CA.
    #[error("leaf certificate must not have CA flag set to true")]
    LeafCertificateHasCaFlag,

    /// The leaf certificate may sign CRLs.
    #[error("leaf certificate must not have 'cRLSign' set as key usage")]
    LeafCertificateHasCrlSign,

    /// The leaf certificate may sign certificates.
    #[error("leaf certificate must not have 'keyCertSign' set as key usage")]
    LeafCertificateHasKeyCertSign,

    /// The leaf certificate lacks the `digitalSignature` key usage.
    #[error("leaf certificate must have 'digitalSignature' set as key usage")]
    LeafCertificateMissingDigitalSignature,

    /// A certificate after the leaf is not a CA.
    #[error("signing certificate must have CA flag set to true")]
    SigningCertificateMissingCaFlag,

    /// A certificate after the leaf lacks the `keyCertSign` key usage.
    #[error("signing certificate must have 'keyCertSign' set as key usage")]
    SigningCertificateMissingKeyCertSign,

    /// An extension needed for validation could not be decoded.
    #[error("X.509 extension could not be parsed: {extension}")]
    UnparseableExtension {
        /// Name of the extension.
        extension: &'static str,
    },

    /// The certificates could not be parsed or carry no usable SPIFFE ID.
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// The private key could not be decoded.
    #[error(transparent)]
    PrivateKey(#[from] PrivateKeyError),

    /// The private key does not belong to the leaf certificate.
    #[error("private key does not match the leaf certificate's public key")]
    KeyMismatch,
}

impl X509Svid {
    /// Parses an `X509Svid` from a concatenated DER certificate chain and a DER
    /// PKCS#8 private key.
    ///
    /// The first certificate is the leaf: it must carry exactly one SPIFFE ID, have the
    /// `digitalSignature` key usage and must not be a CA. Every following certificate
    /// must be a CA with the `keyCertSign` key usage. The private key must pair with
    /// the leaf's public key.
    ///
    /// # Errors
    ///
    /// Returns an [`X509SvidError`] naming the first failed check.
    pub fn parse_from_der(
        cert_chain_der: &[u8],
        private_key_der: &[u8],
    ) -> Result<Self, X509SvidError> {
        let cert_chain = split_der_certificates(cert_chain_der, Some(MAX_CHAIN_LENGTH))?;
        let (leaf, signers) = cert_chain
            .split_first()
            .ok_or(X509SvidError::EmptyChain)?;

        let spiffe_id = validate_leaf(leaf)?;
        validate_signing_certificates(signers)?;
        let private_key = PrivateKey::try_from(private_key_der)?;
        validate_key_pair(leaf, &private_key)?;

        Ok(Self {
            spiffe_id,
            cert_chain,
            private_key,
            hint: None,
        })
    }

    /// Attaches an operator-provided hint. Empty hints are treated as absent.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        let hint = hint.into();
        self.hint = (!hint.is_empty()).then_some(hint);
        self
    }

    /// The SPIFFE ID of the leaf certificate.
    pub fn spiffe_id(&self) -> &SpiffeId {
        &self.spiffe_id
    }

    /// The certificate chain, leaf first.
    pub fn cert_chain(&self) -> &[Certificate] {
        &self.cert_chain
    }

    /// The leaf certificate.
    pub fn leaf(&self) -> &Certificate {
        // parse_from_der rejects empty chains
        &self.cert_chain[0]
    }

    /// The private key matching the leaf certificate.
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// The operator-provided hint, if the agent sent one.
    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }
}
