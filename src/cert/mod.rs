//! DER-encoded certificates and private keys.
//!
//! Both wrappers validate their bytes on construction, so holding one means the
//! content is at least well-formed.

use std::fmt;

use pkcs8::PrivateKeyInfo;
use zeroize::Zeroize;

use crate::cert::error::{CertificateError, PrivateKeyError};
use crate::cert::parsing::{parse_x509, single_spiffe_id};
use crate::spiffe_id::SpiffeId;

pub mod error;
pub(crate) mod parsing;

/// A single DER-encoded X.509 certificate.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Certificate(pub(crate) Vec<u8>);

impl Certificate {
    /// The DER bytes of the certificate.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Extracts the SPIFFE ID from the certificate's URI SAN.
    ///
    /// # Errors
    ///
    /// Fails unless exactly one URI SAN entry is a SPIFFE ID.
    pub fn spiffe_id(&self) -> Result<SpiffeId, CertificateError> {
        single_spiffe_id(&parse_x509(&self.0)?)
    }
}

impl AsRef<[u8]> for Certificate {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Certificate {
    type Error = CertificateError;

    fn try_from(der: &[u8]) -> Result<Self, Self::Error> {
        parse_x509(der)?;
        Ok(Self(der.to_vec()))
    }
}

impl TryFrom<Vec<u8>> for Certificate {
    type Error = CertificateError;

    fn try_from(der: Vec<u8>) -> Result<Self, Self::Error> {
        parse_x509(&der)?;
        Ok(Self(der))
    }
}

/// A DER-encoded PKCS#8 private key, zeroized on drop.
#[derive(Clone, Eq, PartialEq, Zeroize)]
#[zeroize(drop)]
pub struct PrivateKey(Vec<u8>);

impl PrivateKey {
    /// The DER bytes of the key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for PrivateKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for PrivateKey {
    type Error = PrivateKeyError;

    fn try_from(der: &[u8]) -> Result<Self, Self::Error> {
        PrivateKeyInfo::try_from(der).map_err(PrivateKeyError::DecodePkcs8)?;
        Ok(Self(der.to_vec()))
    }
}

// Key material never reaches logs.
impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("len", &self.0.len())
            .finish()
    }
}
