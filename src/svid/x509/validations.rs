use crate::cert::error::{CertificateError, PrivateKeyError};
use crate::cert::parsing::{find_extension, parse_x509, single_spiffe_id};
use crate::cert::{Certificate, PrivateKey};
use crate::spiffe_id::SpiffeId;
use crate::svid::x509::X509SvidError;
use pkcs8::der::asn1::{AnyRef, BitStringRef, ContextSpecific, OctetStringRef, UintRef};
use pkcs8::der::{Decode, Reader, SliceReader, TagNumber};
use pkcs8::PrivateKeyInfo;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::{BasicConstraints, KeyUsage, ParsedExtension};
use x509_parser::oid_registry;
use x509_parser::public_key::PublicKey;

/// Validates `cert` as an X.509-SVID leaf and returns its SPIFFE ID.
pub(crate) fn validate_leaf(cert: &Certificate) -> Result<SpiffeId, X509SvidError> {
    let x509 = parse_x509(cert.as_bytes())?;

    let usage = key_usage(&x509)?;
    if !usage.digital_signature() {
        return Err(X509SvidError::LeafCertificateMissingDigitalSignature);
    }
    if usage.crl_sign() {
        return Err(X509SvidError::LeafCertificateHasCrlSign);
    }
    if usage.key_cert_sign() {
        return Err(X509SvidError::LeafCertificateHasKeyCertSign);
    }
    if basic_constraints(&x509)?.ca {
        return Err(X509SvidError::LeafCertificateHasCaFlag);
    }

    Ok(single_spiffe_id(&x509)?)
}

/// Validates every certificate after the leaf as a CA able to sign certificates.
pub(crate) fn validate_signing_certificates(certs: &[Certificate]) -> Result<(), X509SvidError> {
    for cert in certs {
        let x509 = parse_x509(cert.as_bytes())?;
        if !basic_constraints(&x509)?.ca {
            return Err(X509SvidError::SigningCertificateMissingCaFlag);
        }
        if !key_usage(&x509)?.key_cert_sign() {
            return Err(X509SvidError::SigningCertificateMissingKeyCertSign);
        }
    }
    Ok(())
}

fn key_usage<'a>(cert: &'a X509Certificate<'_>) -> Result<&'a KeyUsage, X509SvidError> {
    match find_extension(cert, &oid_registry::OID_X509_EXT_KEY_USAGE)? {
        ParsedExtension::KeyUsage(usage) => Ok(usage),
        // Present but undecodable must not pass as "no restrictions".
        _ => Err(X509SvidError::UnparseableExtension {
            extension: "KeyUsage",
        }),
    }
}

fn basic_constraints<'a>(
    cert: &'a X509Certificate<'_>,
) -> Result<&'a BasicConstraints, X509SvidError> {
    match find_extension(cert, &oid_registry::OID_X509_EXT_BASIC_CONSTRAINTS)? {
        ParsedExtension::BasicConstraints(constraints) => Ok(constraints),
        _ => Err(X509SvidError::UnparseableExtension {
            extension: "BasicConstraints",
        }),
    }
}

/// Checks that `key` is the private half of the leaf's public key.
///
/// The public key is recovered from the key encoding itself: the PKCS#8 v2
/// public key field, the SEC1 `publicKey` of an EC key, or the modulus and
/// exponent of an RSA key. Keys carrying none of these are accepted.
pub(crate) fn validate_key_pair(
    leaf: &Certificate,
    key: &PrivateKey,
) -> Result<(), X509SvidError> {
    let x509 = parse_x509(leaf.as_bytes())?;
    let spki = x509.public_key();
    let info = PrivateKeyInfo::try_from(key.as_bytes()).map_err(PrivateKeyError::DecodePkcs8)?;

    if spki.algorithm.algorithm.as_bytes() != info.algorithm.oid.as_bytes() {
        return Err(X509SvidError::KeyMismatch);
    }

    let leaf_key = spki.parsed().map_err(CertificateError::from)?;

    let matches = match (&leaf_key, info.public_key) {
        (PublicKey::EC(point), Some(public)) => point.data() == public,
        (PublicKey::Unknown(bytes), Some(public)) => *bytes == public,
        (PublicKey::EC(point), None) => match ec_public_key(info.private_key)? {
            Some(public) => point.data() == public.as_slice(),
            None => true,
        },
        (PublicKey::RSA(rsa), _) => {
            let (modulus, exponent) = rsa_public_parts(info.private_key)?;
            trim_zeros(rsa.modulus) == modulus.as_slice()
                && trim_zeros(rsa.exponent) == exponent.as_slice()
        }
        _ => true,
    };

    if matches {
        Ok(())
    } else {
        Err(X509SvidError::KeyMismatch)
    }
}

// SEC1 ECPrivateKey: version, privateKey, [0] parameters, [1] publicKey.
fn ec_public_key(der: &[u8]) -> Result<Option<Vec<u8>>, PrivateKeyError> {
    let mut reader = SliceReader::new(der).map_err(PrivateKeyError::DecodeKeyMaterial)?;
    reader
        .sequence(|seq| {
            u8::decode(seq)?;
            OctetStringRef::decode(seq)?;
            ContextSpecific::<AnyRef<'_>>::decode_explicit(seq, TagNumber::N0)?;
            let public = ContextSpecific::<BitStringRef<'_>>::decode_explicit(seq, TagNumber::N1)?;
            Ok(public.map(|field| field.value.raw_bytes().to_vec()))
        })
        .map_err(PrivateKeyError::DecodeKeyMaterial)
}

// RSAPrivateKey: version, modulus, publicExponent, then the private fields.
fn rsa_public_parts(der: &[u8]) -> Result<(Vec<u8>, Vec<u8>), PrivateKeyError> {
    let mut reader = SliceReader::new(der).map_err(PrivateKeyError::DecodeKeyMaterial)?;
    reader
        .sequence(|seq| {
            u8::decode(seq)?;
            let modulus = UintRef::decode(seq)?;
            let exponent = UintRef::decode(seq)?;
            while !seq.is_finished() {
                AnyRef::decode(seq)?;
            }
            Ok((modulus.as_bytes().to_vec(), exponent.as_bytes().to_vec()))
        })
        .map_err(PrivateKeyError::DecodeKeyMaterial)
}

fn trim_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}
