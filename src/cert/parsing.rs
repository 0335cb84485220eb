use crate::cert::error::CertificateError;
use crate::cert::Certificate;
use crate::spiffe_id::SpiffeId;
use x509_parser::certificate::X509Certificate;
use x509_parser::der_parser::oid::Oid;
use x509_parser::error::X509Error;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::nom;
use x509_parser::oid_registry;

/// Upper bound on the length of an SVID certificate chain.
///
/// Bundles are not bounded: a trust domain may publish many authorities.
pub(crate) const MAX_CHAIN_LENGTH: usize = 16;

const MAX_URI_SAN_ENTRIES: usize = 32;

fn map_nom_error(e: nom::Err<X509Error>) -> CertificateError {
    match e {
        nom::Err::Incomplete(_) => {
            CertificateError::ParseX509Certificate(X509Error::InvalidCertificate)
        }
        nom::Err::Error(err) | nom::Err::Failure(err) => {
            CertificateError::ParseX509Certificate(err)
        }
    }
}

/// Splits concatenated DER certificates, keeping each certificate's original bytes.
///
/// With `limit` set, fails once more than `limit` certificates are found.
pub(crate) fn split_der_certificates(
    der: &[u8],
    limit: Option<usize>,
) -> Result<Vec<Certificate>, CertificateError> {
    let mut rest = der;
    let mut certs = Vec::new();

    while !rest.is_empty() {
        if let Some(max) = limit {
            if certs.len() >= max {
                return Err(CertificateError::TooManyCertificates { max });
            }
        }

        let (remaining, _) = x509_parser::parse_x509_certificate(rest).map_err(map_nom_error)?;
        let consumed = rest.len() - remaining.len();
        certs.push(Certificate(rest[..consumed].to_vec()));
        rest = remaining;
    }

    Ok(certs)
}

pub(crate) fn parse_x509(der: &[u8]) -> Result<X509Certificate<'_>, CertificateError> {
    x509_parser::parse_x509_certificate(der)
        .map(|(_, cert)| cert)
        .map_err(map_nom_error)
}

pub(crate) fn find_extension<'a>(
    cert: &'a X509Certificate<'_>,
    oid: &Oid<'static>,
) -> Result<&'a ParsedExtension<'a>, CertificateError> {
    cert.tbs_certificate
        .get_extension_unique(oid)?
        .map(|ext| ext.parsed_extension())
        .ok_or_else(|| CertificateError::MissingX509Extension(oid.clone()))
}

/// Returns the single SPIFFE ID carried in the certificate's URI SAN entries.
pub(crate) fn single_spiffe_id(cert: &X509Certificate<'_>) -> Result<SpiffeId, CertificateError> {
    let san = match find_extension(cert, &oid_registry::OID_X509_EXT_SUBJECT_ALT_NAME)? {
        ParsedExtension::SubjectAlternativeName(san) => san,
        _ => {
            return Err(CertificateError::UnparseableExtension {
                extension: "SubjectAlternativeName",
            })
        }
    };

    let uris = san.general_names.iter().filter_map(|name| match name {
        GeneralName::URI(uri) => Some(*uri),
        _ => None,
    });

    let mut found = None;
    for (i, uri) in uris.enumerate() {
        if i >= MAX_URI_SAN_ENTRIES {
            return Err(CertificateError::TooManyUriSanEntries {
                max: MAX_URI_SAN_ENTRIES,
            });
        }
        if !uri.starts_with("spiffe://") {
            continue;
        }
        if found.is_some() {
            return Err(CertificateError::MultipleSpiffeIds);
        }
        found = Some(SpiffeId::new(uri)?);
    }

    found.ok_or(CertificateError::MissingSpiffeId)
}
