//! SPIFFE IDs and trust domains.
//!
//! Parsing follows the character rules of the
//! [SPIFFE ID standard](https://github.com/spiffe/spiffe/blob/main/standards/SPIFFE-ID.md):
//! trust domain names use lowercase letters, digits, `.`, `-` and `_`; path segments
//! additionally allow uppercase letters and may not be empty, `.` or `..`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const SCHEME_PREFIX: &str = "spiffe://";

/// A validated SPIFFE ID, e.g. `spiffe://example.org/service/api`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SpiffeId {
    trust_domain: TrustDomain,
    path: String,
}

/// The trust domain part of a SPIFFE ID, e.g. `example.org`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TrustDomain {
    name: String,
}

/// Reasons a string is rejected as a SPIFFE ID or trust domain.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum SpiffeIdError {
    /// The input was empty.
    #[error("cannot be empty")]
    Empty,

    /// The trust domain part of the ID was empty.
    #[error("trust domain is missing")]
    MissingTrustDomain,

    /// The ID does not start with `spiffe://`.
    #[error("scheme is missing or invalid")]
    WrongScheme,

    /// The trust domain contains a character outside `[a-z0-9._-]`.
    #[error(
        "trust domain characters are limited to lowercase letters, numbers, dots, dashes, and \
         underscores"
    )]
    BadTrustDomainChar,

    /// A path segment contains a character outside `[a-zA-Z0-9._-]`.
    #[error(
        "path segment characters are limited to letters, numbers, dots, dashes, and underscores"
    )]
    BadPathSegmentChar,

    /// The path contains `//`.
    #[error("path cannot contain empty segments")]
    EmptySegment,

    /// The path contains a `.` or `..` segment.
    #[error("path cannot contain dot segments")]
    DotSegment,

    /// The path ends with `/`.
    #[error("path cannot have a trailing slash")]
    TrailingSlash,
}

impl SpiffeId {
    /// Parses a SPIFFE ID.
    ///
    /// ```
    /// use spiffe_workload::SpiffeId;
    ///
    /// let id = SpiffeId::new("spiffe://example.org/service/api").unwrap();
    /// assert_eq!(id.trust_domain().as_ref(), "example.org");
    /// assert_eq!(id.path(), "/service/api");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a [`SpiffeIdError`] describing the first rule the input violates.
    pub fn new(id: &str) -> Result<Self, SpiffeIdError> {
        if id.is_empty() {
            return Err(SpiffeIdError::Empty);
        }

        let rest = id
            .strip_prefix(SCHEME_PREFIX)
            .ok_or(SpiffeIdError::WrongScheme)?;

        let (name, path) = rest.split_at(rest.find('/').unwrap_or(rest.len()));
        if name.is_empty() {
            return Err(SpiffeIdError::MissingTrustDomain);
        }
        check_trust_domain_name(name)?;
        if !path.is_empty() {
            check_path(path)?;
        }

        Ok(Self {
            trust_domain: TrustDomain {
                name: name.to_owned(),
            },
            path: path.to_owned(),
        })
    }

    /// Builds a SPIFFE ID in `trust_domain` whose path joins `segments` with `/`.
    ///
    /// # Errors
    ///
    /// Returns a [`SpiffeIdError`] if a segment is empty, a dot segment, or contains
    /// a character not allowed in a path (including `/`).
    pub fn from_segments(
        trust_domain: TrustDomain,
        segments: &[&str],
    ) -> Result<Self, SpiffeIdError> {
        let path = segments.iter().fold(String::new(), |mut acc, segment| {
            acc.push('/');
            acc.push_str(segment);
            acc
        });

        // One segment carrying a '/' would otherwise pass as two.
        if segments.iter().any(|s| s.contains('/')) {
            return Err(if path.ends_with('/') {
                SpiffeIdError::TrailingSlash
            } else {
                SpiffeIdError::BadPathSegmentChar
            });
        }
        if !path.is_empty() {
            check_path(&path)?;
        }

        Ok(Self { trust_domain, path })
    }

    /// The trust domain this ID belongs to.
    pub fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    /// The path, including its leading `/`, or an empty string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns `true` if the ID lives in `trust_domain`.
    pub fn is_member_of(&self, trust_domain: &TrustDomain) -> bool {
        self.trust_domain == *trust_domain
    }
}

impl fmt::Display for SpiffeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME_PREFIX}{}{}", self.trust_domain.name, self.path)
    }
}

impl FromStr for SpiffeId {
    type Err = SpiffeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for SpiffeId {
    type Error = SpiffeIdError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<String> for SpiffeId {
    type Error = SpiffeIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl TrustDomain {
    /// Parses a trust domain from either a bare name (`example.org`) or a SPIFFE ID
    /// string (`spiffe://example.org/anything`).
    ///
    /// The Workload API keys bundles by the trust domain's SPIFFE ID, so both forms
    /// show up on the wire.
    ///
    /// ```
    /// use spiffe_workload::TrustDomain;
    ///
    /// let a = TrustDomain::new("example.org").unwrap();
    /// let b = TrustDomain::new("spiffe://example.org").unwrap();
    /// assert_eq!(a, b);
    /// assert_eq!(a.id_string(), "spiffe://example.org");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a [`SpiffeIdError`] if the input is neither a valid name nor a valid ID.
    pub fn new(id_or_name: &str) -> Result<Self, SpiffeIdError> {
        if id_or_name.is_empty() {
            return Err(SpiffeIdError::MissingTrustDomain);
        }

        if id_or_name.contains(":/") {
            return SpiffeId::new(id_or_name).map(|id| id.trust_domain);
        }

        check_trust_domain_name(id_or_name)?;
        Ok(Self {
            name: id_or_name.to_owned(),
        })
    }

    /// The SPIFFE ID of the trust domain itself, e.g. `spiffe://example.org`.
    pub fn id_string(&self) -> String {
        format!("{SCHEME_PREFIX}{}", self.name)
    }
}

impl fmt::Display for TrustDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl AsRef<str> for TrustDomain {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl FromStr for TrustDomain {
    type Err = SpiffeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for TrustDomain {
    type Error = SpiffeIdError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<String> for TrustDomain {
    type Error = SpiffeIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

fn is_trust_domain_byte(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'_')
}

fn is_path_segment_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_')
}

fn check_trust_domain_name(name: &str) -> Result<(), SpiffeIdError> {
    if name.bytes().all(is_trust_domain_byte) {
        Ok(())
    } else {
        Err(SpiffeIdError::BadTrustDomainChar)
    }
}

/// Validates a non-empty path that starts with `/`.
fn check_path(path: &str) -> Result<(), SpiffeIdError> {
    let mut segments = path.split('/').skip(1).peekable();

    while let Some(segment) = segments.next() {
        let last = segments.peek().is_none();
        match segment {
            "" if last => return Err(SpiffeIdError::TrailingSlash),
            "" => return Err(SpiffeIdError::EmptySegment),
            "." | ".." => return Err(SpiffeIdError::DotSegment),
            s if !s.bytes().all(is_path_segment_byte) => {
                return Err(SpiffeIdError::BadPathSegmentChar)
            }
            _ => {}
        }
    }

    Ok(())
}
