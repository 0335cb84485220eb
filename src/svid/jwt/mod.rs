//! JWT-SVID type.
//!
//! Two ways in:
//!
//! - [`JwtSvid::parse_insecure`] checks structure, expiry and audience but not the
//!   signature. Use it for tokens that came straight from the Workload API or that
//!   the agent already validated.
//! - [`JwtSvid::parse_and_validate`] also verifies the signature against a JWT bundle
//!   source. Use it for tokens received from peers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use jsonwebtoken::{DecodingKey, Validation};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use zeroize::Zeroize;

use crate::bundle::jwt::JwtBundle;
use crate::bundle::BundleSource;
use crate::spiffe_id::{SpiffeId, SpiffeIdError, TrustDomain};

const MAX_SEGMENT_LEN: usize = 64 * 1024;
const MAX_AUDIENCE_ENTRIES: usize = 32;

/// Signature algorithms allowed by the JWT-SVID profile.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum JwtAlg {
    /// RSASSA-PKCS1-v1_5 using SHA-256
    RS256,
    /// RSASSA-PKCS1-v1_5 using SHA-384
    RS384,
    /// RSASSA-PKCS1-v1_5 using SHA-512
    RS512,
    /// ECDSA using P-256 and SHA-256
    ES256,
    /// ECDSA using P-384 and SHA-384
    ES384,
    /// RSASSA-PSS using SHA-256
    PS256,
    /// RSASSA-PSS using SHA-384
    PS384,
    /// RSASSA-PSS using SHA-512
    PS512,
}

impl JwtAlg {
    fn from_header(alg: &str) -> Option<Self> {
        Some(match alg {
            "RS256" => Self::RS256,
            "RS384" => Self::RS384,
            "RS512" => Self::RS512,
            "ES256" => Self::ES256,
            "ES384" => Self::ES384,
            "PS256" => Self::PS256,
            "PS384" => Self::PS384,
            "PS512" => Self::PS512,
            _ => return None,
        })
    }

    fn algorithm(self) -> jsonwebtoken::Algorithm {
        match self {
            Self::RS256 => jsonwebtoken::Algorithm::RS256,
            Self::RS384 => jsonwebtoken::Algorithm::RS384,
            Self::RS512 => jsonwebtoken::Algorithm::RS512,
            Self::ES256 => jsonwebtoken::Algorithm::ES256,
            Self::ES384 => jsonwebtoken::Algorithm::ES384,
            Self::PS256 => jsonwebtoken::Algorithm::PS256,
            Self::PS384 => jsonwebtoken::Algorithm::PS384,
            Self::PS512 => jsonwebtoken::Algorithm::PS512,
        }
    }
}

/// A [SPIFFE JWT-SVID](https://github.com/spiffe/spiffe/blob/main/standards/JWT-SVID.md).
///
/// The serialized token is zeroized on drop.
#[derive(Debug, Clone, PartialEq)]
pub struct JwtSvid {
    spiffe_id: SpiffeId,
    expiry: OffsetDateTime,
    claims: Claims,
    key_id: String,
    alg: JwtAlg,
    token: Token,
    hint: Option<String>,
}

/// An error that may arise parsing or validating a [`JwtSvid`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JwtSvidError {
    /// The token is not three dot-separated segments.
    #[error("malformed jwt token: expected 3 dot-separated parts")]
    InvalidJwtFormat,

    /// A segment is not unpadded base64url.
    #[error("malformed jwt token: invalid base64url encoding")]
    InvalidBase64,

    /// The header or claims are not the expected JSON.
    #[error("malformed jwt token: invalid json")]
    InvalidJson(#[source] serde_json::Error),

    /// The `typ` header is neither `JWT` nor `JOSE`.
    #[error("token header 'typ' should be 'JWT' or 'JOSE'")]
    InvalidTyp,

    /// The `alg` header names an algorithm outside the JWT-SVID profile.
    #[error("algorithm in 'alg' header is not supported: {0}")]
    UnsupportedAlgorithm(String),

    /// The `kid` header is missing.
    #[error("token header 'kid' not found")]
    MissingKeyId,

    /// The `sub` claim is not a SPIFFE ID.
    #[error("invalid spiffe_id in token 'sub' claim")]
    InvalidSubject(#[from] SpiffeIdError),

    /// The `exp` claim is not a representable timestamp.
    #[error("invalid token expiration ('exp') claim")]
    InvalidExpiration,

    /// The token has expired.
    #[error("token has expired (exp={0})")]
    Expired(OffsetDateTime),

    /// An expected audience is missing from the `aud` claim.
    #[error("expected audience {expected:?} not in token audience {actual:?}")]
    InvalidAudience {
        /// Audience the caller required.
        expected: String,
        /// Audience carried by the token.
        actual: Vec<String>,
    },

    /// No JWT bundle exists for the token's trust domain.
    #[error("cannot find JWT bundle for trust domain: {0}")]
    BundleNotFound(TrustDomain),

    /// The bundle has no authority with the token's key ID.
    #[error("cannot find JWT authority for key_id: {0}")]
    AuthorityNotFound(String),

    /// The bundle source failed.
    #[error("bundle source error")]
    BundleSource(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// Signature or claim verification failed.
    #[error("cannot decode token")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

/// JWT-SVID claims: the registered `sub`, `aud` and `exp` plus any others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    sub: String,
    #[serde(deserialize_with = "one_or_many")]
    aud: Vec<String>,
    exp: i64,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

impl Claims {
    /// The `sub` claim.
    pub fn sub(&self) -> &str {
        &self.sub
    }

    /// The `aud` claim, normalized to a list.
    pub fn aud(&self) -> &[String] {
        &self.aud
    }

    /// The `exp` claim as seconds since the epoch.
    pub fn exp(&self) -> i64 {
        self.exp
    }

    /// Any claim not modeled above, e.g. `iat` or custom claims.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.other.get(name)
    }
}

#[derive(Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    typ: Option<String>,
}

#[derive(Clone, PartialEq, Zeroize)]
#[zeroize(drop)]
struct Token(String);

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(..)")
    }
}

impl JwtSvid {
    /// Parses `token` without verifying its signature.
    ///
    /// Checks the token structure, the `alg`/`typ`/`kid` headers, that `sub` is a
    /// SPIFFE ID, that the token has not expired and that every entry of
    /// `expected_audience` appears in `aud`.
    ///
    /// # Errors
    ///
    /// Returns the [`JwtSvidError`] for the first failed check.
    pub fn parse_insecure<T: AsRef<str>>(
        token: &str,
        expected_audience: &[T],
    ) -> Result<Self, JwtSvidError> {
        let svid = Self::from_str(token)?;

        if svid.expiry <= OffsetDateTime::now_utc() {
            return Err(JwtSvidError::Expired(svid.expiry));
        }

        for expected in expected_audience {
            let expected = expected.as_ref();
            if !svid.claims.aud.iter().any(|aud| aud == expected) {
                return Err(JwtSvidError::InvalidAudience {
                    expected: expected.to_owned(),
                    actual: svid.claims.aud.clone(),
                });
            }
        }

        Ok(svid)
    }

    /// Parses `token` and verifies its signature with the authority found in
    /// `bundle_source` for the token's trust domain and key ID.
    ///
    /// Expiry is checked without leeway. The token must carry at least one entry of
    /// `expected_audience`.
    ///
    /// # Errors
    ///
    /// Returns a [`JwtSvidError`] if the token is malformed, no authority matches, or
    /// signature, expiry or audience verification fails.
    pub fn parse_and_validate<B, T>(
        token: &str,
        bundle_source: &B,
        expected_audience: &[T],
    ) -> Result<Self, JwtSvidError>
    where
        B: BundleSource<Item = JwtBundle>,
        T: AsRef<str>,
    {
        let untrusted = Self::from_str(token)?;
        let trust_domain = untrusted.spiffe_id.trust_domain();

        let bundle = bundle_source
            .bundle_for_trust_domain(trust_domain)
            .map_err(|e| JwtSvidError::BundleSource(Box::new(e)))?
            .ok_or_else(|| JwtSvidError::BundleNotFound(trust_domain.clone()))?;
        let authority = bundle
            .find_jwt_authority(&untrusted.key_id)
            .ok_or_else(|| JwtSvidError::AuthorityNotFound(untrusted.key_id.clone()))?;

        let mut validation = Validation::new(untrusted.alg.algorithm());
        validation.leeway = 0;
        let audience: Vec<&str> = expected_audience.iter().map(AsRef::as_ref).collect();
        validation.set_audience(&audience);

        let key = DecodingKey::from_jwk(authority.jwk())?;
        jsonwebtoken::decode::<Claims>(token, &key, &validation)?;

        Ok(untrusted)
    }

    /// Attaches an operator-provided hint. Empty hints are treated as absent.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        let hint = hint.into();
        self.hint = (!hint.is_empty()).then_some(hint);
        self
    }

    /// The serialized token.
    pub fn token(&self) -> &str {
        &self.token.0
    }

    /// The SPIFFE ID from the `sub` claim.
    pub fn spiffe_id(&self) -> &SpiffeId {
        &self.spiffe_id
    }

    /// The `aud` claim.
    pub fn audience(&self) -> &[String] {
        &self.claims.aud
    }

    /// The `exp` claim.
    pub fn expiry(&self) -> OffsetDateTime {
        self.expiry
    }

    /// The `kid` header.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// The `alg` header.
    pub fn algorithm(&self) -> JwtAlg {
        self.alg
    }

    /// All claims. Only trustworthy when the token was validated by the agent or by
    /// [`JwtSvid::parse_and_validate`].
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// The operator-provided hint, if the agent sent one.
    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }
}

impl FromStr for JwtSvid {
    type Err = JwtSvidError;

    /// Decodes the token structure only: no expiry, audience or signature check.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let mut segments = token.split('.');
        let (Some(header), Some(claims), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(JwtSvidError::InvalidJwtFormat);
        };

        let header: Header =
            serde_json::from_slice(&decode_segment(header)?).map_err(JwtSvidError::InvalidJson)?;
        let claims: Claims =
            serde_json::from_slice(&decode_segment(claims)?).map_err(JwtSvidError::InvalidJson)?;

        if !matches!(header.typ.as_deref(), None | Some("JWT" | "JOSE")) {
            return Err(JwtSvidError::InvalidTyp);
        }
        let alg = JwtAlg::from_header(&header.alg)
            .ok_or_else(|| JwtSvidError::UnsupportedAlgorithm(header.alg.clone()))?;
        let key_id = header.kid.ok_or(JwtSvidError::MissingKeyId)?;
        let spiffe_id = SpiffeId::new(&claims.sub)?;
        let expiry = OffsetDateTime::from_unix_timestamp(claims.exp)
            .map_err(|_| JwtSvidError::InvalidExpiration)?;

        Ok(Self {
            spiffe_id,
            expiry,
            claims,
            key_id,
            alg,
            token: Token(token.to_owned()),
            hint: None,
        })
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, JwtSvidError> {
    use base64ct::{Base64UrlUnpadded, Encoding as _};

    if segment.len() > MAX_SEGMENT_LEN * 4 / 3 {
        return Err(JwtSvidError::InvalidBase64);
    }
    Base64UrlUnpadded::decode_vec(segment).map_err(|_| JwtSvidError::InvalidBase64)
}

// `aud` may be a single string or an array of strings.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(aud) => Ok(vec![aud]),
        OneOrMany::Many(aud) if aud.len() > MAX_AUDIENCE_ENTRIES => Err(de::Error::custom(
            format!("'aud' claim has too many entries (max {MAX_AUDIENCE_ENTRIES})"),
        )),
        OneOrMany::Many(aud) => Ok(aud),
    }
}
