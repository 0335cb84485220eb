#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding as _};
use futures::future::{self, BoxFuture, FutureExt as _};
use spiffe_workload::workload_api::pb::{JwtBundlesResponse, Jwtsvid, X509svid, X509svidResponse};
use spiffe_workload::{
    BackoffConfig, ErrorClass, InMemoryTransport, JwtBundleSet, JwtBundleWatcher, Sleeper,
    WorkloadApiClient, WorkloadApiError, X509Context, X509ContextWatcher,
};
use tokio_util::sync::CancellationToken;

pub const WORKLOAD_CERT: &[u8] = include_bytes!("../testdata/svid/x509/workload.der");
pub const WORKLOAD_KEY: &[u8] = include_bytes!("../testdata/svid/x509/workload-key.der");
pub const WORKLOAD2_CERT: &[u8] = include_bytes!("../testdata/svid/x509/workload2.der");
pub const WORKLOAD2_KEY: &[u8] = include_bytes!("../testdata/svid/x509/workload2-key.der");
pub const SERVICE_CHAIN: &[u8] = include_bytes!("../testdata/svid/x509/service-chain.der");
pub const SERVICE_KEY: &[u8] = include_bytes!("../testdata/svid/x509/service-key.der");
pub const NO_SPIFFE_ID_CERT: &[u8] = include_bytes!("../testdata/svid/x509/no-spiffe-id.der");
pub const NO_SPIFFE_ID_KEY: &[u8] = include_bytes!("../testdata/svid/x509/no-spiffe-id-key.der");

pub const BUNDLE: &[u8] = include_bytes!("../testdata/bundle/x509/bundle.der");
pub const FEDERATED_BUNDLE: &[u8] = include_bytes!("../testdata/bundle/x509/federated-bundle.der");
pub const BUNDLE_TWO_AUTHORITIES: &[u8] =
    include_bytes!("../testdata/bundle/x509/bundle-two-authorities.der");

pub const JWT_SIGNER_PEM: &[u8] = include_bytes!("../testdata/jwt/signer.pem");
pub const JWKS: &[u8] = include_bytes!("../testdata/jwt/jwks.json");
pub const JWT_KEY_ID: &str = "authority-1";

/// Guards every async test against a hung watch.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub fn x509_entry(spiffe_id: &str, cert: &[u8], key: &[u8], hint: &str) -> X509svid {
    X509svid {
        spiffe_id: spiffe_id.to_owned(),
        x509_svid: cert.to_vec(),
        x509_svid_key: key.to_vec(),
        bundle: BUNDLE.to_vec(),
        hint: hint.to_owned(),
    }
}

/// One SVID for `spiffe://example.org/workload` and the `example.org` bundle.
pub fn workload_response() -> X509svidResponse {
    X509svidResponse {
        svids: vec![x509_entry(
            "spiffe://example.org/workload",
            WORKLOAD_CERT,
            WORKLOAD_KEY,
            "",
        )],
        ..Default::default()
    }
}

/// Two SVIDs of `example.org` plus a federated `domain.test` bundle.
pub fn two_svids_response() -> X509svidResponse {
    X509svidResponse {
        svids: vec![
            x509_entry("spiffe://example.org/workload", WORKLOAD_CERT, WORKLOAD_KEY, "internal"),
            x509_entry("spiffe://example.org/workload2", WORKLOAD2_CERT, WORKLOAD2_KEY, "external"),
        ],
        federated_bundles: [("spiffe://domain.test".to_owned(), FEDERATED_BUNDLE.to_vec())].into(),
        ..Default::default()
    }
}

/// A response whose only SVID carries a corrupted key.
pub fn malformed_response() -> X509svidResponse {
    X509svidResponse {
        svids: vec![x509_entry(
            "spiffe://example.org/workload",
            WORKLOAD_CERT,
            b"not a key",
            "",
        )],
        ..Default::default()
    }
}

pub fn jwt_bundles_response() -> JwtBundlesResponse {
    JwtBundlesResponse {
        bundles: [("example.org".to_owned(), JWKS.to_vec())].into(),
    }
}

pub fn jwt_entry(token: &str, hint: &str) -> Jwtsvid {
    Jwtsvid {
        spiffe_id: "spiffe://example.org/workload".to_owned(),
        svid: token.to_owned(),
        hint: hint.to_owned(),
    }
}

pub fn in_an_hour() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp() + 3600
}

/// A structurally valid token whose signature is not checked by anything.
pub fn unsigned_token(sub: &str, aud: &[&str], exp: i64) -> String {
    let header = r#"{"alg":"ES256","kid":"authority-1","typ":"JWT"}"#;
    let claims = serde_json::json!({ "sub": sub, "aud": aud, "exp": exp });
    format!(
        "{}.{}.c2ln",
        Base64UrlUnpadded::encode_string(header.as_bytes()),
        Base64UrlUnpadded::encode_string(claims.to_string().as_bytes()),
    )
}

/// A token signed by the key published in `jwks.json`.
pub fn signed_token(sub: &str, aud: &[&str], exp: i64) -> String {
    let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::ES256);
    header.kid = Some(JWT_KEY_ID.to_owned());
    let claims = serde_json::json!({ "sub": sub, "aud": aud, "exp": exp });
    let key = jsonwebtoken::EncodingKey::from_ec_pem(JWT_SIGNER_PEM).unwrap();
    jsonwebtoken::encode(&header, &claims, &key).unwrap()
}

/// Records the requested delays and completes immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.delays.lock().unwrap().push(duration);
        future::ready(()).boxed()
    }
}

pub fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        min: Duration::from_millis(10),
        max: Duration::from_millis(80),
        jitter: false,
    }
}

/// A client over `transport` whose watches never actually sleep.
pub fn client(transport: &Arc<InMemoryTransport>) -> (WorkloadApiClient, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = WorkloadApiClient::from_transport(transport.clone(), fast_backoff())
        .with_sleeper(sleeper.clone());
    (client, sleeper)
}

/// Collects updates and error classes; cancels the watch after `cancel_after` updates.
#[derive(Debug)]
pub struct Recorder<T> {
    pub updates: Vec<T>,
    pub errors: Vec<ErrorClass>,
    pub messages: Vec<String>,
    cancel: CancellationToken,
    cancel_after: usize,
}

impl<T> Recorder<T> {
    pub fn new(cancel: &CancellationToken, cancel_after: usize) -> Self {
        Self {
            updates: Vec::new(),
            errors: Vec::new(),
            messages: Vec::new(),
            cancel: cancel.clone(),
            cancel_after,
        }
    }

    fn update(&mut self, update: T) {
        self.updates.push(update);
        if self.updates.len() >= self.cancel_after {
            self.cancel.cancel();
        }
    }

    fn error(&mut self, error: &WorkloadApiError) {
        self.errors.push(error.class());
        self.messages.push(error.to_string());
    }
}

impl X509ContextWatcher for Recorder<X509Context> {
    fn on_x509_context_update(&mut self, context: X509Context) {
        self.update(context);
    }

    fn on_x509_context_watch_error(&mut self, error: &WorkloadApiError) {
        self.error(error);
    }
}

impl JwtBundleWatcher for Recorder<JwtBundleSet> {
    fn on_jwt_bundles_update(&mut self, bundles: JwtBundleSet) {
        self.update(bundles);
    }

    fn on_jwt_bundles_watch_error(&mut self, error: &WorkloadApiError) {
        self.error(error);
    }
}
