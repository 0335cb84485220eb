mod common;

use std::sync::Arc;

use common::*;
use spiffe_workload::workload_api::pb::{
    JwtsvidResponse, ValidateJwtsvidResponse, X509svidResponse,
};
use spiffe_workload::workload_api::transport::memory::StreamEnd;
use spiffe_workload::{
    InMemoryTransport, JwtSvidError, SpiffeId, TrustDomain, WorkloadApiClient, WorkloadApiError,
};
use tonic::Status;

fn client_with(transport: &Arc<InMemoryTransport>) -> WorkloadApiClient {
    client(transport).0
}

#[tokio::test]
async fn test_fetch_x509_svid_returns_first_entry() {
    let transport = Arc::new(InMemoryTransport::new());
    transport.push_x509_stream([Ok(two_svids_response())], StreamEnd::Hang);

    let svid = client_with(&transport).fetch_x509_svid().await.unwrap();

    assert_eq!(svid.spiffe_id().to_string(), "spiffe://example.org/workload");
    assert_eq!(svid.hint(), Some("internal"));
}

#[tokio::test]
async fn test_fetch_all_x509_svids() {
    let transport = Arc::new(InMemoryTransport::new());
    transport.push_x509_stream([Ok(two_svids_response())], StreamEnd::Close);

    let svids = client_with(&transport).fetch_all_x509_svids().await.unwrap();

    assert_eq!(svids.len(), 2);
    assert_eq!(svids[1].spiffe_id().to_string(), "spiffe://example.org/workload2");
}

#[tokio::test]
async fn test_fetch_x509_bundles_includes_federated() {
    let transport = Arc::new(InMemoryTransport::new());
    transport.push_x509_stream([Ok(two_svids_response())], StreamEnd::Hang);

    let bundles = client_with(&transport).fetch_x509_bundles().await.unwrap();

    assert_eq!(bundles.len(), 2);
    let federated = TrustDomain::new("domain.test").unwrap();
    assert_eq!(
        bundles.get(&federated).unwrap().authorities()[0].as_bytes(),
        FEDERATED_BUNDLE
    );
}

#[tokio::test]
async fn test_fetch_x509_context() {
    let transport = Arc::new(InMemoryTransport::new());
    transport.push_x509_stream([Ok(workload_response())], StreamEnd::Hang);

    let context = client_with(&transport).fetch_x509_context().await.unwrap();

    assert_eq!(context.svids().len(), 1);
    assert_eq!(context.bundle_set().len(), 1);
    assert_eq!(transport.x509_opens(), 1);
}

#[tokio::test]
async fn test_one_shot_fetches_never_retry() {
    let transport = Arc::new(InMemoryTransport::new());
    transport
        .reject_x509(Status::unavailable("agent down"))
        .push_x509_stream([Ok(workload_response())], StreamEnd::Hang);
    let client = client_with(&transport);

    let err = client.fetch_x509_context().await.unwrap_err();
    assert_eq!(err.status_code(), Some(tonic::Code::Unavailable));
    assert_eq!(transport.x509_opens(), 1);

    assert!(client.fetch_x509_context().await.is_ok());
}

#[tokio::test]
async fn test_fetch_x509_context_errors() {
    let transport = Arc::new(InMemoryTransport::new());
    transport
        .push_x509_stream([], StreamEnd::Close)
        .push_x509_stream([Ok(X509svidResponse::default())], StreamEnd::Close)
        .push_x509_stream([Ok(malformed_response())], StreamEnd::Close)
        .reject_x509(Status::permission_denied("no identity issued"));
    let client = client_with(&transport);

    assert!(matches!(
        client.fetch_x509_context().await.unwrap_err(),
        WorkloadApiError::EmptyResponse
    ));
    assert!(matches!(
        client.fetch_x509_context().await.unwrap_err(),
        WorkloadApiError::EmptyResponse
    ));
    assert!(matches!(
        client.fetch_x509_context().await.unwrap_err(),
        WorkloadApiError::X509Svid(_)
    ));
    assert!(matches!(
        client.fetch_x509_context().await.unwrap_err(),
        WorkloadApiError::NoIdentityIssued
    ));
}

#[tokio::test]
async fn test_fetch_jwt_svid_sends_audience_and_id() {
    let token = unsigned_token("spiffe://example.org/workload", &["service-a"], in_an_hour());
    let transport = Arc::new(InMemoryTransport::new());
    transport.push_jwt_svid(Ok(JwtsvidResponse {
        svids: vec![jwt_entry(&token, "")],
    }));

    let spiffe_id = SpiffeId::new("spiffe://example.org/workload").unwrap();
    let svid = client_with(&transport)
        .fetch_jwt_svid(&["service-a"], Some(&spiffe_id))
        .await
        .unwrap();

    assert_eq!(svid.spiffe_id(), &spiffe_id);
    assert_eq!(svid.token(), token);

    let requests = transport.jwt_svid_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].audience, ["service-a"]);
    assert_eq!(requests[0].spiffe_id, "spiffe://example.org/workload");
}

#[tokio::test]
async fn test_fetch_jwt_svid_default_identity_sends_empty_id() {
    let token = unsigned_token("spiffe://example.org/workload", &["a", "b"], in_an_hour());
    let transport = Arc::new(InMemoryTransport::new());
    transport.push_jwt_svid(Ok(JwtsvidResponse {
        svids: vec![jwt_entry(&token, "")],
    }));

    client_with(&transport)
        .fetch_jwt_svid(vec!["a".to_owned(), "b".to_owned()], None)
        .await
        .unwrap();

    let requests = transport.jwt_svid_requests();
    assert_eq!(requests[0].audience, ["a", "b"]);
    assert!(requests[0].spiffe_id.is_empty());
}

#[tokio::test]
async fn test_fetch_jwt_svid_rejects_missing_audience() {
    let token = unsigned_token("spiffe://example.org/workload", &["service-a"], in_an_hour());
    let transport = Arc::new(InMemoryTransport::new());
    transport.push_jwt_svid(Ok(JwtsvidResponse {
        svids: vec![jwt_entry(&token, "")],
    }));

    let err = client_with(&transport)
        .fetch_jwt_svid(&["service-b"], None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkloadApiError::JwtSvid(JwtSvidError::InvalidAudience { .. })
    ));
}

#[tokio::test]
async fn test_fetch_jwt_svid_by_hint() {
    let first = unsigned_token("spiffe://example.org/workload", &["aud"], in_an_hour());
    let second = unsigned_token("spiffe://example.org/other", &["aud"], in_an_hour());
    let response = JwtsvidResponse {
        svids: vec![jwt_entry(&first, "internal"), jwt_entry(&second, "external")],
    };
    let transport = Arc::new(InMemoryTransport::new());
    transport
        .push_jwt_svid(Ok(response.clone()))
        .push_jwt_svid(Ok(response.clone()))
        .push_jwt_svid(Ok(response));
    let client = client_with(&transport);

    let svid = client
        .fetch_jwt_svid_by_hint(&["aud"], None, "external")
        .await
        .unwrap();
    assert_eq!(svid.spiffe_id().to_string(), "spiffe://example.org/other");

    let all = client.fetch_all_jwt_svids(&["aud"], None).await.unwrap();
    assert_eq!(all.len(), 2);

    let err = client
        .fetch_jwt_svid_by_hint(&["aud"], None, "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, WorkloadApiError::HintNotFound(hint) if hint == "missing"));
}

#[tokio::test]
async fn test_fetch_jwt_token() {
    let token = unsigned_token("spiffe://example.org/workload", &["aud"], in_an_hour());
    let transport = Arc::new(InMemoryTransport::new());
    transport
        .push_jwt_svid(Ok(JwtsvidResponse {
            svids: vec![jwt_entry(&token, "")],
        }))
        .push_jwt_svid(Ok(JwtsvidResponse::default()));
    let client = client_with(&transport);

    assert_eq!(client.fetch_jwt_token(&["aud"], None).await.unwrap(), token);
    assert!(matches!(
        client.fetch_jwt_token(&["aud"], None).await.unwrap_err(),
        WorkloadApiError::EmptyResponse
    ));
}

#[tokio::test]
async fn test_fetch_jwt_bundles() {
    let transport = Arc::new(InMemoryTransport::new());
    transport.push_jwt_bundles_stream([Ok(jwt_bundles_response())], StreamEnd::Hang);

    let bundles = client_with(&transport).fetch_jwt_bundles().await.unwrap();

    let bundle = bundles.get(&TrustDomain::new("example.org").unwrap()).unwrap();
    assert!(bundle.find_jwt_authority(JWT_KEY_ID).is_some());
}

#[tokio::test]
async fn test_validate_jwt_token_asks_the_agent_first() {
    let token = unsigned_token("spiffe://example.org/workload", &["aud"], in_an_hour());
    let transport = Arc::new(InMemoryTransport::new());
    transport
        .push_validate(Ok(ValidateJwtsvidResponse {
            spiffe_id: "spiffe://example.org/workload".to_owned(),
            claims: None,
        }))
        .push_validate(Err(Status::invalid_argument("token expired")));
    let client = client_with(&transport);

    let svid = client.validate_jwt_token("aud", &token).await.unwrap();
    assert_eq!(svid.spiffe_id().to_string(), "spiffe://example.org/workload");

    let err = client.validate_jwt_token("aud", &token).await.unwrap_err();
    assert_eq!(err.status_code(), Some(tonic::Code::InvalidArgument));

    let requests = transport.validate_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].audience, "aud");
    assert_eq!(requests[0].svid, token);
}

#[tokio::test]
async fn test_connect_to_rejects_invalid_endpoint() {
    let err = WorkloadApiClient::connect_to("http://127.0.0.1:8081")
        .await
        .unwrap_err();
    assert!(matches!(err, WorkloadApiError::Endpoint(_)));
}

// These tests need a SPIFFE implementation running, thus they are ignored by default,
// to run them use: `cargo test -- --include-ignored`

#[tokio::test]
#[ignore]
async fn test_live_fetch_x509_context() {
    let client = WorkloadApiClient::connect_env().await.unwrap();
    let context = client.fetch_x509_context().await.unwrap();
    assert!(context.default_svid().is_some());
    assert!(!context.bundle_set().is_empty());
}

#[tokio::test]
#[ignore]
async fn test_live_fetch_and_validate_jwt_token() {
    let client = WorkloadApiClient::connect_env().await.unwrap();
    let token = client.fetch_jwt_token(&["my_audience"], None).await.unwrap();
    let jwt_svid = client.validate_jwt_token("my_audience", &token).await.unwrap();
    assert_eq!(jwt_svid.audience(), ["my_audience"]);
}
