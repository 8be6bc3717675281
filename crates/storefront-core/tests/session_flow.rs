//! Integration tests for authorized requests and session renewal.
//!
//! Each test stands up a mock storefront server and checks how many times
//! the protected and renewal endpoints were hit, with which credentials,
//! and what the credential store holds afterwards.

mod common;

use std::time::Duration;

use common::*;
use serde_json::json;
use storefront_core::models::OrderItem;
use storefront_core::auth::{FileBackend, SecretSource};
use storefront_core::{ApiError, CredentialStore, RenewalError, RenewalMode};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn one_lamp() -> Vec<OrderItem> {
    vec![OrderItem::new(1, 1)]
}

#[tokio::test]
async fn test_login_then_order_uses_login_token_without_renewal() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server, RenewalMode::Explicit);

    Mock::given(method("POST"))
        .and(path("/users/login"))
        .and(body_json(json!({"email": "ann@example.com", "password": "pw"})))
        .respond_with(tokens_response("A1", Some("R1")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders/"))
        .and(header("authorization", "Bearer A1"))
        .and(body_json(json!({"items": [{"product_id": 1, "quantity": 1}]})))
        .respond_with(receipt_response(10))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .respond_with(tokens_response("unused", None))
        .expect(0)
        .mount(&server)
        .await;

    let session = client.login("ann@example.com", "pw").await.unwrap();
    assert!(session.is_authenticated());

    let receipt = client.place_order(one_lamp()).await.unwrap();
    assert_eq!(receipt.order_id, 10);
    assert_session(&store, Some("A1"), Some("R1")).await;
}

#[tokio::test]
async fn test_expired_token_renewed_via_cookie_and_retried_with_new_token() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server, RenewalMode::Implicit);

    Mock::given(method("POST"))
        .and(path("/users/login"))
        .and(header("x-use-cookie", "1"))
        .respond_with(
            tokens_response("A1", None)
                .insert_header("set-cookie", "refresh_token=R1; HttpOnly; Path=/; SameSite=lax"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders/"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .and(header("cookie", "refresh_token=R1"))
        .respond_with(tokens_response("A2", Some("R2")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders/"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(receipt_response(11))
        .expect(1)
        .mount(&server)
        .await;

    client.login("ann@example.com", "pw").await.unwrap();
    assert_session(&store, Some("A1"), None).await;

    let receipt = client.place_order(one_lamp()).await.unwrap();
    assert_eq!(receipt.order_id, 11);
    assert_session(&store, Some("A2"), Some("R2")).await;

    // Implicit mode never puts the renewal token in the body
    let requests = server.received_requests().await.unwrap();
    let renewal = requests
        .iter()
        .find(|r| r.url.path() == "/users/refresh")
        .unwrap();
    assert!(renewal.body.is_empty());
}

#[tokio::test]
async fn test_explicit_renewal_sends_stored_token() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server, RenewalMode::Explicit);
    seed(&store, "A1", Some("R1")).await;

    Mock::given(method("POST"))
        .and(path("/orders/"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .and(body_json(json!({"refresh_token": "R1"})))
        .respond_with(tokens_response("A2", None))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders/"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(receipt_response(12))
        .expect(1)
        .mount(&server)
        .await;

    client.place_order(one_lamp()).await.unwrap();
    // Response without refresh_token keeps the old one
    assert_session(&store, Some("A2"), Some("R1")).await;
}

#[tokio::test]
async fn test_retry_rejected_again_renews_only_once() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server, RenewalMode::Explicit);
    seed(&store, "A1", Some("R1")).await;

    Mock::given(method("POST"))
        .and(path("/orders/"))
        .respond_with(unauthorized())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .respond_with(tokens_response("A2", Some("R2")))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.place_order(one_lamp()).await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized), "got {:?}", err);
    assert!(!err.is_logged_out());
    assert_session(&store, Some("A2"), Some("R2")).await;
}

#[tokio::test]
async fn test_rejected_renewal_clears_store_and_skips_retry() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server, RenewalMode::Explicit);
    seed(&store, "A1", Some("R1")).await;

    Mock::given(method("POST"))
        .and(path("/orders/"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "Refresh token revoked or not found"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = client.place_order(one_lamp()).await.unwrap_err();
    match &err {
        ApiError::RenewalFailed(RenewalError::Rejected { status, detail }) => {
            assert_eq!(*status, 401);
            assert_eq!(detail, "Refresh token revoked or not found");
        }
        other => panic!("expected rejected renewal, got {:?}", other),
    }
    assert!(err.is_logged_out());
    assert_session(&store, None, None).await;
}

#[tokio::test]
async fn test_missing_renewal_token_fails_without_calling_server() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server, RenewalMode::Explicit);
    seed(&store, "A1", None).await;

    Mock::given(method("POST"))
        .and(path("/orders/"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .respond_with(tokens_response("A2", None))
        .expect(0)
        .mount(&server)
        .await;

    let err = client.place_order(one_lamp()).await.unwrap_err();
    assert!(
        matches!(err, ApiError::RenewalFailed(RenewalError::NoRenewalCredential)),
        "got {:?}",
        err
    );
    assert_session(&store, None, None).await;
}

#[tokio::test]
async fn test_malformed_renewal_response_clears_store() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server, RenewalMode::Explicit);
    seed(&store, "A1", Some("R1")).await;

    Mock::given(method("POST"))
        .and(path("/orders/"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token_type": "bearer"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.place_order(one_lamp()).await.unwrap_err();
    assert!(
        matches!(err, ApiError::RenewalFailed(RenewalError::MalformedResponse(_))),
        "got {:?}",
        err
    );
    assert_session(&store, None, None).await;
}

#[tokio::test]
async fn test_business_error_is_not_renewed() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server, RenewalMode::Explicit);
    seed(&store, "A1", Some("R1")).await;

    Mock::given(method("POST"))
        .and(path("/orders/"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"detail": "Insufficient inventory for product 1"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .respond_with(tokens_response("A2", None))
        .expect(0)
        .mount(&server)
        .await;

    match client.place_order(one_lamp()).await.unwrap_err() {
        ApiError::OperationFailed(msg) => assert_eq!(msg, "Insufficient inventory for product 1"),
        other => panic!("expected operation failure, got {:?}", other),
    }
    assert_session(&store, Some("A1"), Some("R1")).await;
}

#[tokio::test]
async fn test_order_failure_without_detail_uses_fallback() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server, RenewalMode::Explicit);
    seed(&store, "A1", Some("R1")).await;

    Mock::given(method("POST"))
        .and(path("/orders/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    match client.place_order(one_lamp()).await.unwrap_err() {
        ApiError::OperationFailed(msg) => assert_eq!(msg, "Order failed"),
        other => panic!("expected operation failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_unauthorized_requests_share_one_renewal() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server, RenewalMode::Explicit);
    seed(&store, "A1", Some("R1")).await;

    Mock::given(method("POST"))
        .and(path("/orders/"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(unauthorized())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .respond_with(tokens_response("A2", Some("R2")).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders/"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(receipt_response(20))
        .expect(2)
        .mount(&server)
        .await;

    let (first, second) = tokio::join!(
        client.place_order(one_lamp()),
        client.place_order(one_lamp())
    );
    assert_eq!(first.unwrap().order_id, 20);
    assert_eq!(second.unwrap().order_id, 20);
    assert_session(&store, Some("A2"), Some("R2")).await;
}

#[tokio::test]
async fn test_rate_limited_request_backs_off_and_succeeds() {
    let server = MockServer::start().await;
    let (client, _store) = client_with_retry(&server, fast_retry(2));

    Mock::given(method("GET"))
        .and(path("/products/"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/products/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "name": "Lamp", "price_cents": 1999, "inventory": 3}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let products = client.list_products().await.unwrap();
    assert_eq!(products.len(), 1);
}

#[tokio::test]
async fn test_rate_limit_exhausted_surfaces_without_renewal() {
    let server = MockServer::start().await;
    let (client, store) = client_with_retry(&server, fast_retry(1));
    seed(&store, "A1", Some("R1")).await;

    Mock::given(method("POST"))
        .and(path("/orders/"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .respond_with(tokens_response("A2", None))
        .expect(0)
        .mount(&server)
        .await;

    let err = client.place_order(one_lamp()).await.unwrap_err();
    assert!(matches!(err, ApiError::RateLimited), "got {:?}", err);
    assert_session(&store, Some("A1"), Some("R1")).await;
}

#[tokio::test]
async fn test_unreachable_server_is_network_error_and_keeps_session() {
    let store = CredentialStore::in_memory();
    seed(&store, "A1", Some("R1")).await;
    let client = client_at(&unreachable_base(), RenewalMode::Explicit, store.clone());

    let err = client.place_order(one_lamp()).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)), "got {:?}", err);
    assert_session(&store, Some("A1"), Some("R1")).await;
}

#[tokio::test]
async fn test_unreachable_renewal_endpoint_keeps_renewal_credential() {
    let server = MockServer::start().await;
    let store = CredentialStore::in_memory();
    seed(&store, "A1", Some("R1")).await;
    let client = client_with_renewal_at(&server, &unreachable_base(), store.clone());

    Mock::given(method("POST"))
        .and(path("/orders/"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;

    let err = client.place_order(one_lamp()).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)), "got {:?}", err);
    assert!(!err.is_logged_out());
    assert_session(&store, Some("A1"), Some("R1")).await;
}

#[tokio::test]
async fn test_implicit_session_survives_restart() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let open_store = || {
        CredentialStore::new(Box::new(FileBackend::new(
            dir.path().to_path_buf(),
            SecretSource::Passphrase("pass".to_string()),
        )))
    };

    Mock::given(method("POST"))
        .and(path("/users/login"))
        .respond_with(
            tokens_response("A1", None)
                .insert_header("set-cookie", "refresh_token=R1; HttpOnly; Path=/; SameSite=lax"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders/"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .and(header("cookie", "refresh_token=R1"))
        .respond_with(
            tokens_response("A2", None)
                .insert_header("set-cookie", "refresh_token=R2; HttpOnly; Path=/; SameSite=lax"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders/"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(receipt_response(12))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/logout"))
        .and(header("cookie", "refresh_token=R2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"revoked": true})))
        .expect(1)
        .mount(&server)
        .await;

    {
        let store = open_store();
        let client = client_at(&server.uri(), RenewalMode::Implicit, store.clone());
        client.login("ann@example.com", "pw").await.unwrap();
    }

    // Each command runs in a new process: a fresh store and client over the same files.
    let store = open_store();
    assert!(store.is_authenticated().await);
    let client = client_at(&server.uri(), RenewalMode::Implicit, store.clone());
    let receipt = client.place_order(one_lamp()).await.unwrap();
    assert_eq!(receipt.order_id, 12);
    assert_session(&store, Some("A2"), None).await;

    let store = open_store();
    let client = client_at(&server.uri(), RenewalMode::Implicit, store.clone());
    let outcome = client.logout().await;
    assert!(matches!(outcome.revocation, Ok(true)), "got {:?}", outcome.revocation);
    assert!(!open_store().is_authenticated().await);
}

#[tokio::test]
async fn test_fetch_order_renews_like_other_protected_calls() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server, RenewalMode::Explicit);
    seed(&store, "A1", Some("R1")).await;

    Mock::given(method("GET"))
        .and(path("/orders/12"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/refresh"))
        .and(body_json(json!({"refresh_token": "R1"})))
        .respond_with(tokens_response("A2", Some("R2")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders/12"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": 12, "user_id": 3, "status": "paid"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders/99"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Order not found"})))
        .mount(&server)
        .await;

    let order = client.fetch_order(12).await.unwrap();
    assert_eq!(order.id, 12);
    assert!(order.is_paid());
    assert_session(&store, Some("A2"), Some("R2")).await;

    match client.fetch_order(99).await.unwrap_err() {
        ApiError::OperationFailed(msg) => assert_eq!(msg, "Order not found"),
        other => panic!("expected operation failure, got {:?}", other),
    }
}
