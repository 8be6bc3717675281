//! Shared helpers for storefront-core integration tests.

#![allow(dead_code)]

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use storefront_core::{
    AccessToken, ApiClient, Config, CredentialStore, RenewalMode, RenewalToken, Renewer,
    RetryPolicy, SessionClient,
};
use wiremock::{MockServer, ResponseTemplate};

/// Client against `base` with rate-limit retries disabled.
pub fn client_at(base: &str, mode: RenewalMode, store: CredentialStore) -> ApiClient {
    let config = Config {
        api_base: Some(base.to_string()),
        renewal_mode: mode,
        rate_limit_retries: Some(0),
        request_timeout_secs: Some(5),
        ..Default::default()
    };
    ApiClient::new(&config, store).expect("build api client")
}

pub fn client_for(server: &MockServer, mode: RenewalMode) -> (ApiClient, CredentialStore) {
    let store = CredentialStore::in_memory();
    (client_at(&server.uri(), mode, store.clone()), store)
}

/// Client with a custom retry policy, for rate-limit tests.
pub fn client_with_retry(server: &MockServer, retry: RetryPolicy) -> (ApiClient, CredentialStore) {
    let store = CredentialStore::in_memory();
    let http = Client::new();
    let renewer = Renewer::new(http.clone(), &server.uri(), RenewalMode::Explicit, store.clone());
    let session = SessionClient::new(http, server.uri(), store.clone(), renewer, retry);
    (ApiClient::from_session_client(session), store)
}

/// Client whose renewal endpoint lives at `renewal_base` instead of the server.
pub fn client_with_renewal_at(
    server: &MockServer,
    renewal_base: &str,
    store: CredentialStore,
) -> ApiClient {
    let http = Client::new();
    let renewer = Renewer::new(http.clone(), renewal_base, RenewalMode::Explicit, store.clone());
    let session = SessionClient::new(http, server.uri(), store, renewer, RetryPolicy::none());
    ApiClient::from_session_client(session)
}

pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_backoff: Duration::from_millis(10),
    }
}

pub async fn seed(store: &CredentialStore, access: &str, refresh: Option<&str>) {
    store
        .update(Some(AccessToken::new(access)), refresh.map(RenewalToken::new))
        .await;
}

pub async fn assert_session(store: &CredentialStore, access: Option<&str>, refresh: Option<&str>) {
    let session = store.get().await;
    assert_eq!(session.access_token.as_ref().map(|t| t.as_str()), access);
    assert_eq!(session.refresh_token.as_ref().map(|t| t.as_str()), refresh);
}

pub fn receipt_response(order_id: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "order_id": order_id,
        "total_cents": 1999,
        "status": "paid"
    }))
}

pub fn tokens_response(access: &str, refresh: Option<&str>) -> ResponseTemplate {
    let body = match refresh {
        Some(refresh) => json!({"access_token": access, "token_type": "bearer", "refresh_token": refresh}),
        None => json!({"access_token": access, "token_type": "bearer"}),
    };
    ResponseTemplate::new(200).set_body_json(body)
}

pub fn unauthorized() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({"detail": "Could not validate credentials"}))
}

/// Base URL of a port nothing is listening on.
pub fn unreachable_base() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{}", addr)
}
