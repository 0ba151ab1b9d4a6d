//! Token acquisition through the real backends, against a mock identity service.

use std::sync::Arc;

use super::common::{mount_metadata, token_path, TENANT};
use kusto_sdk::auth::{
    CloudInfoCache, ConnectionString, HttpCloudInfoSource, TokenProvider, UserPasswordBackend,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cloud_info_cache() -> Arc<CloudInfoCache<HttpCloudInfoSource>> {
    Arc::new(CloudInfoCache::new(
        HttpCloudInfoSource::with_default_client().unwrap(),
    ))
}

#[tokio::test]
async fn test_client_secret_token_is_cached() {
    let server = MockServer::start().await;
    mount_metadata(&server).await;

    Mock::given(method("POST"))
        .and(path(token_path()))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=app-id"))
        .and(body_string_contains("client_secret=app-secret"))
        .and(body_string_contains(
            "scope=https%3A%2F%2Fkusto.kusto.windows.net%2F.default",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "app-token"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let connection: ConnectionString = format!(
        "Data Source={};AppClientId=app-id;AppKey=app-secret;Authority Id={}",
        server.uri(),
        TENANT
    )
    .parse()
    .unwrap();
    let provider = TokenProvider::from_connection_string(&connection, cloud_info_cache()).unwrap();

    assert_eq!(provider.acquire_access_token().await.unwrap(), "app-token");
    assert_eq!(provider.acquire_access_token().await.unwrap(), "app-token");

    let context = provider.authority_context().unwrap();
    assert_eq!(context.authority_url, format!("{}/{}", server.uri(), TENANT));
    assert_eq!(context.client_id, "app-id");
}

#[tokio::test]
async fn test_user_password_refreshes_silently() {
    let server = MockServer::start().await;
    mount_metadata(&server).await;

    // Expires inside the default one-minute margin, so the next call refreshes.
    Mock::given(method("POST"))
        .and(path(token_path()))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("client_id=first-party-app"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "expires_in": 30,
            "access_token": "first",
            "refresh_token": "rt-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(token_path()))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "expires_in": 3599,
            "access_token": "refreshed"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = TokenProvider::new(
        UserPasswordBackend::new("someone@contoso.com", "hunter2"),
        &server.uri(),
        cloud_info_cache(),
    )
    .unwrap()
    .with_authority_id(TENANT);

    assert_eq!(provider.acquire_access_token().await.unwrap(), "first");
    assert_eq!(provider.acquire_access_token().await.unwrap(), "refreshed");
    assert_eq!(provider.acquire_access_token().await.unwrap(), "refreshed");

    // The refresh token is kept when the refresh response omits one.
    assert_eq!(
        provider.cached_token().unwrap().refresh_token.as_deref(),
        Some("rt-1")
    );
}

#[tokio::test]
async fn test_invalid_grant_requires_interaction() {
    let server = MockServer::start().await;
    mount_metadata(&server).await;

    Mock::given(method("POST"))
        .and(path(token_path()))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "AADSTS50126: Error validating credentials"
        })))
        .mount(&server)
        .await;

    let provider = TokenProvider::new(
        UserPasswordBackend::new("someone@contoso.com", "wrong"),
        &server.uri(),
        cloud_info_cache(),
    )
    .unwrap()
    .with_authority_id(TENANT);

    let err = provider.acquire_access_token().await.unwrap_err();
    assert!(err.is_interaction_required());
    assert!(!err.to_string().contains("wrong"));
    assert!(provider.cached_token().is_none());
}

#[tokio::test]
async fn test_identity_outage_is_transient() {
    let server = MockServer::start().await;
    mount_metadata(&server).await;

    Mock::given(method("POST"))
        .and(path(token_path()))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let connection: ConnectionString = format!(
        "Data Source={};AppClientId=app-id;AppKey=app-secret;Authority Id={}",
        server.uri(),
        TENANT
    )
    .parse()
    .unwrap();
    let provider = TokenProvider::from_connection_string(&connection, cloud_info_cache()).unwrap();

    let err = provider.acquire_access_token().await.unwrap_err();
    assert!(err.is_transient());
}
