//! Application id + secret (OAuth 2.0 client credentials).

use tracing::instrument;

use crate::backend::{AcquisitionRequest, IdentityBackend, SilentRequest, TokenGrant};
use crate::error::Result;
use crate::oauth::{request_token, token_endpoint};

/// Acquires application tokens with a client secret.
///
/// Client-credential tokens carry no refresh token, so silent refresh
/// never applies; the provider re-acquires when the token nears expiry.
#[derive(Clone)]
pub struct ClientSecretBackend {
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for ClientSecretBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecretBackend")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl ClientSecretBackend {
    /// Create a new backend.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Use a specific HTTP client for token requests.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

impl IdentityBackend for ClientSecretBackend {
    fn client_id(&self) -> Option<&str> {
        Some(&self.client_id)
    }

    async fn acquire_silently(&self, _request: &SilentRequest) -> Result<Option<TokenGrant>> {
        Ok(None)
    }

    #[instrument(skip(self), fields(client_id = %self.client_id))]
    async fn acquire_new(&self, request: &AcquisitionRequest) -> Result<TokenGrant> {
        let scope = request.scopes.join(" ");
        request_token(
            &self.http,
            &token_endpoint(&request.authority),
            &[
                ("grant_type", "client_credentials"),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("scope", &scope),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_debug_redacts_secret() {
        let backend = ClientSecretBackend::new("app-id", "super-secret");
        let debug = format!("{:?}", backend);
        assert!(debug.contains("app-id"));
        assert!(!debug.contains("super-secret"));
    }

    #[tokio::test]
    async fn test_acquire_new() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/tenant-id/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=app-id"))
            .and(body_string_contains("client_secret=super-secret"))
            .and(body_string_contains(
                "scope=https%3A%2F%2Fkusto.kusto.windows.net%2F.default",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "app-token"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let backend = ClientSecretBackend::new("app-id", "super-secret");
        let grant = backend
            .acquire_new(&AcquisitionRequest {
                authority: format!("{}/tenant-id", mock_server.uri()),
                client_id: "ignored".to_string(),
                scopes: vec!["https://kusto.kusto.windows.net/.default".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(grant.access_token, "app-token");
        assert!(grant.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_silent_has_nothing_to_refresh() {
        let backend = ClientSecretBackend::new("app-id", "secret");
        let result = backend
            .acquire_silently(&SilentRequest {
                authority: "https://login.microsoftonline.com/organizations".to_string(),
                client_id: "app-id".to_string(),
                scopes: vec![],
                refresh_token: None,
                account: None,
            })
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
