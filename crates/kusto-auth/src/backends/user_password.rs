//! Username + password (resource-owner password credentials), with silent
//! refresh through the `refresh_token` grant.

use tracing::{debug, instrument};

use crate::backend::{AcquisitionRequest, IdentityBackend, SilentRequest, TokenGrant};
use crate::error::Result;
use crate::oauth::{request_token, token_endpoint};

/// Scopes added so the response carries a refresh token and an id token.
const OFFLINE_SCOPES: &str = "offline_access openid profile";

/// Acquires user tokens with a username and password.
#[derive(Clone)]
pub struct UserPasswordBackend {
    username: String,
    password: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for UserPasswordBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserPasswordBackend")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl UserPasswordBackend {
    /// Create a new backend.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Use a specific HTTP client for token requests.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

fn offline_scope(scopes: &[String]) -> String {
    let mut scope = scopes.join(" ");
    if !scope.is_empty() {
        scope.push(' ');
    }
    scope.push_str(OFFLINE_SCOPES);
    scope
}

impl IdentityBackend for UserPasswordBackend {
    #[instrument(skip(self, request), fields(authority = %request.authority))]
    async fn acquire_silently(&self, request: &SilentRequest) -> Result<Option<TokenGrant>> {
        let Some(refresh_token) = request.refresh_token.as_deref() else {
            debug!("No refresh token cached");
            return Ok(None);
        };

        let scope = offline_scope(&request.scopes);
        let mut grant = request_token(
            &self.http,
            &token_endpoint(&request.authority),
            &[
                ("grant_type", "refresh_token"),
                ("client_id", &request.client_id),
                ("refresh_token", refresh_token),
                ("scope", &scope),
            ],
        )
        .await?;

        // Endpoints may omit a rotated refresh token; the old one stays valid.
        if grant.refresh_token.is_none() {
            grant.refresh_token = Some(refresh_token.to_string());
        }
        if grant.account.is_none() {
            grant.account = request.account.clone();
        }

        Ok(Some(grant))
    }

    #[instrument(skip(self, request), fields(authority = %request.authority, username = %self.username))]
    async fn acquire_new(&self, request: &AcquisitionRequest) -> Result<TokenGrant> {
        let scope = offline_scope(&request.scopes);
        request_token(
            &self.http,
            &token_endpoint(&request.authority),
            &[
                ("grant_type", "password"),
                ("client_id", &request.client_id),
                ("username", &self.username),
                ("password", &self.password),
                ("scope", &scope),
            ],
        )
        .await
    }
}
