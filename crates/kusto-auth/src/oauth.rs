//! Token endpoint plumbing shared by the OAuth-based backends.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::backend::{Account, TokenGrant};
use crate::error::{Error, ErrorKind, Result};

/// The v2.0 token endpoint of an authority.
pub(crate) fn token_endpoint(authority: &str) -> String {
    format!("{}/oauth2/v2.0/token", authority.trim_end_matches('/'))
}

/// Token response from a token endpoint. Lifetimes arrive as numbers or
/// numeric strings depending on the endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<Value>,
    #[serde(default)]
    pub expires_on: Option<Value>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl TokenResponse {
    /// Convert into a grant, reading the account from the id token if present.
    pub(crate) fn into_grant(self) -> TokenGrant {
        let expires_at = expires_at(self.expires_in.as_ref(), self.expires_on.as_ref());
        let account = self.id_token.as_deref().and_then(account_from_id_token);

        TokenGrant {
            access_token: self.access_token,
            expires_at,
            refresh_token: self.refresh_token,
            account,
        }
    }
}

/// OAuth error response.
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: String,
}

/// POST a form to a token endpoint and decode the grant.
pub(crate) async fn request_token(
    http: &reqwest::Client,
    endpoint: &str,
    params: &[(&str, &str)],
) -> Result<TokenGrant> {
    let body = serde_urlencoded::to_string(params)?;

    let response = http
        .post(endpoint)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .header("Accept", "application/json")
        .body(body)
        .send()
        .await?;

    handle_token_response(response).await
}

/// Check a token endpoint response for errors and decode it.
pub(crate) async fn handle_token_response(response: reqwest::Response) -> Result<TokenGrant> {
    let status = response.status().as_u16();

    if !response.status().is_success() {
        let body = response.text().await?;
        return Err(match serde_json::from_str::<OAuthErrorResponse>(&body) {
            Ok(error) => Error::from_oauth(status, error.error, error.error_description),
            Err(_) if status >= 500 || status == 429 => Error::new(ErrorKind::Transient(
                format!("token endpoint returned HTTP {}", status),
            )),
            Err(_) => Error::new(ErrorKind::Http(format!(
                "token endpoint returned HTTP {}",
                status
            ))),
        });
    }

    let token: TokenResponse = response.json().await?;
    debug!(has_refresh_token = token.refresh_token.is_some(), "Token issued");
    Ok(token.into_grant())
}

fn as_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// A missing lifetime is treated as already expired.
pub(crate) fn expires_at(expires_in: Option<&Value>, expires_on: Option<&Value>) -> DateTime<Utc> {
    let now = Utc::now();

    if let Some(at) = expires_on
        .and_then(as_seconds)
        .and_then(|s| DateTime::from_timestamp(s, 0))
    {
        return at;
    }

    expires_in
        .and_then(as_seconds)
        .and_then(TimeDelta::try_seconds)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now)
}

/// Read the account claims from an id token. The token comes straight
/// from the token endpoint, so its signature is not checked.
pub(crate) fn account_from_id_token(id_token: &str) -> Option<Account> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;

    let claim = |name: &str| claims.get(name).and_then(Value::as_str).map(str::to_string);

    Some(Account {
        username: claim("preferred_username").or_else(|| claim("upn")),
        home_tenant_id: claim("tid"),
    })
}
