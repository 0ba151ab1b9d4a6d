//! The identity backend seam.
//!
//! A [`TokenProvider`](crate::TokenProvider) owns the caching and refresh
//! policy; everything that actually talks to an identity service sits
//! behind [`IdentityBackend`].

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::Result;

/// Home tenant of personal Microsoft accounts.
pub const MSA_HOME_TENANT_ID: &str = "9188040d-6c67-4c5b-b112-36a304b66dad";

/// The identity a token was issued to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Account {
    /// `preferred_username` or `upn` claim.
    pub username: Option<String>,
    /// `tid` claim.
    pub home_tenant_id: Option<String>,
}

impl Account {
    /// Returns true for personal (MSA) accounts.
    pub fn is_personal(&self) -> bool {
        self.home_tenant_id.as_deref() == Some(MSA_HOME_TENANT_ID)
    }
}

/// A token issued by a backend.
#[derive(Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_token: Option<String>,
    pub account: Option<Account>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("account", &self.account)
            .finish()
    }
}

impl TokenGrant {
    /// A grant with no refresh token or account.
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
            refresh_token: None,
            account: None,
        }
    }

    /// Attach a refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Attach the account the token was issued to.
    pub fn with_account(mut self, account: Account) -> Self {
        self.account = Some(account);
        self
    }
}

/// Parameters for a full acquisition.
#[derive(Debug, Clone)]
pub struct AcquisitionRequest {
    pub authority: String,
    pub client_id: String,
    pub scopes: Vec<String>,
}

impl AcquisitionRequest {
    /// The resource the scopes belong to, for endpoints that take a
    /// resource rather than a scope.
    pub fn resource(&self) -> &str {
        self.scopes
            .first()
            .map(|s| s.strip_suffix("/.default").unwrap_or(s.as_str()))
            .unwrap_or_default()
    }
}

/// Parameters for a silent refresh.
#[derive(Clone)]
pub struct SilentRequest {
    pub authority: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub refresh_token: Option<String>,
    pub account: Option<Account>,
}

impl std::fmt::Debug for SilentRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SilentRequest")
            .field("authority", &self.authority)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("account", &self.account)
            .finish()
    }
}

/// A source of tokens.
pub trait IdentityBackend: Send + Sync {
    /// Client id to request tokens as. `None` means the cluster's
    /// first-party client id.
    fn client_id(&self) -> Option<&str> {
        None
    }

    /// Whether the provider must resolve cloud info before acquiring.
    /// Backends that are handed finished tokens return false.
    fn requires_cloud_info(&self) -> bool {
        true
    }

    /// Obtain a token without user interaction, typically from a refresh
    /// token. `Ok(None)` means the backend has nothing to refresh with.
    fn acquire_silently(
        &self,
        request: &SilentRequest,
    ) -> impl Future<Output = Result<Option<TokenGrant>>> + Send;

    /// Obtain a token through the full credential flow.
    fn acquire_new(
        &self,
        request: &AcquisitionRequest,
    ) -> impl Future<Output = Result<TokenGrant>> + Send;
}
