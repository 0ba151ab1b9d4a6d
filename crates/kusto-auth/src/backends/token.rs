//! Backends for tokens the caller already has.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};

use crate::backend::{AcquisitionRequest, IdentityBackend, SilentRequest, TokenGrant};
use crate::error::Result;

/// Caller-supplied token source.
pub type TokenCallback = Arc<dyn Fn() -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// Asks a callback for a token on every acquisition.
///
/// The token's lifetime is unknown, so it is never served from cache.
#[derive(Clone)]
pub struct TokenCallbackBackend {
    callback: TokenCallback,
}

impl std::fmt::Debug for TokenCallbackBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCallbackBackend").finish_non_exhaustive()
    }
}

impl TokenCallbackBackend {
    /// Wrap an async closure.
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        Self {
            callback: Arc::new(move || callback().boxed()),
        }
    }

    /// Wrap an already boxed callback.
    pub fn from_callback(callback: TokenCallback) -> Self {
        Self { callback }
    }
}

impl IdentityBackend for TokenCallbackBackend {
    fn requires_cloud_info(&self) -> bool {
        false
    }

    async fn acquire_silently(&self, _request: &SilentRequest) -> Result<Option<TokenGrant>> {
        Ok(None)
    }

    async fn acquire_new(&self, _request: &AcquisitionRequest) -> Result<TokenGrant> {
        let token = (self.callback)().await?;
        Ok(TokenGrant::new(token, Utc::now()))
    }
}

/// Always returns the same token.
#[derive(Clone)]
pub struct StaticTokenBackend {
    token: String,
}

impl std::fmt::Debug for StaticTokenBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenBackend")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl StaticTokenBackend {
    /// Create a new backend.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl IdentityBackend for StaticTokenBackend {
    fn requires_cloud_info(&self) -> bool {
        false
    }

    async fn acquire_silently(&self, _request: &SilentRequest) -> Result<Option<TokenGrant>> {
        Ok(None)
    }

    async fn acquire_new(&self, _request: &AcquisitionRequest) -> Result<TokenGrant> {
        Ok(TokenGrant::new(self.token.clone(), DateTime::<Utc>::MAX_UTC))
    }
}
