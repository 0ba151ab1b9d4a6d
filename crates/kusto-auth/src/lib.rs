//! # kusto-auth
//!
//! Authentication for Azure Data Explorer (Kusto).
//!
//! ## Security
//!
//! - Tokens, refresh tokens, secrets and keys are redacted in Debug output
//! - Tracing skips credential parameters
//! - Error messages never echo credential values
//!
//! ## Token lifecycle
//!
//! A [`TokenProvider`] caches one token per cluster. A valid token is served
//! from memory; a token inside the validity margin is refreshed silently
//! when the backend can, and otherwise replaced through a full acquisition.
//! Concurrent callers share a single in-flight refresh.
//!
//! The identity service itself sits behind [`IdentityBackend`]:
//!
//! - [`ClientSecretBackend`] - application id + secret
//! - [`CertificateBackend`] - application id + certificate (signed client assertion)
//! - [`UserPasswordBackend`] - user name + password, with refresh tokens
//! - [`ManagedIdentityBackend`] - instance metadata / App Service identity
//! - [`TokenCallbackBackend`], [`StaticTokenBackend`] - tokens obtained elsewhere
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kusto_auth::{CloudInfoCache, ConnectionString, HttpCloudInfoSource, TokenProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kusto_auth::Error> {
//!     let connection: ConnectionString =
//!         "Data Source=https://help.kusto.windows.net;AppClientId=...;AppKey=...;Authority Id=..."
//!             .parse()?;
//!
//!     let cloud_info = Arc::new(CloudInfoCache::new(HttpCloudInfoSource::with_default_client()?));
//!     let provider = TokenProvider::from_connection_string(&connection, cloud_info)?;
//!
//!     let token = provider.acquire_access_token().await?;
//!     Ok(())
//! }
//! ```

mod backend;
mod backends;
mod cloud_info;
mod connection_string;
mod error;
mod oauth;
mod provider;

pub use backend::{
    Account, AcquisitionRequest, IdentityBackend, SilentRequest, TokenGrant, MSA_HOME_TENANT_ID,
};
pub use backends::{
    CertificateBackend, ClientSecretBackend, CredentialBackend, ManagedIdentityBackend,
    StaticTokenBackend, TokenCallback, TokenCallbackBackend, UserPasswordBackend, IMDS_ENDPOINT,
};
pub use cloud_info::{
    CloudInfo, CloudInfoCache, CloudInfoSource, HttpCloudInfoSource,
    DEFAULT_FIRST_PARTY_AUTHORITY_URL, DEFAULT_KUSTO_CLIENT_APP_ID,
    DEFAULT_KUSTO_SERVICE_RESOURCE_ID, DEFAULT_LOGIN_ENDPOINT, DEFAULT_REDIRECT_URI,
    METADATA_ENDPOINT,
};
pub use connection_string::{ConnectionString, CredentialMode};
pub use error::{Error, ErrorKind, Result};
pub use provider::{
    AuthorityContext, CachedToken, TokenProvider, TokenProviderConfig,
    TokenProviderConfigBuilder, DEFAULT_ACQUISITION_TIMEOUT, DEFAULT_MIN_VALIDITY_MARGIN,
};
