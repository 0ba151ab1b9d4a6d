//! Identity backends, one per credential mode.

mod certificate;
mod client_secret;
mod managed_identity;
mod token;
mod user_password;

pub use certificate::CertificateBackend;
pub use client_secret::ClientSecretBackend;
pub use managed_identity::{ManagedIdentityBackend, IMDS_ENDPOINT};
pub use token::{StaticTokenBackend, TokenCallback, TokenCallbackBackend};
pub use user_password::UserPasswordBackend;

use crate::backend::{AcquisitionRequest, IdentityBackend, SilentRequest, TokenGrant};
use crate::connection_string::{ConnectionString, CredentialMode};
use crate::error::{Error, ErrorKind, Result};

/// Any of the built-in backends, selected at runtime from a connection string.
#[derive(Debug, Clone)]
pub enum CredentialBackend {
    ClientSecret(ClientSecretBackend),
    Certificate(CertificateBackend),
    UserPassword(UserPasswordBackend),
    ManagedIdentity(ManagedIdentityBackend),
    TokenCallback(TokenCallbackBackend),
    Static(StaticTokenBackend),
}

impl CredentialBackend {
    /// Build the backend for the connection string's credential mode.
    pub fn from_connection_string(connection: &ConnectionString) -> Result<Self> {
        let backend = match connection.credential() {
            CredentialMode::UserPassword { user_id, password } => {
                Self::UserPassword(UserPasswordBackend::new(user_id, password))
            }
            CredentialMode::ApplicationKey { client_id, key } => {
                Self::ClientSecret(ClientSecretBackend::new(client_id, key))
            }
            CredentialMode::ApplicationCertificate {
                client_id,
                private_key_path,
                certificate_path,
                thumbprint,
                send_x5c,
            } => {
                let backend = match (certificate_path, thumbprint) {
                    (Some(certificate_path), _) => {
                        CertificateBackend::from_files(client_id, private_key_path, certificate_path)?
                    }
                    (None, Some(thumbprint)) => {
                        let private_key = std::fs::read(private_key_path)?;
                        CertificateBackend::from_thumbprint(client_id, &private_key, thumbprint)?
                    }
                    (None, None) => {
                        return Err(Error::new(ErrorKind::InvalidCredentials(
                            "certificate authentication needs a certificate or its thumbprint"
                                .to_string(),
                        )))
                    }
                };
                Self::Certificate(backend.with_send_x5c(*send_x5c))
            }
            CredentialMode::ManagedIdentity { client_id } => {
                Self::ManagedIdentity(ManagedIdentityBackend::new(client_id.clone()))
            }
            CredentialMode::UserToken(token) | CredentialMode::ApplicationToken(token) => {
                Self::Static(StaticTokenBackend::new(token))
            }
            CredentialMode::TokenCallback(callback) => {
                Self::TokenCallback(TokenCallbackBackend::from_callback(callback.clone()))
            }
        };

        Ok(backend)
    }
}

impl IdentityBackend for CredentialBackend {
    fn client_id(&self) -> Option<&str> {
        match self {
            Self::ClientSecret(b) => b.client_id(),
            Self::Certificate(b) => b.client_id(),
            Self::UserPassword(b) => b.client_id(),
            Self::ManagedIdentity(b) => b.client_id(),
            Self::TokenCallback(b) => b.client_id(),
            Self::Static(b) => b.client_id(),
        }
    }

    fn requires_cloud_info(&self) -> bool {
        !matches!(self, Self::TokenCallback(_) | Self::Static(_))
    }

    async fn acquire_silently(&self, request: &SilentRequest) -> Result<Option<TokenGrant>> {
        match self {
            Self::ClientSecret(b) => b.acquire_silently(request).await,
            Self::Certificate(b) => b.acquire_silently(request).await,
            Self::UserPassword(b) => b.acquire_silently(request).await,
            Self::ManagedIdentity(b) => b.acquire_silently(request).await,
            Self::TokenCallback(b) => b.acquire_silently(request).await,
            Self::Static(b) => b.acquire_silently(request).await,
        }
    }

    async fn acquire_new(&self, request: &AcquisitionRequest) -> Result<TokenGrant> {
        match self {
            Self::ClientSecret(b) => b.acquire_new(request).await,
            Self::Certificate(b) => b.acquire_new(request).await,
            Self::UserPassword(b) => b.acquire_new(request).await,
            Self::ManagedIdentity(b) => b.acquire_new(request).await,
            Self::TokenCallback(b) => b.acquire_new(request).await,
            Self::Static(b) => b.acquire_new(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_per_mode() {
        let cs: ConnectionString =
            "Data Source=https://c.kusto.windows.net;AppClientId=id;AppKey=secret;Authority Id=t"
                .parse()
                .unwrap();
        let backend = CredentialBackend::from_connection_string(&cs).unwrap();
        assert!(matches!(backend, CredentialBackend::ClientSecret(_)));
        assert_eq!(backend.client_id(), Some("id"));

        let cs: ConnectionString = "Data Source=https://c.kusto.windows.net;User Token=abc"
            .parse()
            .unwrap();
        let backend = CredentialBackend::from_connection_string(&cs).unwrap();
        assert!(matches!(backend, CredentialBackend::Static(_)));
        assert!(!backend.requires_cloud_info());

        let cs: ConnectionString = "Data Source=https://c.kusto.windows.net;MSI Client Id=mi"
            .parse()
            .unwrap();
        let backend = CredentialBackend::from_connection_string(&cs).unwrap();
        assert!(matches!(backend, CredentialBackend::ManagedIdentity(_)));
        assert!(backend.requires_cloud_info());
    }

    #[test]
    fn test_certificate_from_files() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/testdata");
        let cs: ConnectionString = format!(
            "Data Source=https://c.kusto.windows.net;AppClientId=id;\
             Application Certificate Key Path={dir}/client-key.pem;\
             Application Certificate Path={dir}/client-cert.pem"
        )
        .parse()
        .unwrap();

        let backend = CredentialBackend::from_connection_string(&cs).unwrap();
        assert!(matches!(backend, CredentialBackend::Certificate(_)));
    }
}
