//! Connection string parsing.
//!
//! The format is `key=value;key=value`. Keys are case-insensitive, ignore
//! whitespace, and most have several aliases (`Data Source`, `Addr`,
//! `Server`, ...). Unknown keys are rejected.

use std::path::PathBuf;
use std::str::FromStr;

use url::Url;

use kusto_client::ClientDetails;

use crate::backends::TokenCallback;
use crate::error::{Error, ErrorKind, Result};

/// How the connection authenticates.
#[derive(Clone)]
pub enum CredentialMode {
    UserPassword {
        user_id: String,
        password: String,
    },
    ApplicationKey {
        client_id: String,
        key: String,
    },
    ApplicationCertificate {
        client_id: String,
        private_key_path: PathBuf,
        certificate_path: Option<PathBuf>,
        thumbprint: Option<String>,
        send_x5c: bool,
    },
    ManagedIdentity {
        client_id: Option<String>,
    },
    UserToken(String),
    ApplicationToken(String),
    TokenCallback(TokenCallback),
}

impl std::fmt::Debug for CredentialMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserPassword { user_id, .. } => f
                .debug_struct("UserPassword")
                .field("user_id", user_id)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::ApplicationKey { client_id, .. } => f
                .debug_struct("ApplicationKey")
                .field("client_id", client_id)
                .field("key", &"[REDACTED]")
                .finish(),
            Self::ApplicationCertificate {
                client_id,
                private_key_path,
                certificate_path,
                thumbprint,
                send_x5c,
            } => f
                .debug_struct("ApplicationCertificate")
                .field("client_id", client_id)
                .field("private_key_path", private_key_path)
                .field("certificate_path", certificate_path)
                .field("thumbprint", thumbprint)
                .field("send_x5c", send_x5c)
                .finish(),
            Self::ManagedIdentity { client_id } => f
                .debug_struct("ManagedIdentity")
                .field("client_id", client_id)
                .finish(),
            Self::UserToken(_) => f.debug_tuple("UserToken").field(&"[REDACTED]").finish(),
            Self::ApplicationToken(_) => f
                .debug_tuple("ApplicationToken")
                .field(&"[REDACTED]")
                .finish(),
            Self::TokenCallback(_) => f.write_str("TokenCallback"),
        }
    }
}

/// A parsed connection string.
#[derive(Debug, Clone)]
pub struct ConnectionString {
    data_source: String,
    database: Option<String>,
    authority_id: Option<String>,
    credential: CredentialMode,
    application_for_tracing: Option<String>,
    user_for_tracing: Option<String>,
}

impl ConnectionString {
    fn with_credential(cluster_url: &str, credential: CredentialMode) -> Result<Self> {
        Ok(Self {
            data_source: normalize_cluster_url(cluster_url)?,
            database: None,
            authority_id: None,
            credential,
            application_for_tracing: None,
            user_for_tracing: None,
        })
    }

    /// Authenticate as an application with a client secret.
    pub fn with_application_key(
        cluster_url: &str,
        client_id: impl Into<String>,
        key: impl Into<String>,
        authority_id: impl Into<String>,
    ) -> Result<Self> {
        let cs = Self::with_credential(
            cluster_url,
            CredentialMode::ApplicationKey {
                client_id: client_id.into(),
                key: key.into(),
            },
        )?;
        Ok(cs.with_authority_id(authority_id))
    }

    /// Authenticate as an application with a certificate.
    pub fn with_application_certificate(
        cluster_url: &str,
        client_id: impl Into<String>,
        private_key_path: impl Into<PathBuf>,
        certificate_path: impl Into<PathBuf>,
        authority_id: impl Into<String>,
    ) -> Result<Self> {
        let cs = Self::with_credential(
            cluster_url,
            CredentialMode::ApplicationCertificate {
                client_id: client_id.into(),
                private_key_path: private_key_path.into(),
                certificate_path: Some(certificate_path.into()),
                thumbprint: None,
                send_x5c: false,
            },
        )?;
        Ok(cs.with_authority_id(authority_id))
    }

    /// Authenticate as a user with a password.
    pub fn with_user_password(
        cluster_url: &str,
        user_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        Self::with_credential(
            cluster_url,
            CredentialMode::UserPassword {
                user_id: user_id.into(),
                password: password.into(),
            },
        )
    }

    /// Authenticate as the host's managed identity; `None` for the
    /// system-assigned identity.
    pub fn with_managed_identity(cluster_url: &str, client_id: Option<String>) -> Result<Self> {
        Self::with_credential(cluster_url, CredentialMode::ManagedIdentity { client_id })
    }

    /// Use a user token obtained elsewhere.
    pub fn with_user_token(cluster_url: &str, token: impl Into<String>) -> Result<Self> {
        Self::with_credential(cluster_url, CredentialMode::UserToken(token.into()))
    }

    /// Use an application token obtained elsewhere.
    pub fn with_application_token(cluster_url: &str, token: impl Into<String>) -> Result<Self> {
        Self::with_credential(cluster_url, CredentialMode::ApplicationToken(token.into()))
    }

    /// Ask a callback for a token on every request.
    pub fn with_token_callback(cluster_url: &str, callback: TokenCallback) -> Result<Self> {
        Self::with_credential(cluster_url, CredentialMode::TokenCallback(callback))
    }

    /// Set the default database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the tenant to authenticate against.
    pub fn with_authority_id(mut self, authority_id: impl Into<String>) -> Self {
        let authority_id = authority_id.into();
        self.authority_id = (!authority_id.is_empty()).then_some(authority_id);
        self
    }

    /// Override the application name sent in `x-ms-app`.
    pub fn with_application_for_tracing(mut self, application: impl Into<String>) -> Self {
        self.application_for_tracing = Some(application.into());
        self
    }

    /// Override the user name sent in `x-ms-user`.
    pub fn with_user_for_tracing(mut self, user: impl Into<String>) -> Self {
        self.user_for_tracing = Some(user.into());
        self
    }

    /// Cluster URL, e.g. `https://help.kusto.windows.net`.
    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    /// Default database, if set.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Tenant to authenticate against, if set.
    pub fn authority_id(&self) -> Option<&str> {
        self.authority_id.as_deref()
    }

    /// The credential mode.
    pub fn credential(&self) -> &CredentialMode {
        &self.credential
    }

    /// Tracing headers, with this connection's overrides applied.
    pub fn client_details(&self) -> ClientDetails {
        let mut details = ClientDetails::default();
        if let Some(ref application) = self.application_for_tracing {
            details = details.with_application(application.as_str());
        }
        if let Some(ref user) = self.user_for_tracing {
            details = details.with_user(user.as_str());
        }
        details
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    DataSource,
    Database,
    FederatedSecurity,
    UserId,
    Password,
    ApplicationClientId,
    ApplicationKey,
    AuthorityId,
    CertificateThumbprint,
    CertificateKeyPath,
    CertificatePath,
    SendX5c,
    UserToken,
    ApplicationToken,
    ManagedIdentity,
    MsiClientId,
    ApplicationForTracing,
    UserForTracing,
}

impl Keyword {
    fn lookup(key: &str) -> Option<Self> {
        let normalized: String = key
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        let keyword = match normalized.as_str() {
            "datasource" | "addr" | "address" | "networkaddress" | "server" => Self::DataSource,
            "initialcatalog" | "database" => Self::Database,
            "aadfederatedsecurity" | "federatedsecurity" | "fed" => Self::FederatedSecurity,
            "aaduserid" | "userid" | "uid" => Self::UserId,
            "password" | "pwd" => Self::Password,
            "applicationclientid" | "appclientid" => Self::ApplicationClientId,
            "applicationkey" | "appkey" => Self::ApplicationKey,
            "authorityid" | "authority" | "tenantid" | "tenant" => Self::AuthorityId,
            "applicationcertificatethumbprint" | "appcert" => Self::CertificateThumbprint,
            "applicationcertificatekeypath" => Self::CertificateKeyPath,
            "applicationcertificatepath" => Self::CertificatePath,
            "applicationcertificatesendpubliccertificate" | "sendx5c" => Self::SendX5c,
            "usertoken" | "usrtoken" => Self::UserToken,
            "applicationtoken" | "apptoken" => Self::ApplicationToken,
            "managedidentity" => Self::ManagedIdentity,
            "msiclientid" | "managedidentityclientid" => Self::MsiClientId,
            "applicationnamefortracing" | "traceappname" => Self::ApplicationForTracing,
            "usernamefortracing" | "traceusername" => Self::UserForTracing,
            _ => return None,
        };
        Some(keyword)
    }
}

impl FromStr for ConnectionString {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut values: Vec<(Keyword, String)> = Vec::new();

        for segment in s.split(';').map(str::trim).filter(|seg| !seg.is_empty()) {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                invalid(format!("expected key=value, found '{}'", redact_segment(segment)))
            })?;
            let keyword = Keyword::lookup(key)
                .ok_or_else(|| invalid(format!("unknown keyword '{}'", key.trim())))?;

            values.retain(|(k, _)| *k != keyword);
            values.push((keyword, value.trim().to_string()));
        }

        let get = |keyword: Keyword| {
            values
                .iter()
                .find(|(k, _)| *k == keyword)
                .map(|(_, v)| v.clone())
                .filter(|v| !v.is_empty())
        };

        let data_source = get(Keyword::DataSource).ok_or_else(|| invalid("missing Data Source"))?;
        let credential = credential_mode(&get)?;

        let mut cs = ConnectionString::with_credential(&data_source, credential)?;
        cs.database = get(Keyword::Database);
        cs.authority_id = get(Keyword::AuthorityId);
        cs.application_for_tracing = get(Keyword::ApplicationForTracing);
        cs.user_for_tracing = get(Keyword::UserForTracing);
        Ok(cs)
    }
}

fn credential_mode(get: &impl Fn(Keyword) -> Option<String>) -> Result<CredentialMode> {
    if let Some(token) = get(Keyword::UserToken) {
        return Ok(CredentialMode::UserToken(token));
    }
    if let Some(token) = get(Keyword::ApplicationToken) {
        return Ok(CredentialMode::ApplicationToken(token));
    }

    if let Some(client_id) = get(Keyword::ApplicationClientId) {
        if let Some(key) = get(Keyword::ApplicationKey) {
            return Ok(CredentialMode::ApplicationKey { client_id, key });
        }
        if let Some(private_key_path) = get(Keyword::CertificateKeyPath) {
            return Ok(CredentialMode::ApplicationCertificate {
                client_id,
                private_key_path: PathBuf::from(private_key_path),
                certificate_path: get(Keyword::CertificatePath).map(PathBuf::from),
                thumbprint: get(Keyword::CertificateThumbprint),
                send_x5c: get(Keyword::SendX5c).is_some_and(|v| parse_bool(&v)),
            });
        }
        return Err(invalid(
            "Application Client Id needs an Application Key or a certificate key path",
        ));
    }

    if let Some(client_id) = get(Keyword::MsiClientId) {
        return Ok(CredentialMode::ManagedIdentity {
            client_id: Some(client_id),
        });
    }
    if let Some(value) = get(Keyword::ManagedIdentity) {
        let client_id = match value.to_ascii_lowercase().as_str() {
            "system" | "true" => None,
            _ => Some(value),
        };
        return Ok(CredentialMode::ManagedIdentity { client_id });
    }

    if let Some(user_id) = get(Keyword::UserId) {
        let password = get(Keyword::Password)
            .ok_or_else(|| invalid("AAD User ID needs a Password"))?;
        return Ok(CredentialMode::UserPassword { user_id, password });
    }

    if get(Keyword::FederatedSecurity).is_some_and(|v| parse_bool(&v)) {
        return Err(invalid(
            "interactive sign-in is not supported; supply application, user, managed identity or token credentials",
        ));
    }

    Err(invalid("no credentials"))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "yes" | "1")
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidConnectionString(message.into()))
}

/// Keep the key, drop anything that could be a secret.
fn redact_segment(segment: &str) -> &str {
    segment.get(..segment.len().min(16)).unwrap_or_default()
}

/// Validate the cluster URL: `https`, or `http` for local endpoints only.
/// A bare host name gets an `https://` prefix.
pub(crate) fn normalize_cluster_url(cluster_url: &str) -> Result<String> {
    let trimmed = cluster_url.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&candidate)?;
    let host = url
        .host_str()
        .ok_or_else(|| invalid(format!("cluster URL has no host: {}", trimmed)))?;

    match url.scheme() {
        "https" => {}
        "http" if is_local(host) => {}
        scheme => {
            return Err(invalid(format!(
                "cluster URL must use https (found {}://{})",
                scheme, host
            )))
        }
    }

    Ok(candidate.trim_end_matches('/').to_string())
}

fn is_local(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1")
}
