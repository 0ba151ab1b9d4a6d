//! Error types for kusto-auth.
//!
//! Error messages never include credential values.

/// Result type alias for kusto-auth operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for kusto-auth operations.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional source error.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Create a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Create a new error with the given kind and source.
    pub fn with_source(
        kind: ErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if the caller must re-authenticate interactively.
    pub fn is_interaction_required(&self) -> bool {
        matches!(self.kind, ErrorKind::InteractionRequired(_))
    }

    /// Returns true if the identity backend was temporarily unavailable.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::Transient(_) | ErrorKind::Timeout(_))
    }

    /// Classify an OAuth error response from a token endpoint.
    pub(crate) fn from_oauth(status: u16, error: String, description: String) -> Self {
        let kind = match error.as_str() {
            "interaction_required" | "invalid_grant" | "consent_required" | "login_required" => {
                ErrorKind::InteractionRequired(format!("{}: {}", error, description))
            }
            "temporarily_unavailable" => {
                ErrorKind::Transient(format!("{}: {}", error, description))
            }
            _ if status >= 500 || status == 429 => {
                ErrorKind::Transient(format!("{}: {}", error, description))
            }
            _ => ErrorKind::OAuth { error, description },
        };
        Error::new(kind)
    }
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// The identity backend needs user interaction before it can issue a token.
    #[error("Interaction required: {0}")]
    InteractionRequired(String),

    /// The identity backend could not be reached or asked us to come back later.
    #[error("Identity backend temporarily unavailable: {0}")]
    Transient(String),

    /// Any other rejection from a token endpoint.
    #[error("OAuth error: {error} - {description}")]
    OAuth { error: String, description: String },

    /// Token acquisition did not finish within the configured bound.
    #[error("Token acquisition timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Cloud metadata could not be resolved.
    #[error("Cloud info error: {0}")]
    CloudInfo(String),

    /// Malformed connection string.
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// Invalid credentials configuration.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// JWT signing error.
    #[error("JWT error: {0}")]
    Jwt(String),

    /// HTTP error during authentication.
    #[error("HTTP error: {0}")]
    Http(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // Sanitize the error message to avoid exposing URLs with tokens
        let message = err.to_string();
        let sanitized = if message.contains("access_token") || message.contains("token=") {
            "HTTP request failed (details redacted for security)".to_string()
        } else {
            message
        };

        if err.is_timeout() || err.is_connect() {
            Error::with_source(ErrorKind::Transient(sanitized), err)
        } else {
            Error::with_source(ErrorKind::Http(sanitized), err)
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Json(err.to_string()), err)
    }
}

impl From<serde_urlencoded::ser::Error> for Error {
    fn from(err: serde_urlencoded::ser::Error) -> Self {
        Error::with_source(ErrorKind::Serialization(err.to_string()), err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::with_source(ErrorKind::Io(err.to_string()), err)
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Error::with_source(ErrorKind::Jwt(err.to_string()), err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::with_source(ErrorKind::InvalidConnectionString(err.to_string()), err)
    }
}

impl From<kusto_client::Error> for Error {
    fn from(err: kusto_client::Error) -> Self {
        let message = err.to_string();
        let sanitized = if message.contains("Bearer") || message.contains("token") {
            "Client error (details redacted for security)".to_string()
        } else {
            message
        };

        if err.is_permanent() {
            Error::with_source(ErrorKind::Http(sanitized), err)
        } else {
            Error::with_source(ErrorKind::Transient(sanitized), err)
        }
    }
}
