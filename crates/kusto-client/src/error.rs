//! Error types for kusto-client.

/// Result type alias for kusto-client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for kusto-client operations.
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

    /// Returns true if retrying the same request cannot succeed.
    pub fn is_permanent(&self) -> bool {
        self.kind.is_permanent()
    }

    /// Returns true if this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        !self.kind.is_permanent()
    }

    /// Returns true if the service answered with an error payload.
    pub fn is_service_error(&self) -> bool {
        matches!(self.kind, ErrorKind::Service { .. })
    }

    /// The activity id echoed by the service, if this is a service error.
    pub fn activity_id(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::Service { activity_id, .. } => Some(activity_id),
            _ => None,
        }
    }

    /// The HTTP status of the failed response, if this is a service error.
    pub fn status(&self) -> Option<u16> {
        match &self.kind {
            ErrorKind::Service { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// The service returned a non-success response.
    ///
    /// `message` already carries the `, ActivityId='<id>'` suffix.
    #[error("{message}")]
    Service {
        status: u16,
        message: String,
        permanent: bool,
        activity_id: String,
    },

    /// The request never produced a response.
    #[error("Transport error: {message}")]
    Transport { message: String, permanent: bool },

    /// The service redirected more than once, or without a location.
    #[error("Redirect error: {0}")]
    Redirect(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl ErrorKind {
    /// Returns true if this error kind is permanent.
    pub fn is_permanent(&self) -> bool {
        match self {
            ErrorKind::Service { permanent, .. } => *permanent,
            ErrorKind::Transport { permanent, .. } => *permanent,
            ErrorKind::Redirect(_)
            | ErrorKind::Json(_)
            | ErrorKind::InvalidUrl(_)
            | ErrorKind::Config(_) => true,
            ErrorKind::Other(_) => false,
        }
    }
}

/// Walk an error chain looking for causes that retrying will not fix.
///
/// Host-not-found and refused connections are permanent; timeouts and
/// everything else are not.
pub(crate) fn is_permanent_transport_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return true,
                std::io::ErrorKind::TimedOut => return false,
                _ => {}
            }
        }

        let text = e.to_string().to_ascii_lowercase();
        if text.contains("dns error")
            || text.contains("failed to lookup address")
            || text.contains("name or service not known")
            || text.contains("no such host")
            || text.contains("connection refused")
        {
            return true;
        }

        current = e.source();
    }
    false
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let permanent = if err.is_timeout() {
            false
        } else if err.is_builder() {
            true
        } else {
            is_permanent_transport_failure(&err)
        };

        let kind = ErrorKind::Transport {
            message: err.to_string(),
            permanent,
        };

        Error::with_source(kind, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Json(err.to_string()), err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::with_source(ErrorKind::InvalidUrl(err.to_string()), err)
    }
}
