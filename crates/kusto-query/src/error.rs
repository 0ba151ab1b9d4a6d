//! Error types for kusto-query.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    pub kind: ErrorKind,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// The HTTP layer error, if the request itself failed.
    pub fn client_error(&self) -> Option<&kusto_client::Error> {
        self.source.as_deref()?.downcast_ref()
    }

    /// The authentication error, if no token could be obtained.
    pub fn auth_error(&self) -> Option<&kusto_auth::Error> {
        self.source.as_deref()?.downcast_ref()
    }

    /// The decoding error, if the response could not be decoded.
    pub fn data_error(&self) -> Option<&kusto_data::Error> {
        self.source.as_deref()?.downcast_ref()
    }

    /// Returns true if repeating the request cannot succeed.
    pub fn is_permanent(&self) -> bool {
        if let Some(err) = self.client_error() {
            return err.is_permanent();
        }
        if let Some(err) = self.auth_error() {
            return !err.is_transient();
        }
        true
    }

    /// Activity id of the failed service call, if the service answered.
    pub fn activity_id(&self) -> Option<&str> {
        self.client_error()?.activity_id()
    }

    /// Exceptions the service reported inline in the response.
    pub fn exceptions(&self) -> Option<&[String]> {
        self.data_error()?.exceptions()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("Client error: {0}")]
    Client(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Data error: {0}")]
    Data(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<kusto_client::Error> for Error {
    fn from(err: kusto_client::Error) -> Self {
        Error {
            kind: ErrorKind::Client(err.to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<kusto_auth::Error> for Error {
    fn from(err: kusto_auth::Error) -> Self {
        Error {
            kind: ErrorKind::Auth(err.to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<kusto_data::Error> for Error {
    fn from(err: kusto_data::Error) -> Self {
        Error {
            kind: ErrorKind::Data(err.to_string()),
            source: Some(Box::new(err)),
        }
    }
}
