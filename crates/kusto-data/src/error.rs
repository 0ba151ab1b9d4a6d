//! Error types for kusto-data.

use crate::types::ColumnType;

/// Result type alias for kusto-data operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for kusto-data operations.
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

    /// Returns true if a non-nullable accessor hit a null cell.
    pub fn is_null_value(&self) -> bool {
        matches!(self.kind, ErrorKind::NullValue { .. })
    }

    /// Returns true if an accessor asked for a narrower or unrelated type.
    pub fn is_invalid_cast(&self) -> bool {
        matches!(self.kind, ErrorKind::InvalidCast { .. })
    }

    /// The messages the service embedded in the response, if any.
    pub fn exceptions(&self) -> Option<&[String]> {
        match &self.kind {
            ErrorKind::ServiceExceptions(messages) => Some(messages),
            _ => None,
        }
    }
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// A required property is absent from the payload.
    #[error("Missing property: {0}")]
    MissingProperty(String),

    /// The service reported failures inside an otherwise successful response.
    #[error("Query execution failed with {} exception(s): {}", .0.len(), .0.join("; "))]
    ServiceExceptions(Vec<String>),

    /// A non-nullable accessor was used on a null cell.
    #[error("Null value in column '{column}'")]
    NullValue { column: String },

    /// The declared column type cannot be read as the requested type.
    #[error("Cannot read column '{column}' of type {declared} as {requested}")]
    InvalidCast {
        column: String,
        declared: ColumnType,
        requested: &'static str,
    },

    /// A cell or literal does not match its type's textual form.
    #[error("Invalid {column_type} value: {value}")]
    InvalidFormat {
        column_type: ColumnType,
        value: String,
    },

    /// A column type name is not one of the known types.
    #[error("Unknown column type: {0}")]
    UnknownColumnType(String),

    /// No column with the given name.
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Column ordinal out of range.
    #[error("Column index {index} out of range for {count} column(s)")]
    ColumnIndexOutOfRange { index: usize, count: usize },

    /// The cursor is not positioned on a row.
    #[error("No current row; call next() first")]
    NoCurrentRow,

    /// A row is not an array aligned with the columns.
    #[error("Invalid row {index}: {reason}")]
    InvalidRow { index: usize, reason: String },

    /// The envelope does not have the expected shape.
    #[error("Invalid response envelope: {0}")]
    InvalidEnvelope(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Json(err.to_string()), err)
    }
}
