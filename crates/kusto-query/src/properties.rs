//! Per-request options sent alongside a query or command.

use std::time::Duration;

use chrono::TimeDelta;
use serde_json::{Map, Value};

use kusto_data::{format_timespan, parse_timespan};

/// Option name of the server-side timeout.
pub const OPTION_SERVER_TIMEOUT: &str = "servertimeout";

/// Longest server timeout the service accepts.
pub const MAX_SERVER_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Prefix of generated client request ids.
pub const CLIENT_REQUEST_ID_PREFIX: &str = "KRS.execute;";

/// Options, query parameters and correlation id for one request.
///
/// Serialized into the `properties` field of the request body as
/// `{"Options": {...}, "Parameters": {...}}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientRequestProperties {
    options: Map<String, Value>,
    parameters: Map<String, Value>,
    client_request_id: Option<String>,
}

impl ClientRequestProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a request option, e.g. `truncationmaxrecords`.
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Set a query parameter referenced by a `declare query_parameters` statement.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .insert(name.into(), Value::String(value.into()));
        self
    }

    /// Bound execution on the service side, capped at
    /// [`MAX_SERVER_TIMEOUT`]. The client waits a little longer than this
    /// before giving up.
    pub fn with_server_timeout(self, timeout: Duration) -> Self {
        let timeout = TimeDelta::from_std(timeout.min(MAX_SERVER_TIMEOUT)).unwrap_or_default();
        self.with_option(OPTION_SERVER_TIMEOUT, format_timespan(timeout))
    }

    /// Use a caller-chosen correlation id instead of a generated one.
    pub fn with_client_request_id(mut self, id: impl Into<String>) -> Self {
        self.client_request_id = Some(id.into());
        self
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(Value::as_str)
    }

    /// The server timeout, if one was set as a timespan string or in
    /// milliseconds.
    pub fn server_timeout(&self) -> Option<Duration> {
        match self.options.get(OPTION_SERVER_TIMEOUT)? {
            Value::String(text) => parse_timespan(text).ok()?.to_std().ok(),
            Value::Number(millis) => millis.as_u64().map(Duration::from_millis),
            _ => None,
        }
    }

    pub fn client_request_id(&self) -> Option<&str> {
        self.client_request_id.as_deref()
    }

    /// The `properties` payload.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "Options": self.options,
            "Parameters": self.parameters,
        })
    }
}

/// A fresh `KRS.execute;<uuid>` correlation id.
pub(crate) fn generate_client_request_id() -> String {
    format!("{}{}", CLIENT_REQUEST_ID_PREFIX, uuid::Uuid::new_v4())
}
