//! HTTP response handling and service error parsing.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, ErrorKind, Result};

/// Header carrying the service-side correlation id.
pub const ACTIVITY_ID_HEADER: &str = "x-ms-activity-id";

/// Wrapper around an HTTP response.
#[derive(Debug)]
pub struct Response {
    inner: reqwest::Response,
}

impl Response {
    pub(crate) fn new(inner: reqwest::Response) -> Self {
        Self { inner }
    }

    /// Get the HTTP status code.
    pub fn status(&self) -> u16 {
        self.inner.status().as_u16()
    }

    /// Returns true if the response status is successful (2xx).
    pub fn is_success(&self) -> bool {
        self.inner.status().is_success()
    }

    /// Returns true if the service asked us to resubmit elsewhere.
    pub fn is_redirect(&self) -> bool {
        matches!(self.status(), 302 | 307)
    }

    /// Get a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name)?.to_str().ok()
    }

    /// The activity id header, or an empty string.
    pub fn activity_id(&self) -> &str {
        self.header(ACTIVITY_ID_HEADER).unwrap_or_default()
    }

    /// The redirect target, if any.
    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Get the response body as text.
    pub async fn text(self) -> Result<String> {
        self.inner.text().await.map_err(Into::into)
    }

    /// Get the response body as bytes.
    pub async fn bytes(self) -> Result<bytes::Bytes> {
        self.inner.bytes().await.map_err(Into::into)
    }

    /// Deserialize the response body as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(Into::into)
    }

    /// Get access to the inner reqwest::Response.
    pub fn into_inner(self) -> reqwest::Response {
        self.inner
    }
}

/// Extension trait for turning error responses into service errors.
pub trait ResponseExt {
    /// Pass through successful responses; convert anything else.
    fn check_kusto_error(self) -> impl std::future::Future<Output = Result<Response>> + Send;
}

impl ResponseExt for Response {
    async fn check_kusto_error(self) -> Result<Response> {
        if self.is_success() {
            return Ok(self);
        }

        let status = self.status();
        let activity_id = self.activity_id().to_string();
        let body = match self.text().await {
            Ok(body) => body,
            Err(err) => {
                warn!(status, error = %err, "Failed to read error response body");
                String::new()
            }
        };

        Err(error_from_response(status, &body, &activity_id))
    }
}

/// Build a service error from a failed response.
///
/// The body may be a structured `{"error": {...}}` object, a generic
/// `{"message": "..."}` object, or anything else, which is used verbatim.
/// A blank body is described by its status code. The message always ends
/// with `, ActivityId='<id>'`.
pub fn error_from_response(status: u16, body: &str, activity_id: &str) -> Error {
    let mut permanent = default_permanence(status);

    let message = if body.trim().is_empty() {
        format!("Http StatusCode='{}'", status)
    } else {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => {
                if let Some(error) = map.get("error") {
                    if let Some(flag) = error.get("@permanent").and_then(Value::as_bool) {
                        permanent = flag;
                    }
                    error
                        .get("message")
                        .or_else(|| error.get("@message"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string())
                } else if let Some(message) = map.get("message").and_then(Value::as_str) {
                    message.to_string()
                } else {
                    body.to_string()
                }
            }
            _ => body.to_string(),
        }
    };

    Error::new(ErrorKind::Service {
        status,
        message: format!("{}, ActivityId='{}'", message, activity_id),
        permanent,
        activity_id: activity_id.to_string(),
    })
}

/// Client errors are permanent unless they signal throttling or a timeout.
fn default_permanence(status: u16) -> bool {
    (400..500).contains(&status) && !matches!(status, 408 | 429)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_error_body() {
        let body = r#"{"error":{"message":"M","@permanent":true}}"#;
        let err = error_from_response(400, body, "1234");
        assert_eq!(err.to_string(), "M, ActivityId='1234'");
        assert!(err.is_permanent());
        assert_eq!(err.activity_id(), Some("1234"));
    }

    #[test]
    fn test_structured_error_can_be_transient() {
        let body = r#"{"error":{"code":"Throttled","@message":"Try later","@permanent":false}}"#;
        let err = error_from_response(400, body, "a1");
        assert_eq!(err.to_string(), "Try later, ActivityId='a1'");
        assert!(!err.is_permanent());
    }

    #[test]
    fn test_structured_error_without_message_uses_object() {
        let body = r#"{"error":{"code":"BadRequest"}}"#;
        let err = error_from_response(400, body, "x");
        assert_eq!(err.to_string(), r#"{"code":"BadRequest"}, ActivityId='x'"#);
    }

    #[test]
    fn test_generic_message_body() {
        let err = error_from_response(503, r#"{"message":"Service busy"}"#, "id-1");
        assert_eq!(err.to_string(), "Service busy, ActivityId='id-1'");
        assert!(!err.is_permanent());
    }

    #[test]
    fn test_blank_body() {
        let err = error_from_response(401, "", "abc");
        assert_eq!(err.to_string(), "Http StatusCode='401', ActivityId='abc'");
        assert!(err.is_permanent());

        let err = error_from_response(500, "   \n", "");
        assert_eq!(err.to_string(), "Http StatusCode='500', ActivityId=''");
        assert!(!err.is_permanent());
    }

    #[test]
    fn test_non_json_body_is_literal() {
        let err = error_from_response(502, "Bad Gateway", "z");
        assert_eq!(err.to_string(), "Bad Gateway, ActivityId='z'");

        let err = error_from_response(400, "[1,2]", "z");
        assert_eq!(err.to_string(), "[1,2], ActivityId='z'");
    }

    #[test]
    fn test_throttling_is_not_permanent() {
        assert!(!default_permanence(429));
        assert!(!default_permanence(408));
        assert!(default_permanence(404));
        assert!(!default_permanence(500));
    }
}
