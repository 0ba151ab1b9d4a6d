//! Core HTTP client with Kusto-specific headers and redirect handling.

use tracing::{debug, info, instrument};

use crate::config::ClientConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::request::{RequestBuilder, RequestMethod};
use crate::response::{Response, ResponseExt};

/// HTTP client for Kusto endpoints.
///
/// Automatic redirects are disabled; a single 302/307 is followed by
/// resubmitting the same payload to the `Location` target.
#[derive(Debug, Clone)]
pub struct KustoHttpClient {
    inner: reqwest::Client,
    config: ClientConfig,
}

impl KustoHttpClient {
    /// Create a new HTTP client.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .gzip(config.accept_compressed)
            .deflate(config.accept_compressed);

        let inner = builder
            .build()
            .map_err(|e| Error::with_source(ErrorKind::Config(e.to_string()), e))?;

        Ok(Self { inner, config })
    }

    /// Create a new HTTP client with default configuration.
    pub fn default_client() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Create a GET request builder.
    pub fn get(&self, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(RequestMethod::Get, url)
    }

    /// Create a POST request builder.
    pub fn post(&self, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(RequestMethod::Post, url)
    }

    /// Execute a request, following at most one redirect, and convert
    /// non-success responses into service errors.
    #[instrument(skip(self, request), fields(method = ?request.method, url = %request.url))]
    pub async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.execute_once(&request).await?;

        let response = if response.is_redirect() {
            let location = response.location().map(str::to_string).ok_or_else(|| {
                Error::new(ErrorKind::Redirect(format!(
                    "HTTP {} without a Location header",
                    response.status()
                )))
            })?;

            debug!(%location, "Following redirect");
            let redirected = self.execute_once(&request.redirected_to(location)).await?;

            if redirected.is_redirect() {
                return Err(Error::new(ErrorKind::Redirect(format!(
                    "Redirected more than once, ActivityId='{}'",
                    redirected.activity_id()
                ))));
            }
            redirected
        } else {
            response
        };

        response.check_kusto_error().await
    }

    /// POST a JSON payload with the standard Kusto header set.
    pub async fn post_json<T: serde::Serialize>(
        &self,
        url: &str,
        token: &str,
        body: &T,
    ) -> Result<Response> {
        let request = self.post(url).bearer_auth(token).json(body)?;
        self.execute(request).await
    }

    /// Execute a request and deserialize the JSON response.
    pub async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = self.execute(request).await?;
        response.json().await
    }

    /// Send a single request without redirect handling.
    async fn execute_once(&self, request: &RequestBuilder) -> Result<Response> {
        let mut req = self
            .inner
            .request(request.method.to_reqwest(), &request.url)
            .header("Accept", "application/json")
            .header("x-ms-version", crate::API_VERSION);

        if let Some(ref token) = request.bearer_token {
            req = req.bearer_auth(token);
        }

        for (name, value) in self.config.client_details.headers() {
            req = req.header(name, value);
        }

        if self.config.accept_compressed {
            req = req.header("Accept-Encoding", "gzip,deflate");
        }

        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        if let Some(ref body) = request.body {
            req = req.body(body.clone());
        }

        if self.config.enable_tracing {
            debug!(method = ?request.method, url = %request.url, "Sending request");
        }

        let response = req.send().await?;

        if self.config.enable_tracing {
            let status = response.status().as_u16();
            let content_length = response.content_length();

            if response.status().is_success() {
                debug!(status, content_length, "Response received");
            } else {
                info!(status, content_length, "Non-success response");
            }
        }

        Ok(Response::new(response))
    }
}
