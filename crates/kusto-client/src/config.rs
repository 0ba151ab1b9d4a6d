//! HTTP settings shared by every request a [`KustoHttpClient`](crate::KustoHttpClient) sends.

use std::time::Duration;

use crate::details::ClientDetails;

/// Transport settings for talking to a cluster.
///
/// `timeout` only applies when a request carries no timeout of its own;
/// query and management calls normally set one from their server timeout.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Values for the `x-ms-app`, `x-ms-user` and `x-ms-client-version` headers.
    pub client_details: ClientDetails,
    /// Ask the service for gzip/deflate encoded result sets.
    pub accept_compressed: bool,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// How long an unused pooled connection is kept open.
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub user_agent: String,
    /// Emit a `debug!` event per request and response.
    pub enable_tracing: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_details: ClientDetails::default(),
            accept_compressed: true,
            timeout: crate::DEFAULT_QUERY_TIMEOUT,
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: crate::USER_AGENT.to_string(),
            enable_tracing: true,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builds a [`ClientConfig`], starting from the defaults.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Identify the calling application and user in the tracing headers.
    pub fn with_client_details(mut self, details: ClientDetails) -> Self {
        self.config.client_details = details;
        self
    }

    /// Turn `Accept-Encoding: gzip,deflate` on or off.
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.config.accept_compressed = enabled;
        self
    }

    /// Fallback timeout for requests that set none.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Bound on establishing the TCP/TLS connection.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    pub fn with_pool_max_idle(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Override the `kusto-rust/<version>` User-Agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Silence per-request `debug!` events.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.config.enable_tracing = enabled;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
