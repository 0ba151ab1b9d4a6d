//! Kusto query client.
//!
//! Ties the pieces together: a token from the [`TokenProvider`], a request
//! through the [`KustoHttpClient`], and the response decoded into a
//! [`KustoResponseDataSet`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use kusto_auth::{
    CloudInfoCache, CloudInfoSource, ConnectionString, CredentialBackend, HttpCloudInfoSource,
    IdentityBackend, TokenProvider,
};
use kusto_client::{
    ClientConfig, KustoHttpClient, CLIENT_SERVER_DELTA, DEFAULT_MGMT_TIMEOUT,
    DEFAULT_QUERY_TIMEOUT,
};
use kusto_data::{EnvelopeVersion, KustoResponseDataSet};

use crate::error::{Error, ErrorKind, Result};
use crate::properties::{generate_client_request_id, ClientRequestProperties};

/// Query endpoint, answering with the v2 envelope.
pub const QUERY_PATH: &str = "/v2/rest/query";

/// Management endpoint, answering with the v1 envelope.
pub const MGMT_PATH: &str = "/v1/rest/mgmt";

/// Whether a request is a query or a management command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Query,
    Management,
}

impl CommandKind {
    /// Management commands start with a dot.
    pub fn detect(text: &str) -> Self {
        if text.trim_start().starts_with('.') {
            CommandKind::Management
        } else {
            CommandKind::Query
        }
    }

    fn path(self) -> &'static str {
        match self {
            CommandKind::Query => QUERY_PATH,
            CommandKind::Management => MGMT_PATH,
        }
    }

    fn envelope(self) -> EnvelopeVersion {
        match self {
            CommandKind::Query => EnvelopeVersion::V2,
            CommandKind::Management => EnvelopeVersion::V1,
        }
    }

    fn default_timeout(self) -> Duration {
        match self {
            CommandKind::Query => DEFAULT_QUERY_TIMEOUT,
            CommandKind::Management => DEFAULT_MGMT_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct CommandBody<'a> {
    db: &'a str,
    csl: &'a str,
    properties: Value,
}

/// Client for running queries and management commands against one cluster.
///
/// # Example
///
/// ```rust,ignore
/// use kusto_query::KustoQueryClient;
///
/// let client = KustoQueryClient::from_connection_string(&connection)?;
///
/// let mut table = client
///     .execute_query("Samples", "StormEvents | take 10")
///     .await?
///     .into_primary_result()
///     .expect("query returns a table");
///
/// while table.next() {
///     println!("{}", table.get_string("State")?);
/// }
/// ```
pub struct KustoQueryClient<B = CredentialBackend, S = HttpCloudInfoSource> {
    cluster_url: String,
    token_provider: Arc<TokenProvider<B, S>>,
    http: KustoHttpClient,
}

impl<B, S> Clone for KustoQueryClient<B, S> {
    fn clone(&self) -> Self {
        Self {
            cluster_url: self.cluster_url.clone(),
            token_provider: self.token_provider.clone(),
            http: self.http.clone(),
        }
    }
}

impl<B, S> std::fmt::Debug for KustoQueryClient<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KustoQueryClient")
            .field("cluster_url", &self.cluster_url)
            .field("http", &self.http)
            .finish_non_exhaustive()
    }
}

impl KustoQueryClient {
    /// Create a client from a connection string, with a default HTTP client
    /// carrying the connection's tracing headers.
    pub fn from_connection_string(connection: &ConnectionString) -> Result<Self> {
        let http = KustoHttpClient::new(
            ClientConfig::builder()
                .with_client_details(connection.client_details())
                .build(),
        )?;
        let cloud_info = Arc::new(CloudInfoCache::new(HttpCloudInfoSource::new(http.clone())));
        let token_provider = TokenProvider::from_connection_string(connection, cloud_info)?;

        Self::new(connection.data_source(), Arc::new(token_provider), http)
    }
}

impl<B: IdentityBackend, S: CloudInfoSource> KustoQueryClient<B, S> {
    /// Create a client for `cluster_url`.
    pub fn new(
        cluster_url: &str,
        token_provider: Arc<TokenProvider<B, S>>,
        http: KustoHttpClient,
    ) -> Result<Self> {
        let cluster_url = cluster_url.trim().trim_end_matches('/');
        if cluster_url.is_empty() {
            return Err(Error::new(ErrorKind::InvalidRequest(
                "cluster URL is empty".to_string(),
            )));
        }

        Ok(Self {
            cluster_url: cluster_url.to_string(),
            token_provider,
            http,
        })
    }

    /// Normalized cluster endpoint, without a trailing slash.
    pub fn cluster_url(&self) -> &str {
        &self.cluster_url
    }

    /// The shared provider that supplies bearer tokens.
    pub fn token_provider(&self) -> &Arc<TokenProvider<B, S>> {
        &self.token_provider
    }

    /// The underlying HTTP client.
    pub fn http_client(&self) -> &KustoHttpClient {
        &self.http
    }

    /// Run a query; the response is the v2 envelope.
    pub async fn execute_query(&self, database: &str, query: &str) -> Result<KustoResponseDataSet> {
        self.execute_with(CommandKind::Query, database, query, None)
            .await
    }

    /// Run a query with request properties.
    pub async fn execute_query_with_properties(
        &self,
        database: &str,
        query: &str,
        properties: &ClientRequestProperties,
    ) -> Result<KustoResponseDataSet> {
        self.execute_with(CommandKind::Query, database, query, Some(properties))
            .await
    }

    /// Run a management command; the response is the v1 envelope.
    pub async fn execute_mgmt(
        &self,
        database: &str,
        command: &str,
    ) -> Result<KustoResponseDataSet> {
        self.execute_with(CommandKind::Management, database, command, None)
            .await
    }

    /// Run a management command with request properties.
    pub async fn execute_mgmt_with_properties(
        &self,
        database: &str,
        command: &str,
        properties: &ClientRequestProperties,
    ) -> Result<KustoResponseDataSet> {
        self.execute_with(CommandKind::Management, database, command, Some(properties))
            .await
    }

    /// Run a query or command, routed by whether the text starts with a dot.
    pub async fn execute(&self, database: &str, text: &str) -> Result<KustoResponseDataSet> {
        self.execute_with(CommandKind::detect(text), database, text, None)
            .await
    }

    #[instrument(skip(self, text, properties), fields(cluster = %self.cluster_url))]
    async fn execute_with(
        &self,
        kind: CommandKind,
        database: &str,
        text: &str,
        properties: Option<&ClientRequestProperties>,
    ) -> Result<KustoResponseDataSet> {
        if text.trim().is_empty() {
            return Err(Error::new(ErrorKind::InvalidRequest(
                "query text is empty".to_string(),
            )));
        }

        let token = self.token_provider.acquire_access_token().await?;

        let server_timeout = properties
            .and_then(ClientRequestProperties::server_timeout)
            .unwrap_or_else(|| kind.default_timeout());
        let client_request_id = properties
            .and_then(ClientRequestProperties::client_request_id)
            .map(str::to_string)
            .unwrap_or_else(generate_client_request_id);

        let body = CommandBody {
            db: database,
            csl: text,
            properties: properties
                .map(ClientRequestProperties::to_json)
                .unwrap_or_else(|| ClientRequestProperties::default().to_json()),
        };

        let url = format!("{}{}", self.cluster_url, kind.path());
        debug!(%url, %client_request_id, ?server_timeout, "Sending request");

        let request = self
            .http
            .post(url)
            .bearer_auth(token)
            .client_request_id(client_request_id)
            .timeout(server_timeout + CLIENT_SERVER_DELTA)
            .json(&body)?;

        let response = self.http.execute(request).await?;
        let payload = response.text().await?;

        Ok(KustoResponseDataSet::parse_as(&payload, kind.envelope())?)
    }
}
