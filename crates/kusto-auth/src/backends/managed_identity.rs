//! Managed identity through the instance metadata service, or the App
//! Service identity endpoint when the host advertises one.

use tracing::{debug, instrument};
use url::Url;

use crate::backend::{AcquisitionRequest, IdentityBackend, SilentRequest, TokenGrant};
use crate::error::Result;
use crate::oauth::handle_token_response;

/// Token endpoint of the instance metadata service.
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

#[derive(Clone)]
enum Endpoint {
    Imds(String),
    AppService { url: String, secret: String },
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Imds(url) => f.debug_tuple("Imds").field(url).finish(),
            Endpoint::AppService { url, .. } => f
                .debug_struct("AppService")
                .field("url", url)
                .field("secret", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Acquires tokens for the host's managed identity.
#[derive(Debug, Clone)]
pub struct ManagedIdentityBackend {
    client_id: Option<String>,
    endpoint: Endpoint,
    http: reqwest::Client,
}

impl ManagedIdentityBackend {
    /// System-assigned identity when `client_id` is `None`, otherwise the
    /// user-assigned identity with that client id.
    ///
    /// Uses the App Service endpoint if `IDENTITY_ENDPOINT` and
    /// `IDENTITY_HEADER` are set, the instance metadata service otherwise.
    pub fn new(client_id: Option<String>) -> Self {
        let endpoint = match (
            std::env::var("IDENTITY_ENDPOINT"),
            std::env::var("IDENTITY_HEADER"),
        ) {
            (Ok(url), Ok(secret)) => Endpoint::AppService { url, secret },
            _ => Endpoint::Imds(IMDS_ENDPOINT.to_string()),
        };

        Self {
            client_id,
            endpoint,
            http: reqwest::Client::new(),
        }
    }

    /// Use an instance-metadata-style endpoint at a different address.
    pub fn with_imds_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Endpoint::Imds(url.into());
        self
    }

    /// Use an App Service-style endpoint.
    pub fn with_app_service_endpoint(
        mut self,
        url: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        self.endpoint = Endpoint::AppService {
            url: url.into(),
            secret: secret.into(),
        };
        self
    }

    /// Use a specific HTTP client for token requests.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

impl IdentityBackend for ManagedIdentityBackend {
    async fn acquire_silently(&self, _request: &SilentRequest) -> Result<Option<TokenGrant>> {
        Ok(None)
    }

    #[instrument(skip(self, request), fields(resource = %request.resource()))]
    async fn acquire_new(&self, request: &AcquisitionRequest) -> Result<TokenGrant> {
        let (base, api_version) = match &self.endpoint {
            Endpoint::Imds(url) => (url, IMDS_API_VERSION),
            Endpoint::AppService { url, .. } => (url, APP_SERVICE_API_VERSION),
        };

        let mut params = vec![
            ("api-version", api_version),
            ("resource", request.resource()),
        ];
        if let Some(ref client_id) = self.client_id {
            params.push(("client_id", client_id.as_str()));
        }
        let url = Url::parse_with_params(base, &params)?;

        debug!(
            endpoint = %base,
            user_assigned = self.client_id.is_some(),
            "Requesting managed identity token"
        );

        let builder = self.http.get(url);
        let builder = match &self.endpoint {
            Endpoint::Imds(_) => builder.header("Metadata", "true"),
            Endpoint::AppService { secret, .. } => builder.header("X-IDENTITY-HEADER", secret),
        };

        let response = builder.send().await?;
        handle_token_response(response).await
    }
}
