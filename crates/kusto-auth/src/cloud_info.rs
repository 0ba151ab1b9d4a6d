//! Cloud metadata discovery.
//!
//! Each cluster advertises its login endpoint, first-party client id and
//! service resource id at `/v1/rest/auth/metadata`. Lookups go through an
//! injected [`CloudInfoSource`] and are memoized per cluster endpoint in a
//! [`CloudInfoCache`] that callers share explicitly through an `Arc`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use kusto_client::KustoHttpClient;

use crate::error::{Error, ErrorKind, Result};

/// Path of the metadata endpoint relative to the cluster.
pub const METADATA_ENDPOINT: &str = "/v1/rest/auth/metadata";

/// Login endpoint of the public cloud.
pub const DEFAULT_LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";
/// Kusto's first-party client application id.
pub const DEFAULT_KUSTO_CLIENT_APP_ID: &str = "db662dc1-0cfe-4e1c-a843-19a68e65be58";
/// Redirect URI registered for the first-party client.
pub const DEFAULT_REDIRECT_URI: &str = "https://microsoft/kustoclient";
/// Resource id of the public-cloud service.
pub const DEFAULT_KUSTO_SERVICE_RESOURCE_ID: &str = "https://kusto.kusto.windows.net";
/// Authority used for personal (MSA) accounts.
pub const DEFAULT_FIRST_PARTY_AUTHORITY_URL: &str =
    "https://login.microsoftonline.com/f8cdef31-a31e-4b4a-93e4-5f571e91255a";

/// Cloud-specific authentication parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CloudInfo {
    pub login_endpoint: String,
    pub login_mfa_required: bool,
    pub kusto_client_app_id: String,
    pub kusto_client_redirect_uri: String,
    pub kusto_service_resource_id: String,
    pub first_party_authority_url: String,
}

impl Default for CloudInfo {
    fn default() -> Self {
        Self {
            login_endpoint: DEFAULT_LOGIN_ENDPOINT.to_string(),
            login_mfa_required: false,
            kusto_client_app_id: DEFAULT_KUSTO_CLIENT_APP_ID.to_string(),
            kusto_client_redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            kusto_service_resource_id: DEFAULT_KUSTO_SERVICE_RESOURCE_ID.to_string(),
            first_party_authority_url: DEFAULT_FIRST_PARTY_AUTHORITY_URL.to_string(),
        }
    }
}

impl CloudInfo {
    /// The OAuth scope for the service, e.g. `https://kusto.kusto.windows.net/.default`.
    ///
    /// Clusters that require MFA use the `kustomfa` resource instead.
    pub fn scope(&self) -> String {
        let resource = self.kusto_service_resource_id.trim_end_matches('/');
        let resource = if self.login_mfa_required {
            resource.replace(".kusto.", ".kustomfa.")
        } else {
            resource.to_string()
        };
        format!("{}/.default", resource)
    }
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(rename = "AzureAD", default)]
    azure_ad: Option<CloudInfo>,
}

/// Something that can look up the cloud info of a cluster.
pub trait CloudInfoSource: Send + Sync {
    /// Fetch the cloud info for a cluster endpoint (`scheme://host[:port]`).
    fn fetch(&self, endpoint: &str) -> impl Future<Output = Result<CloudInfo>> + Send;
}

/// Fetches cloud info from the cluster's metadata endpoint.
#[derive(Debug, Clone)]
pub struct HttpCloudInfoSource {
    http: KustoHttpClient,
}

impl HttpCloudInfoSource {
    /// Create a source that issues requests through the given client.
    pub fn new(http: KustoHttpClient) -> Self {
        Self { http }
    }

    /// Create a source with a default HTTP client.
    pub fn with_default_client() -> Result<Self> {
        Ok(Self::new(KustoHttpClient::default_client()?))
    }
}

impl CloudInfoSource for HttpCloudInfoSource {
    #[instrument(skip(self))]
    async fn fetch(&self, endpoint: &str) -> Result<CloudInfo> {
        let url = format!("{}{}", endpoint.trim_end_matches('/'), METADATA_ENDPOINT);

        match self.http.send_json::<MetadataResponse>(self.http.get(url)).await {
            Ok(response) => Ok(response.azure_ad.unwrap_or_default()),
            Err(err) if err.status() == Some(404) => {
                // Clusters without the endpoint live in the public cloud.
                debug!("Metadata endpoint not found; using public cloud defaults");
                Ok(CloudInfo::default())
            }
            Err(err) => Err(Error::with_source(
                ErrorKind::CloudInfo(format!("failed to fetch metadata for {}", endpoint)),
                err,
            )),
        }
    }
}

/// Memoizes cloud info per cluster endpoint.
#[derive(Debug)]
pub struct CloudInfoCache<S = HttpCloudInfoSource> {
    source: S,
    entries: RwLock<HashMap<String, Arc<CloudInfo>>>,
}

impl<S: CloudInfoSource> CloudInfoCache<S> {
    /// Create an empty cache over the given source.
    pub fn new(source: S) -> Self {
        Self {
            source,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cloud info for the cluster, fetching it on first use.
    ///
    /// Concurrent first lookups of the same cluster may each fetch; the
    /// first result stored wins.
    pub async fn get(&self, cluster_url: &str) -> Result<Arc<CloudInfo>> {
        let key = endpoint_key(cluster_url)?;

        if let Some(info) = self.cached(&key) {
            debug!(endpoint = %key, "Cloud info cache hit");
            return Ok(info);
        }

        let info = Arc::new(self.source.fetch(&key).await?);

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        Ok(entries.entry(key).or_insert(info).clone())
    }

    /// Seed the cache, e.g. for clusters whose metadata is known up front.
    pub fn insert(&self, cluster_url: &str, info: CloudInfo) -> Result<()> {
        let key = endpoint_key(cluster_url)?;
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, Arc::new(info));
        Ok(())
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn cached(&self, key: &str) -> Option<Arc<CloudInfo>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }
}

/// Normalize a cluster URL to `scheme://host[:port]`.
pub(crate) fn endpoint_key(cluster_url: &str) -> Result<String> {
    let url = Url::parse(cluster_url)?;
    let host = url.host_str().ok_or_else(|| {
        Error::new(ErrorKind::CloudInfo(format!(
            "cluster URL has no host: {}",
            cluster_url
        )))
    })?;

    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host.to_lowercase(), port),
        None => format!("{}://{}", url.scheme(), host.to_lowercase()),
    })
}
