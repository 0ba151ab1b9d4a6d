//! Token caching and refresh policy.
//!
//! A [`TokenProvider`] holds at most one [`CachedToken`]. Each call to
//! [`TokenProvider::acquire_access_token`] either returns that token, asks
//! the backend for a silent refresh, or falls back to a full acquisition.
//!
//! ```text
//!  cached & valid ──────────────────────────────► return cached
//!  cached & near expiry ──► silent refresh ──ok──► replace, return
//!                               │ none/err
//!  nothing cached ─────────────►└──► new acquisition ──ok──► replace, return
//!                                          │ err
//!                                          └──► error, cache untouched
//! ```
//!
//! Callers that find a valid token only take a read lock. Refreshes are
//! serialized: callers arriving while one is in flight wait for it and then
//! reuse its result.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, instrument, warn};

use crate::backend::{Account, AcquisitionRequest, IdentityBackend, SilentRequest, TokenGrant};
use crate::backends::CredentialBackend;
use crate::cloud_info::{CloudInfo, CloudInfoCache, CloudInfoSource, HttpCloudInfoSource};
use crate::connection_string::{normalize_cluster_url, ConnectionString};
use crate::error::{Error, ErrorKind, Result};

/// Default margin before expiry at which a token is refreshed.
pub const DEFAULT_MIN_VALIDITY_MARGIN: Duration = Duration::from_secs(60);

/// Default bound on the silent-refresh-then-new-acquisition chain.
pub const DEFAULT_ACQUISITION_TIMEOUT: Duration = Duration::from_secs(60);

/// Authority used when no tenant is configured.
const ORGANIZATIONS_TENANT: &str = "organizations";

/// Configuration for a [`TokenProvider`].
#[derive(Debug, Clone)]
pub struct TokenProviderConfig {
    /// Tokens expiring within this margin are refreshed.
    pub min_validity_margin: Duration,
    /// Upper bound on one acquisition, silent attempt and fallback included.
    pub acquisition_timeout: Duration,
}

impl Default for TokenProviderConfig {
    fn default() -> Self {
        Self {
            min_validity_margin: DEFAULT_MIN_VALIDITY_MARGIN,
            acquisition_timeout: DEFAULT_ACQUISITION_TIMEOUT,
        }
    }
}

impl TokenProviderConfig {
    /// Create a new config builder.
    pub fn builder() -> TokenProviderConfigBuilder {
        TokenProviderConfigBuilder::default()
    }
}

/// Builder for [`TokenProviderConfig`].
#[derive(Debug, Default)]
pub struct TokenProviderConfigBuilder {
    config: TokenProviderConfig,
}

impl TokenProviderConfigBuilder {
    /// Set the refresh margin.
    pub fn with_min_validity_margin(mut self, margin: Duration) -> Self {
        self.config.min_validity_margin = margin;
        self
    }

    /// Set the acquisition bound.
    pub fn with_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquisition_timeout = timeout;
        self
    }

    /// Build the config.
    pub fn build(self) -> TokenProviderConfig {
        self.config
    }
}

/// Where and as whom tokens are requested. Fixed once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityContext {
    pub authority_url: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    /// Authority for personal (MSA) accounts.
    pub first_party_authority_url: String,
}

impl AuthorityContext {
    /// Derive the context from cloud info and the configured tenant.
    pub fn from_cloud_info(
        cloud_info: &CloudInfo,
        authority_id: Option<&str>,
        client_id: Option<&str>,
    ) -> Self {
        Self {
            authority_url: format!(
                "{}/{}",
                cloud_info.login_endpoint.trim_end_matches('/'),
                authority_id.unwrap_or(ORGANIZATIONS_TENANT)
            ),
            client_id: client_id
                .unwrap_or(&cloud_info.kusto_client_app_id)
                .to_string(),
            scopes: vec![cloud_info.scope()],
            first_party_authority_url: cloud_info.first_party_authority_url.clone(),
        }
    }

    /// The authority to refresh a token for `account` against.
    pub fn authority_for(&self, account: Option<&Account>) -> &str {
        match account {
            Some(account) if account.is_personal() => &self.first_party_authority_url,
            _ => &self.authority_url,
        }
    }
}

/// The token a provider currently holds.
#[derive(Clone)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_token: Option<String>,
    pub scopes: Vec<String>,
    pub account: Option<Account>,
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scopes", &self.scopes)
            .field("account", &self.account)
            .finish()
    }
}

impl CachedToken {
    fn from_grant(grant: TokenGrant, scopes: Vec<String>) -> Self {
        Self {
            access_token: grant.access_token,
            expires_at: grant.expires_at,
            refresh_token: grant.refresh_token,
            scopes,
            account: grant.account,
        }
    }

    /// Returns true if the token expires within `margin` of now.
    pub fn is_near_expiry(&self, margin: Duration) -> bool {
        let margin = TimeDelta::from_std(margin).unwrap_or(TimeDelta::MAX);
        match Utc::now().checked_add_signed(margin) {
            Some(deadline) => self.expires_at <= deadline,
            None => true,
        }
    }
}

/// Produces bearer tokens for one cluster, caching the most recent one.
pub struct TokenProvider<B, S = HttpCloudInfoSource> {
    backend: B,
    cloud_info: Arc<CloudInfoCache<S>>,
    cluster_url: String,
    authority_id: Option<String>,
    config: TokenProviderConfig,
    context: OnceCell<AuthorityContext>,
    cached: RwLock<Option<Arc<CachedToken>>>,
    refresh: Mutex<()>,
}

impl<B: std::fmt::Debug, S> std::fmt::Debug for TokenProvider<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("backend", &self.backend)
            .field("cluster_url", &self.cluster_url)
            .field("authority_id", &self.authority_id)
            .field("config", &self.config)
            .field("context", &self.context.get())
            .finish_non_exhaustive()
    }
}

impl<S: CloudInfoSource> TokenProvider<CredentialBackend, S> {
    /// Create a provider for the cluster and credentials of a connection string.
    pub fn from_connection_string(
        connection: &ConnectionString,
        cloud_info: Arc<CloudInfoCache<S>>,
    ) -> Result<Self> {
        let backend = CredentialBackend::from_connection_string(connection)?;
        let mut provider = Self::new(backend, connection.data_source(), cloud_info)?;
        provider.authority_id = connection.authority_id().map(str::to_string);
        Ok(provider)
    }
}

impl<B: IdentityBackend, S: CloudInfoSource> TokenProvider<B, S> {
    /// Create a provider for `cluster_url` that acquires tokens through
    /// `backend`, resolving cloud info through the shared cache.
    pub fn new(backend: B, cluster_url: &str, cloud_info: Arc<CloudInfoCache<S>>) -> Result<Self> {
        Ok(Self {
            backend,
            cloud_info,
            cluster_url: normalize_cluster_url(cluster_url)?,
            authority_id: None,
            config: TokenProviderConfig::default(),
            context: OnceCell::new(),
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        })
    }

    /// Authenticate against a specific tenant instead of `organizations`.
    pub fn with_authority_id(mut self, authority_id: impl Into<String>) -> Self {
        self.authority_id = Some(authority_id.into());
        self
    }

    /// Replace the refresh policy.
    pub fn with_config(mut self, config: TokenProviderConfig) -> Self {
        self.config = config;
        self
    }

    /// The cluster tokens are issued for.
    pub fn cluster_url(&self) -> &str {
        &self.cluster_url
    }

    /// The identity backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The refresh policy.
    pub fn config(&self) -> &TokenProviderConfig {
        &self.config
    }

    /// Resolve the authority context. Runs once; later calls return the
    /// stored context. Acquisition calls this implicitly.
    pub async fn initialize(&self) -> Result<&AuthorityContext> {
        self.context
            .get_or_try_init(|| async {
                let cloud_info = if self.backend.requires_cloud_info() {
                    self.cloud_info.get(&self.cluster_url).await?
                } else {
                    Arc::new(CloudInfo::default())
                };

                let context = AuthorityContext::from_cloud_info(
                    &cloud_info,
                    self.authority_id.as_deref(),
                    self.backend.client_id(),
                );
                debug!(
                    authority = %context.authority_url,
                    client_id = %context.client_id,
                    "Resolved authority context"
                );
                Ok::<_, Error>(context)
            })
            .await
    }

    /// The authority context, if [`initialize`](Self::initialize) has completed.
    pub fn authority_context(&self) -> Option<&AuthorityContext> {
        self.context.get()
    }

    /// The token currently held, valid or not.
    pub fn cached_token(&self) -> Option<Arc<CachedToken>> {
        self.cached.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drop the cached token; the next call performs a new acquisition.
    pub fn invalidate(&self) {
        *self.cached.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Return a bearer token that is valid for at least the configured margin.
    pub async fn acquire_access_token(&self) -> Result<String> {
        if let Some(token) = self.valid_cached() {
            return Ok(token.access_token.clone());
        }

        let _guard = self.refresh.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(token) = self.valid_cached() {
            debug!("Using token refreshed by a concurrent caller");
            return Ok(token.access_token.clone());
        }

        let context = self.initialize().await?;
        let previous = self.cached_token();

        let timeout = self.config.acquisition_timeout;
        let token = tokio::time::timeout(timeout, self.refresh_token(context, previous))
            .await
            .map_err(|_| Error::new(ErrorKind::Timeout(timeout)))??;

        let token = Arc::new(token);
        *self.cached.write().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());
        Ok(token.access_token.clone())
    }

    fn valid_cached(&self) -> Option<Arc<CachedToken>> {
        self.cached_token()
            .filter(|token| !token.is_near_expiry(self.config.min_validity_margin))
    }

    #[instrument(skip_all, fields(cluster = %self.cluster_url))]
    async fn refresh_token(
        &self,
        context: &AuthorityContext,
        previous: Option<Arc<CachedToken>>,
    ) -> Result<CachedToken> {
        if let Some(previous) = previous {
            let request = SilentRequest {
                authority: context.authority_for(previous.account.as_ref()).to_string(),
                client_id: context.client_id.clone(),
                scopes: context.scopes.clone(),
                refresh_token: previous.refresh_token.clone(),
                account: previous.account.clone(),
            };

            match self.backend.acquire_silently(&request).await {
                Ok(Some(grant)) => {
                    debug!(expires_at = %grant.expires_at, "Silent refresh succeeded");
                    return Ok(CachedToken::from_grant(grant, context.scopes.clone()));
                }
                Ok(None) => debug!("Silent refresh unavailable; acquiring a new token"),
                Err(err) => warn!(error = %err, "Silent refresh failed; acquiring a new token"),
            }
        }

        let request = AcquisitionRequest {
            authority: context.authority_url.clone(),
            client_id: context.client_id.clone(),
            scopes: context.scopes.clone(),
        };
        let grant = self.backend.acquire_new(&request).await?;
        debug!(expires_at = %grant.expires_at, "Acquired new token");

        Ok(CachedToken::from_grant(grant, context.scopes.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MSA_HOME_TENANT_ID;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeBackend {
        silent_calls: AtomicUsize,
        new_calls: AtomicUsize,
        silent: std::sync::Mutex<VecDeque<Result<Option<TokenGrant>>>>,
        new: std::sync::Mutex<VecDeque<Result<TokenGrant>>>,
        silent_authorities: std::sync::Mutex<Vec<String>>,
        delay: Option<Duration>,
        offline: bool,
    }

    impl FakeBackend {
        fn new_grants(self, grants: impl IntoIterator<Item = Result<TokenGrant>>) -> Self {
            self.new.lock().unwrap().extend(grants);
            self
        }

        fn silent_grants(self, grants: impl IntoIterator<Item = Result<Option<TokenGrant>>>) -> Self {
            self.silent.lock().unwrap().extend(grants);
            self
        }

        fn silent_calls(&self) -> usize {
            self.silent_calls.load(Ordering::SeqCst)
        }

        fn new_calls(&self) -> usize {
            self.new_calls.load(Ordering::SeqCst)
        }
    }

    impl IdentityBackend for FakeBackend {
        fn requires_cloud_info(&self) -> bool {
            !self.offline
        }

        async fn acquire_silently(&self, request: &SilentRequest) -> Result<Option<TokenGrant>> {
            self.silent_calls.fetch_add(1, Ordering::SeqCst);
            self.silent_authorities
                .lock()
                .unwrap()
                .push(request.authority.clone());
            self.silent.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }

        async fn acquire_new(&self, _request: &AcquisitionRequest) -> Result<TokenGrant> {
            self.new_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.new.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(Error::new(ErrorKind::Transient("no grant".to_string()))))
        }
    }

    #[derive(Default)]
    struct FixedCloud {
        fetches: Arc<AtomicUsize>,
    }

    impl CloudInfoSource for FixedCloud {
        async fn fetch(&self, _endpoint: &str) -> Result<CloudInfo> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(CloudInfo {
                login_endpoint: "https://login.example".to_string(),
                kusto_client_app_id: "first-party-app".to_string(),
                ..CloudInfo::default()
            })
        }
    }

    fn provider(backend: FakeBackend) -> TokenProvider<FakeBackend, FixedCloud> {
        TokenProvider::new(
            backend,
            "https://c.kusto.windows.net",
            Arc::new(CloudInfoCache::new(FixedCloud::default())),
        )
        .unwrap()
    }

    fn seed(provider: &TokenProvider<FakeBackend, FixedCloud>, grant: TokenGrant) {
        let token = CachedToken::from_grant(grant, Vec::new());
        *provider.cached.write().unwrap() = Some(Arc::new(token));
    }

    fn grant(token: &str, lifetime: TimeDelta) -> TokenGrant {
        TokenGrant::new(token, Utc::now() + lifetime)
    }

    #[tokio::test]
    async fn test_first_call_acquires_new_token() {
        let provider = provider(FakeBackend::default().new_grants([Ok(grant("t1", TimeDelta::hours(1)))]));

        assert_eq!(provider.acquire_access_token().await.unwrap(), "t1");
        assert_eq!(provider.backend().silent_calls(), 0);
        assert_eq!(provider.backend().new_calls(), 1);

        let context = provider.authority_context().unwrap();
        assert_eq!(context.authority_url, "https://login.example/organizations");
        assert_eq!(context.client_id, "first-party-app");
        assert_eq!(context.scopes, vec!["https://kusto.kusto.windows.net/.default"]);
    }

    #[tokio::test]
    async fn test_valid_token_served_from_cache() {
        let provider = provider(FakeBackend::default().new_grants([Ok(grant("t1", TimeDelta::hours(1)))]));

        provider.acquire_access_token().await.unwrap();
        for _ in 0..5 {
            assert_eq!(provider.acquire_access_token().await.unwrap(), "t1");
        }

        assert_eq!(provider.backend().silent_calls(), 0);
        assert_eq!(provider.backend().new_calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_token_tries_silent_then_new() {
        let provider = provider(FakeBackend::default().new_grants([Ok(grant("fresh", TimeDelta::hours(1)))]));
        seed(&provider, grant("expired", TimeDelta::minutes(-5)));

        assert_eq!(provider.acquire_access_token().await.unwrap(), "fresh");
        assert_eq!(provider.cached_token().unwrap().access_token, "fresh");

        assert_eq!(provider.backend().silent_calls(), 1);
        assert_eq!(provider.backend().new_calls(), 1);
    }

    #[tokio::test]
    async fn test_silent_refresh_wins_when_it_succeeds() {
        let provider = provider(
            FakeBackend::default()
                .new_grants([Ok(grant("old", TimeDelta::seconds(30)).with_refresh_token("rt"))])
                .silent_grants([Ok(Some(grant("refreshed", TimeDelta::hours(1))))]),
        );

        assert_eq!(provider.acquire_access_token().await.unwrap(), "old");
        assert_eq!(provider.acquire_access_token().await.unwrap(), "refreshed");

        assert_eq!(provider.backend().silent_calls(), 1);
        assert_eq!(provider.backend().new_calls(), 1);
    }

    #[tokio::test]
    async fn test_silent_error_falls_through() {
        let provider = provider(
            FakeBackend::default()
                .new_grants([
                    Ok(grant("old", TimeDelta::zero())),
                    Ok(grant("new", TimeDelta::hours(1))),
                ])
                .silent_grants([Err(Error::new(ErrorKind::InteractionRequired(
                    "invalid_grant".to_string(),
                )))]),
        );

        provider.acquire_access_token().await.unwrap();
        assert_eq!(provider.acquire_access_token().await.unwrap(), "new");
        assert_eq!(provider.backend().new_calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_leaves_cache_untouched() {
        let provider = provider(FakeBackend::default().new_grants([
            Ok(grant("stale", TimeDelta::seconds(10))),
            Err(Error::new(ErrorKind::InteractionRequired(
                "consent_required".to_string(),
            ))),
        ]));

        provider.acquire_access_token().await.unwrap();
        let err = provider.acquire_access_token().await.unwrap_err();

        assert!(err.is_interaction_required());
        assert_eq!(provider.cached_token().unwrap().access_token, "stale");
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_acquisition() {
        let backend = FakeBackend {
            delay: Some(Duration::from_millis(50)),
            ..FakeBackend::default()
        }
        .new_grants([Ok(grant("shared", TimeDelta::hours(1)))]);
        let provider = provider(backend);

        let results =
            futures::future::join_all((0..8).map(|_| provider.acquire_access_token())).await;

        assert!(results.iter().all(|r| r.as_deref().ok() == Some("shared")));
        assert_eq!(provider.backend().new_calls(), 1);
    }

    #[tokio::test]
    async fn test_acquisition_timeout() {
        let backend = FakeBackend {
            delay: Some(Duration::from_millis(500)),
            ..FakeBackend::default()
        }
        .new_grants([Ok(grant("late", TimeDelta::hours(1)))]);
        let provider = provider(backend).with_config(
            TokenProviderConfig::builder()
                .with_acquisition_timeout(Duration::from_millis(20))
                .build(),
        );

        let err = provider.acquire_access_token().await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Timeout(_)));
        assert!(err.is_transient());
        assert!(provider.cached_token().is_none());
    }

    #[tokio::test]
    async fn test_personal_accounts_refresh_against_first_party_authority() {
        let msa = Account {
            username: Some("someone@outlook.com".to_string()),
            home_tenant_id: Some(MSA_HOME_TENANT_ID.to_string()),
        };
        let work = Account {
            username: Some("someone@contoso.com".to_string()),
            home_tenant_id: Some("contoso".to_string()),
        };
        let provider = provider(
            FakeBackend::default()
                .new_grants([
                    Ok(grant("a", TimeDelta::zero()).with_account(msa)),
                    Ok(grant("b", TimeDelta::zero()).with_account(work)),
                    Ok(grant("c", TimeDelta::zero())),
                ])
                .silent_grants([Ok(None), Ok(None)]),
        )
        .with_authority_id("contoso");

        for _ in 0..3 {
            provider.acquire_access_token().await.unwrap();
        }

        let authorities = provider.backend().silent_authorities.lock().unwrap().clone();
        assert_eq!(
            authorities,
            vec![
                crate::cloud_info::DEFAULT_FIRST_PARTY_AUTHORITY_URL.to_string(),
                "https://login.example/contoso".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_acquisition() {
        let provider = provider(FakeBackend::default().new_grants([
            Ok(grant("t1", TimeDelta::hours(1))),
            Ok(grant("t2", TimeDelta::hours(1))),
        ]));

        provider.acquire_access_token().await.unwrap();
        provider.invalidate();
        assert_eq!(provider.acquire_access_token().await.unwrap(), "t2");
        assert_eq!(provider.backend().silent_calls(), 0);
    }

    #[tokio::test]
    async fn test_cloud_info_skipped_for_supplied_tokens() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(CloudInfoCache::new(FixedCloud {
            fetches: fetches.clone(),
        }));
        let backend = FakeBackend {
            offline: true,
            ..FakeBackend::default()
        }
        .new_grants([Ok(grant("t", TimeDelta::hours(1)))]);
        let provider = TokenProvider::new(backend, "https://c.kusto.windows.net", cache).unwrap();

        provider.acquire_access_token().await.unwrap();
        let context = provider.authority_context().unwrap();
        assert_eq!(
            context.authority_url,
            "https://login.microsoftonline.com/organizations"
        );
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cloud_info_shared_between_providers() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(CloudInfoCache::new(FixedCloud {
            fetches: fetches.clone(),
        }));

        for _ in 0..3 {
            let provider = TokenProvider::new(
                FakeBackend::default().new_grants([Ok(grant("t", TimeDelta::hours(1)))]),
                "https://C.kusto.windows.net/",
                cache.clone(),
            )
            .unwrap();
            provider.acquire_access_token().await.unwrap();
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_near_expiry() {
        let token = CachedToken::from_grant(grant("t", TimeDelta::seconds(30)), vec![]);
        assert!(token.is_near_expiry(Duration::from_secs(60)));
        assert!(!token.is_near_expiry(Duration::from_secs(5)));

        let forever = CachedToken::from_grant(TokenGrant::new("t", DateTime::<Utc>::MAX_UTC), vec![]);
        assert!(!forever.is_near_expiry(DEFAULT_MIN_VALIDITY_MARGIN));
        assert!(!format!("{:?}", forever).contains("\"t\""));
    }

    #[test]
    fn test_rejects_plain_http_cluster() {
        let result = TokenProvider::new(
            FakeBackend::default(),
            "http://c.kusto.windows.net",
            Arc::new(CloudInfoCache::new(FixedCloud::default())),
        );
        assert!(result.is_err());
    }
}
