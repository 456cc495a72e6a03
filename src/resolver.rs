//! The resolver facade: the single entry point reconcilers call at the
//! start of every reconciliation.

use std::sync::Arc;

use crate::auth::{CredentialSources, HttpTokenExchange, TokenExchange};
use crate::cache::{CacheConfig, ClientCache};
use crate::client::ClientHandle;
use crate::config::ConfigResolver;
use crate::error::ConnError;
use crate::stores::{ConfigStore, MemorySecretStore, SecretStore};
use crate::types::{ConfigReference, Fingerprint};

/// Resolves a configuration reference into a ready-to-use client handle.
///
/// Pure composition of [`ConfigResolver`] and [`ClientCache`]; the
/// facade holds no state of its own. Errors keep their kind and gain the
/// offending reference for diagnostics.
pub struct Resolver {
    config: ConfigResolver,
    cache: ClientCache,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(config: ConfigResolver, cache: ClientCache) -> Self {
        Self { config, cache }
    }

    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    /// Resolve `reference` and return a client with valid credentials.
    pub async fn get(&self, reference: &ConfigReference) -> Result<ClientHandle, ConnError> {
        let spec = self
            .config
            .resolve(reference)
            .await
            .map_err(|e| e.annotate(reference))?;
        self.cache
            .get_or_refresh(&spec)
            .await
            .map_err(|e| e.annotate(reference))
    }

    /// Drop the cached client for a fingerprint, forcing the next `get`
    /// to authenticate afresh. Called when a configuration object is
    /// observed to have changed or been deleted.
    pub fn invalidate(&self, fingerprint: Fingerprint) -> bool {
        self.cache.invalidate(fingerprint)
    }

    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }
}

/// Wires stores, token exchange, HTTP client, and cache tuning into a
/// [`Resolver`], with defaults for everything but the config store.
pub struct ResolverBuilder {
    config_store: Option<Arc<dyn ConfigStore>>,
    secret_store: Option<Arc<dyn SecretStore>>,
    token_exchange: Option<Arc<dyn TokenExchange>>,
    http: Option<reqwest::Client>,
    cache_config: CacheConfig,
}

impl ResolverBuilder {
    pub fn new() -> Self {
        Self {
            config_store: None,
            secret_store: None,
            token_exchange: None,
            http: None,
            cache_config: CacheConfig::default(),
        }
    }

    pub fn with_config_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.config_store = Some(store);
        self
    }

    pub fn with_secret_store(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.secret_store = Some(store);
        self
    }

    pub fn with_token_exchange(mut self, exchange: Arc<dyn TokenExchange>) -> Self {
        self.token_exchange = Some(exchange);
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_cache_config(mut self, cache_config: CacheConfig) -> Self {
        self.cache_config = cache_config;
        self
    }

    pub fn build(self) -> Result<Resolver, ConnError> {
        let config_store = self.config_store.ok_or_else(|| {
            ConnError::Configuration("resolver requires a configuration store".into())
        })?;
        let http = self.http.unwrap_or_default();
        let secret_store = self
            .secret_store
            .unwrap_or_else(|| Arc::new(MemorySecretStore::new()));
        let token_exchange = self
            .token_exchange
            .unwrap_or_else(|| Arc::new(HttpTokenExchange::new(http.clone())));

        let sources = Arc::new(CredentialSources::new(
            secret_store,
            token_exchange,
            http.clone(),
        ));
        let cache = ClientCache::new(self.cache_config, sources, http);
        Ok(Resolver::new(ConfigResolver::new(config_store), cache))
    }
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}
