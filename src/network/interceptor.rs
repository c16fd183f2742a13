//! # Network Interception Layer
//!
//! Wraps a [`Transport`] and applies a cache policy per request class:
//!
//! - **Cross-origin**: passed through untouched
//! - **API** (same origin, under the API prefix): network first; a 2xx
//!   `GET` response is copied into the dynamic namespace, and a network
//!   failure falls back to the cached copy of that exact request
//! - **Static** (everything else on the origin): cache first; a `200` from
//!   the network is copied into the dynamic namespace, and a failed
//!   navigation is answered with the offline page
//!
//! Only `GET` responses are ever stored or served from cache. Cache I/O
//! failures are logged and treated as a miss; they never fail a request
//! the network answered.

use crate::local_db::LocalDatabase;
use crate::network::{HttpRequest, HttpResponse, Transport};
use crate::shared::config::{ConfigError, SyncConfig};
use crate::shared::error::{Result, SyncError, TransportError};
use reqwest::{Method, Url};

/// Which policy applies to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    CrossOrigin,
    Api,
    Static,
}

/// Cache policy in front of a transport
#[derive(Debug, Clone)]
pub struct Interceptor<T> {
    transport: T,
    db: LocalDatabase,
    origin: Url,
    api_prefix: String,
    static_cache: String,
    dynamic_cache: String,
    static_assets: Vec<String>,
    offline_page: String,
}

impl<T: Transport> Interceptor<T> {
    pub fn new(transport: T, db: LocalDatabase, config: &SyncConfig) -> Result<Self> {
        db.require_current()?;
        Ok(Self {
            transport,
            db,
            origin: config.origin()?,
            api_prefix: config.api_prefix.clone(),
            static_cache: config.static_cache_name(),
            dynamic_cache: config.dynamic_cache_name(),
            static_assets: config.static_assets.clone(),
            offline_page: config.offline_page.clone(),
        })
    }

    /// The wrapped transport, for requests that must bypass the cache
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn static_cache_name(&self) -> &str {
        &self.static_cache
    }

    pub fn dynamic_cache_name(&self) -> &str {
        &self.dynamic_cache
    }

    pub fn classify(&self, request: &HttpRequest) -> RequestClass {
        if request.url.origin() != self.origin.origin() {
            RequestClass::CrossOrigin
        } else if request.url.path().starts_with(&self.api_prefix) {
            RequestClass::Api
        } else {
            RequestClass::Static
        }
    }

    /// Answer a request according to its class
    pub async fn handle(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        match self.classify(&request) {
            RequestClass::CrossOrigin => self.transport.fetch(request).await,
            RequestClass::Api => self.network_first(request).await,
            RequestClass::Static => self.cache_first(request).await,
        }
    }

    async fn network_first(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let cacheable = request.method == Method::GET;
        let key = request.cache_key();

        match self.transport.fetch(request).await {
            Ok(response) => {
                if cacheable && response.is_ok() {
                    self.store(&key, &response).await;
                }
                Ok(response)
            }
            Err(e) if cacheable => match self.lookup(&key).await {
                Some(cached) => {
                    tracing::debug!("[Cache] Network failed for {}, serving cached copy", key);
                    Ok(cached)
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    async fn cache_first(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let cacheable = request.method == Method::GET;
        let key = request.cache_key();

        if cacheable {
            if let Some(cached) = self.lookup(&key).await {
                tracing::debug!("[Cache] Hit {}", key);
                return Ok(cached);
            }
        }

        let navigation = request.is_navigation();
        match self.transport.fetch(request).await {
            Ok(response) => {
                if cacheable && response.status == 200 {
                    self.store(&key, &response).await;
                }
                Ok(response)
            }
            Err(e) if navigation => match self.offline_fallback().await {
                Some(page) => {
                    tracing::debug!("[Cache] Navigation to {} failed, serving offline page", key);
                    Ok(page)
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    async fn offline_fallback(&self) -> Option<HttpResponse> {
        let url = self.origin.join(&self.offline_page).ok()?;
        self.lookup(&HttpRequest::get(url).cache_key()).await
    }

    async fn lookup(&self, key: &str) -> Option<HttpResponse> {
        match self.db.cache_match_any(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("[Cache] Lookup failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn store(&self, key: &str, response: &HttpResponse) {
        if let Err(e) = self.db.cache_put(&self.dynamic_cache, key, response).await {
            tracing::warn!("[Cache] Failed to store {}: {}", key, e);
        }
    }

    /// Fetch the static manifest and seed the static namespace
    ///
    /// Every asset must answer `200`; if any fails nothing is stored.
    /// Returns the number of assets cached.
    pub async fn precache(&self) -> Result<usize> {
        let mut entries = Vec::with_capacity(self.static_assets.len());
        for asset in &self.static_assets {
            let url = self
                .origin
                .join(asset)
                .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", asset, e)))?;
            let request = HttpRequest::get(url);
            let key = request.cache_key();

            let response = self
                .transport
                .fetch(request)
                .await
                .map_err(|e| SyncError::install(format!("{}: {}", asset, e)))?;
            if response.status != 200 {
                return Err(SyncError::install(format!(
                    "{} answered {}",
                    asset, response.status
                )));
            }
            entries.push((key, response));
        }

        self.db.cache_put_all(&self.static_cache, &entries).await?;
        Ok(entries.len())
    }

    /// Delete every namespace that is not one of the current two
    ///
    /// Returns the names that were removed.
    pub async fn evict_stale(&self) -> Result<Vec<String>> {
        let mut evicted = Vec::new();
        for name in self.db.cache_names().await? {
            if name != self.static_cache && name != self.dynamic_cache {
                self.db.delete_cache(&name).await?;
                tracing::info!("[Cache] Evicted stale namespace {}", name);
                evicted.push(name);
            }
        }
        Ok(evicted)
    }
}

impl<T: Transport> Transport for Interceptor<T> {
    async fn fetch(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        self.handle(request).await
    }
}
