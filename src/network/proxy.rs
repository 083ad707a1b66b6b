//! Caching HTTP proxy for intercepted sub-resources

use std::time::Duration;

use log::{debug, warn};

use super::cache::{CacheStats, DiskCache};
use super::client::{HttpTransport, ReqwestTransport};
use super::headers::rewrite_cache_control;
use super::{OutboundRequest, UpstreamResponse};
use crate::config::ProxyConfig;
use crate::utils::Result;

/// Executes requests through an optional disk cache.
///
/// Each network response has its cache directives replaced by a fixed
/// `max-age` before it is stored or returned (see `network::headers`).
/// Without a cache the proxy still rewrites headers and simply always hits
/// the network.
pub struct CachingHttpProxy {
    transport: Box<dyn HttpTransport>,
    cache: Option<DiskCache>,
    max_age: Duration,
}

impl CachingHttpProxy {
    /// Create a proxy from explicit parts
    pub fn new(
        transport: Box<dyn HttpTransport>,
        cache: Option<DiskCache>,
        max_age: Duration,
    ) -> Self {
        Self {
            transport,
            cache,
            max_age,
        }
    }

    /// Build the reqwest-backed proxy described by `config`.
    ///
    /// A cache directory that cannot be opened leaves the proxy uncached.
    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config.timeout(), &config.user_agent)?;
        Ok(Self::with_transport(config, Box::new(transport)))
    }

    /// Same as [`from_config`](Self::from_config) with a caller-supplied transport
    pub fn with_transport(config: &ProxyConfig, transport: Box<dyn HttpTransport>) -> Self {
        let cache = if config.enable_cache {
            match DiskCache::open(&config.cache_dir, config.cache_max_bytes) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!("resource cache disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self::new(transport, cache, config.cache_max_age())
    }

    /// Whether responses are persisted
    pub fn is_caching(&self) -> bool {
        self.cache.is_some()
    }

    /// Execute a request, blocking until the response body is available
    pub fn execute(&self, request: &OutboundRequest) -> Result<UpstreamResponse> {
        let storable = !request.forbids_storage();

        if let Some(cache) = &self.cache
            && storable
            && let Some(entry) = cache.get(request.method(), request.url())
        {
            debug!("cache hit {} {}", request.method(), request.url());
            return Ok(entry.response);
        }

        let mut response = self.transport.send(request)?;
        rewrite_cache_control(response.headers_mut(), self.max_age);

        if let Some(cache) = &self.cache
            && storable
        {
            match cache.put(request.method(), request.url(), &response) {
                Ok(true) => debug!("cached {} {}", request.method(), request.url()),
                Ok(false) => {}
                Err(e) => warn!("failed to cache {}: {}", request.url(), e),
            }
        }

        Ok(response)
    }

    /// Drop every cached entry
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Cache statistics, if caching is enabled
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(DiskCache::stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::MockHttpTransport;
    use crate::utils::error::NetworkError;

    fn config(dir: &std::path::Path) -> ProxyConfig {
        ProxyConfig {
            cache_dir: dir.to_path_buf(),
            ..ProxyConfig::default()
        }
    }

    fn upstream() -> UpstreamResponse {
        UpstreamResponse::new(200, "OK")
            .with_header("pragma", "no-cache")
            .with_header("cache-control", "no-store")
            .with_body(b"console.log(1)".to_vec())
    }

    #[test]
    fn test_second_request_served_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = MockHttpTransport::new();
        transport.expect_send().times(1).returning(|_| Ok(upstream()));

        let proxy = CachingHttpProxy::with_transport(&config(dir.path()), Box::new(transport));
        let request = OutboundRequest::get("https://site/app.js").unwrap();

        let first = proxy.execute(&request).unwrap();
        let second = proxy.execute(&request).unwrap();

        assert_eq!(first.header("cache-control"), Some("max-age=31536000"));
        assert_eq!(first.header("pragma"), None);
        assert_eq!(second.body(), first.body());
        assert_eq!(proxy.cache_stats().unwrap().entries, 1);
    }

    #[test]
    fn test_no_store_request_bypasses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = MockHttpTransport::new();
        transport.expect_send().times(2).returning(|_| Ok(upstream()));

        let proxy = CachingHttpProxy::with_transport(&config(dir.path()), Box::new(transport));
        let request = OutboundRequest::get("https://site/app.js")
            .unwrap()
            .header("Cache-Control", "no-store");

        proxy.execute(&request).unwrap();
        proxy.execute(&request).unwrap();
        assert_eq!(proxy.cache_stats().unwrap().entries, 0);
    }

    #[test]
    fn test_unusable_cache_dir_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let mut transport = MockHttpTransport::new();
        transport.expect_send().times(2).returning(|_| Ok(upstream()));

        let proxy = CachingHttpProxy::with_transport(&config(&blocker.join("cache")), Box::new(transport));
        assert!(!proxy.is_caching());

        let request = OutboundRequest::get("https://site/app.js").unwrap();
        assert_eq!(proxy.execute(&request).unwrap().status(), 200);
        assert_eq!(proxy.execute(&request).unwrap().status(), 200);
        assert!(proxy.cache_stats().is_none());
    }

    #[test]
    fn test_transport_error_propagates() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .returning(|_| Err(NetworkError::Timeout.into()));

        let proxy = CachingHttpProxy::new(Box::new(transport), None, Duration::from_secs(60));
        let request = OutboundRequest::get("https://site/app.js").unwrap();
        assert!(proxy.execute(&request).is_err());
    }
}
