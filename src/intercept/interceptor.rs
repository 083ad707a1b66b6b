//! Bridges a surface's resource hook to the caching proxy

use std::collections::HashMap;

use log::{debug, warn};

use super::policy::{InterceptedRequest, InterceptionPolicy, StaticAsset};
use super::response::{CachedResponse, DEFAULT_CHARSET, parse_content_type};
use crate::network::{CachingHttpProxy, Method, OutboundRequest, UpstreamResponse};
use crate::utils::{Result, error::NetworkError};

/// Answers intercepted requests from the caching proxy.
///
/// `intercept` runs on the engine's resource thread and blocks for the
/// duration of the upstream request. A `None` result means the engine loads
/// the resource itself.
pub struct RequestInterceptor {
    policy: InterceptionPolicy,
    proxy: CachingHttpProxy,
}

impl RequestInterceptor {
    /// Create a new interceptor
    pub fn new(proxy: CachingHttpProxy) -> Self {
        Self {
            policy: InterceptionPolicy,
            proxy,
        }
    }

    pub fn policy(&self) -> &InterceptionPolicy {
        &self.policy
    }

    pub fn proxy(&self) -> &CachingHttpProxy {
        &self.proxy
    }

    /// Proxy the request if the policy allows it; never fails.
    pub fn intercept(&self, request: &InterceptedRequest) -> Option<CachedResponse> {
        if !self.policy.should_proxy(request) {
            return None;
        }

        match self.fetch(request) {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "interception failed for {}: {}",
                    request.url.as_deref().unwrap_or_default(),
                    e
                );
                None
            }
        }
    }

    fn fetch(&self, request: &InterceptedRequest) -> Result<Option<CachedResponse>> {
        let url = request.url.as_deref().unwrap_or_default();
        let method = Method::parse(&request.method)
            .ok_or_else(|| NetworkError::InvalidRequest(request.method.clone()))?;
        let outbound = OutboundRequest::new(method, url)?.headers_from(&request.headers);

        let response = self.proxy.execute(&outbound)?;
        if response.status() != 200 {
            debug!("{} returned {}, leaving it to the engine", url, response.status());
            return Ok(None);
        }

        Ok(Some(synthesize(response, request.extension())))
    }
}

/// Build the engine-facing response for a 200 upstream reply
fn synthesize(response: UpstreamResponse, extension: &str) -> CachedResponse {
    let (essence, charset) = response
        .content_type()
        .map(parse_content_type)
        .unwrap_or_default();
    let mime_type = essence.unwrap_or_else(|| StaticAsset::fallback_mime(extension).to_string());
    let charset = charset.unwrap_or_else(|| DEFAULT_CHARSET.to_string());

    let (status, reason, headers, body) = response.into_parts();
    let headers: HashMap<String, String> = headers.into_iter().collect();

    CachedResponse::new(status, reason, mime_type, charset, body)
        .with_headers(headers)
        .with_cors()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::network::MockHttpTransport;
    use crate::utils::error::NetworkError;

    fn interceptor(transport: MockHttpTransport) -> RequestInterceptor {
        RequestInterceptor::new(CachingHttpProxy::new(
            Box::new(transport),
            None,
            Duration::from_secs(31_536_000),
        ))
    }

    #[test]
    fn test_rewrites_upstream_headers() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().times(1).returning(|_| {
            Ok(UpstreamResponse::new(200, "")
                .with_header("Pragma", "no-cache")
                .with_header("Cache-Control", "no-store")
                .with_header("content-type", "application/javascript; charset=gbk")
                .with_body(b"let a = 1;".to_vec()))
        });

        let response = interceptor(transport)
            .intercept(&InterceptedRequest::get("https://site/app.js"))
            .unwrap();

        let mut names: Vec<&str> = response.headers().keys().map(String::as_str).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "Access-Control-Allow-Credentials",
                "Access-Control-Allow-Headers",
                "Access-Control-Allow-Methods",
                "Access-Control-Allow-Origin",
                "Cache-Control",
                "content-type",
            ]
        );
        assert_eq!(response.headers()["Cache-Control"], "max-age=31536000");
        assert_eq!(response.mime_type(), "application/javascript");
        assert_eq!(response.charset(), "gbk");
        assert_eq!(response.reason(), "OK");
        assert_eq!(response.read_body().unwrap(), b"let a = 1;");
    }

    #[test]
    fn test_uppercase_scheme_is_fetched() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Ok(UpstreamResponse::new(200, "OK").with_body(vec![0])));

        let response = interceptor(transport).intercept(&InterceptedRequest::get("HTTPS://site/a.png"));
        assert!(response.is_some());
    }

    #[test]
    fn test_upstream_cors_headers_replaced() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().times(1).returning(|_| {
            Ok(UpstreamResponse::new(200, "OK")
                .with_header("access-control-allow-origin", "https://only-this.example")
                .with_header("access-control-allow-credentials", "false"))
        });

        let response = interceptor(transport)
            .intercept(&InterceptedRequest::get("https://site/a.css"))
            .unwrap();
        let cors: Vec<(&str, &str)> = {
            let mut cors: Vec<_> = response
                .headers()
                .iter()
                .filter(|(k, _)| {
                    k.eq_ignore_ascii_case("access-control-allow-origin")
                        || k.eq_ignore_ascii_case("access-control-allow-credentials")
                })
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            cors.sort();
            cors
        };
        assert_eq!(
            cors,
            vec![
                ("Access-Control-Allow-Credentials", "true"),
                ("Access-Control-Allow-Origin", "*"),
            ]
        );
    }

    #[test]
    fn test_fallback_mime_and_charset() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .returning(|_| Ok(UpstreamResponse::new(200, "OK").with_body(vec![1, 2, 3])));

        let response = interceptor(transport)
            .intercept(&InterceptedRequest::get("https://site/logo.png"))
            .unwrap();
        assert_eq!(response.mime_type(), "image/png");
        assert_eq!(response.charset(), "utf-8");
    }

    #[test]
    fn test_headers_copied_verbatim() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .withf(|req| {
                req.headers().get("Referer").map(String::as_str) == Some("https://site/")
                    && req.headers().get("x-custom").map(String::as_str) == Some("1")
            })
            .times(1)
            .returning(|_| Ok(UpstreamResponse::new(200, "OK")));

        let request = InterceptedRequest::get("https://site/a.css")
            .with_header("Referer", "https://site/")
            .with_header("x-custom", "1");
        assert!(interceptor(transport).intercept(&request).is_some());
    }

    #[test]
    fn test_non_200_passes_through() {
        for status in [204, 304, 302, 404, 500] {
            let mut transport = MockHttpTransport::new();
            transport
                .expect_send()
                .times(1)
                .returning(move |_| Ok(UpstreamResponse::new(status, "")));
            assert!(
                interceptor(transport)
                    .intercept(&InterceptedRequest::get("https://site/a.css"))
                    .is_none()
            );
        }
    }

    #[test]
    fn test_network_error_fails_open() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Err(NetworkError::ConnectionFailed("dns".into()).into()));

        assert!(
            interceptor(transport)
                .intercept(&InterceptedRequest::get("https://site/a.css"))
                .is_none()
        );
    }

    #[test]
    fn test_policy_rejection_skips_network() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().never();

        let interceptor = interceptor(transport);
        assert!(interceptor.intercept(&InterceptedRequest::get("https://site/").main_frame(true)).is_none());
        assert!(interceptor.intercept(&InterceptedRequest::get("https://site/page.html")).is_none());
    }
}
