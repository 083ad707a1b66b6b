//! HTTP transport used by the caching proxy

use std::time::Duration;

use reqwest::redirect::Policy;

use super::{OutboundRequest, UpstreamResponse};
use crate::utils::{Result, error::NetworkError};

/// Sends one request and returns the raw upstream response.
///
/// Implementations block the calling thread until the body is read.
#[cfg_attr(test, mockall::automock)]
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &OutboundRequest) -> Result<UpstreamResponse>;
}

/// Blocking reqwest transport that never follows redirects.
///
/// The rendering surface performs its own navigation, so a 3xx is handed
/// back as-is instead of being chased here. `Policy::none()` also stops
/// http -> https upgrades.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Create a new transport
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &OutboundRequest) -> Result<UpstreamResponse> {
        let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;

        let mut req = self.client.request(method, request.url());

        for (name, value) in request.headers() {
            req = req.header(name.as_str(), value.as_str());
        }

        let response = req.send().map_err(map_send_error)?;

        let status = response.status();
        let mut upstream = UpstreamResponse::new(
            status.as_u16(),
            status.canonical_reason().unwrap_or_default(),
        );
        for (name, value) in response.headers() {
            upstream = upstream.with_header(
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }

        let body = response
            .bytes()
            .map_err(|e| NetworkError::Body(e.to_string()))?;

        Ok(upstream.with_body(body.to_vec()))
    }
}

fn map_send_error(err: reqwest::Error) -> crate::utils::WarmviewError {
    if err.is_timeout() {
        NetworkError::Timeout.into()
    } else if err.is_builder() {
        NetworkError::InvalidRequest(err.to_string()).into()
    } else {
        NetworkError::ConnectionFailed(err.to_string()).into()
    }
}
