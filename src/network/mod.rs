//! Network stack for intercepted sub-resources
//!
//! A blocking HTTP transport, an on-disk response cache and the header
//! rewrite that forces long-lived caching, combined in [`CachingHttpProxy`].

pub mod cache;
mod client;
pub mod headers;
mod proxy;
mod request;
mod response;

pub use cache::{CacheStats, DiskCache};
#[cfg(test)]
pub use client::MockHttpTransport;
pub use client::{HttpTransport, ReqwestTransport};
pub use proxy::CachingHttpProxy;
pub use request::{Method, OutboundRequest};
pub use response::UpstreamResponse;
