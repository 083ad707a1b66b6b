//! Selective request interception
//!
//! [`InterceptionPolicy`] picks the static sub-resources worth caching,
//! [`RequestInterceptor`] runs them through the caching proxy and turns the
//! result into a [`CachedResponse`] for the rendering surface.

mod interceptor;
pub mod policy;
mod response;

pub use interceptor::RequestInterceptor;
pub use policy::{InterceptedRequest, InterceptionPolicy, StaticAsset};
pub use response::{CORS_HEADERS, CachedResponse};
