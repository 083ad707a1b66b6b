//! # warmview - pre-warmed browser surfaces
//!
//! Keeps a small pool of ready-to-use rendering surfaces so pages open
//! without paying engine start-up cost, and serves static sub-resources of
//! those pages through a disk-caching HTTP proxy.
//!
//! ## Architecture
//!
//! - **pool**: LIFO surface pool refilled on idle time
//! - **surface**: pooled surface wrapper, host contexts and lifecycle binding
//! - **intercept**: decides which page requests to proxy and builds the
//!   substitute responses
//! - **network**: HTTP transport, disk cache and cache-header rewriting
//! - **bootstrap**: preferred engine download and readiness tracking
//! - **runtime**: wires the pieces together for one process
//! - **config**: TOML configuration
//! - **utils**: error types and logging setup

pub mod bootstrap;
pub mod config;
pub mod intercept;
pub mod network;
pub mod pool;
pub mod runtime;
pub mod surface;
pub mod utils;

// Re-export main types for convenience
pub use config::Config;
pub use intercept::{InterceptedRequest, InterceptionPolicy, RequestInterceptor};
pub use network::CachingHttpProxy;
pub use pool::SurfacePool;
pub use runtime::WarmviewRuntime;
pub use surface::{LifecycleBinder, PooledSurface};
pub use utils::error::{Result, WarmviewError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "warmview";
