//! Rendering surfaces
//!
//! The engine itself is an external capability ([`SurfaceEngine`]);
//! [`PooledSurface`] wraps one instance with host binding, page callbacks,
//! the resource-intercept hook and lifecycle handling.

mod engine;
mod host;
mod lifecycle;
#[allow(clippy::module_inception)]
mod surface;

pub use engine::{
    DownloadRequest, EventSink, HostBridge, InterceptHook, ScriptCallback, SurfaceEngine,
    SurfaceEvent, SurfaceFactory,
};
pub use host::{Host, HostContext, HostLifecycle, LifecycleObserver, LifecycleOwner};
pub use lifecycle::LifecycleBinder;
pub use surface::{PooledSurface, SurfaceId, SurfaceListener, SurfacePhase, SurfaceSetup};
