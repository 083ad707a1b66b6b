//! Capabilities the embedded rendering engine must provide

use std::sync::Arc;

use super::HostContext;
use crate::intercept::{CachedResponse, InterceptedRequest};
use crate::utils::Result;

/// Resource hook: `Some` replaces the engine's own load of the resource
pub type InterceptHook = Arc<dyn Fn(&InterceptedRequest) -> Option<CachedResponse> + Send + Sync>;

/// Receives page events from the engine
pub type EventSink = Arc<dyn Fn(SurfaceEvent) + Send + Sync>;

/// The single host method exposed to page scripts: `notify_host(message)`
pub type HostBridge = Arc<dyn Fn(&str) + Send + Sync>;

/// Receives the result of `evaluate_script`
pub type ScriptCallback = Box<dyn FnOnce(String) + Send>;

/// A download the page asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub user_agent: String,
    pub content_disposition: String,
    pub mime_type: String,
    pub content_length: u64,
}

/// Events emitted by a rendering engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Load progress in percent
    Progress(u8),
    Title(String),
    PageStarted(String),
    PageFinished(String),
    DownloadRequested(DownloadRequest),
}

/// One rendering engine instance.
///
/// Engines deliver [`SurfaceEvent`]s and run the intercept hook from their
/// own threads, never from inside one of these method calls. The
/// `evaluate_script` callback may run either inline or later.
pub trait SurfaceEngine: Send {
    fn load(&mut self, url: &str);
    fn reload(&mut self);
    fn can_go_back(&self) -> bool;
    fn go_back(&mut self);
    fn clear_history(&mut self);
    fn evaluate_script(&mut self, script: &str, callback: ScriptCallback);
    fn set_cookie(&mut self, url: &str, cookie: &str);

    fn set_intercept_hook(&mut self, hook: Option<InterceptHook>);
    fn set_event_sink(&mut self, sink: Option<EventSink>);
    fn install_bridge(&mut self, name: &str, bridge: HostBridge);

    /// Re-parent the engine's execution context onto `host`
    fn rebind_host(&mut self, host: &HostContext);
    /// Remove the surface from any view it is attached to.
    /// Returns whether it had a parent.
    fn detach_from_parent(&mut self) -> bool;

    fn resume(&mut self);
    fn pause(&mut self);
    fn destroy(&mut self);
}

/// Builds engine instances for the pool
pub trait SurfaceFactory: Send + Sync {
    fn create(&self, host: &HostContext) -> Result<Box<dyn SurfaceEngine>>;
}

impl<F> SurfaceFactory for F
where
    F: Fn(&HostContext) -> Result<Box<dyn SurfaceEngine>> + Send + Sync,
{
    fn create(&self, host: &HostContext) -> Result<Box<dyn SurfaceEngine>> {
        self(host)
    }
}
