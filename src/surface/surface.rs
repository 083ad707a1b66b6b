//! Pooled rendering surface

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use log::{debug, info};

use super::engine::{EventSink, HostBridge, InterceptHook, ScriptCallback, SurfaceEngine, SurfaceEvent};
use super::host::{HostContext, LifecycleOwner};
use super::lifecycle::LifecycleBinder;
use crate::intercept::{InterceptedRequest, RequestInterceptor};
use crate::utils::{Result, error::SurfaceError};

/// Unique surface identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(u64);

impl SurfaceId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Where a surface is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfacePhase {
    /// Idle in the pool under the application context
    Free,
    /// Handed to a host, not yet visible
    Attached,
    /// Host visible, rendering and timers running
    Active,
    /// Host backgrounded, rendering and timers suspended
    Inactive,
    /// Torn down for good
    Destroyed,
}

impl SurfacePhase {
    /// Owned by a host
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Attached | Self::Active | Self::Inactive)
    }
}

/// Page callbacks a host registers on the surface it holds
#[derive(Clone, Default)]
pub struct SurfaceListener {
    pub on_progress: Option<Arc<dyn Fn(u8) + Send + Sync>>,
    pub on_title: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub on_page_finished: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl SurfaceListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress(mut self, f: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_title(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_title = Some(Arc::new(f));
        self
    }

    pub fn on_page_finished(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_page_finished = Some(Arc::new(f));
        self
    }
}

/// What every new surface is wired with
#[derive(Clone)]
pub struct SurfaceSetup {
    pub interceptor: Option<Arc<RequestInterceptor>>,
    pub bridge_name: String,
}

impl Default for SurfaceSetup {
    fn default() -> Self {
        Self {
            interceptor: None,
            bridge_name: "host".to_string(),
        }
    }
}

type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;
type TeardownHook = Box<dyn FnOnce(SurfaceId) + Send>;

#[derive(Default)]
struct Callbacks {
    listener: Option<SurfaceListener>,
    message_handler: Option<MessageHandler>,
    teardown: Option<TeardownHook>,
    page_started: Option<Instant>,
}

struct Core {
    engine: Box<dyn SurfaceEngine>,
    host: HostContext,
    phase: SurfacePhase,
    lifecycle_override: Option<Arc<dyn LifecycleOwner>>,
    /// Bumped on every rebind so observers of earlier hosts go quiet
    generation: u64,
    observed_generation: Option<u64>,
}

pub(crate) struct SurfaceShared {
    id: SurfaceId,
    alive: AtomicBool,
    core: Mutex<Core>,
    callbacks: Mutex<Callbacks>,
}

impl SurfaceShared {
    fn core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callbacks(&self) -> MutexGuard<'_, Callbacks> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.core().generation
    }

    fn dispatch(&self, event: SurfaceEvent) {
        if !self.is_alive() {
            debug!("{}: dropping {:?} after teardown", self.id, event);
            return;
        }

        let mut callbacks = self.callbacks();
        let listener = callbacks.listener.clone();
        match event {
            SurfaceEvent::Progress(percent) => {
                drop(callbacks);
                debug!("{}: progress {}", self.id, percent);
                if let Some(f) = listener.and_then(|l| l.on_progress) {
                    f(percent);
                }
            }
            SurfaceEvent::Title(title) => {
                drop(callbacks);
                debug!("{}: title {}", self.id, title);
                if let Some(f) = listener.and_then(|l| l.on_title) {
                    f(&title);
                }
            }
            SurfaceEvent::PageStarted(url) => {
                callbacks.page_started = Some(Instant::now());
                debug!("{}: page started {}", self.id, url);
            }
            SurfaceEvent::PageFinished(url) => {
                let started = callbacks.page_started.take();
                drop(callbacks);
                match started {
                    Some(start) => info!("{}: loaded {} in {:?}", self.id, url, start.elapsed()),
                    None => info!("{}: loaded {}", self.id, url),
                }
                if let Some(f) = listener.and_then(|l| l.on_page_finished) {
                    f(&url);
                }
            }
            SurfaceEvent::DownloadRequested(download) => {
                drop(callbacks);
                info!(
                    "{}: download requested {} ({}, {} bytes, {})",
                    self.id,
                    download.url,
                    download.mime_type,
                    download.content_length,
                    download.content_disposition
                );
            }
        }
    }

    fn notify_host(&self, message: &str) {
        info!("{}: page says {}", self.id, message);
        let handler = self.callbacks().message_handler.clone();
        if let Some(handler) = handler {
            handler(message);
        }
    }

    pub(crate) fn resume(&self, generation: Option<u64>) {
        let mut core = self.core();
        if !self.is_alive() || generation.is_some_and(|g| g != core.generation) {
            return;
        }
        debug!("{}: host resumed", self.id);
        core.engine.resume();
        core.phase = SurfacePhase::Active;
    }

    pub(crate) fn pause(&self, generation: Option<u64>) {
        let mut core = self.core();
        if !self.is_alive() || generation.is_some_and(|g| g != core.generation) {
            return;
        }
        debug!("{}: host paused", self.id);
        core.engine.pause();
        core.phase = SurfacePhase::Inactive;
    }

    /// Tear down for good. Later calls are no-ops.
    pub(crate) fn destroy(&self, generation: Option<u64>) {
        if let Some(generation) = generation
            && generation != self.generation()
        {
            return;
        }
        if !self.alive.swap(false, Ordering::SeqCst) {
            debug!("{}: already destroyed", self.id);
            return;
        }

        let teardown = {
            let mut callbacks = self.callbacks();
            let teardown = callbacks.teardown.take();
            *callbacks = Callbacks::default();
            teardown
        };

        {
            let mut core = self.core();
            core.lifecycle_override = None;
            core.observed_generation = None;
            core.engine.set_intercept_hook(None);
            core.engine.set_event_sink(None);
            core.engine.detach_from_parent();
            core.engine.destroy();
            core.host = HostContext::Application;
            core.phase = SurfacePhase::Destroyed;
        }
        debug!("{}: destroyed", self.id);

        if let Some(teardown) = teardown {
            teardown(self.id);
        }
    }
}

/// A rendering surface that can sit in the pool or serve one host.
///
/// The handle is moved between the pool and its host, never cloned.
/// Dropping a live surface destroys it.
pub struct PooledSurface {
    shared: Arc<SurfaceShared>,
}

impl PooledSurface {
    pub(crate) fn new(
        mut engine: Box<dyn SurfaceEngine>,
        host: HostContext,
        phase: SurfacePhase,
        setup: &SurfaceSetup,
    ) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<SurfaceShared>| {
            engine.set_event_sink(Some(event_sink(weak.clone())));
            engine.install_bridge(&setup.bridge_name, bridge(weak.clone()));
            if let Some(interceptor) = &setup.interceptor {
                engine.set_intercept_hook(Some(intercept_hook(weak.clone(), interceptor.clone())));
            }

            SurfaceShared {
                id: SurfaceId::next(),
                alive: AtomicBool::new(true),
                core: Mutex::new(Core {
                    engine,
                    host,
                    phase,
                    lifecycle_override: None,
                    generation: 0,
                    observed_generation: None,
                }),
                callbacks: Mutex::new(Callbacks::default()),
            }
        });

        Self { shared }
    }

    pub fn id(&self) -> SurfaceId {
        self.shared.id
    }

    pub fn phase(&self) -> SurfacePhase {
        self.shared.core().phase
    }

    pub fn is_destroyed(&self) -> bool {
        !self.shared.is_alive()
    }

    /// Context the surface currently runs under
    pub fn host(&self) -> HostContext {
        self.shared.core().host.clone()
    }

    pub fn has_listener(&self) -> bool {
        self.shared.callbacks().listener.is_some()
    }

    pub fn set_listener(&self, listener: SurfaceListener) {
        self.shared.callbacks().listener = Some(listener);
    }

    pub fn clear_listener(&self) {
        self.shared.callbacks().listener = None;
    }

    /// Handle messages the page sends through the host bridge
    pub fn set_message_handler(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.shared.callbacks().message_handler = Some(Arc::new(handler));
    }

    /// Lifecycle owner to observe instead of the one found on the host context
    pub fn set_host_lifecycle_owner(&self, owner: Arc<dyn LifecycleOwner>) {
        self.shared.core().lifecycle_override = Some(owner);
    }

    pub fn load_url(&self, url: &str) -> Result<()> {
        self.with_engine(|engine| engine.load(url))
    }

    /// Set a cookie for `url`, then load it
    pub fn load_url_with_cookie(&self, url: &str, cookie: &str) -> Result<()> {
        self.with_engine(|engine| {
            engine.set_cookie(url, cookie);
            engine.load(url);
        })
    }

    pub fn reload(&self) -> Result<()> {
        self.with_engine(|engine| engine.reload())
    }

    pub fn evaluate_script(
        &self,
        script: &str,
        callback: impl FnOnce(String) + Send + 'static,
    ) -> Result<()> {
        let slot = ScriptResult::new(Box::new(callback));
        let deliver = slot.clone();
        let callback: ScriptCallback = Box::new(move |result| deliver.deliver(result));
        let outcome = self.with_engine(|engine| engine.evaluate_script(script, callback));
        slot.finish_call();
        outcome
    }

    /// Step back in history if possible.
    ///
    /// Returns `true` when there was nothing to go back to and the host may
    /// close, `false` when the surface navigated back.
    pub fn go_back_or_exit(&self) -> bool {
        self.with_engine(|engine| {
            if engine.can_go_back() {
                engine.go_back();
                false
            } else {
                true
            }
        })
        .unwrap_or(true)
    }

    /// Register with the host's lifecycle once the surface is on screen.
    ///
    /// Returns whether an observer was attached. Without one the host has to
    /// call [`destroy`](Self::destroy) itself.
    pub fn attach_to_host(&self) -> bool {
        LifecycleBinder::bind(self)
    }

    pub fn resume(&self) {
        self.shared.resume(None);
    }

    pub fn pause(&self) {
        self.shared.pause(None);
    }

    /// Release listeners, hooks and the engine. Safe to call repeatedly.
    pub fn destroy(&self) {
        self.shared.destroy(None);
    }

    pub(crate) fn downgrade(&self) -> Weak<SurfaceShared> {
        Arc::downgrade(&self.shared)
    }

    /// Lifecycle owner to bind to, unless this host generation already has an observer
    pub(crate) fn claim_lifecycle_owner(&self) -> Option<(Arc<dyn LifecycleOwner>, u64)> {
        let mut core = self.shared.core();
        if !self.shared.is_alive() || core.observed_generation == Some(core.generation) {
            return None;
        }
        let owner = core
            .lifecycle_override
            .clone()
            .or_else(|| core.host.find_lifecycle_owner())?;
        core.observed_generation = Some(core.generation);
        Some((owner, core.generation))
    }

    /// Hand the surface to a new host
    pub(crate) fn bind_to(&self, host: HostContext) {
        let mut core = self.shared.core();
        if core.engine.detach_from_parent() {
            debug!("{}: removed stale parent", self.shared.id);
        }
        core.engine.rebind_host(&host);
        core.host = host;
        core.generation += 1;
        core.phase = SurfacePhase::Attached;
    }

    /// Return to a neutral state suitable for the pool
    pub(crate) fn reset_for_pool(&self) {
        *self.shared.callbacks() = Callbacks::default();

        let mut core = self.shared.core();
        core.engine.clear_history();
        core.engine.detach_from_parent();
        core.engine.rebind_host(&HostContext::Application);
        core.host = HostContext::Application;
        core.lifecycle_override = None;
        core.generation += 1;
        core.phase = SurfacePhase::Free;
    }

    pub(crate) fn set_teardown_hook(&self, hook: impl FnOnce(SurfaceId) + Send + 'static) {
        self.shared.callbacks().teardown = Some(Box::new(hook));
    }

    fn with_engine<T>(&self, f: impl FnOnce(&mut dyn SurfaceEngine) -> T) -> Result<T> {
        let mut core = self.shared.core();
        if !self.shared.is_alive() {
            return Err(SurfaceError::Destroyed(self.shared.id).into());
        }
        Ok(f(core.engine.as_mut()))
    }
}

impl Drop for PooledSurface {
    fn drop(&mut self) {
        if self.shared.is_alive() {
            self.shared.destroy(None);
        }
    }
}

impl fmt::Debug for PooledSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSurface")
            .field("id", &self.id())
            .field("phase", &self.phase())
            .finish()
    }
}

/// Result slot for `evaluate_script`.
///
/// A result the engine delivers while its call is still on the stack is
/// held until the core lock is released, so the callback may use the
/// surface again.
struct ScriptResult {
    state: Mutex<ScriptResultState>,
}

struct ScriptResultState {
    in_call: bool,
    callback: Option<ScriptCallback>,
    result: Option<String>,
}

impl ScriptResult {
    fn new(callback: ScriptCallback) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ScriptResultState {
                in_call: true,
                callback: Some(callback),
                result: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ScriptResultState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, result: String) {
        let mut state = self.lock();
        if state.in_call {
            state.result = Some(result);
            return;
        }
        let callback = state.callback.take();
        drop(state);
        if let Some(callback) = callback {
            callback(result);
        }
    }

    fn finish_call(&self) {
        let mut state = self.lock();
        state.in_call = false;
        let Some(result) = state.result.take() else {
            return;
        };
        let callback = state.callback.take();
        drop(state);
        if let Some(callback) = callback {
            callback(result);
        }
    }
}

fn event_sink(target: Weak<SurfaceShared>) -> EventSink {
    Arc::new(move |event| {
        if let Some(shared) = target.upgrade() {
            shared.dispatch(event);
        }
    })
}

fn bridge(target: Weak<SurfaceShared>) -> HostBridge {
    Arc::new(move |message: &str| {
        if let Some(shared) = target.upgrade()
            && shared.is_alive()
        {
            shared.notify_host(message);
        }
    })
}

/// Resource hook that drops results finishing after the surface is gone
fn intercept_hook(target: Weak<SurfaceShared>, interceptor: Arc<RequestInterceptor>) -> InterceptHook {
    Arc::new(move |request: &InterceptedRequest| {
        let alive = || target.upgrade().is_some_and(|s| s.is_alive());
        if !alive() {
            return None;
        }
        let response = interceptor.intercept(request)?;
        if !alive() {
            debug!(
                "discarding response for {} after teardown",
                request.url.as_deref().unwrap_or_default()
            );
            return None;
        }
        Some(response)
    })
}
