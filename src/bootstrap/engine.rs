//! Preferred rendering engine readiness
//!
//! The preferred engine is downloaded and installed by an external service.
//! Until it is ready, surfaces come from a fallback engine; nothing in the
//! pool waits for readiness.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, info, warn};

use super::settings::FlagStore;
use crate::surface::{HostContext, SurfaceEngine, SurfaceFactory};
use crate::utils::Result;

/// Flag recording that the preferred engine initialized at least once
pub const ENGINE_INITIALIZED_KEY: &str = "engine_initialized";

/// Download result code meaning success
pub const DOWNLOAD_OK: i32 = 100;

/// External service that downloads and loads the preferred engine
pub trait EngineService: Send + Sync {
    /// Apply download and loader settings; called before every (re)start
    fn configure(&self) {}
    fn is_ready(&self) -> bool;
    /// Whether an installed engine can be loaded right now
    fn can_load(&self) -> bool;
    fn needs_download(&self) -> bool;
    fn is_downloading(&self) -> bool;
    /// Forget any partial install
    fn reset(&self);
    fn request_download(&self);
    /// Called once with `true` if the preferred engine loaded, `false` if the
    /// fallback is in use
    fn on_ready(&self, callback: Box<dyn FnOnce(bool) + Send>);
}

/// Progress reports from the engine service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    DownloadFinished(i32),
    InstallFinished(i32),
    DownloadProgress(i32),
    InitFinished { preferred_engine: bool },
}

/// Drives engine initialization and download retries
pub struct EngineBootstrap {
    service: Arc<dyn EngineService>,
    flags: Arc<dyn FlagStore>,
    max_retries: u32,
    initialized: AtomicBool,
    retries: AtomicU32,
}

impl EngineBootstrap {
    pub fn new(service: Arc<dyn EngineService>, flags: Arc<dyn FlagStore>, max_retries: u32) -> Self {
        Self {
            service,
            flags,
            max_retries,
            initialized: AtomicBool::new(false),
            retries: AtomicU32::new(0),
        }
    }

    /// Configure the service and wait for its readiness callback
    pub fn start(self: &Arc<Self>) {
        info!(
            "starting engine bootstrap (previously initialized: {})",
            self.previously_initialized()
        );
        self.service.configure();

        let this: Weak<Self> = Arc::downgrade(self);
        self.service.on_ready(Box::new(move |preferred_engine| {
            if let Some(bootstrap) = this.upgrade() {
                bootstrap.handle_event(EngineEvent::InitFinished { preferred_engine });
            }
        }));
    }

    pub fn handle_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::DownloadFinished(code) => {
                info!("engine download finished with code {}", code);
                if code != DOWNLOAD_OK {
                    let attempt = self.retries.fetch_add(1, Ordering::SeqCst);
                    if attempt < self.max_retries {
                        self.retry();
                    } else {
                        self.retries.store(self.max_retries, Ordering::SeqCst);
                        warn!("engine download failed, giving up after {} retries", self.max_retries);
                    }
                }
            }
            EngineEvent::InstallFinished(code) => {
                info!("engine installed with code {}", code);
                self.initialized.store(true, Ordering::SeqCst);
            }
            EngineEvent::DownloadProgress(percent) => {
                debug!("engine download {}%", percent);
            }
            EngineEvent::InitFinished { preferred_engine } => {
                info!("engine init finished, preferred engine: {}", preferred_engine);
                self.initialized.store(preferred_engine, Ordering::SeqCst);
                if !preferred_engine
                    && self.service.needs_download()
                    && !self.service.is_downloading()
                {
                    self.retry();
                }
                if let Err(e) = self.flags.set_bool(ENGINE_INITIALIZED_KEY, preferred_engine) {
                    warn!("failed to persist engine state: {}", e);
                }
            }
        }
    }

    /// Restart the download unless a usable engine is already known.
    ///
    /// Returns whether the preferred engine is initialized.
    pub fn retry(&self) -> bool {
        let initialized = self.is_initialized();
        if self.previously_initialized() && self.service.can_load() {
            debug!("engine already installed and loadable");
            return initialized;
        }
        if !initialized && !self.service.is_downloading() {
            info!("resetting engine service and downloading again");
            self.service.reset();
            self.service.configure();
            self.service.request_download();
        }
        initialized
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Persisted result of the last initialization
    pub fn previously_initialized(&self) -> bool {
        self.flags.get_bool(ENGINE_INITIALIZED_KEY, false)
    }

    /// Download retries used so far
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }
}

/// Builds surfaces with the preferred engine once it is ready, and with the
/// fallback engine until then
pub struct FallbackFactory {
    service: Arc<dyn EngineService>,
    preferred: Arc<dyn SurfaceFactory>,
    fallback: Arc<dyn SurfaceFactory>,
}

impl FallbackFactory {
    pub fn new(
        service: Arc<dyn EngineService>,
        preferred: Arc<dyn SurfaceFactory>,
        fallback: Arc<dyn SurfaceFactory>,
    ) -> Self {
        Self {
            service,
            preferred,
            fallback,
        }
    }
}

impl SurfaceFactory for FallbackFactory {
    fn create(&self, host: &HostContext) -> Result<Box<dyn SurfaceEngine>> {
        if self.service.is_ready() {
            self.preferred.create(host)
        } else {
            debug!("preferred engine not ready, using fallback");
            self.fallback.create(host)
        }
    }
}
