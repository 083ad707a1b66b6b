//! Process-level wiring
//!
//! [`WarmviewRuntime`] owns the surface pool, the shared request interceptor
//! and, optionally, the engine bootstrap. One runtime can be installed
//! globally with [`WarmviewRuntime::install`].

use std::sync::{Arc, OnceLock};

use log::{info, warn};

use crate::bootstrap::{EngineBootstrap, EngineService, JsonFlagStore};
use crate::config::Config;
use crate::intercept::RequestInterceptor;
use crate::network::CachingHttpProxy;
use crate::pool::{IdleScheduler, SurfacePool};
use crate::surface::{HostContext, PooledSurface, SurfaceFactory};
use crate::utils::{Result, WarmviewError};

static GLOBAL: OnceLock<Arc<WarmviewRuntime>> = OnceLock::new();

pub struct WarmviewRuntime {
    config: Config,
    interceptor: Arc<RequestInterceptor>,
    pool: SurfacePool,
    bootstrap: Option<Arc<EngineBootstrap>>,
}

impl WarmviewRuntime {
    /// Build a runtime with the reqwest-backed proxy from `config`
    pub fn new(
        config: Config,
        factory: Arc<dyn SurfaceFactory>,
        scheduler: Arc<dyn IdleScheduler>,
    ) -> Result<Self> {
        let proxy = CachingHttpProxy::from_config(&config.proxy)?;
        Ok(Self::with_proxy(config, proxy, factory, scheduler))
    }

    /// Build a runtime around an existing proxy
    pub fn with_proxy(
        config: Config,
        proxy: CachingHttpProxy,
        factory: Arc<dyn SurfaceFactory>,
        scheduler: Arc<dyn IdleScheduler>,
    ) -> Self {
        let interceptor = Arc::new(RequestInterceptor::new(proxy));
        let pool = SurfacePool::new(factory, scheduler, &config.pool, Some(interceptor.clone()));

        Self {
            config,
            interceptor,
            pool,
            bootstrap: None,
        }
    }

    /// Track the preferred engine through `service`, persisting its state in
    /// the configured settings file
    pub fn with_bootstrap(mut self, service: Arc<dyn EngineService>) -> Self {
        let flags = Arc::new(JsonFlagStore::open(&self.config.bootstrap.settings_path));
        self.bootstrap = Some(Arc::new(EngineBootstrap::new(
            service,
            flags,
            self.config.bootstrap.max_download_retries,
        )));
        self
    }

    /// Start engine bootstrap (if any) and pool prewarming
    pub fn start(&self) {
        if let Some(bootstrap) = &self.bootstrap {
            bootstrap.start();
        }
        self.pool.initialize();
        info!(
            "runtime started (pool capacity {}, resource cache {})",
            self.pool.capacity(),
            if self.interceptor.proxy().is_caching() { "on" } else { "off" }
        );
    }

    /// Install `runtime` as the process-wide instance.
    ///
    /// Fails if one is already installed.
    pub fn install(runtime: Self) -> Result<Arc<Self>> {
        let runtime = Arc::new(runtime);
        GLOBAL
            .set(runtime.clone())
            .map_err(|_| WarmviewError::Other("runtime already installed".to_string()))?;
        Ok(runtime)
    }

    /// The installed runtime, if any
    pub fn global() -> Option<Arc<Self>> {
        GLOBAL.get().cloned()
    }

    /// Shortcut for `pool().acquire(host)`
    pub fn acquire(&self, host: HostContext) -> Result<PooledSurface> {
        self.pool.acquire(host)
    }

    pub fn pool(&self) -> &SurfacePool {
        &self.pool
    }

    pub fn interceptor(&self) -> &Arc<RequestInterceptor> {
        &self.interceptor
    }

    pub fn bootstrap(&self) -> Option<&Arc<EngineBootstrap>> {
        self.bootstrap.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Destroy idle surfaces and stop prewarming. Surfaces held by hosts are
    /// left alone.
    pub fn shutdown(&self) {
        let destroyed = self.pool.release_all();
        if destroyed == 0 && !self.pool.is_initialized() {
            warn!("runtime shut down before it was started");
        }
        info!("runtime shut down");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::network::MockHttpTransport;
    use crate::pool::IdleQueue;
    use crate::surface::{
        EventSink, HostBridge, InterceptHook, ScriptCallback, SurfaceEngine, SurfacePhase,
    };

    struct StubEngine;

    impl SurfaceEngine for StubEngine {
        fn load(&mut self, _url: &str) {}
        fn reload(&mut self) {}
        fn can_go_back(&self) -> bool {
            false
        }
        fn go_back(&mut self) {}
        fn clear_history(&mut self) {}
        fn evaluate_script(&mut self, _script: &str, _callback: ScriptCallback) {}
        fn set_cookie(&mut self, _url: &str, _cookie: &str) {}
        fn set_intercept_hook(&mut self, _hook: Option<InterceptHook>) {}
        fn set_event_sink(&mut self, _sink: Option<EventSink>) {}
        fn install_bridge(&mut self, _name: &str, _bridge: HostBridge) {}
        fn rebind_host(&mut self, _host: &HostContext) {}
        fn detach_from_parent(&mut self) -> bool {
            false
        }
        fn resume(&mut self) {}
        fn pause(&mut self) {}
        fn destroy(&mut self) {}
    }

    fn runtime(queue: Arc<IdleQueue>) -> WarmviewRuntime {
        let proxy = CachingHttpProxy::new(Box::new(MockHttpTransport::new()), None, Duration::from_secs(60));
        let factory: Arc<dyn SurfaceFactory> =
            Arc::new(|_: &HostContext| -> Result<Box<dyn SurfaceEngine>> { Ok(Box::new(StubEngine)) });
        WarmviewRuntime::with_proxy(Config::default(), proxy, factory, queue)
    }

    #[test]
    fn test_start_prewarms_pool() {
        let queue = Arc::new(IdleQueue::new());
        let runtime = runtime(queue.clone());
        runtime.start();
        queue.run_until_idle(16);

        assert_eq!(runtime.pool().len(), 2);
        let surface = runtime.acquire(HostContext::Application).unwrap();
        assert_eq!(surface.phase(), SurfacePhase::Attached);
        assert_eq!(runtime.pool().len(), 1);
    }

    #[test]
    fn test_shutdown_releases_pool() {
        let queue = Arc::new(IdleQueue::new());
        let runtime = runtime(queue.clone());
        runtime.start();
        queue.run_until_idle(16);

        runtime.shutdown();
        queue.run_until_idle(16);
        assert!(runtime.pool().is_empty());
        assert!(runtime.pool().is_released());
    }
}
