//! Pool of pre-warmed rendering surfaces
//!
//! Building a surface costs hundreds of milliseconds, so a few are built
//! ahead of time while the host is idle and handed out on demand. The pool
//! is a stack: the most recently pushed surface is reused first.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::{debug, info, warn};

use super::idle::IdleScheduler;
use crate::config::PoolConfig;
use crate::intercept::RequestInterceptor;
use crate::surface::{HostContext, PooledSurface, SurfaceFactory, SurfacePhase, SurfaceSetup};
use crate::utils::Result;

/// Statistics for a surface pool
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Total surfaces built
    pub created: AtomicUsize,
    /// Acquires served from the pool
    pub reused: AtomicUsize,
    /// Acquires that had to build a surface on the spot
    pub misses: AtomicUsize,
    /// Surfaces recycled back into the pool
    pub recycled: AtomicUsize,
    /// Surfaces the pool tore down
    pub destroyed: AtomicUsize,
    /// Failed background constructions
    pub prewarm_failures: AtomicUsize,
}

impl PoolStats {
    pub fn hit_rate(&self) -> f64 {
        let reused = self.reused.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = reused + misses;
        if total == 0 {
            0.0
        } else {
            (reused as f64 / total as f64) * 100.0
        }
    }
}

struct PoolInner {
    stack: Mutex<Vec<PooledSurface>>,
    capacity: usize,
    retry_limit: u32,
    factory: Arc<dyn SurfaceFactory>,
    scheduler: Arc<dyn IdleScheduler>,
    setup: SurfaceSetup,
    initialized: AtomicBool,
    released: AtomicBool,
    /// At most one prewarm task is queued at a time
    prewarm_queued: AtomicBool,
    consecutive_failures: AtomicU32,
    stats: PoolStats,
}

impl PoolInner {
    fn stack(&self) -> MutexGuard<'_, Vec<PooledSurface>> {
        self.stack.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn build(&self, host: HostContext, phase: SurfacePhase) -> Result<PooledSurface> {
        let engine = self.factory.create(&host)?;
        self.stats.created.fetch_add(1, Ordering::Relaxed);
        Ok(PooledSurface::new(engine, host, phase, &self.setup))
    }

    /// Push unless full or released; hands the surface back otherwise
    fn push(&self, surface: PooledSurface) -> Option<PooledSurface> {
        let mut stack = self.stack();
        if !self.is_released() && stack.len() < self.capacity {
            stack.push(surface);
            None
        } else {
            Some(surface)
        }
    }

    fn schedule_prewarm(inner: &Arc<Self>) {
        if inner.is_released() || inner.stack().len() >= inner.capacity {
            return;
        }
        if inner.prewarm_queued.swap(true, Ordering::SeqCst) {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(inner);
        inner.scheduler.schedule_idle(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                Self::prewarm_tick(&inner);
            }
        }));
    }

    /// One idle slice: build at most one surface, then queue the next slice
    fn prewarm_tick(inner: &Arc<Self>) {
        inner.prewarm_queued.store(false, Ordering::SeqCst);
        if inner.is_released() || inner.stack().len() >= inner.capacity {
            return;
        }

        match inner.build(HostContext::Application, SurfacePhase::Free) {
            Ok(surface) => {
                inner.consecutive_failures.store(0, Ordering::SeqCst);
                if let Some(surplus) = inner.push(surface) {
                    surplus.destroy();
                    inner.stats.destroyed.fetch_add(1, Ordering::Relaxed);
                }
                debug!("surface pool size: {}", inner.stack().len());
            }
            Err(e) => {
                inner.stats.prewarm_failures.fetch_add(1, Ordering::Relaxed);
                let failures = inner.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= inner.retry_limit {
                    warn!("prewarm failed {} times in a row, stopping: {}", failures, e);
                    inner.consecutive_failures.store(0, Ordering::SeqCst);
                    return;
                }
                warn!("prewarm failed, retrying on next idle: {}", e);
            }
        }

        Self::schedule_prewarm(inner);
    }
}

/// Bounded stack of idle surfaces.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct SurfacePool {
    inner: Arc<PoolInner>,
}

impl SurfacePool {
    /// Create a pool. Nothing is built until [`initialize`](Self::initialize).
    pub fn new(
        factory: Arc<dyn SurfaceFactory>,
        scheduler: Arc<dyn IdleScheduler>,
        config: &PoolConfig,
        interceptor: Option<Arc<RequestInterceptor>>,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                stack: Mutex::new(Vec::with_capacity(config.capacity)),
                capacity: config.capacity,
                retry_limit: config.prewarm_retry_limit.max(1),
                factory,
                scheduler,
                setup: SurfaceSetup {
                    interceptor,
                    bridge_name: config.bridge_name.clone(),
                },
                initialized: AtomicBool::new(false),
                released: AtomicBool::new(false),
                prewarm_queued: AtomicBool::new(false),
                consecutive_failures: AtomicU32::new(0),
                stats: PoolStats::default(),
            }),
        }
    }

    /// One-time setup; starts prewarming. Later calls do nothing.
    pub fn initialize(&self) {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            debug!("surface pool already initialized");
            return;
        }
        info!("surface pool initialized, capacity {}", self.inner.capacity);
        self.prewarm();
    }

    /// Queue background construction until the pool is full.
    ///
    /// Returns immediately; surfaces are built on later idle slices.
    pub fn prewarm(&self) {
        PoolInner::schedule_prewarm(&self.inner);
    }

    /// Take a surface for `host`.
    ///
    /// Pooled surfaces are detached from any old parent and rebound to
    /// `host`, and a refill is queued. With an empty pool a surface is built
    /// right away; construction errors are returned.
    pub fn acquire(&self, host: HostContext) -> Result<PooledSurface> {
        let pooled = loop {
            let Some(surface) = self.inner.stack().pop() else {
                break None;
            };
            if !surface.is_destroyed() {
                break Some(surface);
            }
        };

        let surface = match pooled {
            Some(surface) => {
                surface.bind_to(host);
                self.inner.stats.reused.fetch_add(1, Ordering::Relaxed);
                debug!("{} taken from pool", surface.id());
                self.prewarm();
                surface
            }
            None => {
                self.inner.stats.misses.fetch_add(1, Ordering::Relaxed);
                let surface = self.inner.build(host, SurfacePhase::Attached)?;
                debug!("pool empty, built {}", surface.id());
                surface
            }
        };

        let pool = Arc::downgrade(&self.inner);
        surface.set_teardown_hook(move |id| {
            if let Some(inner) = pool.upgrade() {
                debug!("{} torn down, refilling pool", id);
                PoolInner::schedule_prewarm(&inner);
            }
        });

        Ok(surface)
    }

    /// Put a surface the host no longer needs back into the pool.
    ///
    /// It is reset (listeners, history, parent and host cleared) first. When
    /// the pool is full or released the surface is destroyed instead.
    pub fn recycle(&self, surface: PooledSurface) {
        if surface.is_destroyed() {
            debug!("{} already destroyed, not recycled", surface.id());
            return;
        }

        surface.reset_for_pool();
        match self.inner.push(surface) {
            None => {
                self.inner.stats.recycled.fetch_add(1, Ordering::Relaxed);
            }
            Some(surplus) => {
                debug!("pool full, destroying {}", surplus.id());
                surplus.destroy();
                self.inner.stats.destroyed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Destroy every idle surface and stop prewarming for good
    pub fn release_all(&self) -> usize {
        self.inner.released.store(true, Ordering::SeqCst);
        let drained: Vec<PooledSurface> = self.inner.stack().drain(..).collect();
        let count = drained.len();
        for surface in drained {
            surface.destroy();
        }
        self.inner.stats.destroyed.fetch_add(count, Ordering::Relaxed);
        info!("surface pool released, {} surfaces destroyed", count);
        count
    }

    /// Current number of idle surfaces
    pub fn len(&self) -> usize {
        self.inner.stack().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_released()
    }

    /// Get pool statistics
    pub fn stats(&self) -> &PoolStats {
        &self.inner.stats
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::pool::IdleQueue;
    use crate::surface::{
        EventSink, HostBridge, InterceptHook, ScriptCallback, SurfaceEngine, SurfaceListener,
    };
    use crate::utils::error::SurfaceError;

    #[derive(Default)]
    struct NullEngine;

    impl SurfaceEngine for NullEngine {
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

    fn pool_with(capacity: usize, factory: Arc<dyn SurfaceFactory>) -> (SurfacePool, Arc<IdleQueue>) {
        let queue = Arc::new(IdleQueue::new());
        let config = PoolConfig {
            capacity,
            ..PoolConfig::default()
        };
        (SurfacePool::new(factory, queue.clone(), &config, None), queue)
    }

    fn null_factory() -> Arc<dyn SurfaceFactory> {
        Arc::new(|_: &HostContext| -> Result<Box<dyn SurfaceEngine>> { Ok(Box::new(NullEngine)) })
    }

    #[test]
    fn test_initialize_prewarms_on_idle_only() {
        let (pool, queue) = pool_with(2, null_factory());
        pool.initialize();
        assert_eq!(pool.len(), 0);

        queue.run_until_idle(10);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.stats().created.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (pool, queue) = pool_with(2, null_factory());
        pool.initialize();
        pool.initialize();
        assert_eq!(queue.pending(), 1);
        assert!(pool.is_initialized());
    }

    #[test]
    fn test_prewarm_at_capacity_is_noop() {
        let (pool, queue) = pool_with(1, null_factory());
        pool.initialize();
        queue.run_until_idle(10);

        pool.prewarm();
        pool.prewarm();
        assert_eq!(queue.pending(), 0);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_acquire_reuses_and_refills() {
        let (pool, queue) = pool_with(2, null_factory());
        pool.initialize();
        queue.run_until_idle(10);

        let surface = pool.acquire(HostContext::Application).unwrap();
        assert_eq!(surface.phase(), SurfacePhase::Attached);
        assert_eq!(pool.len(), 1);
        assert_eq!(queue.pending(), 1);

        queue.run_until_idle(10);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.stats().reused.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_recycle_resets_and_respects_capacity() {
        let (pool, _queue) = pool_with(1, null_factory());
        let a = pool.acquire(HostContext::Application).unwrap();
        let b = pool.acquire(HostContext::Application).unwrap();
        a.set_listener(SurfaceListener::new().on_title(|_| {}));

        pool.recycle(a);
        assert_eq!(pool.len(), 1);

        pool.recycle(b);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.stats().destroyed.load(Ordering::Relaxed), 1);

        let again = pool.acquire(HostContext::Application).unwrap();
        assert!(!again.has_listener());
    }

    #[test]
    fn test_prewarm_failures_are_retried_then_abandoned() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let factory: Arc<dyn SurfaceFactory> = Arc::new(move |_: &HostContext| -> Result<Box<dyn SurfaceEngine>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(SurfaceError::Construction("no gpu".into()).into())
        });
        let (pool, queue) = pool_with(2, factory);

        pool.initialize();
        queue.run_until_idle(100);

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.stats().prewarm_failures.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_acquire_propagates_construction_error() {
        let factory: Arc<dyn SurfaceFactory> = Arc::new(|_: &HostContext| -> Result<Box<dyn SurfaceEngine>> {
            Err(SurfaceError::Construction("boom".into()).into())
        });
        let (pool, _queue) = pool_with(2, factory);
        assert!(pool.acquire(HostContext::Application).is_err());
        assert_eq!(pool.stats().misses.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_release_all() {
        let (pool, queue) = pool_with(2, null_factory());
        pool.initialize();
        queue.run_until_idle(10);

        assert_eq!(pool.release_all(), 2);
        assert!(pool.is_empty());

        pool.prewarm();
        assert_eq!(queue.pending(), 0);

        let surface = pool.acquire(HostContext::Application).unwrap();
        assert!(!surface.is_destroyed());
    }

    #[test]
    fn test_hit_rate() {
        let (pool, queue) = pool_with(1, null_factory());
        pool.initialize();
        queue.run_until_idle(10);

        let _a = pool.acquire(HostContext::Application).unwrap();
        let _b = pool.acquire(HostContext::Application).unwrap();
        assert_eq!(pool.stats().hit_rate(), 50.0);
    }
}
