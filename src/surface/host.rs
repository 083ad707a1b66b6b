//! Host environment a surface runs under

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

/// Callbacks for host visibility changes
pub trait LifecycleObserver: Send + Sync {
    fn on_resume(&self);
    fn on_pause(&self);
    fn on_destroy(&self);
}

/// Something that reports visibility changes to observers
pub trait LifecycleOwner: Send + Sync {
    fn add_observer(&self, observer: Arc<dyn LifecycleObserver>);
}

/// A screen or window that displays surfaces
pub trait Host: Send + Sync {
    fn name(&self) -> &str;

    /// Lifecycle source of this host, if it has one
    fn lifecycle_owner(&self) -> Option<Arc<dyn LifecycleOwner>> {
        None
    }
}

/// The environment a surface currently runs under
#[derive(Clone)]
pub enum HostContext {
    /// Process-level context used for idle, pooled surfaces
    Application,
    Host(Arc<dyn Host>),
    /// One wrapping layer around another context
    Wrapped(Arc<HostContext>),
}

impl HostContext {
    pub fn host(host: Arc<dyn Host>) -> Self {
        Self::Host(host)
    }

    pub fn wrap(inner: HostContext) -> Self {
        Self::Wrapped(Arc::new(inner))
    }

    pub fn is_application(&self) -> bool {
        matches!(self, Self::Application)
    }

    /// Lifecycle owner of this context or of the context it directly wraps.
    /// Deeper nesting is not searched.
    pub fn find_lifecycle_owner(&self) -> Option<Arc<dyn LifecycleOwner>> {
        match self {
            Self::Application => None,
            Self::Host(host) => host.lifecycle_owner(),
            Self::Wrapped(inner) => match inner.as_ref() {
                Self::Host(host) => host.lifecycle_owner(),
                _ => None,
            },
        }
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application => f.write_str("Application"),
            Self::Host(host) => write!(f, "Host({})", host.name()),
            Self::Wrapped(inner) => write!(f, "Wrapped({:?})", inner),
        }
    }
}

/// Ready-made [`LifecycleOwner`] that hosts drive by hand
#[derive(Default)]
pub struct HostLifecycle {
    observers: Mutex<Vec<Arc<dyn LifecycleObserver>>>,
}

impl HostLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observer_count(&self) -> usize {
        self.snapshot().len()
    }

    pub fn resume(&self) {
        for observer in self.snapshot() {
            observer.on_resume();
        }
    }

    pub fn pause(&self) {
        for observer in self.snapshot() {
            observer.on_pause();
        }
    }

    /// Notify observers and forget them; destroy is terminal
    pub fn destroy(&self) {
        let observers = std::mem::take(
            &mut *self.observers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        debug!("host destroyed, notifying {} observers", observers.len());
        for observer in observers {
            observer.on_destroy();
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn LifecycleObserver>> {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LifecycleOwner for HostLifecycle {
    fn add_observer(&self, observer: Arc<dyn LifecycleObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Screen {
        lifecycle: Option<Arc<HostLifecycle>>,
    }

    impl Host for Screen {
        fn name(&self) -> &str {
            "screen"
        }

        fn lifecycle_owner(&self) -> Option<Arc<dyn LifecycleOwner>> {
            self.lifecycle
                .clone()
                .map(|l| l as Arc<dyn LifecycleOwner>)
        }
    }

    #[derive(Default)]
    struct Counter {
        destroyed: AtomicUsize,
    }

    impl LifecycleObserver for Counter {
        fn on_resume(&self) {}
        fn on_pause(&self) {}
        fn on_destroy(&self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn screen(with_lifecycle: bool) -> HostContext {
        HostContext::host(Arc::new(Screen {
            lifecycle: with_lifecycle.then(|| Arc::new(HostLifecycle::new())),
        }))
    }

    #[test]
    fn test_lifecycle_owner_lookup() {
        assert!(HostContext::Application.find_lifecycle_owner().is_none());
        assert!(screen(true).find_lifecycle_owner().is_some());
        assert!(screen(false).find_lifecycle_owner().is_none());
        assert!(HostContext::wrap(screen(true)).find_lifecycle_owner().is_some());
        assert!(
            HostContext::wrap(HostContext::wrap(screen(true)))
                .find_lifecycle_owner()
                .is_none()
        );
    }

    #[test]
    fn test_destroy_notifies_once() {
        let lifecycle = HostLifecycle::new();
        let counter = Arc::new(Counter::default());
        lifecycle.add_observer(counter.clone());

        lifecycle.destroy();
        lifecycle.destroy();

        assert_eq!(counter.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.observer_count(), 0);
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", HostContext::wrap(screen(false))), "Wrapped(Host(screen))");
    }
}
