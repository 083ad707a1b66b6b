//! Ties a surface to its host's visibility lifecycle
//!
//! `Attached -> Active <-> Inactive -> Destroyed`. Resume and pause map to
//! the engine's own resume / pause, destroy tears the surface down. The
//! observer only holds a weak reference and is tagged with the host binding
//! it was created for, so a host that outlives its surface, or an old host
//! of a recycled surface, cannot touch it.

use std::sync::{Arc, Weak};

use log::debug;

use super::host::LifecycleObserver;
use super::surface::{PooledSurface, SurfaceShared};

pub struct LifecycleBinder;

impl LifecycleBinder {
    /// Attach an observer for the surface's current host.
    ///
    /// Returns `false` if no lifecycle owner could be found or the current
    /// host binding is already observed.
    pub fn bind(surface: &PooledSurface) -> bool {
        match surface.claim_lifecycle_owner() {
            Some((owner, generation)) => {
                debug!("{}: observing host lifecycle", surface.id());
                owner.add_observer(Arc::new(SurfaceObserver {
                    target: surface.downgrade(),
                    generation,
                }));
                true
            }
            None => {
                debug!("{}: no lifecycle owner, host must tear down", surface.id());
                false
            }
        }
    }
}

struct SurfaceObserver {
    target: Weak<SurfaceShared>,
    generation: u64,
}

impl LifecycleObserver for SurfaceObserver {
    fn on_resume(&self) {
        if let Some(surface) = self.target.upgrade() {
            surface.resume(Some(self.generation));
        }
    }

    fn on_pause(&self) {
        if let Some(surface) = self.target.upgrade() {
            surface.pause(Some(self.generation));
        }
    }

    fn on_destroy(&self) {
        if let Some(surface) = self.target.upgrade() {
            surface.destroy(Some(self.generation));
        }
    }
}
