//! Surface pooling
//!
//! [`SurfacePool`] keeps a few idle surfaces ready; [`IdleScheduler`] decides
//! when the host has time to build more.

mod idle;
mod surface_pool;

pub use idle::{IdleQueue, IdleScheduler, IdleTask};
pub use surface_pool::{PoolStats, SurfacePool};
