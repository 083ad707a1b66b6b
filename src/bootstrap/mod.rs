//! Engine bootstrap
//!
//! Keeps track of whether the preferred rendering engine is usable, retries
//! its download, and remembers the outcome across restarts.

mod engine;
mod settings;

pub use engine::{
    DOWNLOAD_OK, ENGINE_INITIALIZED_KEY, EngineBootstrap, EngineEvent, EngineService,
    FallbackFactory,
};
pub use settings::{FlagStore, JsonFlagStore};
