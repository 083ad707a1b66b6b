//! Error types for warmview

use thiserror::Error;

use crate::surface::SurfaceId;

/// Main error type for warmview operations
#[derive(Debug, Error)]
pub enum WarmviewError {
    /// Surface construction or lifecycle errors
    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),
    /// Outbound network errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    /// Disk cache errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Rendering surface errors
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The surface factory failed to build an engine instance
    #[error("failed to construct surface: {0}")]
    Construction(String),
    /// Operation on a surface that was already torn down
    #[error("surface {0} is destroyed")]
    Destroyed(SurfaceId),
}

/// Network-specific errors
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Connection timed out
    #[error("request timed out")]
    Timeout,
    /// Connection could not be established
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// Invalid URL
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// Method or header the client refused to send
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Body could not be read
    #[error("failed to read body: {0}")]
    Body(String),
}

/// Disk cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache directory could not be created or scanned
    #[error("cache directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// An entry's metadata could not be encoded or decoded
    #[error("corrupt cache entry: {0}")]
    Corrupt(#[from] serde_json::Error),
    /// Entry read or write failed
    #[error("cache I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML parse error
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Convenience Result type for warmview operations
pub type Result<T> = std::result::Result<T, WarmviewError>;
