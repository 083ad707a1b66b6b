//! Logging setup
//!
//! Everything in the crate logs through the `log` facade. Binaries and
//! integration harnesses call [`init`] once; library users are free to
//! install their own logger instead.

use log::LevelFilter;

/// Install `env_logger`.
///
/// `RUST_LOG` wins when set, otherwise `default_level` applies. Calling this
/// more than once is harmless: later calls leave the first logger in place.
pub fn init(default_level: LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(default_level);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    if builder.try_init().is_err() {
        log::debug!("logger already installed");
    }
}

/// Parse a level name from configuration, defaulting to `Info`.
pub fn level_from_str(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse() {
        assert_eq!(level_from_str("debug"), LevelFilter::Debug);
        assert_eq!(level_from_str("WARN"), LevelFilter::Warn);
        assert_eq!(level_from_str("nonsense"), LevelFilter::Info);
    }

    #[test]
    fn test_init_twice() {
        init(LevelFilter::Off);
        init(LevelFilter::Off);
    }
}
