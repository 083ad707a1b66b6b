//! Response header rewriting
//!
//! Every response that passes through the proxy loses its `Pragma` and
//! `Cache-Control` headers and gets a single long `max-age` instead. Origin
//! cache directives are overridden on purpose: static assets may go stale,
//! and that is accepted in exchange for skipping the network on later loads.

use std::time::Duration;

pub const CACHE_CONTROL: &str = "Cache-Control";
pub const PRAGMA: &str = "Pragma";

/// Replace cache directives with `Cache-Control: max-age=<max_age>`.
///
/// Names are matched case-insensitively. Applying the rewrite twice leaves
/// the same header list as applying it once.
pub fn rewrite_cache_control(headers: &mut Vec<(String, String)>, max_age: Duration) {
    headers.retain(|(name, _)| {
        !name.eq_ignore_ascii_case(PRAGMA) && !name.eq_ignore_ascii_case(CACHE_CONTROL)
    });
    headers.push((
        CACHE_CONTROL.to_string(),
        format!("max-age={}", max_age.as_secs()),
    ));
}

/// All values of a header, compared case-insensitively
pub fn header_values<'a>(
    headers: &'a [(String, String)],
    name: &'a str,
) -> impl Iterator<Item = &'a str> + 'a {
    headers
        .iter()
        .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
