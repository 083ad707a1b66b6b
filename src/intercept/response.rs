//! Synthetic response handed back to the rendering surface

use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Read};

/// CORS headers forced onto every proxied response so the page's own
/// cross-origin sub-resource loads are not blocked.
pub const CORS_HEADERS: [(&str, &str); 4] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Headers", "X-Requested-With"),
    ("Access-Control-Allow-Methods", "POST, GET, OPTIONS, DELETE"),
    ("Access-Control-Allow-Credentials", "true"),
];

pub const DEFAULT_CHARSET: &str = "utf-8";
pub const DEFAULT_REASON: &str = "OK";

/// Reply for an intercepted request.
///
/// The body reader is owned by whoever receives the response; the rendering
/// surface is expected to drain or drop it.
pub struct CachedResponse {
    status: u16,
    reason: String,
    mime_type: String,
    charset: String,
    headers: HashMap<String, String>,
    body: Box<dyn Read + Send>,
}

impl CachedResponse {
    /// Create a response over an in-memory body
    pub fn new(
        status: u16,
        reason: impl Into<String>,
        mime_type: impl Into<String>,
        charset: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        let reason = reason.into();
        Self {
            status,
            reason: if reason.trim().is_empty() {
                DEFAULT_REASON.to_string()
            } else {
                reason
            },
            mime_type: mime_type.into(),
            charset: charset.into(),
            headers: HashMap::new(),
            body: Box::new(Cursor::new(body)),
        }
    }

    /// Replace the header map
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Insert or overwrite the CORS headers.
    ///
    /// Upstream copies are removed whatever their case.
    pub fn with_cors(mut self) -> Self {
        for (name, value) in CORS_HEADERS {
            self.headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
            self.headers.insert(name.to_string(), value.to_string());
        }
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Take ownership of the body stream
    pub fn into_body(self) -> Box<dyn Read + Send> {
        self.body
    }

    /// Read the whole body
    pub fn read_body(self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.into_body().read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl fmt::Debug for CachedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("mime_type", &self.mime_type)
            .field("charset", &self.charset)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Split a `Content-Type` value into its essence and `charset` parameter
pub fn parse_content_type(value: &str) -> (Option<String>, Option<String>) {
    let mut parts = value.split(';');
    let essence = parts
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let charset = parts.find_map(|param| {
        let (key, val) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| val.trim().trim_matches('"').to_string())
            .filter(|s| !s.is_empty())
    });
    (essence, charset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_reason_defaults() {
        let response = CachedResponse::new(200, "  ", "text/css", "utf-8", Vec::new());
        assert_eq!(response.reason(), "OK");
    }

    #[test]
    fn test_cors_overwrites() {
        let mut headers = HashMap::new();
        headers.insert("Access-Control-Allow-Origin".to_string(), "https://a".to_string());
        let response = CachedResponse::new(200, "OK", "text/css", "utf-8", Vec::new())
            .with_headers(headers)
            .with_cors();

        assert_eq!(response.headers()["Access-Control-Allow-Origin"], "*");
        assert_eq!(response.headers()["Access-Control-Allow-Credentials"], "true");
        assert_eq!(response.headers().len(), 4);
    }

    #[test]
    fn test_cors_replaces_lowercase_upstream_copies() {
        let mut headers = HashMap::new();
        headers.insert(
            "access-control-allow-origin".to_string(),
            "https://only-this.example".to_string(),
        );
        headers.insert("access-control-allow-credentials".to_string(), "false".to_string());
        headers.insert("content-type".to_string(), "text/css".to_string());
        let response = CachedResponse::new(200, "OK", "text/css", "utf-8", Vec::new())
            .with_headers(headers)
            .with_cors();

        let origins: Vec<&String> = response
            .headers()
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("access-control-allow-origin"))
            .map(|(_, v)| v)
            .collect();
        assert_eq!(origins, vec!["*"]);
        assert_eq!(response.headers()["Access-Control-Allow-Credentials"], "true");
        assert_eq!(response.headers().len(), 5);
    }

    #[test]
    fn test_parse_content_type() {
        assert_eq!(
            parse_content_type("text/css; charset=\"ISO-8859-1\""),
            (Some("text/css".to_string()), Some("ISO-8859-1".to_string()))
        );
        assert_eq!(parse_content_type("image/png"), (Some("image/png".to_string()), None));
        assert_eq!(parse_content_type(""), (None, None));
    }

    #[test]
    fn test_body_stream() {
        let response = CachedResponse::new(200, "OK", "text/plain", "utf-8", b"hi".to_vec());
        assert_eq!(response.read_body().unwrap(), b"hi");
    }
}
