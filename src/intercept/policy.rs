//! Decides which sub-resource requests go through the caching proxy

use std::collections::HashMap;

use url::Url;

/// Read-only snapshot of a pending resource fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub url: Option<String>,
    pub method: String,
    pub headers: HashMap<String, String>,
    /// Set for the top-level navigation request of a page
    pub is_main_frame: bool,
}

impl InterceptedRequest {
    /// Sub-resource GET request without headers
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            method: "GET".to_string(),
            headers: HashMap::new(),
            is_main_frame: false,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn main_frame(mut self, is_main_frame: bool) -> Self {
        self.is_main_frame = is_main_frame;
        self
    }

    /// File extension of the URL, empty when there is none
    pub fn extension(&self) -> &str {
        self.url.as_deref().map(extension_from_url).unwrap_or("")
    }

    /// Static asset class of the URL, if any
    pub fn asset(&self) -> Option<StaticAsset> {
        StaticAsset::from_extension(self.extension())
    }
}

/// Static sub-resources worth caching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticAsset {
    Image,
    Stylesheet,
    Script,
    Json,
    Font,
}

impl StaticAsset {
    /// Classify a file extension. Matching is exact: `PNG` is not `png`.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let asset = match extension {
            "ico" | "bmp" | "gif" | "jpeg" | "jpg" | "png" | "svg" | "webp" => Self::Image,
            "css" => Self::Stylesheet,
            "js" => Self::Script,
            "json" => Self::Json,
            "eot" | "otf" | "ttf" | "woff" => Self::Font,
            _ => return None,
        };
        Some(asset)
    }

    /// MIME type to declare when the server sent none
    pub fn fallback_mime(extension: &str) -> &'static str {
        match extension {
            "ico" => "image/x-icon",
            "bmp" => "image/bmp",
            "gif" => "image/gif",
            "jpeg" | "jpg" => "image/jpeg",
            "png" => "image/png",
            "svg" => "image/svg+xml",
            "webp" => "image/webp",
            "css" => "text/css",
            "js" => "application/javascript",
            "json" => "application/json",
            "eot" => "application/vnd.ms-fontobject",
            "otf" => "font/otf",
            "ttf" => "font/ttf",
            "woff" => "font/woff",
            _ => "application/octet-stream",
        }
    }
}

/// Extension of the last path segment of `url`.
///
/// Fragment and query are stripped first. The segment must consist of
/// `[A-Za-z0-9_.\-()%]`, otherwise no extension is reported.
pub fn extension_from_url(url: &str) -> &str {
    if url.trim().is_empty() || url == "null" {
        return "";
    }

    let mut rest = url;
    if let Some(pos) = rest.rfind('#')
        && pos > 0
    {
        rest = &rest[..pos];
    }
    if let Some(pos) = rest.rfind('?')
        && pos > 0
    {
        rest = &rest[..pos];
    }

    let filename = rest.rsplit('/').next().unwrap_or(rest);
    let valid = !filename.is_empty()
        && filename
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_.-()%".contains(c));
    if !valid {
        return "";
    }

    filename.rfind('.').map(|dot| &filename[dot + 1..]).unwrap_or("")
}

/// Pure decision function: proxy a request or let the engine load it.
///
/// Navigations keep the engine's own redirect, cookie and TLS handling;
/// only static GET sub-resources over http(s) are proxied.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterceptionPolicy;

impl InterceptionPolicy {
    pub fn should_proxy(&self, request: &InterceptedRequest) -> bool {
        if request.is_main_frame {
            return false;
        }
        if !request.method.eq_ignore_ascii_case("GET") {
            return false;
        }

        let Some(raw) = request.url.as_deref() else {
            return false;
        };
        if raw.trim().is_empty() || raw == "null" {
            return false;
        }
        let Ok(url) = Url::parse(raw) else {
            return false;
        };
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        StaticAsset::from_extension(extension_from_url(raw)).is_some()
    }
}
