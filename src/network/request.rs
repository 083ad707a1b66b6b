//! Outbound HTTP request types

use std::collections::HashMap;
use std::fmt;

use crate::utils::{Result, error::NetworkError};

/// HTTP methods the proxy knows how to send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
}

impl Method {
    /// Parse a method name, ignoring ASCII case
    pub fn parse(name: &str) -> Option<Self> {
        let method = match name.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            _ => return None,
        };
        Some(method)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP request sent by the caching proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    method: Method,
    url: String,
    headers: HashMap<String, String>,
}

impl OutboundRequest {
    /// Create a new request
    pub fn new(method: Method, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let has_scheme = |prefix: &str| {
            url.get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        };
        if !has_scheme("http://") && !has_scheme("https://") {
            return Err(NetworkError::InvalidUrl(url).into());
        }
        Ok(Self {
            method,
            url,
            headers: HashMap::new(),
        })
    }

    /// Create a GET request
    pub fn get(url: impl Into<String>) -> Result<Self> {
        Self::new(Method::Get, url)
    }

    /// Add a header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Add every header from a map, keeping names as given
    pub fn headers_from(mut self, headers: &HashMap<String, String>) -> Self {
        for (key, value) in headers {
            self.headers.insert(key.clone(), value.clone());
        }
        self
    }

    /// Get the URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the method
    pub fn method(&self) -> Method {
        self.method
    }

    /// Get headers
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Whether the caller asked caches not to store the response
    pub fn forbids_storage(&self) -> bool {
        self.headers.iter().any(|(key, value)| {
            key.eq_ignore_ascii_case("cache-control")
                && value
                    .split(',')
                    .any(|d| d.trim().eq_ignore_ascii_case("no-store"))
        })
    }
}
