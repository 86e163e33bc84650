//! Simulated request builder.
//!
//! Builds the request-shaped value handed to the host pipeline for one sub-request. Pure
//! construction: the method is upper-cased (GET when absent), the url is passed through
//! unmodified, and any extra options-bag fields ride along in `extensions` so handlers that lean
//! on framework-specific request fields still see them.
//!
//! Known limitation: `query` is never populated, even when the url embeds a query string.
//! Handlers that read query parameters off the simulated request will see none.

use std::collections::HashMap;

/// Options bag for building a [`SimRequest`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
    /// Additional caller-supplied fields, merged through verbatim.
    pub extensions: HashMap<String, serde_json::Value>,
}

/// Request-shaped value presented to the host handler for one dispatch.
#[derive(Debug, Clone)]
pub struct SimRequest {
    /// Upper-cased HTTP method; `GET` when the spec omits one.
    pub method: String,
    /// Target path, exactly as provided by the caller.
    pub url: String,
    pub headers: HashMap<String, String>,
    /// Always empty; query strings embedded in `url` are not parsed at this layer.
    pub query: HashMap<String, String>,
    /// Always empty.
    pub cookies: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
    /// Extra options-bag fields merged through from the sub-request spec.
    pub extensions: HashMap<String, serde_json::Value>,
}

impl SimRequest {
    pub fn new(url: impl Into<String>, opts: RequestOptions) -> Self {
        let method = opts
            .method
            .map(|m| m.to_ascii_uppercase())
            .unwrap_or_else(|| "GET".to_string());
        Self {
            method,
            url: url.into(),
            headers: opts.headers,
            query: HashMap::new(),
            cookies: HashMap::new(),
            body: opts.body,
            extensions: opts.extensions,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
