//! Resolving the deployment's own base URL from forwarded headers.
//!
//! Used only by the loopback-HTTP transport: every sub-request URL is re-anchored to this origin
//! before dispatch, so the batch endpoint cannot be used as a relay to arbitrary external hosts.
//! Proxies may rewrite the connection, so `x-forwarded-*` headers take precedence over the `host`
//! header.

use std::collections::HashMap;

use anyhow::Context;
use url::Url;

/// Scheme + authority of the current deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    scheme: String,
    /// Host, with the port appended when it isn't the scheme default.
    host: String,
}

fn first_forwarded(headers: &HashMap<String, String>, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|v| v.split(',').next().unwrap_or("").trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Split a `host` header into host and optional port, keeping IPv6 brackets intact.
fn split_host_port(host_header: &str) -> (&str, Option<&str>) {
    if host_header.starts_with('[') {
        if let Some(end) = host_header.find(']') {
            let host = &host_header[..=end];
            let port = host_header[end + 1..].strip_prefix(':');
            return (host, port);
        }
        return (host_header, None);
    }
    match host_header.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (host_header, None),
    }
}

fn has_explicit_port(host: &str) -> bool {
    if host.starts_with('[') {
        host.contains("]:")
    } else {
        host.contains(':')
    }
}

impl Origin {
    /// Resolve the origin from an outer call's headers (lower-cased names).
    ///
    /// `fallback_scheme` applies when no `x-forwarded-proto` header is present.
    pub fn from_headers(
        headers: &HashMap<String, String>,
        fallback_scheme: &str,
    ) -> anyhow::Result<Self> {
        let scheme =
            first_forwarded(headers, "x-forwarded-proto").unwrap_or_else(|| fallback_scheme.to_string());

        let host_header = headers
            .get("host")
            .context("outer call carries no host header")?;
        let (bare_host, host_port) = split_host_port(host_header);

        let host = match first_forwarded(headers, "x-forwarded-host") {
            Some(fwd) => fwd,
            None => bare_host.to_string(),
        };

        let port = first_forwarded(headers, "x-forwarded-port")
            .or_else(|| host_port.map(|p| p.to_string()));

        // Drop the port when it is the scheme default.
        let port = port.filter(|p| {
            !((scheme == "https" && p == "443") || (scheme == "http" && p == "80"))
        });

        let host = match port {
            Some(p) if !has_explicit_port(&host) => format!("{host}:{p}"),
            _ => host,
        };

        Ok(Self { scheme, host })
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Re-anchor a sub-request URL to this origin, keeping only its path and query.
    ///
    /// The input is resolved against the base first and then stripped to path+query, so neither
    /// absolute nor protocol-relative (`//host/...`) inputs can smuggle a foreign authority
    /// through.
    pub fn anchor(&self, raw: &str) -> anyhow::Result<Url> {
        let base = Url::parse(&self.base_url())
            .with_context(|| format!("invalid base url {}", self.base_url()))?;

        let resolved = Url::options()
            .base_url(Some(&base))
            .parse(raw)
            .with_context(|| format!("cannot anchor {raw}"))?;
        let path_and_query = match resolved.query() {
            Some(q) => format!("{}?{}", resolved.path(), q),
            None => resolved.path().to_string(),
        };

        base.join(&path_and_query)
            .with_context(|| format!("cannot anchor {raw}"))
    }
}
