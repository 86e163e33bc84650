//! Sub-request dispatcher.
//!
//! One dispatch builds a [`SimRequest`]/[`SimResponse`] pair, invokes the host entry point
//! exactly once, and waits for the response's completion channel to fire. No timeout is imposed
//! here: a handler that never performs a terminal write hangs its slot (and, in series mode, the
//! batch). Timeout policy belongs to an outer layer.
//!
//! Two entry-point implementations cover the two transport strategies:
//! - [`RouterEntryPoint`] drives an `axum::Router` in-process via `tower::ServiceExt::oneshot`,
//!   bypassing the network entirely.
//! - [`HttpEntryPoint`] issues a real request over a `reqwest` client, re-anchored to the
//!   deployment's own origin so the endpoint cannot relay elsewhere.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use thiserror::Error;
use tower::ServiceExt as _;

use crate::batch::{ResponsePayload, SubRequestSpec};
use crate::origin::Origin;
use crate::request::{RequestOptions, SimRequest};
use crate::response::{CapturedResponse, SimResponse};

/// Errors that abort the whole batch. Per-item body-parse problems are not errors at this level;
/// they are embedded into the item's [`ResponsePayload`].
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Configuration error: a sub-request spec with an empty url.
    #[error("sub-request url must not be empty")]
    EmptyUrl,
    /// An unrecovered error escaped the host handler invocation.
    #[error("handler failed: {0}")]
    Handler(#[from] anyhow::Error),
    /// The handler returned and dropped the response without a terminal write.
    #[error("handler finished without a terminal write")]
    IncompleteResponse,
}

/// The host application's invocable entry point.
///
/// Accepts one simulated request/response pair and drives the handler pipeline. Completion is
/// signalled through the response's terminal write, not through this future: an implementation may
/// return before the terminal write fires (for example after spawning background work that ends
/// the response later).
#[async_trait]
pub trait AppEntryPoint: Send + Sync {
    async fn call(&self, req: SimRequest, res: SimResponse) -> anyhow::Result<()>;
}

/// Drives single sub-requests through the host entry point.
#[derive(Clone)]
pub struct Dispatcher {
    entry: Arc<dyn AppEntryPoint>,
}

impl Dispatcher {
    pub fn new(entry: Arc<dyn AppEntryPoint>) -> Self {
        Self { entry }
    }

    /// Perform exactly one in-process invocation for `spec` and normalize the captured outcome.
    pub async fn dispatch(&self, spec: &SubRequestSpec) -> Result<ResponsePayload, DispatchError> {
        if spec.url.is_empty() {
            return Err(DispatchError::EmptyUrl);
        }

        let req = SimRequest::new(
            &spec.url,
            RequestOptions {
                method: spec.method.clone(),
                headers: spec.headers.clone(),
                body: spec.body.clone(),
                extensions: spec.extra.clone(),
            },
        );

        tracing::debug!(
            event = "sub_dispatch",
            method = %req.method,
            url = %req.url,
            "dispatching sub-request"
        );

        let (res, completion) = SimResponse::new();
        self.entry.call(req, res).await?;

        let captured = completion
            .await
            .map_err(|_| DispatchError::IncompleteResponse)?;

        Ok(normalize(captured))
    }
}

/// Turn a captured response into the uniform sub-response record payload.
///
/// When the content type declares JSON, the raw body is re-parsed into a structured value; a parse
/// failure is a per-item problem recorded on the payload, never a dispatch error.
fn normalize(captured: CapturedResponse) -> ResponsePayload {
    let content_type = captured
        .headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v.trim().to_ascii_lowercase());

    let headers = if captured.headers.is_empty() {
        None
    } else {
        Some(captured.headers)
    };

    let mut error = None;
    let body = if captured.body.is_empty() {
        None
    } else if content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("application/json"))
    {
        match serde_json::from_slice(&captured.body) {
            Ok(value) => Some(value),
            Err(err) => {
                error = Some(format!("invalid json body: {err}"));
                Some(serde_json::Value::String(
                    String::from_utf8_lossy(&captured.body).into_owned(),
                ))
            }
        }
    } else {
        Some(serde_json::Value::String(
            String::from_utf8_lossy(&captured.body).into_owned(),
        ))
    };

    ResponsePayload {
        code: captured.status,
        headers,
        body,
        error,
    }
}

/// In-process transport: drives the host `axum::Router` directly, no network hop.
#[derive(Clone)]
pub struct RouterEntryPoint {
    app: axum::Router,
}

impl RouterEntryPoint {
    pub fn new(app: axum::Router) -> Self {
        Self { app }
    }
}

#[async_trait]
impl AppEntryPoint for RouterEntryPoint {
    async fn call(&self, req: SimRequest, mut res: SimResponse) -> anyhow::Result<()> {
        let mut builder = http::Request::builder()
            .method(req.method.as_str())
            .uri(req.url.as_str());
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        // A structured body is sent as JSON, with an implied content type unless the sub-request
        // declared its own. A string body passes through as raw bytes.
        let declared_content_type = req.header("content-type").is_some();
        let body = match req.body {
            None => Bytes::new(),
            Some(serde_json::Value::String(s)) => Bytes::from(s),
            Some(value) => {
                if !declared_content_type {
                    builder = builder.header(CONTENT_TYPE, "application/json");
                }
                Bytes::from(serde_json::to_vec(&value)?)
            }
        };

        let request = builder.body(Body::from(body))?;
        let response = self.app.clone().oneshot(request).await?;

        let (parts, body) = response.into_parts();
        let bytes = to_bytes(body, usize::MAX).await?;

        res.status(parts.status.as_u16());
        for (name, value) in parts.headers.iter() {
            if let Ok(value) = value.to_str() {
                res.set_header(name.as_str(), value);
            }
        }
        res.send(bytes);
        Ok(())
    }
}

/// Loopback-HTTP transport: a real request over the wire, constrained to the deployment's own
/// origin.
#[derive(Clone)]
pub struct HttpEntryPoint {
    client: reqwest::Client,
    origin: Origin,
}

impl HttpEntryPoint {
    pub fn new(client: reqwest::Client, origin: Origin) -> Self {
        Self { client, origin }
    }
}

#[async_trait]
impl AppEntryPoint for HttpEntryPoint {
    async fn call(&self, req: SimRequest, mut res: SimResponse) -> anyhow::Result<()> {
        let target = self.origin.anchor(&req.url)?;
        let method = http::Method::from_bytes(req.method.as_bytes())?;

        let mut builder = self.client.request(method, target);
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match req.body {
            None => builder,
            Some(serde_json::Value::String(s)) => builder.body(s),
            Some(value) => builder.json(&value),
        };

        let response = builder.send().await?;

        res.status(response.status().as_u16());
        for (name, value) in response.headers().iter() {
            if let Ok(value) = value.to_str() {
                res.set_header(name.as_str(), value);
            }
        }
        let bytes = response.bytes().await?;
        res.send(bytes);
        Ok(())
    }
}
