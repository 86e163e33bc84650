//! axum wiring for the batch endpoint.
//!
//! [`build_app`] mounts `POST {batch_path}` onto a host application router. In the default
//! in-process transport the entry point wraps a clone of the host router taken *before* the batch
//! route is added, so a batch cannot recursively target the batch endpoint itself.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};

use crate::batch::{BatchOrchestrator, BatchRequest};
use crate::config::{FanoutConfig, TransportMode};
use crate::dispatch::{AppEntryPoint, Dispatcher, HttpEntryPoint, RouterEntryPoint};
use crate::origin::Origin;

#[derive(Clone)]
enum Transport {
    InProcess(Arc<dyn AppEntryPoint>),
    Http {
        client: reqwest::Client,
        fallback_scheme: String,
    },
}

#[derive(Clone)]
struct AppState {
    transport: Transport,
    max_body_bytes: usize,
}

/// Mount the batch endpoint onto `host`.
pub fn build_app(host: Router, cfg: &FanoutConfig) -> Router {
    let transport = match cfg.transport {
        TransportMode::InProcess => {
            Transport::InProcess(Arc::new(RouterEntryPoint::new(host.clone())))
        }
        TransportMode::Http => Transport::Http {
            client: reqwest::Client::new(),
            fallback_scheme: cfg.fallback_scheme.clone(),
        },
    };

    let state = AppState {
        transport,
        max_body_bytes: cfg.max_body_bytes,
    };

    let batch = Router::new()
        .route(&cfg.batch_path, post(handle_batch))
        .with_state(state);

    host.merge(batch)
}

/// Bind and serve the composed application.
pub async fn run(cfg: FanoutConfig, host: Router) -> anyhow::Result<()> {
    let app = build_app(host, &cfg);
    let listener = tokio::net::TcpListener::bind(cfg.listen_addr).await?;
    tracing::info!(event = "listening", addr = %cfg.listen_addr, path = %cfg.batch_path, "serving");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_batch(State(state): State<AppState>, req: Request<Body>) -> Response {
    let (parts, body) = req.into_parts();

    let body = match to_bytes(body, state.max_body_bytes).await {
        Ok(b) => b,
        Err(_) => {
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let batch_request: BatchRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(err) => {
            tracing::debug!(event = "bad_payload", error = %err, "rejecting batch payload");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    // Shared read-only header view for the merge policy, lower-cased names.
    let mut outer_headers = HashMap::new();
    for (name, value) in parts.headers.iter() {
        if let Ok(value) = value.to_str() {
            outer_headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }

    let entry: Arc<dyn AppEntryPoint> = match &state.transport {
        Transport::InProcess(entry) => Arc::clone(entry),
        Transport::Http {
            client,
            fallback_scheme,
        } => match Origin::from_headers(&outer_headers, fallback_scheme) {
            Ok(origin) => Arc::new(HttpEntryPoint::new(client.clone(), origin)),
            Err(err) => {
                tracing::warn!(event = "origin_unresolved", error = %err, "batch failed");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        },
    };

    let orchestrator = BatchOrchestrator::new(Dispatcher::new(entry));
    match orchestrator.execute(&outer_headers, batch_request).await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(err) => {
            tracing::warn!(event = "batch_failed", error = %err, "batch aborted");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::routing::get;
    use serde_json::{json, Value};
    use tower::ServiceExt as _;

    fn test_cfg() -> FanoutConfig {
        FanoutConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            batch_path: "/batch".to_string(),
            max_body_bytes: 1024 * 1024,
            transport: TransportMode::InProcess,
            fallback_scheme: "http".to_string(),
        }
    }

    fn host_app() -> Router {
        Router::new()
            .route("/a", get(|| async { "hi" }))
            .route(
                "/b",
                post(|Json(body): Json<Value>| async move {
                    let name = body["n"].as_str().unwrap_or("?").to_string();
                    Json(json!({"greet": format!("hi {name}")}))
                }),
            )
            .route(
                "/echo-trace",
                get(|headers: HeaderMap| async move {
                    headers
                        .get("x-trace-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string()
                }),
            )
    }

    async fn post_batch(app: Router, payload: Value) -> (StatusCode, Option<Value>) {
        post_batch_with_headers(app, payload, &[]).await
    }

    async fn post_batch_with_headers(
        app: Router,
        payload: Value,
        extra_headers: &[(&str, &str)],
    ) -> (StatusCode, Option<Value>) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/batch")
            .header("content-type", "application/json");
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Body::from(serde_json::to_vec(&payload).unwrap()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).ok();
        (status, body)
    }

    #[tokio::test]
    async fn end_to_end_mixed_text_and_json() {
        let app = build_app(host_app(), &test_cfg());
        let (status, body) = post_batch(
            app,
            json!({
                "batch": [
                    {"url": "/a", "method": "GET"},
                    {"url": "/b", "method": "POST", "body": {"n": "Ana"}}
                ]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body = body.unwrap();
        let records = body.as_array().unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0]["response"]["code"], json!(200));
        assert_eq!(records[0]["response"]["body"], json!("hi"));
        assert_eq!(records[1]["response"]["code"], json!(200));
        assert_eq!(records[1]["response"]["body"], json!({"greet": "hi Ana"}));
    }

    #[tokio::test]
    async fn request_key_absent_by_default_present_on_request() {
        let app = build_app(host_app(), &test_cfg());
        let (_, body) = post_batch(app, json!({"batch": [{"url": "/a"}]})).await;
        let records = body.unwrap();
        assert!(records[0].get("request").is_none());

        let app = build_app(host_app(), &test_cfg());
        let (_, body) = post_batch(
            app,
            json!({"includeRequestsInResponse": true, "batch": [{"url": "/a"}]}),
        )
        .await;
        let records = body.unwrap();
        assert_eq!(records[0]["request"]["url"], json!("/a"));
    }

    #[tokio::test]
    async fn merged_headers_reach_the_handlers() {
        let app = build_app(host_app(), &test_cfg());
        let (status, body) = post_batch_with_headers(
            app,
            json!({
                "mergeHeaders": "x-trace-id",
                "includeRequestsInResponse": true,
                "batch": [{"url": "/echo-trace"}]
            }),
            &[("x-trace-id", "abc123")],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let records = body.unwrap();
        assert_eq!(records[0]["response"]["body"], json!("abc123"));
        assert_eq!(records[0]["request"]["headers"]["x-trace-id"], json!("abc123"));
    }

    #[tokio::test]
    async fn series_and_parallel_agree_on_output_order() {
        for in_series in [false, true] {
            let app = build_app(host_app(), &test_cfg());
            let (_, body) = post_batch(
                app,
                json!({
                    "executeInSeries": in_series,
                    "batch": [{"url": "/a"}, {"url": "/b", "method": "POST", "body": {"n": "Bo"}}]
                }),
            )
            .await;
            let records = body.unwrap();
            assert_eq!(records[0]["response"]["body"], json!("hi"));
            assert_eq!(records[1]["response"]["body"], json!({"greet": "hi Bo"}));
        }
    }

    #[tokio::test]
    async fn empty_batch_returns_empty_array() {
        let app = build_app(host_app(), &test_cfg());
        let (status, body) = post_batch(app, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn hard_failure_returns_500_with_no_partial_data() {
        let app = build_app(host_app(), &test_cfg());
        let (status, body) = post_batch(
            app,
            json!({"batch": [{"url": "/a"}, {"url": ""}]}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let app = build_app(host_app(), &test_cfg());
        let request = Request::builder()
            .method("POST")
            .uri("/batch")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let mut cfg = test_cfg();
        cfg.max_body_bytes = 16;
        let app = build_app(host_app(), &cfg);
        let (status, _) = post_batch(
            app,
            json!({"batch": [{"url": "/a", "body": "x".repeat(64)}]}),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn batch_cannot_recurse_into_itself() {
        let app = build_app(host_app(), &test_cfg());
        let (status, body) = post_batch(
            app,
            json!({"batch": [{"url": "/batch", "method": "POST", "body": {"batch": []}}]}),
        )
        .await;
        // The entry point wraps the host router without the batch route, so this is a plain 404.
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap()[0]["response"]["code"], json!(404));
    }

    #[tokio::test]
    async fn http_transport_without_host_header_fails_the_batch() {
        let mut cfg = test_cfg();
        cfg.transport = TransportMode::Http;
        let app = build_app(host_app(), &cfg);
        let (status, _) = post_batch(app, json!({"batch": [{"url": "/a"}]})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
