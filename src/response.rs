//! Simulated response builder.
//!
//! Handlers written against a real server response expect a mutable surface: set a status, set
//! headers, redirect, and eventually perform a terminal write. [`SimResponse`] reproduces that
//! surface as a plain state struct with a closed set of operations and captures whatever the
//! handler writes. The first terminal write snapshots the accumulated state and fires a one-shot
//! completion channel; anything the handler does afterwards is silently absorbed.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::oneshot;

/// Immutable snapshot of a response at the moment of its first terminal write.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

/// Single-fire completion guard.
///
/// Holds the oneshot sender behind a mutex and hands it out exactly once. Each in-flight dispatch
/// owns its own guard, so concurrent batches never share one.
#[derive(Debug)]
pub struct CompletionGuard {
    tx: Mutex<Option<oneshot::Sender<CapturedResponse>>>,
}

impl CompletionGuard {
    pub fn new() -> (Self, oneshot::Receiver<CapturedResponse>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Fire the completion callback with `captured`. Returns `true` if this call was the first;
    /// subsequent calls are absorbed and return `false`.
    pub fn fire(&self, captured: CapturedResponse) -> bool {
        let sender = self.tx.lock().map(|mut slot| slot.take()).unwrap_or(None);
        match sender {
            // The receiver may already be gone (dispatch dropped); that still counts as fired.
            Some(tx) => {
                let _ = tx.send(captured);
                true
            }
            None => false,
        }
    }

    pub fn completed(&self) -> bool {
        self.tx.lock().map(|slot| slot.is_none()).unwrap_or(true)
    }
}

/// Mutable response accumulator handed to the host handler.
///
/// Performs no validation: a nonsensical status code or header value is the handler's defect and
/// passes through unmodified, the same way a real response object would take it.
#[derive(Debug)]
pub struct SimResponse {
    status: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    guard: CompletionGuard,
}

impl SimResponse {
    /// Create a response bound to a fresh completion channel. The dispatcher holds the receiver.
    pub fn new() -> (Self, oneshot::Receiver<CapturedResponse>) {
        let (guard, rx) = CompletionGuard::new();
        (
            Self {
                status: 200,
                headers: HashMap::new(),
                body: Vec::new(),
                guard,
            },
            rx,
        )
    }

    /// Set the status code. Chainable.
    pub fn status(&mut self, code: u16) -> &mut Self {
        self.status = code;
        self
    }

    /// Set a single header. Chainable.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set multiple headers from a mapping. Chainable.
    pub fn set_headers<I, K, V>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.headers.insert(name.into(), value.into());
        }
        self
    }

    /// Append data to the body buffer without completing the response. Chainable.
    pub fn write(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        self.body.extend_from_slice(data.as_ref());
        self
    }

    /// Terminal write with no further data: complete with whatever has accumulated.
    pub fn end(&mut self) {
        self.complete();
    }

    /// Terminal write with a raw body, replacing anything previously buffered.
    pub fn send(&mut self, data: impl AsRef<[u8]>) {
        self.body.clear();
        self.body.extend_from_slice(data.as_ref());
        self.complete();
    }

    /// Terminal write with a JSON body. Sets `content-type: application/json` unless the handler
    /// already declared a content type. Serialization failures are returned to the handler.
    pub fn send_json<T: Serialize>(&mut self, value: &T) -> serde_json::Result<()> {
        let encoded = serde_json::to_vec(value)?;
        if !self
            .headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("content-type"))
        {
            self.headers
                .insert("content-type".to_string(), "application/json".to_string());
        }
        self.send(encoded);
        Ok(())
    }

    /// Redirect with the default 301 status.
    pub fn redirect(&mut self, location: impl Into<String>) {
        self.redirect_with_status(301, location);
    }

    /// Redirect with an explicit status: sets `Location`, then performs a terminal write with no
    /// body.
    pub fn redirect_with_status(&mut self, code: u16, location: impl Into<String>) {
        self.status = code;
        self.headers.insert("location".to_string(), location.into());
        self.body.clear();
        self.complete();
    }

    /// Whether a terminal write has already fired.
    pub fn completed(&self) -> bool {
        self.guard.completed()
    }

    fn complete(&mut self) {
        self.guard.fire(CapturedResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: Bytes::from(std::mem::take(&mut self.body)),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_status_headers_and_body() {
        let (mut res, rx) = SimResponse::new();
        res.status(201)
            .set_header("x-one", "1")
            .set_headers([("x-two", "2"), ("x-three", "3")]);
        res.send("created");

        let captured = rx.await.expect("completion");
        assert_eq!(captured.status, 201);
        assert_eq!(captured.headers.get("x-one").unwrap(), "1");
        assert_eq!(captured.headers.get("x-two").unwrap(), "2");
        assert_eq!(captured.headers.get("x-three").unwrap(), "3");
        assert_eq!(captured.body.as_ref(), b"created");
    }

    #[tokio::test]
    async fn status_defaults_to_200_and_body_to_empty() {
        let (mut res, rx) = SimResponse::new();
        res.end();

        let captured = rx.await.expect("completion");
        assert_eq!(captured.status, 200);
        assert!(captured.body.is_empty());
    }

    #[tokio::test]
    async fn write_appends_and_end_flushes() {
        let (mut res, rx) = SimResponse::new();
        res.write("hello ").write("world");
        res.end();

        let captured = rx.await.expect("completion");
        assert_eq!(captured.body.as_ref(), b"hello world");
    }

    #[tokio::test]
    async fn send_replaces_buffered_writes() {
        let (mut res, rx) = SimResponse::new();
        res.write("draft");
        res.send("final");

        let captured = rx.await.expect("completion");
        assert_eq!(captured.body.as_ref(), b"final");
    }

    #[tokio::test]
    async fn send_json_sets_content_type_when_absent() {
        let (mut res, rx) = SimResponse::new();
        res.send_json(&serde_json::json!({"ok": true})).unwrap();

        let captured = rx.await.expect("completion");
        assert_eq!(captured.headers.get("content-type").unwrap(), "application/json");
        assert_eq!(captured.body.as_ref(), br#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn send_json_keeps_declared_content_type() {
        let (mut res, rx) = SimResponse::new();
        res.set_header("Content-Type", "application/vnd.api+json");
        res.send_json(&serde_json::json!({"ok": true})).unwrap();

        let captured = rx.await.expect("completion");
        assert_eq!(
            captured.headers.get("Content-Type").unwrap(),
            "application/vnd.api+json"
        );
        assert!(!captured.headers.contains_key("content-type"));
    }

    #[tokio::test]
    async fn redirect_defaults_to_301() {
        let (mut res, rx) = SimResponse::new();
        res.redirect("/elsewhere");

        let captured = rx.await.expect("completion");
        assert_eq!(captured.status, 301);
        assert_eq!(captured.headers.get("location").unwrap(), "/elsewhere");
        assert!(captured.body.is_empty());
    }

    #[tokio::test]
    async fn redirect_with_explicit_status() {
        let (mut res, rx) = SimResponse::new();
        res.redirect_with_status(302, "/found");

        let captured = rx.await.expect("completion");
        assert_eq!(captured.status, 302);
        assert_eq!(captured.headers.get("location").unwrap(), "/found");
    }

    #[tokio::test]
    async fn double_terminal_write_keeps_first_state() {
        let (mut res, rx) = SimResponse::new();
        res.status(200);
        res.send("first");

        assert!(res.completed());
        res.status(500);
        res.send("second");

        let captured = rx.await.expect("completion");
        assert_eq!(captured.status, 200);
        assert_eq!(captured.body.as_ref(), b"first");
    }

    #[tokio::test]
    async fn end_after_redirect_is_absorbed() {
        let (mut res, rx) = SimResponse::new();
        res.redirect("/moved");
        res.end();
        res.end();

        let captured = rx.await.expect("completion");
        assert_eq!(captured.status, 301);
    }

    #[test]
    fn guard_fires_exactly_once() {
        let (guard, _rx) = CompletionGuard::new();
        let snapshot = CapturedResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::new(),
        };
        assert!(!guard.completed());
        assert!(guard.fire(snapshot.clone()));
        assert!(guard.completed());
        assert!(!guard.fire(snapshot));
    }
}
