//! Batch orchestration and boundary wire types.
//!
//! The orchestrator parses one boundary payload, applies the header-merge policy, drives every
//! sub-request through the dispatcher (one at a time in series mode, all at once in parallel
//! mode), and assembles the records in input order. A hard dispatch failure aborts the whole
//! batch; partial results are never returned.

use std::collections::HashMap;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::dispatch::{DispatchError, Dispatcher};
use crate::headers::{merge_headers, parse_merge_list};

/// One logical sub-request within a batch, as described by the caller.
///
/// Unknown fields are retained in `extra` and ride through to the simulated request, so handlers
/// that depend on framework-specific extensions still see them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubRequestSpec {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Boundary payload received by the batch endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(default)]
    pub execute_in_series: bool,
    #[serde(default)]
    pub include_requests_in_response: bool,
    /// Comma-separated names of outer-call headers to propagate into every sub-request.
    #[serde(default)]
    pub merge_headers: String,
    #[serde(default)]
    pub batch: Vec<SubRequestSpec>,
}

/// Per-batch options, parsed once and shared read-only by every sub-dispatch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub execute_in_series: bool,
    pub include_requests_in_response: bool,
    pub merge_headers: Vec<String>,
}

impl BatchOptions {
    pub fn from_request(request: &BatchRequest) -> Self {
        Self {
            execute_in_series: request.execute_in_series,
            include_requests_in_response: request.include_requests_in_response,
            merge_headers: parse_merge_list(&request.merge_headers),
        }
    }
}

/// Normalized outcome of one sub-request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponsePayload {
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// Per-item problem (e.g. a body that claims JSON but fails to parse). Never aborts the
    /// batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One element of the aggregated batch response.
#[derive(Debug, Clone, Serialize)]
pub struct SubResponseRecord {
    pub response: ResponsePayload,
    /// The originating spec (with post-merge headers), present only when the caller asked for it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<SubRequestSpec>,
}

/// Drives a whole batch through the dispatcher.
#[derive(Clone)]
pub struct BatchOrchestrator {
    dispatcher: Dispatcher,
}

impl BatchOrchestrator {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Execute a batch. Output index i always corresponds to `request.batch[i]`, regardless of
    /// execution mode or completion timing.
    pub async fn execute(
        &self,
        outer_headers: &HashMap<String, String>,
        request: BatchRequest,
    ) -> Result<Vec<SubResponseRecord>, DispatchError> {
        let options = BatchOptions::from_request(&request);
        let mut specs = request.batch;

        // Configuration errors surface before any sub-request is attempted.
        if specs.iter().any(|spec| spec.url.is_empty()) {
            return Err(DispatchError::EmptyUrl);
        }

        for spec in &mut specs {
            merge_headers(&mut spec.headers, outer_headers, &options.merge_headers);
        }

        tracing::debug!(
            event = "batch_execute",
            len = specs.len(),
            in_series = options.execute_in_series,
            merge_headers = options.merge_headers.len(),
            "executing batch"
        );

        let payloads: Vec<ResponsePayload> = if options.execute_in_series {
            let mut out = Vec::with_capacity(specs.len());
            for spec in &specs {
                out.push(self.dispatcher.dispatch(spec).await?);
            }
            out
        } else {
            // join_all yields results in the order of the input futures, so input order is
            // preserved no matter when each sub-request completes.
            join_all(specs.iter().map(|spec| self.dispatcher.dispatch(spec)))
                .await
                .into_iter()
                .collect::<Result<_, _>>()?
        };

        let records = specs
            .into_iter()
            .zip(payloads)
            .map(|(spec, response)| SubResponseRecord {
                response,
                request: options.include_requests_in_response.then_some(spec),
            })
            .collect();

        Ok(records)
    }
}
