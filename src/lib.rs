//! `batch-fanout` is a batch-request fan-out endpoint for axum applications.
//!
//! One incoming call carries a list of logical sub-requests; each is executed against the same
//! running application and the ordered sub-responses come back as a single JSON array. The core
//! mechanism is in-process dispatch: a simulated request/response pair is driven through the host
//! pipeline with no network hop, and whatever the pipeline writes back is captured through a
//! single-fire completion channel.
//!
//! Core modules:
//! - [`response`]: simulated response builder + completion guard
//! - [`request`]: simulated request builder
//! - [`dispatch`]: sub-request dispatcher + transports (in-process and loopback HTTP)
//! - [`headers`]: header-merge policy
//! - [`batch`]: batch orchestrator + boundary wire types
//! - [`origin`]: base-URL resolution from forwarded headers
//! - [`config`]: service config manifest (YAML)
//! - [`server`]: axum wiring

pub mod batch;
pub mod config;
pub mod dispatch;
pub mod headers;
pub mod origin;
pub mod request;
pub mod response;
pub mod server;
