//! Service configuration loaded from YAML.
//!
//! Intentionally small: listen address, the batch endpoint's mount path, a body cap for the outer
//! call, and the transport used for sub-request dispatch.

use std::net::SocketAddr;

use serde::Deserialize;

fn default_batch_path() -> String {
    "/batch".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_fallback_scheme() -> String {
    "http".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
/// How sub-requests reach the application.
pub enum TransportMode {
    /// Drive the host router directly, no network hop.
    #[default]
    InProcess,
    /// Loop back over real HTTP, re-anchored to the deployment's own origin.
    Http,
}

#[derive(Debug, Clone, Deserialize)]
/// Top-level service configuration.
pub struct FanoutConfig {
    /// Address the service listens on (e.g. `127.0.0.1:3000`).
    pub listen_addr: SocketAddr,

    #[serde(default = "default_batch_path")]
    /// Path the batch endpoint is mounted on.
    pub batch_path: String,

    #[serde(default = "default_max_body_bytes")]
    /// Maximum accepted outer-call body size.
    pub max_body_bytes: usize,

    #[serde(default)]
    /// Sub-request transport (in-process by default).
    pub transport: TransportMode,

    #[serde(default = "default_fallback_scheme")]
    /// Scheme assumed when no `x-forwarded-proto` header is present (http transport only).
    pub fallback_scheme: String,
}

impl FanoutConfig {
    /// Parse a YAML config from bytes.
    pub fn from_yaml_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_slice(bytes)?)
    }
}
