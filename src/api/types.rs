//! API request and response types.

use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Upstream execution API the sessions poll
    pub api_url: String,

    /// Snapshot poll cadence
    pub poll_interval_ms: u64,

    /// Whether the push channel is connected at all (false means poll-only)
    pub event_stream: bool,

    /// Name of the push channel, if any
    pub channel: Option<String>,

    /// Number of live sessions
    pub sessions: usize,

    /// Agents with an open push connection
    pub subscribed_agents: Vec<String>,
}

/// Request to start reconciling an execution.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchRequest {
    #[serde(alias = "agentId")]
    pub agent_id: String,

    #[serde(alias = "executionId")]
    pub execution_id: String,
}

/// Response after asking a session to cancel.
#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub execution_id: String,

    /// The session took the request; the server confirmation arrives later
    /// through the view.
    pub cancel_requested: bool,
}
