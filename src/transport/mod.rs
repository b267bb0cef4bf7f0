pub mod registry;
pub mod rest;
pub mod sse;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;

use crate::error::TransportError;
use crate::execution::ExecutionSnapshot;

pub use registry::{AgentSubscription, ChannelMessage, ConnectionRegistry};
pub use rest::RestExecutionApi;
pub use sse::SseEventChannel;

/// One named event as it came off the push channel, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct WireFrame {
    pub event: String,
    pub data: Value,
}

impl WireFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

pub type FrameStream = BoxStream<'static, Result<WireFrame, TransportError>>;

/// Push side: a per-agent stream of named events.
///
/// A stream ends (or yields an error) when the connection drops. Reconnects
/// are not transparent; callers subscribe again.
#[async_trait]
pub trait EventChannel: Send + Sync {
    fn name(&self) -> &str;
    async fn connect(&self, agent_id: &str) -> Result<FrameStream, TransportError>;
}

/// Server acknowledgement of a cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelAck {
    /// False when the server reports nothing to cancel (already terminal).
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Pull side: snapshot polling and cancellation.
#[async_trait]
pub trait ExecutionApi: Send + Sync {
    async fn fetch_snapshot(&self, execution_id: &str) -> Result<ExecutionSnapshot, TransportError>;
    async fn cancel(&self, execution_id: &str) -> Result<CancelAck, TransportError>;
}
