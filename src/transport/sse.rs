//! Push adapter over server-sent events.
//!
//! `GET {events_url}/agents/{agent_id}/events` streams named events for every
//! execution of that agent. The adapter never reconnects on its own: the
//! first error closes the source and ends the stream.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest_eventsource::{Event, EventSource};
use serde_json::Value;
use tracing::{debug, info};

use super::{EventChannel, FrameStream, WireFrame};
use crate::error::TransportError;
use crate::util::join_url;

/// Default SSE event name when the server does not set one.
const DEFAULT_EVENT: &str = "message";

#[derive(Clone)]
pub struct SseEventChannel {
    base_url: String,
    client: reqwest::Client,
    token: Option<String>,
}

impl SseEventChannel {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            client: reqwest::Client::new(),
            token,
        }
    }

    pub fn events_url(&self, agent_id: &str) -> String {
        join_url(&self.base_url, &["agents", agent_id, "events"])
    }
}

#[async_trait]
impl EventChannel for SseEventChannel {
    fn name(&self) -> &str {
        "sse"
    }

    async fn connect(&self, agent_id: &str) -> Result<FrameStream, TransportError> {
        let url = self.events_url(agent_id);
        let mut request = self.client.get(&url).header(ACCEPT, "text/event-stream");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let mut source = EventSource::new(request)
            .map_err(|e| TransportError::connect(format!("cannot open {}: {}", url, e)))?;

        // Wait for the open (or the first failure) so connect errors surface here.
        let first = match source.next().await {
            Some(Ok(Event::Open)) => None,
            Some(Ok(Event::Message(message))) => Some(frame_from_message(&message.event, &message.data)),
            Some(Err(err)) => {
                source.close();
                return Err(map_error(err));
            }
            None => return Err(TransportError::closed("event stream ended before opening")),
        };
        info!(agent_id = %agent_id, "Event stream connected");

        let stream = async_stream::stream! {
            if let Some(frame) = first {
                yield Ok(frame);
            }
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => continue,
                    Ok(Event::Message(message)) => {
                        yield Ok(frame_from_message(&message.event, &message.data));
                    }
                    Err(err) => {
                        source.close();
                        let err = map_error(err);
                        debug!("Event stream closed: {}", err);
                        yield Err(err);
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Build a frame from an SSE message.
///
/// Data that is not JSON is kept as a string value. Unnamed messages may
/// carry an envelope `{"event": name, "data": payload}`; it is unwrapped.
pub fn frame_from_message(event: &str, data: &str) -> WireFrame {
    let value = serde_json::from_str::<Value>(data).unwrap_or_else(|_| Value::String(data.to_string()));
    if event.is_empty() || event == DEFAULT_EVENT {
        if let Some((name, payload)) = unwrap_envelope(&value) {
            return WireFrame::new(name, payload);
        }
    }
    let name = if event.is_empty() { DEFAULT_EVENT } else { event };
    WireFrame::new(name, value)
}

fn unwrap_envelope(value: &Value) -> Option<(String, Value)> {
    let map = value.as_object()?;
    let name = map.get("event").and_then(|v| v.as_str())?;
    let payload = map
        .get("data")
        .or_else(|| map.get("payload"))
        .cloned()
        .unwrap_or(Value::Null);
    Some((name.to_string(), payload))
}

fn map_error(err: reqwest_eventsource::Error) -> TransportError {
    use reqwest_eventsource::Error;
    match err {
        Error::Transport(e) => TransportError::from(e),
        Error::InvalidStatusCode(status, _) => {
            TransportError::http(status.as_u16(), "event stream request rejected")
        }
        Error::InvalidContentType(content_type, _) => {
            TransportError::decode(format!("unexpected content type {:?}", content_type))
        }
        Error::StreamEnded => TransportError::closed("event stream ended"),
        other => TransportError::decode(other.to_string()),
    }
}
