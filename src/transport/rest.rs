//! Pull adapter: execution snapshot polling and cancellation over REST.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use super::{CancelAck, ExecutionApi};
use crate::error::TransportError;
use crate::execution::ExecutionSnapshot;
use crate::util::{join_url, truncate_for_log};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct RestExecutionApi {
    base_url: String,
    client: reqwest::Client,
    token: Option<String>,
}

impl RestExecutionApi {
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

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ExecutionApi for RestExecutionApi {
    async fn fetch_snapshot(&self, execution_id: &str) -> Result<ExecutionSnapshot, TransportError> {
        let url = join_url(&self.base_url, &["executions", execution_id]);
        let resp = self
            .authorize(self.client.get(&url))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(TransportError::http(
                status.as_u16(),
                format!("GET {} failed: {}", url, truncate_for_log(&text, 200)),
            ));
        }
        parse_snapshot(&text)
    }

    async fn cancel(&self, execution_id: &str) -> Result<CancelAck, TransportError> {
        let url = join_url(&self.base_url, &["executions", execution_id, "cancel"]);
        let resp = self
            .authorize(self.client.post(&url))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        cancel_ack(status, &text)
    }
}

/// Parse a snapshot body. Accepts the bare execution object or one wrapped
/// in `{"execution": ...}` / `{"data": ...}`.
pub fn parse_snapshot(body: &str) -> Result<ExecutionSnapshot, TransportError> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        TransportError::decode(format!(
            "invalid snapshot JSON ({}): {}",
            e,
            truncate_for_log(body, 200)
        ))
    })?;
    let inner = match value {
        Value::Object(map) => {
            let wrapped = ["execution", "data"]
                .iter()
                .find_map(|key| map.get(*key).filter(|v| v.is_object()).cloned());
            wrapped.unwrap_or(Value::Object(map))
        }
        _ => return Err(TransportError::decode("snapshot is not a JSON object")),
    };
    serde_json::from_value(inner).map_err(|e| TransportError::decode(format!("invalid snapshot: {}", e)))
}

/// Cancel is safe on terminal executions: a conflict/gone answer is an
/// unaccepted acknowledgement, not an error.
fn cancel_ack(status: StatusCode, body: &str) -> Result<CancelAck, TransportError> {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
        .or_else(|| (!body.trim().is_empty()).then(|| truncate_for_log(body.trim(), 200)));

    if status.is_success() {
        return Ok(CancelAck {
            accepted: true,
            message,
        });
    }
    if status == StatusCode::CONFLICT || status == StatusCode::GONE {
        return Ok(CancelAck {
            accepted: false,
            message,
        });
    }
    Err(TransportError::http(
        status.as_u16(),
        message.unwrap_or_else(|| format!("cancel failed with {}", status)),
    ))
}
