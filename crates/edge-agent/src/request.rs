use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::bridge::OutputMode;
use crate::errors::{PipelineError, PipelineResult};
use crate::models::message::Message;

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// A chat message as sent by the caller.
///
/// `content` is either a plain string or a list of typed parts, of which
/// only the `text` parts are used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub role: String,
    #[serde(default)]
    pub content: Value,
}

impl RequestMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Value::String(content.into()),
        }
    }

    pub fn text(&self) -> String {
        match &self.content {
            Value::String(text) => text.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }
}

/// The JSON body of an agent invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub messages: Vec<RequestMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
    #[serde(default)]
    pub return_intermediate_steps: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_tools: Option<Vec<String>>,
    /// Remaining agent parameters, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentRequest {
    /// Decode a request body. An empty body is an empty request.
    pub fn from_slice(body: &[u8]) -> PipelineResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| PipelineError::Parse(format!("invalid request body: {}", e)))
    }

    pub fn output_mode(&self) -> OutputMode {
        if self.stream {
            OutputMode::Streaming
        } else {
            OutputMode::Buffered
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_ITERATIONS)
    }

    /// Split the caller's messages into system instructions and conversation.
    pub fn conversation(&self) -> PipelineResult<(Option<String>, Vec<Message>)> {
        let mut instructions = Vec::new();
        let mut conversation = Vec::new();
        for message in &self.messages {
            let text = message.text();
            match message.role.as_str() {
                "system" => instructions.push(text),
                "user" => conversation.push(Message::user().with_text(text)),
                "assistant" => conversation.push(Message::assistant().with_text(text)),
                other => tracing::warn!(role = other, "skipping message with unknown role"),
            }
        }

        if conversation.is_empty() {
            return Err(PipelineError::Construction(
                "at least one user or assistant message is required".to_string(),
            ));
        }
        let instructions = (!instructions.is_empty()).then(|| instructions.join("\n"));
        Ok((instructions, conversation))
    }
}
