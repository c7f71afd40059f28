use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One unit of streamed output emitted by a tool callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub message: String,
}

impl EventEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A frame written by the agent executor while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    pub is_success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_tool_message: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ResponseBody {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            is_success: true,
            message: message.into(),
            is_tool_message: false,
            tool_name: None,
        }
    }

    pub fn tool(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            is_success: true,
            message: message.into(),
            is_tool_message: true,
            tool_name: Some(name.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            message: message.into(),
            is_tool_message: false,
            tool_name: None,
        }
    }
}

/// Frame a payload as `data: <json>\n\n`
pub fn sse_frame<T: Serialize>(payload: &T) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(payload)?;
    Ok(Bytes::from(format!("data: {}\n\n", json)))
}
