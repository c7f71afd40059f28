//! Decides what an aggregated agent result means for the caller.

use http::StatusCode;
use serde_json::{json, Map, Value};

pub const UNEXPECTED_RESPONSE: &str = "Unexpected response received from agentApi.getApiHandler";

/// The three outcomes of a buffered run, decoded once from the parsed document.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    /// `isSuccess` was truthy; the payload is returned as is.
    Success(Map<String, Value>),
    /// No success marker but an `error` field; the payload is preserved.
    Failure(Map<String, Value>),
    /// Neither marker was present.
    Unrecognized(Map<String, Value>),
}

/// Truthiness as the callers of this API understand it: `false`, `null`, `0`
/// and `""` are falsy, everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl AgentOutcome {
    pub fn classify(document: Map<String, Value>) -> Self {
        let flag = |key: &str| document.get(key).is_some_and(is_truthy);
        if flag("isSuccess") {
            AgentOutcome::Success(document)
        } else if flag("error") {
            AgentOutcome::Failure(document)
        } else {
            AgentOutcome::Unrecognized(document)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AgentOutcome::Success(_) => StatusCode::OK,
            AgentOutcome::Failure(_) | AgentOutcome::Unrecognized(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The JSON body sent to the caller
    pub fn into_body(self) -> Value {
        match self {
            AgentOutcome::Success(document) | AgentOutcome::Failure(document) => {
                Value::Object(document)
            }
            AgentOutcome::Unrecognized(_) => json!({ "error": UNEXPECTED_RESPONSE }),
        }
    }
}
