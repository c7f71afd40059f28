use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from a single tool call. These are handed back to the model as the
/// tool's output instead of failing the run.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// A failure in one stage of the request pipeline.
///
/// The display text is the bare message so the HTTP boundary can hand it to
/// the caller as `{"error": <message>}` without any stage prefix.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Credential or base URL resolution failed.
    #[error("{0}")]
    Resolution(String),

    /// A model client, embeddings client or tool could not be built.
    #[error("{0}")]
    Construction(String),

    /// The execution unit failed to start or its output stream aborted.
    #[error("{0}")]
    Execution(String),

    /// The request body or the aggregated result is not the expected JSON.
    #[error("{0}")]
    Parse(String),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Resolution(_) => "resolution",
            PipelineError::Construction(_) => "construction",
            PipelineError::Execution(_) => "execution",
            PipelineError::Parse(_) => "parse",
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
