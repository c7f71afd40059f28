//! Turns an agent's chunked output into either a live event stream or a
//! single classified JSON document.

pub mod channel;
pub mod drain;
pub mod sse;

use std::time::Duration;

pub use channel::{
    collect_text, event_callback, output_channel, EventCallback, EventWriter, OutputStream,
    StreamError,
};
pub use drain::{drain, parse_document};
pub use sse::{sse_frame, EventEnvelope, ResponseBody};

use crate::classifier::AgentOutcome;
use crate::errors::PipelineResult;

/// How the caller wants to receive the agent's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Frames are forwarded as `text/event-stream` while the agent runs.
    Streaming,
    /// The stream is drained and the aggregate returned as one JSON body.
    #[default]
    Buffered,
}

/// What the bridge hands back to the HTTP layer.
pub enum BridgeResponse {
    Stream(OutputStream),
    Json(AgentOutcome),
}

impl std::fmt::Debug for BridgeResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeResponse::Stream(_) => f.write_str("Stream(..)"),
            BridgeResponse::Json(outcome) => f.debug_tuple("Json").field(outcome).finish(),
        }
    }
}

/// Bridge the execution output into a response.
///
/// Streaming mode hands the stream through untouched, no chunk is read here.
/// Buffered mode drains to end of stream before parsing and classifying.
pub async fn respond(
    stream: OutputStream,
    mode: OutputMode,
    drain_timeout: Option<Duration>,
) -> PipelineResult<BridgeResponse> {
    match mode {
        OutputMode::Streaming => Ok(BridgeResponse::Stream(stream)),
        OutputMode::Buffered => {
            let bytes = drain(stream, drain_timeout).await?;
            let document = parse_document(&bytes)?;
            Ok(BridgeResponse::Json(AgentOutcome::classify(document)))
        }
    }
}
