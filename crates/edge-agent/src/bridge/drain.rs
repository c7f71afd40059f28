use serde_json::{Map, Value};
use std::time::Duration;
use tokio_stream::StreamExt;

use super::channel::OutputStream;
use crate::errors::{PipelineError, PipelineResult};

/// Read the stream to exhaustion, concatenating chunks in arrival order.
///
/// Without a timeout this waits for as long as the producer keeps the
/// stream open.
pub async fn drain(stream: OutputStream, timeout: Option<Duration>) -> PipelineResult<Vec<u8>> {
    match timeout {
        None => read_all(stream).await,
        Some(limit) => tokio::time::timeout(limit, read_all(stream))
            .await
            .map_err(|_| {
                PipelineError::Execution(format!(
                    "agent did not finish within {} seconds",
                    limit.as_secs()
                ))
            })?,
    }
}

async fn read_all(mut stream: OutputStream) -> PipelineResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut chunks = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| PipelineError::Execution(e.to_string()))?;
        buffer.extend_from_slice(&chunk);
        chunks += 1;
    }
    tracing::debug!(chunks, bytes = buffer.len(), "drained agent output");
    Ok(buffer)
}

/// Decode the drained bytes as one UTF-8 JSON object.
pub fn parse_document(bytes: &[u8]) -> PipelineResult<Map<String, Value>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| PipelineError::Parse(format!("agent output is not valid UTF-8: {}", e)))?;
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(PipelineError::Parse(
            "agent output is not a JSON object".to_string(),
        )),
        Err(e) => Err(PipelineError::Parse(e.to_string())),
    }
}
