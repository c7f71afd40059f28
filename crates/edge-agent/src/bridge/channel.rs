use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::sse::{sse_frame, EventEnvelope};
use super::OutputMode;
use crate::errors::{PipelineError, PipelineResult};

/// Chunked output of one execution. Ends when every writer is dropped.
pub type OutputStream = BoxStream<'static, Result<Bytes, StreamError>>;

/// Raised inside the output stream when a run aborts mid-stream.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StreamError(pub String);

/// Callback handed to tools so they can emit partial output before they return.
pub type EventCallback = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// The only holder of the sending half of a request's output channel.
///
/// Tool callbacks and the executor both write through the same writer, so
/// frames land on the channel in the order they were produced. Every write
/// first waits for channel capacity.
pub struct EventWriter {
    tx: mpsc::Sender<Result<Bytes, StreamError>>,
    mode: OutputMode,
    events: Mutex<Vec<String>>,
}

/// Create the bounded output channel for one request.
pub fn output_channel(capacity: usize, mode: OutputMode) -> (Arc<EventWriter>, OutputStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let writer = EventWriter {
        tx,
        mode,
        events: Mutex::new(Vec::new()),
    };
    (Arc::new(writer), Box::pin(ReceiverStream::new(rx)))
}

impl EventWriter {
    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, item: Result<Bytes, StreamError>) -> PipelineResult<()> {
        let permit = self.tx.reserve().await.map_err(|_| {
            PipelineError::Execution("output stream was closed by the consumer".to_string())
        })?;
        permit.send(item);
        Ok(())
    }

    /// Write one `data:` frame.
    pub async fn write_frame<T: Serialize>(&self, payload: &T) -> PipelineResult<()> {
        let frame = sse_frame(payload).map_err(|e| PipelineError::Execution(e.to_string()))?;
        self.send(Ok(frame)).await
    }

    /// Write a whole JSON document as a single chunk.
    pub async fn write_document<T: Serialize>(&self, payload: &T) -> PipelineResult<()> {
        let bytes =
            serde_json::to_vec(payload).map_err(|e| PipelineError::Execution(e.to_string()))?;
        self.send(Ok(Bytes::from(bytes))).await
    }

    /// Abort the stream; the consumer sees `message` as a stream error.
    pub async fn abort(&self, message: impl Into<String>) -> PipelineResult<()> {
        self.send(Err(StreamError(message.into()))).await
    }

    /// Emit a tool event.
    ///
    /// Streaming mode frames it immediately. Buffered mode keeps it for the
    /// terminal document, which must stay the only thing on the channel.
    pub async fn emit(&self, message: String) -> PipelineResult<()> {
        match self.mode {
            OutputMode::Streaming => self.write_frame(&EventEnvelope::new(message)).await,
            OutputMode::Buffered => {
                self.events
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(message);
                Ok(())
            }
        }
    }

    /// Events collected in buffered mode, in emission order
    pub fn take_events(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Wrap the writer as the callback tools receive.
pub fn event_callback(writer: Arc<EventWriter>) -> EventCallback {
    Arc::new(move |text: String| {
        let writer = Arc::clone(&writer);
        Box::pin(async move {
            if let Err(error) = writer.emit(text).await {
                tracing::debug!(%error, "dropping tool event");
            }
        })
    })
}

/// Collect a stream into its text for tests and diagnostics.
pub async fn collect_text(mut stream: OutputStream) -> Result<String, StreamError> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}
