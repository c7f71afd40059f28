//! Runs the agent for one request and writes its output to the channel.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::Agent;
use crate::bridge::{EventWriter, OutputMode, OutputStream, ResponseBody};
use crate::errors::{PipelineError, PipelineResult};
use crate::models::content::join_text;
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::providers::base::Provider;
use crate::request::AgentRequest;
use crate::tools::ToolSet;

/// Everything an execution unit needs for one run.
///
/// `writer` is the only sender of `output`; once the unit drops it (and every
/// tool callback holding it) the output stream ends.
pub struct ExecutionContext {
    pub request: AgentRequest,
    pub model: Arc<dyn Provider>,
    pub tools: ToolSet,
    pub writer: Arc<EventWriter>,
    pub output: OutputStream,
}

/// Starts a run and hands back its output stream.
#[async_trait]
pub trait ExecutionUnit: Send + Sync {
    async fn execute(&self, context: ExecutionContext) -> PipelineResult<OutputStream>;
}

/// One tool invocation and what it returned, reported when the caller asks
/// for intermediate steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntermediateStep {
    pub tool: String,
    pub tool_input: Value,
    pub observation: String,
}

/// Runs the tool calling agent on a spawned task.
///
/// Streaming callers get a `ResponseBody` frame per model answer and per tool
/// call. Buffered callers get one terminal document: the final answer with
/// the collected tool events, or `{"error": ...}`.
#[derive(Debug, Clone, Default)]
pub struct AgentApi;

#[async_trait]
impl ExecutionUnit for AgentApi {
    async fn execute(&self, context: ExecutionContext) -> PipelineResult<OutputStream> {
        let ExecutionContext {
            request,
            model,
            tools,
            writer,
            output,
        } = context;

        let (instructions, messages) = request.conversation()?;
        let agent = Agent::new(model, tools)
            .with_instructions(instructions)
            .with_max_iterations(request.max_iterations());
        let run = Run {
            writer,
            return_intermediate_steps: request.return_intermediate_steps,
        };

        tokio::spawn(async move {
            if let Err(error) = run.drive(agent, messages).await {
                tracing::debug!(%error, "agent output was not delivered");
            }
        });
        Ok(output)
    }
}

struct Run {
    writer: Arc<EventWriter>,
    return_intermediate_steps: bool,
}

impl Run {
    fn streaming(&self) -> bool {
        self.writer.mode() == OutputMode::Streaming
    }

    async fn drive(self, agent: Agent, messages: Vec<Message>) -> PipelineResult<()> {
        match self.collect(&agent, &messages).await {
            Ok((answer, steps)) => {
                tracing::info!(steps = steps.len(), "agent run finished");
                if self.streaming() {
                    return Ok(());
                }
                let mut document = json!({
                    "isSuccess": true,
                    "message": answer,
                    "events": self.writer.take_events(),
                });
                if self.return_intermediate_steps {
                    document["intermediateSteps"] = serde_json::to_value(&steps)
                        .map_err(|e| PipelineError::Execution(e.to_string()))?;
                }
                self.writer.write_document(&document).await
            }
            Err(RunError::Delivery(error)) => Err(error),
            Err(RunError::Agent(message)) => {
                tracing::warn!(error = %message, "agent run failed");
                if self.streaming() {
                    self.writer.write_frame(&ResponseBody::failure(message)).await
                } else {
                    self.writer.write_document(&json!({ "error": message })).await
                }
            }
        }
    }

    async fn collect(
        &self,
        agent: &Agent,
        messages: &[Message],
    ) -> Result<(String, Vec<IntermediateStep>), RunError> {
        let mut replies = agent
            .reply(messages)
            .await
            .map_err(|e| RunError::Agent(e.to_string()))?;

        let mut answer = String::new();
        let mut pending: HashMap<String, (String, Value)> = HashMap::new();
        let mut steps = Vec::new();

        while let Some(message) = replies.next().await {
            let message = message.map_err(|e| RunError::Agent(e.to_string()))?;
            for content in &message.content {
                match content {
                    MessageContent::Text(text) if message.role == Role::Assistant => {
                        if text.text.trim().is_empty() {
                            continue;
                        }
                        answer = text.text.clone();
                        if self.streaming() {
                            self.writer
                                .write_frame(&ResponseBody::text(&text.text))
                                .await
                                .map_err(RunError::Delivery)?;
                        }
                    }
                    MessageContent::ToolRequest(request) => {
                        let Ok(call) = &request.tool_call else {
                            continue;
                        };
                        pending.insert(
                            request.id.clone(),
                            (call.name.clone(), call.arguments.clone()),
                        );
                        if self.streaming() {
                            let frame = ResponseBody::tool(&call.name, call.arguments.to_string());
                            self.writer
                                .write_frame(&frame)
                                .await
                                .map_err(RunError::Delivery)?;
                        }
                    }
                    MessageContent::ToolResponse(response) => {
                        let Some((tool, tool_input)) = pending.remove(&response.id) else {
                            continue;
                        };
                        let observation = match &response.tool_result {
                            Ok(contents) => join_text(contents),
                            Err(error) => error.to_string(),
                        };
                        steps.push(IntermediateStep {
                            tool,
                            tool_input,
                            observation,
                        });
                    }
                    MessageContent::Text(_) => {}
                }
            }
        }
        Ok((answer, steps))
    }
}

enum RunError {
    /// The model or the agent loop failed; reported to the caller.
    Agent(String),
    /// The consumer went away; nothing more can be written.
    Delivery(PipelineError),
}
