use anyhow::Result;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::ToolCall;
use crate::prompt_template::system_prompt;
use crate::providers::base::Provider;
use crate::request::DEFAULT_MAX_ITERATIONS;
use crate::tools::ToolSet;

pub const MAX_ITERATIONS_MESSAGE: &str = "Agent stopped due to max iterations.";

/// Agent integrates a foundational LLM with the tools of one request
pub struct Agent {
    provider: Arc<dyn Provider>,
    tools: ToolSet,
    instructions: Option<String>,
    max_iterations: usize,
}

impl Agent {
    /// Create a new Agent with the specified provider and tools
    pub fn new(provider: Arc<dyn Provider>, tools: ToolSet) -> Self {
        Self {
            provider,
            tools,
            instructions: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Dispatch a single tool call to the matching tool
    async fn dispatch_tool_call(
        &self,
        tool_call: AgentResult<ToolCall>,
    ) -> AgentResult<Vec<Content>> {
        let call = tool_call?;
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
        tracing::debug!(tool = %call.name, "calling tool");
        tool.call(call.arguments).await
    }

    fn get_system_prompt(&self) -> AgentResult<String> {
        system_prompt(&self.tools.descriptors(), self.instructions.as_deref())
            .map_err(|e| AgentError::Internal(e.to_string()))
    }

    /// Create a stream that yields each message as it's generated by the agent.
    /// This includes both the assistant's responses and any tool responses.
    ///
    /// The loop ends when the model answers without tool calls, or with a
    /// final assistant message once `max_iterations` model calls still asked
    /// for tools.
    pub async fn reply(&self, messages: &[Message]) -> Result<BoxStream<'_, Result<Message>>> {
        let mut messages = messages.to_vec();
        let tools = self.tools.descriptors();
        let system_prompt = self.get_system_prompt()?;

        Ok(Box::pin(async_stream::try_stream! {
            let mut iterations = 0;
            loop {
                if iterations == self.max_iterations {
                    tracing::warn!(iterations, "agent reached max iterations");
                    yield Message::assistant().with_text(MAX_ITERATIONS_MESSAGE);
                    break;
                }
                iterations += 1;

                // Get completion from provider
                let (response, _) = self.provider.complete(
                    &system_prompt,
                    &messages,
                    &tools,
                ).await?;

                yield response.clone();

                // Ensures the response above reaches the consumer before
                // potentially long-running tools start
                tokio::task::yield_now().await;

                let tool_requests: Vec<&ToolRequest> = response.tool_requests().collect();
                if tool_requests.is_empty() {
                    break;
                }

                // Dispatch all requests of this round concurrently and wait for all of them
                let futures: Vec<_> = tool_requests
                    .iter()
                    .map(|request| self.dispatch_tool_call(request.tool_call.clone()))
                    .collect();
                let outputs = futures::future::join_all(futures).await;

                let mut message_tool_response = Message::user();
                for (request, output) in tool_requests.iter().zip(outputs.into_iter()) {
                    message_tool_response = message_tool_response.with_tool_response(
                        request.id.clone(),
                        output,
                    );
                }

                yield message_tool_response.clone();

                messages.push(response);
                messages.push(message_tool_response);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::MessageContent;
    use crate::models::tool::Tool;
    use crate::providers::mock::MockProvider;
    use crate::tools::AgentTool;
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use serde_json::{json, Value};

    struct EchoTool {
        tool: Tool,
    }

    impl EchoTool {
        fn new() -> Self {
            Self {
                tool: Tool::new(
                    "echo",
                    "Echoes back the input",
                    json!({"type": "object", "properties": {"message": {"type": "string"}}, "required": ["message"]}),
                ),
            }
        }
    }

    #[async_trait]
    impl AgentTool for EchoTool {
        fn tool(&self) -> &Tool {
            &self.tool
        }

        async fn call(&self, arguments: Value) -> AgentResult<Vec<Content>> {
            Ok(vec![Content::text(
                arguments["message"].as_str().unwrap_or(""),
            )])
        }
    }

    fn agent(responses: Vec<Message>) -> Agent {
        let echo: Arc<dyn AgentTool> = Arc::new(EchoTool::new());
        Agent::new(Arc::new(MockProvider::new(responses)), ToolSet::new(vec![echo]))
    }

    async fn collect(agent: &Agent, prompt: &str) -> Result<Vec<Message>> {
        let initial_messages = vec![Message::user().with_text(prompt)];
        let mut stream = agent.reply(&initial_messages).await?;
        let mut messages = Vec::new();
        while let Some(msg) = stream.try_next().await? {
            messages.push(msg);
        }
        Ok(messages)
    }

    #[tokio::test]
    async fn test_simple_response() -> Result<()> {
        let response = Message::assistant().with_text("Hello!");
        let agent = agent(vec![response.clone()]);

        let messages = collect(&agent, "Hi").await?;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0], response);
        Ok(())
    }

    #[tokio::test]
    async fn test_tool_call() -> Result<()> {
        let agent = agent(vec![
            Message::assistant()
                .with_tool_request("1", Ok(ToolCall::new("echo", json!({"message": "test"})))),
            Message::assistant().with_text("Done!"),
        ]);

        let messages = collect(&agent, "Echo test").await?;

        // Should have three messages: tool request, response, and model text
        assert_eq!(messages.len(), 3);
        assert!(messages[0]
            .content
            .iter()
            .any(|c| matches!(c, MessageContent::ToolRequest(_))));
        let response = messages[1].content[0].as_tool_response().unwrap();
        assert_eq!(response.tool_result, Ok(vec![Content::text("test")]));
        assert_eq!(messages[2].content[0], MessageContent::text("Done!"));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_tool() -> Result<()> {
        let agent = agent(vec![
            Message::assistant()
                .with_tool_request("1", Ok(ToolCall::new("invalid_tool", json!({})))),
            Message::assistant().with_text("Error occurred"),
        ]);

        let messages = collect(&agent, "Invalid tool").await?;

        // Should have three messages: failed tool request, fail response, and model text
        assert_eq!(messages.len(), 3);
        let response = messages[1].content[0].as_tool_response().unwrap();
        assert_eq!(
            response.tool_result,
            Err(AgentError::ToolNotFound("invalid_tool".to_string()))
        );
        assert_eq!(
            messages[2].content[0],
            MessageContent::text("Error occurred")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_tool_calls() -> Result<()> {
        let agent = agent(vec![
            Message::assistant()
                .with_tool_request("1", Ok(ToolCall::new("echo", json!({"message": "first"}))))
                .with_tool_request("2", Ok(ToolCall::new("echo", json!({"message": "second"})))),
            Message::assistant().with_text("All done!"),
        ]);

        let messages = collect(&agent, "Multiple calls").await?;

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content.len(), 2);
        assert_eq!(messages[2].content[0], MessageContent::text("All done!"));
        Ok(())
    }

    #[tokio::test]
    async fn test_stops_at_max_iterations() -> Result<()> {
        let looping = || {
            Message::assistant()
                .with_tool_request("1", Ok(ToolCall::new("echo", json!({"message": "again"}))))
        };
        let agent = agent(vec![looping(), looping(), looping()]).with_max_iterations(2);

        let messages = collect(&agent, "loop").await?;

        // two rounds of request and response, then the stop message
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[4].text(), MAX_ITERATIONS_MESSAGE);
        Ok(())
    }
}
