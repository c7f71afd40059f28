//! Tools the agent can call while answering a request.

pub mod calculator;
pub mod dalle;
pub mod web_browser;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::bridge::EventCallback;
use crate::errors::{AgentError, AgentResult, PipelineError, PipelineResult};
use crate::models::content::Content;
use crate::models::tool::Tool;
use crate::providers::base::{Embeddings, Provider};

pub use calculator::Calculator;
pub use dalle::DallE;
pub use web_browser::WebBrowser;

/// A single tool the agent can invoke
#[async_trait]
pub trait AgentTool: Send + Sync {
    /// Name, description and JSON schema of the arguments
    fn tool(&self) -> &Tool;

    /// Run the tool. Errors are returned to the model, they do not end the run.
    async fn call(&self, arguments: Value) -> AgentResult<Vec<Content>>;
}

/// The ordered tools available to one request
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn AgentTool>>,
}

impl ToolSet {
    pub fn new(tools: Vec<Arc<dyn AgentTool>>) -> Self {
        Self { tools }
    }

    pub fn push(&mut self, tool: Arc<dyn AgentTool>) {
        self.tools.push(tool);
    }

    pub fn descriptors(&self) -> Vec<Tool> {
        self.tools.iter().map(|t| t.tool().clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.tool().name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AgentTool>> {
        self.tools.iter().find(|t| t.tool().name == name)
    }

    /// Keep only the named tools, preserving their original order
    pub fn retain_named(&mut self, names: &[String]) {
        self.tools.retain(|t| names.iter().any(|n| *n == t.tool().name));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Everything a tool may need, bound to one request's credentials
#[derive(Clone)]
pub struct ToolContext {
    pub api_key: String,
    pub base_url: String,
    pub model: Arc<dyn Provider>,
    pub embeddings: Arc<dyn Embeddings>,
    pub on_event: EventCallback,
}

#[async_trait]
pub trait ToolFactory: Send + Sync {
    async fn build(&self, context: ToolContext) -> PipelineResult<ToolSet>;
}

/// Calculator, image generation and web browsing
#[derive(Debug, Clone, Default)]
pub struct EdgeToolFactory;

#[async_trait]
impl ToolFactory for EdgeToolFactory {
    async fn build(&self, context: ToolContext) -> PipelineResult<ToolSet> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| PipelineError::Construction(format!("failed to build HTTP client: {}", e)))?;

        let mut tools = ToolSet::default();
        tools.push(Arc::new(Calculator::new()));
        tools.push(Arc::new(DallE::new(
            http.clone(),
            &context.api_key,
            &context.base_url,
            context.on_event.clone(),
        )));
        tools.push(Arc::new(WebBrowser::new(
            http,
            Arc::clone(&context.model),
            Arc::clone(&context.embeddings),
        )));
        tracing::debug!(tools = ?tools, "built tool set");
        Ok(tools)
    }
}

/// Read a required string argument
pub(crate) fn required_str<'a>(arguments: &'a Value, key: &str) -> AgentResult<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AgentError::InvalidParameters(format!("missing `{}` argument", key)))
}
