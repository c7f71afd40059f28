//! Credential resolution, assembly, execution and bridging for one request.

use std::sync::Arc;
use std::time::Duration;

use crate::bridge::{self, event_callback, output_channel, BridgeResponse};
use crate::credentials::{resolve, CredentialService};
use crate::errors::PipelineResult;
use crate::executor::{ExecutionContext, ExecutionUnit};
use crate::providers::factory::ClientFactory;
use crate::request::AgentRequest;
use crate::tools::{ToolContext, ToolFactory};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Frames buffered before writers wait for the consumer
    pub channel_capacity: usize,
    /// Upper bound for draining a buffered run; unbounded when `None`
    pub drain_timeout: Option<Duration>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            drain_timeout: None,
        }
    }
}

/// The collaborators that turn an authenticated request into a response.
///
/// Holds only immutable handles; every client, tool and channel it creates
/// belongs to a single request.
#[derive(Clone)]
pub struct Pipeline {
    credentials: Arc<dyn CredentialService>,
    clients: Arc<dyn ClientFactory>,
    tools: Arc<dyn ToolFactory>,
    executor: Arc<dyn ExecutionUnit>,
    settings: BridgeSettings,
}

impl Pipeline {
    pub fn new(
        credentials: Arc<dyn CredentialService>,
        clients: Arc<dyn ClientFactory>,
        tools: Arc<dyn ToolFactory>,
        executor: Arc<dyn ExecutionUnit>,
    ) -> Self {
        Self {
            credentials,
            clients,
            tools,
            executor,
            settings: BridgeSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: BridgeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> BridgeSettings {
        self.settings
    }

    /// Run one request after the gate has let it through.
    pub async fn run(&self, token: &str, request: AgentRequest) -> PipelineResult<BridgeResponse> {
        let mode = request.output_mode();
        tracing::info!(model = %request.model, ?mode, "agent request");

        let credentials =
            resolve(self.credentials.as_ref(), token, request.base_url.as_deref()).await?;

        let model = self.clients.model(&credentials, &request.model)?;
        let embeddings = self.clients.embeddings(&credentials)?;

        let (writer, output) = output_channel(self.settings.channel_capacity, mode);
        let mut tools = self
            .tools
            .build(ToolContext {
                api_key: credentials.api_key.clone(),
                base_url: credentials.base_url.clone(),
                model: Arc::clone(&model),
                embeddings,
                on_event: event_callback(Arc::clone(&writer)),
            })
            .await?;
        if let Some(names) = &request.use_tools {
            tools.retain_named(names);
        }
        tracing::debug!(tools = ?tools, "assembled agent");

        let output = self
            .executor
            .execute(ExecutionContext {
                request,
                model,
                tools,
                writer,
                output,
            })
            .await?;

        bridge::respond(output, mode, self.settings.drain_timeout).await
    }
}
