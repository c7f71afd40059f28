use std::sync::Arc;
use url::Url;

use super::base::{Embeddings, Provider};
use super::configs::{EmbeddingsConfig, OpenAiProviderConfig, DEFAULT_EMBEDDINGS_MODEL};
use super::embeddings::OpenAiEmbeddings;
use super::openai::OpenAiProvider;
use crate::credentials::Credentials;
use crate::errors::{PipelineError, PipelineResult};

/// Builds the request scoped model and embeddings clients.
///
/// Both clients are bound to the same resolved credentials. Errors are
/// construction failures and end the request.
pub trait ClientFactory: Send + Sync {
    fn model(&self, credentials: &Credentials, model: &str) -> PipelineResult<Arc<dyn Provider>>;

    fn embeddings(&self, credentials: &Credentials) -> PipelineResult<Arc<dyn Embeddings>>;
}

/// Clients for OpenAI compatible endpoints with deterministic generation
#[derive(Debug, Clone)]
pub struct OpenAiClientFactory {
    embeddings_model: String,
}

impl Default for OpenAiClientFactory {
    fn default() -> Self {
        Self {
            embeddings_model: DEFAULT_EMBEDDINGS_MODEL.to_string(),
        }
    }
}

impl OpenAiClientFactory {
    pub fn with_embeddings_model(mut self, model: impl Into<String>) -> Self {
        self.embeddings_model = model.into();
        self
    }
}

fn validate_base_url(base_url: &str) -> PipelineResult<()> {
    let url = Url::parse(base_url)
        .map_err(|e| PipelineError::Construction(format!("invalid base URL {}: {}", base_url, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(PipelineError::Construction(format!(
            "unsupported base URL scheme: {}",
            scheme
        ))),
    }
}

impl ClientFactory for OpenAiClientFactory {
    fn model(&self, credentials: &Credentials, model: &str) -> PipelineResult<Arc<dyn Provider>> {
        validate_base_url(&credentials.base_url)?;
        if model.trim().is_empty() {
            return Err(PipelineError::Construction(
                "a model name is required".to_string(),
            ));
        }

        let provider = OpenAiProvider::new(OpenAiProviderConfig {
            host: credentials.base_url.clone(),
            api_key: credentials.api_key.clone(),
            model: model.to_string(),
            temperature: Some(0.0),
            max_tokens: None,
        })
        .map_err(|e| PipelineError::Construction(e.to_string()))?;
        Ok(Arc::new(provider))
    }

    fn embeddings(&self, credentials: &Credentials) -> PipelineResult<Arc<dyn Embeddings>> {
        validate_base_url(&credentials.base_url)?;
        let embeddings = OpenAiEmbeddings::new(EmbeddingsConfig {
            host: credentials.base_url.clone(),
            api_key: credentials.api_key.clone(),
            model: self.embeddings_model.clone(),
        })
        .map_err(|e| PipelineError::Construction(e.to_string()))?;
        Ok(Arc::new(embeddings))
    }
}
