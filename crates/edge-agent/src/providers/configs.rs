use std::fmt;

/// Settings for an OpenAI compatible chat completions endpoint.
///
/// `host` is the full API base, including the `/v1` segment.
#[derive(Clone)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

/// Settings for an OpenAI compatible embeddings endpoint.
#[derive(Clone)]
pub struct EmbeddingsConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
}

pub const DEFAULT_EMBEDDINGS_MODEL: &str = "text-embedding-ada-002";

// api keys never reach the logs
impl fmt::Debug for OpenAiProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProviderConfig")
            .field("host", &self.host)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl fmt::Debug for EmbeddingsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingsConfig")
            .field("host", &self.host)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}
