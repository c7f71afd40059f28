use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use edge_agent::pipeline::{BridgeSettings as PipelineBridgeSettings, DEFAULT_CHANNEL_CAPACITY};
use edge_agent::providers::configs::DEFAULT_EMBEDDINGS_MODEL;
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// Server side provider credentials, used when the caller brings no key
#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_embeddings_model")]
    pub embeddings_model: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            embeddings_model: default_embeddings_model(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthSettings {
    /// Comma separated access codes; empty means no code is required
    #[serde(default)]
    pub codes: String,
    #[serde(default)]
    pub hide_user_api_key: bool,
}

impl AuthSettings {
    pub fn codes(&self) -> Vec<String> {
        self.codes
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct BridgeSettings {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub drain_timeout_secs: Option<u64>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            drain_timeout_secs: None,
        }
    }
}

impl BridgeSettings {
    pub fn to_pipeline(&self) -> PipelineBridgeSettings {
        PipelineBridgeSettings {
            channel_capacity: self.channel_capacity.max(1),
            drain_timeout: self
                .drain_timeout_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub bridge: BridgeSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        // Start with default configuration
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("bridge.channel_capacity", default_channel_capacity() as u64)?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("EDGE_AGENT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Handle missing field errors specially
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // Extract field name from error message "missing field `type`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_embeddings_model() -> String {
    DEFAULT_EMBEDDINGS_MODEL.to_string()
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}
