use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use edge_agent::errors::PipelineError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a configuration key such as `provider.api_key` to its environment variable
pub fn to_env_var(field_path: &str) -> String {
    format!(
        "EDGE_AGENT_{}",
        field_path.to_uppercase().replace('.', "__")
    )
}

/// The single place where pipeline failures become HTTP responses.
///
/// Every stage reports `500` with `{"error": <message>}`.
#[derive(Debug)]
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(stage = self.0.stage(), error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}
