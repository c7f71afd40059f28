//! Resolves the provider API key and base URL for one request.

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use std::fmt;

use crate::errors::{PipelineError, PipelineResult};

/// Bearer tokens with this prefix are access codes, not provider keys.
pub const ACCESS_CODE_PREFIX: &str = "nk-";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Provider credentials resolved for a single request. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub base_url: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Extract the bearer token from the `Authorization` header.
///
/// The scheme text and surrounding whitespace are removed; a missing or
/// non UTF-8 header yields an empty token.
pub fn bearer_token(headers: &HeaderMap) -> String {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().replace("Bearer ", "").trim().to_string())
        .unwrap_or_default()
}

/// Source of the effective API key and base URL for a request.
#[async_trait]
pub trait CredentialService: Send + Sync {
    async fn resolve_api_key(&self, token: &str) -> PipelineResult<String>;

    async fn resolve_base_url(&self, requested: Option<&str>) -> PipelineResult<String>;
}

/// Resolve both halves of the credentials exactly once.
pub async fn resolve(
    service: &dyn CredentialService,
    token: &str,
    requested_base_url: Option<&str>,
) -> PipelineResult<Credentials> {
    let api_key = service.resolve_api_key(token).await?;
    let base_url = service.resolve_base_url(requested_base_url).await?;
    tracing::debug!(%base_url, "resolved provider credentials");
    Ok(Credentials { api_key, base_url })
}

/// Credential policy backed by the server configuration.
///
/// A caller token that is not an access code is the caller's own provider
/// key. Access codes and empty tokens fall back to the server key.
#[derive(Clone, Default)]
pub struct ServerCredentialService {
    api_key: Option<String>,
    base_url: Option<String>,
}

impl ServerCredentialService {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.filter(|u| !u.trim().is_empty()),
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Make sure the base URL ends with the `/v1` API segment.
pub fn normalize_base_url(url: &str) -> String {
    let url = url.trim();
    if url.ends_with("/v1") {
        url.to_string()
    } else if url.ends_with('/') {
        format!("{}v1", url)
    } else {
        format!("{}/v1", url)
    }
}

#[async_trait]
impl CredentialService for ServerCredentialService {
    async fn resolve_api_key(&self, token: &str) -> PipelineResult<String> {
        let is_caller_key = !token.is_empty() && !token.starts_with(ACCESS_CODE_PREFIX);
        if is_caller_key {
            return Ok(token.to_string());
        }
        self.api_key.clone().ok_or_else(|| {
            PipelineError::Resolution("no API key available for the provider".to_string())
        })
    }

    async fn resolve_base_url(&self, requested: Option<&str>) -> PipelineResult<String> {
        let mut base_url = self
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if let Some(requested) = requested.map(str::trim).filter(|u| is_http_url(u)) {
            base_url = requested.to_string();
        }
        if !is_http_url(&base_url) {
            return Err(PipelineError::Resolution(format!(
                "base URL must be http or https: {}",
                base_url
            )));
        }
        Ok(normalize_base_url(&base_url))
    }
}
