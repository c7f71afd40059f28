//! The authentication step of the request gate.

use axum::http::HeaderMap;
use edge_agent::credentials::{bearer_token, ACCESS_CODE_PREFIX};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Result of authenticating a request. Serialized as is on rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthOutcome {
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl AuthOutcome {
    pub fn allowed() -> Self {
        Self {
            error: false,
            msg: None,
        }
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self {
            error: true,
            msg: Some(msg.into()),
        }
    }
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> AuthOutcome;
}

/// Checks access codes against configured SHA-256 digests.
///
/// With no codes configured every request passes. `hide_user_api_key`
/// rejects callers that bring their own provider key.
#[derive(Debug, Clone, Default)]
pub struct AccessCodeAuthenticator {
    digests: HashSet<String>,
    hide_user_api_key: bool,
}

pub fn digest(code: &str) -> String {
    Sha256::digest(code.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

impl AccessCodeAuthenticator {
    pub fn new<I, S>(codes: I, hide_user_api_key: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let digests = codes
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty())
            .map(|c| digest(&c))
            .collect();
        Self {
            digests,
            hide_user_api_key,
        }
    }
}

impl Authenticator for AccessCodeAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> AuthOutcome {
        let token = bearer_token(headers);

        if let Some(code) = token.strip_prefix(ACCESS_CODE_PREFIX) {
            if self.digests.is_empty() || self.digests.contains(&digest(code)) {
                return AuthOutcome::allowed();
            }
            tracing::info!("rejected request with a wrong access code");
            return AuthOutcome::rejected("wrong access code");
        }

        if !token.is_empty() {
            if self.hide_user_api_key {
                return AuthOutcome::rejected(
                    "you are not allowed to access with your own api key",
                );
            }
            return AuthOutcome::allowed();
        }

        if self.digests.is_empty() {
            AuthOutcome::allowed()
        } else {
            AuthOutcome::rejected("wrong access code")
        }
    }
}
