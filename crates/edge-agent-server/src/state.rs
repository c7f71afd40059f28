use edge_agent::pipeline::Pipeline;
use std::sync::Arc;

use crate::auth::Authenticator;

/// Shared application state. Immutable; every request builds its own clients.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            pipeline,
            authenticator,
        }
    }
}
