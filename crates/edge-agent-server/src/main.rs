use edge_agent::credentials::ServerCredentialService;
use edge_agent::executor::AgentApi;
use edge_agent::pipeline::Pipeline;
use edge_agent::providers::factory::OpenAiClientFactory;
use edge_agent::tools::EdgeToolFactory;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod auth;
mod configuration;
mod error;
mod routes;
mod state;

use auth::AccessCodeAuthenticator;
use configuration::Settings;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Settings::new()?;

    let clients =
        OpenAiClientFactory::default().with_embeddings_model(settings.provider.embeddings_model);
    let pipeline = Pipeline::new(
        Arc::new(ServerCredentialService::new(
            settings.provider.api_key,
            settings.provider.base_url,
        )),
        Arc::new(clients),
        Arc::new(EdgeToolFactory),
        Arc::new(AgentApi),
    )
    .with_settings(settings.bridge.to_pipeline());

    let authenticator = AccessCodeAuthenticator::new(
        settings.auth.codes(),
        settings.auth.hide_user_api_key,
    );
    let state = AppState::new(pipeline, Arc::new(authenticator));

    let app = routes::configure(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(settings.server.socket_addr()?).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
