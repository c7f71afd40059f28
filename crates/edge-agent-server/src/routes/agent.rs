use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use edge_agent::bridge::{BridgeResponse, OutputStream};
use edge_agent::credentials::bearer_token;
use edge_agent::request::AgentRequest;
use serde_json::json;

pub const AGENT_PATH: &str = "/api/langchain/tool/agent/edge";

/// Server-sent events body forwarding the agent's frames untouched
pub struct SseResponse {
    stream: OutputStream,
}

impl SseResponse {
    fn new(stream: OutputStream) -> Self {
        Self { stream }
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        let body = Body::from_stream(self.stream);
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            body,
        )
            .into_response()
    }
}

async fn handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // pre-flight requests never reach authentication
    if method == Method::OPTIONS {
        return (StatusCode::OK, Json(json!({ "body": "OK" }))).into_response();
    }

    let outcome = state.authenticator.authenticate(&headers);
    if outcome.error {
        return (StatusCode::UNAUTHORIZED, Json(outcome)).into_response();
    }

    match run(&state, &headers, &body).await {
        Ok(response) => response,
        Err(error) => error.into_response(),
    }
}

async fn run(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<Response, ApiError> {
    let request = AgentRequest::from_slice(body)?;
    let token = bearer_token(headers);

    let response = match state.pipeline.run(&token, request).await? {
        BridgeResponse::Stream(stream) => SseResponse::new(stream).into_response(),
        BridgeResponse::Json(outcome) => {
            let status = outcome.status();
            tracing::info!(%status, "agent run classified");
            (status, Json(outcome.into_body())).into_response()
        }
    };
    Ok(response)
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    let endpoint = get(handler).post(handler).options(handler);
    Router::new()
        .route(AGENT_PATH, endpoint.clone())
        .route("/agent", endpoint)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AccessCodeAuthenticator, AuthOutcome, Authenticator};
    use async_trait::async_trait;
    use axum::http::Request;
    use edge_agent::classifier::UNEXPECTED_RESPONSE;
    use edge_agent::credentials::{CredentialService, Credentials};
    use edge_agent::errors::{PipelineError, PipelineResult};
    use edge_agent::executor::{ExecutionContext, ExecutionUnit};
    use edge_agent::models::message::Message;
    use edge_agent::models::tool::Tool;
    use edge_agent::pipeline::Pipeline;
    use edge_agent::providers::base::{Embeddings, Provider, Usage};
    use edge_agent::providers::factory::ClientFactory;
    use edge_agent::tools::{ToolContext, ToolFactory, ToolSet};
    use futures::stream;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    #[derive(Default)]
    struct Calls {
        resolve: AtomicUsize,
        construct: AtomicUsize,
        execute: AtomicUsize,
    }

    struct StubCredentials {
        calls: Arc<Calls>,
        fail_with: Option<&'static str>,
    }

    #[async_trait]
    impl CredentialService for StubCredentials {
        async fn resolve_api_key(&self, _token: &str) -> PipelineResult<String> {
            self.calls.resolve.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(message) => Err(PipelineError::Resolution(message.to_string())),
                None => Ok("sk-test".to_string()),
            }
        }

        async fn resolve_base_url(&self, _requested: Option<&str>) -> PipelineResult<String> {
            Ok("https://api.openai.com/v1".to_string())
        }
    }

    struct SilentProvider;

    #[async_trait]
    impl Provider for SilentProvider {
        async fn complete(
            &self,
            _system: &str,
            _messages: &[Message],
            _tools: &[Tool],
        ) -> anyhow::Result<(Message, Usage)> {
            Ok((Message::assistant().with_text("unused"), Usage::default()))
        }
    }

    struct ZeroEmbeddings;

    #[async_trait]
    impl Embeddings for ZeroEmbeddings {
        async fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0]).collect())
        }
    }

    struct StubClients {
        calls: Arc<Calls>,
        fail: bool,
    }

    impl ClientFactory for StubClients {
        fn model(&self, _credentials: &Credentials, _model: &str) -> PipelineResult<Arc<dyn Provider>> {
            self.calls.construct.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PipelineError::Construction("unknown model".to_string()));
            }
            Ok(Arc::new(SilentProvider))
        }

        fn embeddings(&self, _credentials: &Credentials) -> PipelineResult<Arc<dyn Embeddings>> {
            self.calls.construct.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(ZeroEmbeddings))
        }
    }

    struct EventTools;

    #[async_trait]
    impl ToolFactory for EventTools {
        async fn build(&self, _context: ToolContext) -> PipelineResult<ToolSet> {
            Ok(ToolSet::default())
        }
    }

    /// Emits a, b, c through the writer, then either a terminal frame or raw chunks
    struct ScriptedUnit {
        calls: Arc<Calls>,
        chunks: Vec<&'static str>,
    }

    #[async_trait]
    impl ExecutionUnit for ScriptedUnit {
        async fn execute(&self, context: ExecutionContext) -> PipelineResult<OutputStream> {
            self.calls.execute.fetch_add(1, Ordering::SeqCst);
            if !context.request.stream {
                let chunks: Vec<_> = self
                    .chunks
                    .iter()
                    .copied()
                    .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                    .collect();
                return Ok(Box::pin(stream::iter(chunks)));
            }

            let writer = context.writer;
            tokio::spawn(async move {
                for part in ["a", "b", "c"] {
                    writer.emit(part.to_string()).await.unwrap();
                }
                writer
                    .write_frame(&json!({"isSuccess": true, "message": "done"}))
                    .await
                    .unwrap();
            });
            Ok(context.output)
        }
    }

    struct Harness {
        calls: Arc<Calls>,
        app: Router,
    }

    fn harness_with(
        authenticator: Arc<dyn Authenticator>,
        fail_resolution: Option<&'static str>,
        fail_construction: bool,
        chunks: Vec<&'static str>,
    ) -> Harness {
        let calls = Arc::new(Calls::default());
        let pipeline = Pipeline::new(
            Arc::new(StubCredentials {
                calls: Arc::clone(&calls),
                fail_with: fail_resolution,
            }),
            Arc::new(StubClients {
                calls: Arc::clone(&calls),
                fail: fail_construction,
            }),
            Arc::new(EventTools),
            Arc::new(ScriptedUnit {
                calls: Arc::clone(&calls),
                chunks,
            }),
        );
        Harness {
            calls,
            app: routes(AppState::new(pipeline, authenticator)),
        }
    }

    fn harness(chunks: Vec<&'static str>) -> Harness {
        harness_with(
            Arc::new(AccessCodeAuthenticator::default()),
            None,
            false,
            chunks,
        )
    }

    fn post(body: Value) -> Request<Body> {
        Request::builder()
            .uri(AGENT_PATH)
            .method("POST")
            .header("content-type", "application/json")
            .header("authorization", "Bearer nk-secret")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn buffered_body() -> Value {
        json!({"model": "gpt-4o-mini", "messages": [{"role": "user", "content": "hi"}]})
    }

    async fn read_body(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn read_json(response: Response) -> Value {
        serde_json::from_str(&read_body(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_options_short_circuits() {
        struct DenyAll;
        impl Authenticator for DenyAll {
            fn authenticate(&self, _headers: &HeaderMap) -> AuthOutcome {
                AuthOutcome::rejected("denied")
            }
        }
        let harness = harness_with(Arc::new(DenyAll), None, false, vec![]);

        let request = Request::builder()
            .uri(AGENT_PATH)
            .method("OPTIONS")
            .body(Body::empty())
            .unwrap();
        let response = harness.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!({"body": "OK"}));
        assert_eq!(harness.calls.resolve.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_auth_failure_is_401_without_side_effects() {
        let harness = harness_with(
            Arc::new(AccessCodeAuthenticator::new(["other"], false)),
            None,
            false,
            vec!["{\"isSuccess\":true}"],
        );

        let response = harness.app.clone().oneshot(post(buffered_body())).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            read_json(response).await,
            json!({"error": true, "msg": "wrong access code"})
        );
        assert_eq!(harness.calls.resolve.load(Ordering::SeqCst), 0);
        assert_eq!(harness.calls.construct.load(Ordering::SeqCst), 0);
        assert_eq!(harness.calls.execute.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resolution_failure_is_normalized() {
        let harness = harness_with(
            Arc::new(AccessCodeAuthenticator::default()),
            Some("invalid token"),
            false,
            vec![],
        );

        let response = harness.app.clone().oneshot(post(buffered_body())).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read_json(response).await, json!({"error": "invalid token"}));
        assert_eq!(harness.calls.construct.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_construction_failure_is_normalized() {
        let harness = harness_with(
            Arc::new(AccessCodeAuthenticator::default()),
            None,
            true,
            vec![],
        );

        let response = harness.app.clone().oneshot(post(buffered_body())).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read_json(response).await, json!({"error": "unknown model"}));
        assert_eq!(harness.calls.execute.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_buffered_success_from_split_chunks() {
        let harness = harness(vec!["{\"isSuc", "cess\":true}"]);

        let response = harness.app.clone().oneshot(post(buffered_body())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!({"isSuccess": true}));
        assert_eq!(harness.calls.resolve.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_buffered_error_payload() {
        let harness = harness(vec!["{\"isSuccess\":false,\"error\":\"quota exceeded\"}"]);

        let response = harness.app.clone().oneshot(post(buffered_body())).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            read_json(response).await,
            json!({"isSuccess": false, "error": "quota exceeded"})
        );
    }

    #[tokio::test]
    async fn test_buffered_unexpected_shape() {
        let harness = harness(vec!["{\"message\":\"hello\"}"]);

        let response = harness.app.clone().oneshot(post(buffered_body())).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read_json(response).await, json!({"error": UNEXPECTED_RESPONSE}));
    }

    #[tokio::test]
    async fn test_buffered_non_object_is_normalized_error() {
        let harness = harness(vec!["[1, 2, 3]"]);

        let response = harness.app.clone().oneshot(post(buffered_body())).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            read_json(response).await,
            json!({"error": "agent output is not a JSON object"})
        );
    }

    #[tokio::test]
    async fn test_invalid_body_is_normalized_error() {
        let harness = harness(vec![]);
        let request = Request::builder()
            .uri("/agent")
            .method("POST")
            .body(Body::from("{not json"))
            .unwrap();

        let response = harness.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid request body"));
        assert_eq!(harness.calls.resolve.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_streaming_forwards_frames_in_order() {
        let harness = harness(vec![]);
        let mut body = buffered_body();
        body["stream"] = json!(true);

        let response = harness.app.clone().oneshot(post(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(
            read_body(response).await,
            "data: {\"message\":\"a\"}\n\n\
             data: {\"message\":\"b\"}\n\n\
             data: {\"message\":\"c\"}\n\n\
             data: {\"isSuccess\":true,\"message\":\"done\"}\n\n"
        );
    }
}
