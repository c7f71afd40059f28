use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{required_str, AgentTool};
use crate::bridge::EventCallback;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::Tool;

pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";

const SIZES: [&str; 5] = ["256x256", "512x512", "1024x1024", "1792x1024", "1024x1792"];

/// Generates images through the OpenAI compatible images endpoint.
///
/// The finished image is announced through the event callback as markdown,
/// so streaming callers see it before the model writes its final answer.
pub struct DallE {
    tool: Tool,
    client: Client,
    api_key: String,
    endpoint: String,
    on_event: EventCallback,
}

impl DallE {
    pub fn new(client: Client, api_key: &str, base_url: &str, on_event: EventCallback) -> Self {
        let tool = Tool::new(
            "dall_e",
            "A wrapper around the DALL-E image generation API. Useful when you need to \
            generate an image from a text description. The input should be a detailed \
            English description of the image.",
            json!({
                "type": "object",
                "required": ["prompt"],
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "Description of the image to generate."
                    },
                    "size": {
                        "type": "string",
                        "enum": SIZES,
                        "default": DEFAULT_IMAGE_SIZE,
                        "description": "Size of the generated image."
                    }
                }
            }),
        );
        Self {
            tool,
            client,
            api_key: api_key.to_string(),
            endpoint: format!("{}/images/generations", base_url.trim_end_matches('/')),
            on_event,
        }
    }

    async fn generate(&self, prompt: &str, size: &str) -> AgentResult<(String, Option<String>)> {
        let payload = json!({
            "model": DEFAULT_IMAGE_MODEL,
            "prompt": prompt,
            "n": 1,
            "size": size,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AgentError::ExecutionError(format!("image request failed: {}", e)))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| AgentError::ExecutionError(format!("invalid image response: {}", e)))?;
        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string());
            return Err(AgentError::ExecutionError(format!(
                "image generation failed ({}): {}",
                status, message
            )));
        }

        let image = &body["data"][0];
        let url = image["url"]
            .as_str()
            .ok_or_else(|| AgentError::ExecutionError("image response has no url".to_string()))?;
        let revised = image["revised_prompt"].as_str().map(str::to_string);
        Ok((url.to_string(), revised))
    }
}

#[async_trait]
impl AgentTool for DallE {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Value) -> AgentResult<Vec<Content>> {
        let prompt = required_str(&arguments, "prompt")?;
        let size = arguments
            .get("size")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_IMAGE_SIZE);
        if !SIZES.contains(&size) {
            return Err(AgentError::InvalidParameters(format!(
                "unsupported image size: {}",
                size
            )));
        }

        tracing::debug!(size, "generating image");
        let (url, revised) = self.generate(prompt, size).await?;
        let alt = revised.as_deref().unwrap_or(prompt).replace(['[', ']'], "");
        let markdown = format!("![{}]({})", alt, url);
        (self.on_event)(markdown.clone()).await;

        Ok(vec![Content::text(format!(
            "Generated the image and showed it to the user: {}",
            markdown
        ))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{collect_text, event_callback, output_channel, OutputMode};
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_generates_and_announces_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"prompt": "a red fox", "size": "512x512"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "created": 1,
                "data": [{"url": "https://images.local/fox.png"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (writer, stream) = output_channel(4, OutputMode::Streaming);
        let tool = DallE::new(
            Client::new(),
            "sk-test",
            &format!("{}/v1", server.uri()),
            event_callback(Arc::clone(&writer)),
        );
        let result = tool
            .call(json!({"prompt": "a red fox", "size": "512x512"}))
            .await
            .unwrap();
        assert!(result[0]
            .as_text()
            .unwrap()
            .contains("![a red fox](https://images.local/fox.png)"));

        drop(tool);
        drop(writer);
        assert_eq!(
            collect_text(stream).await.unwrap(),
            "data: {\"message\":\"![a red fox](https://images.local/fox.png)\"}\n\n"
        );
    }

    #[tokio::test]
    async fn test_api_error_is_tool_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "content policy violation"}
            })))
            .mount(&server)
            .await;

        let (writer, _stream) = output_channel(4, OutputMode::Buffered);
        let tool = DallE::new(
            Client::new(),
            "sk-test",
            &format!("{}/v1", server.uri()),
            event_callback(Arc::clone(&writer)),
        );
        let err = tool.call(json!({"prompt": "x"})).await.unwrap_err();
        assert!(matches!(err, AgentError::ExecutionError(ref m) if m.contains("content policy violation")));
        assert!(writer.take_events().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_unknown_size() {
        let (writer, _stream) = output_channel(1, OutputMode::Buffered);
        let tool = DallE::new(
            Client::new(),
            "sk-test",
            "https://api.openai.com/v1",
            event_callback(writer),
        );
        let err = tool
            .call(json!({"prompt": "x", "size": "1x1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(_)));
    }
}
