use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Node};
use serde_json::{json, Value};
use std::sync::Arc;

use super::{required_str, AgentTool};
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Embeddings, Provider};
use crate::providers::embeddings::cosine_similarity;

const CHUNK_SIZE: usize = 2000;
const CHUNK_OVERLAP: usize = 200;
const TOP_CHUNKS: usize = 4;

const SUMMARY_PROMPT: &str = "You are given excerpts of a web page. \
Answer the task using only the excerpts. If the task is empty, summarize the page \
in a few sentences and list the most relevant links you saw.";

/// Reads a web page and answers a question about it
pub struct WebBrowser {
    tool: Tool,
    client: Client,
    model: Arc<dyn Provider>,
    embeddings: Arc<dyn Embeddings>,
}

impl WebBrowser {
    pub fn new(client: Client, model: Arc<dyn Provider>, embeddings: Arc<dyn Embeddings>) -> Self {
        let tool = Tool::new(
            "web_browser",
            "Useful for when you need to find something on or summarize a webpage. \
            Provide the url of the page and optionally what you want to find on it.",
            json!({
                "type": "object",
                "required": ["url"],
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "A valid http or https URL."
                    },
                    "task": {
                        "type": "string",
                        "default": "",
                        "description": "What to look for on the page. Leave empty for a summary."
                    }
                }
            }),
        );
        Self {
            tool,
            client,
            model,
            embeddings,
        }
    }

    async fn fetch(&self, url: &str) -> AgentResult<String> {
        let parsed = url::Url::parse(url)
            .map_err(|e| AgentError::InvalidParameters(format!("invalid url {}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AgentError::InvalidParameters(format!(
                "unsupported url scheme: {}",
                parsed.scheme()
            )));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| AgentError::ExecutionError(format!("failed to fetch {}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::ExecutionError(format!(
                "fetching {} returned {}",
                url, status
            )));
        }
        response
            .text()
            .await
            .map_err(|e| AgentError::ExecutionError(format!("failed to read {}: {}", url, e)))
    }

    async fn rank(&self, chunks: Vec<String>, task: &str) -> AgentResult<Vec<String>> {
        if task.is_empty() || chunks.len() <= TOP_CHUNKS {
            return Ok(chunks.into_iter().take(TOP_CHUNKS).collect());
        }
        let query = self
            .embeddings
            .embed_query(task)
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;
        let vectors = self
            .embeddings
            .embed_documents(&chunks)
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;

        if vectors.len() != chunks.len() {
            tracing::warn!(
                chunks = chunks.len(),
                vectors = vectors.len(),
                "embeddings count does not match chunk count"
            );
        }

        // chunks without a vector are never ranked
        let mut scored: Vec<(f32, usize, String)> = chunks
            .into_iter()
            .zip(vectors.iter())
            .enumerate()
            .map(|(i, (chunk, v))| (cosine_similarity(&query, v), i, chunk))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(TOP_CHUNKS);
        // keep page order so the excerpts read naturally
        scored.sort_unstable_by_key(|(_, i, _)| *i);
        Ok(scored.into_iter().map(|(_, _, chunk)| chunk).collect())
    }
}

#[async_trait]
impl AgentTool for WebBrowser {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Value) -> AgentResult<Vec<Content>> {
        let url = required_str(&arguments, "url")?;
        let task = arguments
            .get("task")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim();

        let html = self.fetch(url).await?;
        let text = html_to_text(&html);
        if text.is_empty() {
            return Ok(vec![Content::text(format!("{} has no readable text", url))]);
        }

        let excerpts = self.rank(split_text(&text, CHUNK_SIZE, CHUNK_OVERLAP), task).await?;
        tracing::debug!(url, excerpts = excerpts.len(), "summarizing page");

        let request = Message::user().with_text(format!(
            "Task: {}\n\nExcerpts:\n{}",
            task,
            excerpts.join("\n---\n")
        ));
        let (response, _) = self
            .model
            .complete(SUMMARY_PROMPT, &[request], &[])
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;
        Ok(vec![Content::text(response.text())])
    }
}

/// Subtrees whose text is never shown to a reader
const HIDDEN: &[&str] = &["head", "script", "style", "noscript", "template", "svg"];

const BLOCKS: &[&str] = &[
    "br", "p", "div", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "table",
    "section", "article", "header", "footer", "blockquote", "pre",
];

/// Reduce an HTML document to its visible text, one line per block
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();
    for node in document.root_element().descendants() {
        match node.value() {
            Node::Text(fragment) => {
                let hidden = node.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .is_some_and(|e| HIDDEN.contains(&e.name()))
                });
                if !hidden {
                    text.push_str(fragment);
                }
            }
            Node::Element(element) if BLOCKS.contains(&element.name()) => text.push('\n'),
            _ => {}
        }
    }

    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split text into chunks of at most `size` chars, overlapping by `overlap`
pub fn split_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= size {
        return vec![text.to_string()];
    }
    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}
