//! Backend search API client.
//!
//! Speaks a chat-completions style API: one system + user message pair in,
//! one completion with optional citations out.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default backend endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";

const DEFAULT_MODEL: &str = "sonar-pro";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// The query side of the gateway, behind a trait so the MCP handler can be
/// exercised without network access.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Answer a single query, returning the completion text with citations
    /// appended when the backend provides them.
    async fn ask(&self, query: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// reqwest-backed client for the search API.
pub struct SearchClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl SearchClient {
    pub fn new(api_key: String, base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url,
            model: DEFAULT_MODEL.to_string(),
        })
    }
}

#[async_trait]
impl SearchBackend for SearchClient {
    async fn ask(&self, query: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "Be precise and concise.",
                },
                ChatMessage {
                    role: "user",
                    content: query,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("search API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("search API returned {status}: {body}");
        }

        let completion: ChatResponse = response
            .json()
            .await
            .context("failed to decode search API response")?;

        let Some(choice) = completion.choices.into_iter().next() else {
            bail!("search API response contained no choices");
        };

        debug!(query_len = query.len(), "search completed");
        Ok(render_answer(choice.message.content, &completion.citations))
    }
}

/// Append numbered citations to the completion text, when present.
fn render_answer(content: String, citations: &[String]) -> String {
    if citations.is_empty() {
        return content;
    }

    let mut answer = content;
    answer.push_str("\n\nCitations:\n");
    for (index, citation) in citations.iter().enumerate() {
        answer.push_str(&format!("[{}] {}\n", index + 1, citation));
    }
    answer
}
