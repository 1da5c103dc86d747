use std::future::Future;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AppError, Result};

/// Keys shorter than this are rejected before calling the large model.
const MIN_API_KEY_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    #[default]
    Small,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A chat-completion service returning the fully accumulated reply.
pub trait ChatClient: Send + Sync {
    fn complete(
        &self,
        api_key: &str,
        tier: ModelTier,
        messages: Vec<ChatMessage>,
    ) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

pub struct OpenAiClient {
    client: Client,
    api_url: String,
    small_model: String,
    large_model: String,
}

impl OpenAiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder().timeout(config.llm_timeout()).build()?;
        Ok(Self {
            client,
            api_url: config.llm_api_url.clone(),
            small_model: config.model_name(ModelTier::Small).to_string(),
            large_model: config.model_name(ModelTier::Large).to_string(),
        })
    }

    fn model(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Small => &self.small_model,
            ModelTier::Large => &self.large_model,
        }
    }
}

impl ChatClient for OpenAiClient {
    async fn complete(
        &self,
        api_key: &str,
        tier: ModelTier,
        messages: Vec<ChatMessage>,
    ) -> Result<String> {
        if tier == ModelTier::Large && api_key.trim().len() < MIN_API_KEY_LEN {
            return Err(AppError::Llm("API key is not set".to_string()));
        }

        let request = ChatRequest {
            model: self.model(tier),
            messages: &messages,
            stream: true,
        };

        let mut response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key.trim())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Llm(format!(
                "API Error (Status {status}): {error_text}"
            )));
        }

        let mut accumulator = StreamAccumulator::default();
        while let Some(chunk) = response.chunk().await? {
            accumulator.push(&chunk);
        }

        Ok(accumulator.finish())
    }
}

/// Collects `choices[0].delta.content` from a server-sent-events body that
/// may arrive split at arbitrary byte positions.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    pending: Vec<u8>,
    text: String,
}

impl StreamAccumulator {
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.consume_line(&String::from_utf8_lossy(&line));
        }
    }

    pub fn finish(mut self) -> String {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.consume_line(&String::from_utf8_lossy(&line));
        }
        self.text
    }

    fn consume_line(&mut self, line: &str) {
        if let Some(delta) = parse_stream_line(line) {
            self.text.push_str(&delta);
        }
    }
}

/// Content delta carried by one SSE line, if any.
fn parse_stream_line(line: &str) -> Option<String> {
    let data = line.trim().strip_prefix("data: ")?;
    if data == "[DONE]" {
        return None;
    }

    let chunk: StreamChunk = serde_json::from_str(data).ok()?;
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
}
