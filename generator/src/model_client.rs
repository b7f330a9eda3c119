use crate::error::GenerationResult;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// A message in the conversation sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Web search capability bound to the model in research mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSearchTool {
    pub allowed_domains: Vec<String>,
    pub max_uses: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationOptions {
    pub extended_thinking: bool,
    pub web_search: Option<WebSearchTool>,
}

pub type TextStream = BoxStream<'static, GenerationResult<String>>;

/// The model provider as seen by the orchestrator.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Produce the whole response in one call.
    async fn invoke(&self, messages: &[Message], options: &InvocationOptions) -> GenerationResult<String>;

    /// Produce the response as a sequence of text chunks.
    async fn stream(&self, messages: &[Message], options: &InvocationOptions) -> GenerationResult<TextStream>;

    fn model_name(&self) -> &str;
}
