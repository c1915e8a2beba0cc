//! The provider seam: one model call in, a stream of text fragments out.
//!
//! Concrete providers (OpenAI-compatible HTTP clients, local inference
//! endpoints, test doubles) live outside this crate and implement
//! [`Provider`]. A provider performs exactly one attempt; retries and
//! fallback belong to the chain and pool layers above it.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A fully resolved model call.
///
/// The fallback chain owns the `model` field; judges build the request with
/// an empty model id and the chain substitutes each candidate in turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// One streamed fragment: partial text, or a terminal error.
pub type Fragment = Result<String, ProviderError>;

/// The fragment stream for one call. An `Err` fragment is terminal.
pub type FragmentStream = BoxStream<'static, Fragment>;

/// Executes one model call. No retries, no fallback, no admission control.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn call(&self, request: ChatRequest) -> Result<FragmentStream, ProviderError>;
}

/// Drain a fragment stream into one accumulated text.
///
/// Stops at the first error fragment and surfaces it; content already
/// accumulated is discarded because a truncated classification is not
/// trustworthy.
pub async fn collect_fragments(mut stream: FragmentStream) -> Result<String, ProviderError> {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}
