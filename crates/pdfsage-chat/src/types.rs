//! Chat types: Ollama wire format and the HTTP request/response bodies.

use serde::{Deserialize, Serialize};

/// Role-tagged chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
    /// Reasoning trace, only sent by thinking models when `think` is on.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thinking: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
            ..Self::default()
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
    pub think: bool,
}

/// One object of Ollama's chat response.
///
/// Streaming responses are a sequence of these, one per line; the last has
/// `done: true` and carries timing metadata that is ignored here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub message: ChatMessage,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub done_reason: Option<String>,
    /// Set instead of `message` when the backend fails.
    #[serde(default)]
    pub error: Option<String>,
}

impl ChatChunk {
    /// Text fragment carried by this chunk (may be empty).
    pub fn content(&self) -> &str {
        &self.message.content
    }

    /// Chunk with only content, as produced mid-stream.
    pub fn fragment(content: impl Into<String>) -> Self {
        Self {
            message: ChatMessage {
                role: "assistant".into(),
                content: content.into(),
                ..ChatMessage::default()
            },
            ..Self::default()
        }
    }
}

/// Incoming question about a document.
#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    /// Document name, resolved inside the configured PDF folder.
    pub filename: String,
    pub question: String,
    /// Ollama model; the configured default when absent.
    #[serde(default)]
    pub model: Option<String>,
}

/// Non-streaming answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskResponse {
    pub answer: String,
}
