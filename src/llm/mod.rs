pub mod claude;
pub mod openai;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Injected when a conversation carries no system message of its own.
pub const DEFAULT_SYSTEM_MESSAGE: &str =
    "You are a helpful assistant. Feel free to respond in multiple paragraphs where appropriate";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
}

/// A lazy, finite sequence of completion text fragments. Ends by exhaustion
/// on success; yields an `Err` item on mid-stream failure.
pub type FragmentStream = BoxStream<'static, Result<String, LlmError>>;

/// Unified LLM provider enum — dispatches to OpenAI-compatible or Claude backends.
#[derive(Debug, Clone)]
pub enum Provider {
    OpenAi(openai::OpenAiConfig),
    Claude(claude::ClaudeConfig),
    Ollama(openai::OpenAiConfig),
}

impl Provider {
    pub fn openai(api_key: String) -> Self {
        Provider::OpenAi(openai::OpenAiConfig {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
        })
    }

    pub fn claude(api_key: String) -> Self {
        Provider::Claude(claude::ClaudeConfig {
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
        })
    }

    pub fn ollama(host: String) -> Self {
        Provider::Ollama(openai::OpenAiConfig {
            api_key: String::new(),
            base_url: format!("{}/v1", host),
        })
    }

    /// Opens a streaming completion for the given history. The request is
    /// sent eagerly so connection and API errors surface before any fragment
    /// is produced; the returned stream then yields content deltas lazily.
    pub async fn completion_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<FragmentStream, LlmError> {
        let request = with_system_message(request);
        match self {
            Provider::OpenAi(config) | Provider::Ollama(config) => {
                openai::chat_stream(config, &request).await
            }
            Provider::Claude(config) => claude::chat_stream(config, &request).await,
        }
    }
}

fn with_system_message(request: &ChatRequest) -> ChatRequest {
    if request.messages.iter().any(|m| m.role == "system") {
        return request.clone();
    }
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(ChatMessage {
        role: "system".to_string(),
        content: DEFAULT_SYSTEM_MESSAGE.to_string(),
    });
    messages.extend(request.messages.iter().cloned());
    ChatRequest {
        messages,
        model: request.model.clone(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_injected_when_absent() {
        let request = ChatRequest {
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            model: "gpt-4o".to_string(),
        };
        let prepared = with_system_message(&request);
        assert_eq!(prepared.messages.len(), 2);
        assert_eq!(prepared.messages[0].role, "system");
        assert_eq!(prepared.messages[0].content, DEFAULT_SYSTEM_MESSAGE);
    }

    #[test]
    fn existing_system_message_kept() {
        let request = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "be terse".to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: "hi".to_string(),
                },
            ],
            model: "gpt-4o".to_string(),
        };
        let prepared = with_system_message(&request);
        assert_eq!(prepared.messages.len(), 2);
        assert_eq!(prepared.messages[0].content, "be terse");
    }
}
