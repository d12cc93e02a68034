use super::{ChatRequest, FragmentStream, LlmError};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ClaudeMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ClaudeStreamEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: ClaudeDelta },
    #[serde(rename = "message_stop")]
    MessageStop {},
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ClaudeDelta {
    text: Option<String>,
}

fn build_request(request: &ChatRequest) -> ClaudeRequest {
    // Anthropic takes the system prompt as a top-level field
    let system_msg = request
        .messages
        .iter()
        .find(|m| m.role == "system")
        .map(|m| m.content.clone());

    let messages: Vec<ClaudeMessage> = request
        .messages
        .iter()
        .filter(|m| m.role != "system")
        .map(|m| ClaudeMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        })
        .collect();

    ClaudeRequest {
        model: request.model.clone(),
        max_tokens: 4096,
        messages,
        stream: true,
        system: system_msg,
    }
}

#[derive(Default)]
struct SseDecoder {
    buffer: String,
    pending: VecDeque<String>,
    done: bool,
}

impl SseDecoder {
    fn push_bytes(&mut self, bytes: &[u8]) {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer = self.buffer[pos + 1..].to_string();
            self.handle_line(&line);
        }
    }

    fn handle_line(&mut self, line: &str) {
        let Some(data) = line.strip_prefix("data: ") else {
            return;
        };
        if let Ok(event) = serde_json::from_str::<ClaudeStreamEvent>(data) {
            match event {
                ClaudeStreamEvent::ContentBlockDelta { delta } => {
                    if let Some(text) = delta.text {
                        if !text.is_empty() {
                            self.pending.push_back(text);
                        }
                    }
                }
                ClaudeStreamEvent::MessageStop {} => self.done = true,
                ClaudeStreamEvent::Other => {}
            }
        }
    }
}

pub async fn chat_stream(
    config: &ClaudeConfig,
    request: &ChatRequest,
) -> Result<FragmentStream, LlmError> {
    let client = Client::new();
    let body = build_request(request);

    let resp = client
        .post(format!("{}/v1/messages", config.base_url))
        .header("Content-Type", "application/json")
        .header("x-api-key", &config.api_key)
        .header("anthropic-version", "2023-06-01")
        .json(&body)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            status,
            message: text,
        });
    }

    let bytes = resp.bytes_stream();
    let fragments = stream::try_unfold(
        (bytes, SseDecoder::default()),
        |(mut bytes, mut decoder)| async move {
            loop {
                if let Some(fragment) = decoder.pending.pop_front() {
                    return Ok(Some((fragment, (bytes, decoder))));
                }
                if decoder.done {
                    return Ok(None);
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => decoder.push_bytes(&chunk),
                    Some(Err(e)) => return Err(LlmError::Http(e)),
                    None => decoder.done = true,
                }
            }
        },
    );

    Ok(fragments.boxed())
}
