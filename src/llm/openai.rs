use super::{ChatRequest, FragmentStream, LlmError};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiStreamResponse {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

/// Line-buffered decoder for the `data:`-prefixed SSE body. Raw bytes go in,
/// content deltas queue up in `pending` until the stream pulls them.
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
        if data == "[DONE]" {
            self.done = true;
            return;
        }
        if let Ok(parsed) = serde_json::from_str::<OpenAiStreamResponse>(data) {
            if let Some(choice) = parsed.choices.first() {
                if let Some(content) = &choice.delta.content {
                    if !content.is_empty() {
                        self.pending.push_back(content.clone());
                    }
                }
                if choice.finish_reason.is_some() {
                    self.done = true;
                }
            }
        }
    }
}

pub async fn chat_stream(
    config: &OpenAiConfig,
    request: &ChatRequest,
) -> Result<FragmentStream, LlmError> {
    let client = Client::new();
    let messages: Vec<OpenAiMessage> = request
        .messages
        .iter()
        .map(|m| OpenAiMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        })
        .collect();

    let body = OpenAiRequest {
        model: request.model.clone(),
        messages,
        stream: true,
    };

    let mut req = client
        .post(format!("{}/chat/completions", config.base_url))
        .header("Content-Type", "application/json")
        .json(&body);

    if !config.api_key.is_empty() {
        req = req.header("Authorization", format!("Bearer {}", config.api_key));
    }

    let resp = req.send().await?;

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
