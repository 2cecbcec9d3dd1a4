use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::buffered::buffered_stream;
use crate::error::{LlmError, Result};
use crate::provider::{LlmProvider, LlmStream};
use crate::sse::llm_stream_from_sse;
use crate::types::{LlmChunk, Message, Usage};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// An OpenAI-compatible chat-completions endpoint. Streaming is attempted
/// first; a failure before the HTTP response even arrives falls back to a
/// buffered, non-streaming call (SPEC_FULL.md §4.3).
pub struct GenericHttpProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl GenericHttpProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            default_model: default_model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn body(&self, messages: &[Message], model: Option<&str>, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": model.unwrap_or(&self.default_model),
            "messages": messages,
            "stream": stream,
        })
    }

    async fn call_buffered(&self, messages: &[Message], model: Option<&str>) -> Result<LlmStream> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.body(messages, model, false))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {status}: {text}")));
        }

        let completion: BufferedCompletion = response.json().await?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        Ok(buffered_stream(text))
    }
}

#[async_trait]
impl LlmProvider for GenericHttpProvider {
    async fn chat_stream(&self, messages: &[Message], model: Option<&str>) -> Result<LlmStream> {
        let response = match self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.body(messages, model, true))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                log::warn!("streaming request rejected with {}, falling back to buffered", response.status());
                return self.call_buffered(messages, model).await;
            }
            Err(e) => {
                log::warn!("streaming request failed before first event ({e}), falling back to buffered");
                return self.call_buffered(messages, model).await;
            }
        };

        Ok(llm_stream_from_sse(response, parse_stream_chunk))
    }
}

fn parse_stream_chunk(data: &str) -> Result<Option<LlmChunk>> {
    let chunk: StreamChunk = serde_json::from_str(data)?;

    if let Some(usage) = chunk.usage {
        return Ok(Some(LlmChunk::Usage(Usage {
            prompt: usage.prompt_tokens,
            completion: usage.completion_tokens,
            total: usage.total_tokens,
        })));
    }

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content);

    Ok(content.map(LlmChunk::Delta))
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct BufferedCompletion {
    choices: Vec<BufferedChoice>,
}

#[derive(Debug, Deserialize)]
struct BufferedChoice {
    message: BufferedMessage,
}

#[derive(Debug, Deserialize)]
struct BufferedMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delta_chunk() {
        let data = r#"{"choices":[{"delta":{"content":"hi"}}]}"#;
        let chunk = parse_stream_chunk(data).unwrap().unwrap();
        matches!(chunk, LlmChunk::Delta(ref s) if s == "hi");
    }

    #[test]
    fn parses_usage_chunk() {
        let data = r#"{"choices":[],"usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}}"#;
        let chunk = parse_stream_chunk(data).unwrap().unwrap();
        match chunk {
            LlmChunk::Usage(usage) => {
                assert_eq!(usage.prompt, 1);
                assert_eq!(usage.completion, 2);
                assert_eq!(usage.total, 3);
            }
            _ => panic!("expected usage chunk"),
        }
    }

    #[test]
    fn empty_delta_is_dropped() {
        let data = r#"{"choices":[{"delta":{}}]}"#;
        assert!(parse_stream_chunk(data).unwrap().is_none());
    }
}
