//! OpenAI-compatible chat-completions provider
//!
//! Requests `stream: true` and parses the SSE body incrementally. Servers
//! that ignore the flag and answer with a plain JSON completion are handled
//! too.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::sse::SseLineParser;
use super::{CompletionProvider, CompletionRequest, TextStream};
use crate::error::ProviderError;

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f32,
    http_client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: 0.3,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = client;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Text carried by one streamed `data:` payload
fn parse_chunk(data: &str) -> Result<Option<String>, ProviderError> {
    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| ProviderError::Decode(e.to_string()))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|s| !s.is_empty()))
}

fn parse_completion(body: &str) -> Result<String, ProviderError> {
    let completion: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;
    Ok(completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default())
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn stream(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::MissingCredentials)?;

        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            max_tokens: request.max_output_tokens,
            temperature: self.temperature,
            stream: true,
        };

        let send = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            res = send => res?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let is_event_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));

        if !is_event_stream {
            let body = tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                res = response.text() => res?,
            };
            let text = parse_completion(&body)?;
            return Ok(Box::pin(futures::stream::iter(
                (!text.is_empty()).then_some(Ok(text)),
            )));
        }

        let mut bytes = Box::pin(response.bytes_stream());
        let stream = async_stream::stream! {
            let mut parser = SseLineParser::new();
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => None,
                    chunk = bytes.next() => Some(chunk),
                };
                let Some(chunk) = next else {
                    yield Err(ProviderError::Cancelled);
                    return;
                };
                let (events, ended) = match chunk {
                    Some(Ok(chunk)) => (parser.push(&chunk), false),
                    Some(Err(e)) => {
                        yield Err(ProviderError::from(e));
                        return;
                    }
                    None => (parser.flush().into_iter().collect::<Vec<_>>(), true),
                };
                for event in events {
                    if event.is_done() {
                        return;
                    }
                    match parse_chunk(&event.data) {
                        Ok(Some(text)) => yield Ok(text),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
                if ended {
                    return;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stream_chunk() {
        let data = r#"{"id":"x","choices":[{"index":0,"delta":{"content":"Hej"}}]}"#;
        assert_eq!(parse_chunk(data).unwrap().as_deref(), Some("Hej"));

        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_chunk(role_only).unwrap(), None);

        assert!(parse_chunk("not json").is_err());
    }

    #[test]
    fn test_parse_plain_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Hello there."}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "Hello there.");
        assert_eq!(parse_completion(r#"{"choices":[]}"#).unwrap(), "");
    }

    #[tokio::test]
    async fn test_missing_key_is_reported() {
        let provider = OpenAiCompatibleProvider::new(None, "http://127.0.0.1:9", "m");
        assert!(!provider.is_configured());
        let request = CompletionRequest {
            system_prompt: "s".into(),
            user_prompt: "u".into(),
            max_output_tokens: 10,
        };
        let result = provider.stream(request, CancellationToken::new()).await;
        assert!(matches!(result, Err(ProviderError::MissingCredentials)));
    }
}
