//! Streaming model transport for OpenAI-compatible chat completion APIs
//!
//! Responses arrive as server-sent events; every `data:` payload carries a
//! JSON delta. The transport yields the text of each delta, not the
//! accumulated response.

use async_trait::async_trait;
use autocode_core::config::ModelConfig;
use autocode_core::ports::{ChunkStream, ModelTransport};
use autocode_core::{AutocodeError, ChatMessage, ModelRequest, Result};
use futures::StreamExt;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

pub struct OpenAiTransport {
    http: ReqwestClient,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
}

impl OpenAiTransport {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: ReqwestClient::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
            temperature: None,
        }
    }

    /// Build from config, reading the key from the configured variable
    pub fn from_config(config: &ModelConfig) -> Self {
        let mut transport = Self::new(config.endpoint.clone(), config.model.clone());
        transport.temperature = config.temperature;
        match std::env::var(&config.api_key_env) {
            Ok(key) => transport.with_api_key(key),
            Err(_) => {
                info!("{} not set, sending requests without auth", config.api_key_env);
                transport
            }
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl ModelTransport for OpenAiTransport {
    async fn stream(
        &self,
        request: ModelRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream> {
        let url = self.url();
        let body = CompletionRequest {
            model: &self.model,
            messages: request.to_messages(),
            stream: true,
            temperature: self.temperature,
        };

        let mut req = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        debug!("POST {} ({} messages)", url, body.messages.len());
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AutocodeError::TransportAborted),
            response = req.send() => response.map_err(|e| {
                error!("Failed to reach {}: {}", url, e);
                AutocodeError::Transport(format!("network error: {}", e))
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AutocodeError::Transport(format!(
                "API error ({}): {}",
                status, text
            )));
        }

        let bytes = response.bytes_stream().boxed();
        let stream = futures::stream::unfold(
            (bytes, SseDecoder::default(), VecDeque::new()),
            |(mut bytes, mut decoder, mut pending)| async move {
                loop {
                    if let Some(item) = pending.pop_front() {
                        return Some((item, (bytes, decoder, pending)));
                    }
                    if decoder.is_done() {
                        return None;
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => pending.extend(decoder.feed(&chunk).into_iter().map(Ok)),
                        Some(Err(e)) => {
                            decoder.close();
                            pending.push_back(Err(AutocodeError::Transport(format!(
                                "stream error: {}",
                                e
                            ))));
                        }
                        None => pending.extend(decoder.finish().into_iter().map(Ok)),
                    }
                }
            },
        );

        Ok(stream.boxed())
    }
}

/// Incremental server-sent-events decoder yielding content deltas
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend(bytes.iter().filter(|b| **b != b'\r'));

        let mut deltas = Vec::new();
        while let Some(end) = find_event_end(&self.buffer) {
            let event: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(delta) = self.decode_event(&event[..end]) {
                deltas.push(delta);
            }
            if self.done {
                break;
            }
        }
        deltas
    }

    /// Flush a trailing event that was not followed by a blank line
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buffer);
        let delta = if self.done { None } else { self.decode_event(&rest) };
        self.done = true;
        delta.into_iter().collect()
    }

    pub fn close(&mut self) {
        self.done = true;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn decode_event(&mut self, event: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(event);
        let data = text
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|d| d.strip_prefix(' ').unwrap_or(d))
            .collect::<Vec<_>>()
            .join("\n");
        if data.is_empty() {
            return None;
        }
        if data.trim() == "[DONE]" {
            self.done = true;
            return None;
        }
        match serde_json::from_str::<CompletionChunk>(&data) {
            Ok(chunk) => chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .filter(|c| !c.is_empty()),
            Err(e) => {
                // Some servers send keep-alive or non-JSON payloads
                debug!("Skipping SSE payload: {}", e);
                None
            }
        }
    }
}

fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\ndata: [DONE]\n\n";

    #[test]
    fn test_decoder_handles_split_events() {
        let mut decoder = SseDecoder::default();
        let (a, b) = BODY.split_at(30);
        let mut deltas = decoder.feed(a);
        assert!(deltas.is_empty());
        deltas.extend(decoder.feed(b));
        assert_eq!(deltas, vec!["Hello", " world"]);
        assert!(decoder.is_done());
        assert!(decoder.feed(b"data: {}\n\n").is_empty());
    }

    #[test]
    fn test_decoder_skips_noise_and_flushes_tail() {
        let mut decoder = SseDecoder::default();
        let deltas = decoder.feed(b": keep-alive\r\n\r\ndata: not json\n\ndata: {\"choices\":[{\"delta\":{}}]}\n\n");
        assert!(deltas.is_empty());

        let deltas = decoder.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}");
        assert!(deltas.is_empty());
        assert_eq!(decoder.finish(), vec!["tail"]);
        assert!(decoder.is_done());
    }

    #[tokio::test]
    async fn test_streams_deltas_from_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(BODY)
            .create_async()
            .await;

        let transport = OpenAiTransport::new(format!("{}/v1", server.url()), "test-model")
            .with_api_key("sk-test");
        let chunks: Vec<String> = transport
            .stream(ModelRequest::new("hi"), CancellationToken::new())
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert_eq!(chunks, vec!["Hello", " world"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("bad key")
            .create_async()
            .await;

        let transport = OpenAiTransport::new(server.url(), "m");
        let err = transport
            .stream(ModelRequest::new("hi"), CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AutocodeError::Transport(ref m) if m.contains("401")));
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let transport = OpenAiTransport::new("http://127.0.0.1:9", "m");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = transport
            .stream(ModelRequest::new("hi"), cancel)
            .await
            .err()
            .unwrap();
        assert!(err.is_aborted());
    }
}
