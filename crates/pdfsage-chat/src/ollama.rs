//! Ollama chat client.
//!
//! Streaming responses are newline-delimited JSON. Each line is decoded into
//! a `ChatChunk`; an `error` field or a transport failure ends the stream
//! with `Error::StreamInterrupted`.

use std::fmt::Display;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use pdfsage_core::{Error, OllamaSettings, Result};
use reqwest::Client;
use tracing::debug;

use crate::types::{ChatChunk, ChatMessage, ChatRequest};

/// Boxed stream of decoded chat chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>;

/// Client for a single Ollama instance.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    think: bool,
}

impl OllamaClient {
    pub fn new(settings: &OllamaSettings) -> Self {
        Self::with_client(Client::new(), settings)
    }

    pub fn with_client(client: Client, settings: &OllamaSettings) -> Self {
        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            think: settings.think,
        }
    }

    /// Single non-streaming chat call.
    pub async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<ChatChunk> {
        let response = self.send(model, messages, false).await?;

        let chunk: ChatChunk = response
            .json()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Invalid response: {}", e)))?;

        match chunk.error {
            Some(err) => Err(Error::BackendUnavailable(err)),
            None => Ok(chunk),
        }
    }

    /// Open a streaming chat call.
    ///
    /// Connection and status failures are reported here, before any chunk is
    /// produced. The returned stream owns the HTTP response; dropping it
    /// closes the connection.
    pub async fn chat_stream(&self, model: &str, messages: &[ChatMessage]) -> Result<ChunkStream> {
        let response = self.send(model, messages, true).await?;
        Ok(Box::pin(ndjson_chunks(response.bytes_stream())))
    }

    async fn send(
        &self,
        model: &str,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model,
            messages,
            stream,
            think: self.think,
        };

        debug!("Chat request to {} with model {} (stream={})", url, model, stream);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ChatChunk>(&body)
                .ok()
                .and_then(|c| c.error)
                .unwrap_or(body);
            return Err(Error::BackendUnavailable(format!(
                "API error {}: {}",
                status, detail
            )));
        }

        Ok(response)
    }
}

/// Longest NDJSON line accepted from the backend.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Decode a byte stream of newline-delimited JSON into chat chunks.
///
/// Stops after the chunk marked `done`, or after the first error.
pub fn ndjson_chunks<S, B, E>(bytes: S) -> impl Stream<Item = Result<ChatChunk>> + Send + 'static
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    decode_lines(bytes, MAX_LINE_BYTES)
}

fn decode_lines<S, B, E>(
    bytes: S,
    max_line: usize,
) -> impl Stream<Item = Result<ChatChunk>> + Send + 'static
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::stream! {
        futures::pin_mut!(bytes);
        let mut buffer: Vec<u8> = Vec::new();
        // Bytes of `buffer` already known to contain no newline.
        let mut scanned = 0usize;

        while let Some(next) = bytes.next().await {
            let data = match next {
                Ok(d) => d,
                Err(e) => {
                    yield Err(Error::StreamInterrupted(format!("Stream read error: {}", e)));
                    return;
                }
            };

            buffer.extend_from_slice(data.as_ref());

            while let Some(offset) = buffer[scanned..].iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=scanned + offset).collect();
                scanned = 0;
                match parse_line(&line) {
                    None => continue,
                    Some(Ok(chunk)) => {
                        let done = chunk.done;
                        yield Ok(chunk);
                        if done {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            scanned = buffer.len();

            if buffer.len() > max_line {
                yield Err(Error::StreamInterrupted(format!(
                    "Line exceeds {} bytes",
                    max_line
                )));
                return;
            }
        }

        // Trailing line without a newline
        if let Some(last) = parse_line(&buffer) {
            yield last;
        }
    }
}

fn parse_line(line: &[u8]) -> Option<Result<ChatChunk>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let chunk = match serde_json::from_str::<ChatChunk>(text) {
        Ok(c) => c,
        Err(e) => {
            return Some(Err(Error::StreamInterrupted(format!(
                "Malformed chunk: {}",
                e
            ))))
        }
    };

    match chunk.error {
        Some(err) => Some(Err(Error::StreamInterrupted(err))),
        None => Some(Ok(chunk)),
    }
}
