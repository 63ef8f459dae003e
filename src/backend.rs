//! Completion backend interface and its HTTP implementation
//!
//! A turn is sent as one POST. The reply body is read lazily and split into
//! text fragments according to the configured [`FragmentFraming`]; callers
//! see a finite, non-restartable [`FragmentStream`].

use crate::config::{BackendConfig, FragmentFraming};
use crate::error::{CloverError, Result};
use crate::http;
use crate::models::{parse_remote, AgentConfig};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;

/// Lazily produced text fragments of one reply
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Backend that answers a user message with a (possibly streamed) reply
///
/// The backend keeps the conversation history itself; only the new user
/// message is sent.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send one user message and return the reply's fragments
    ///
    /// # Arguments
    ///
    /// * `token` - Bearer token of the signed-in user
    /// * `conversation_id` - Conversation the turn belongs to
    /// * `user_message` - Text typed by the user
    /// * `agent_config` - The conversation's creation-time configuration,
    ///   which implementations may forward
    ///
    /// # Errors
    ///
    /// Errors returned here happen before any fragment was produced. Errors
    /// after that arrive as items of the stream.
    async fn send_turn(
        &self,
        token: &str,
        conversation_id: &str,
        user_message: &str,
        agent_config: &AgentConfig,
    ) -> Result<FragmentStream>;
}

#[derive(Debug, Serialize)]
struct TurnRequest<'a> {
    user_message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_config: Option<&'a AgentConfig>,
}

#[derive(Debug, Deserialize)]
struct TurnResponse {
    assistant_response: String,
}

/// [`CompletionBackend`] speaking the turn endpoints over HTTP
#[derive(Debug, Clone)]
pub struct HttpCompletionBackend {
    client: Client,
    base_url: String,
    streaming: bool,
    framing: FragmentFraming,
    forward_agent_config: bool,
}

impl HttpCompletionBackend {
    /// Create a backend client from its configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &BackendConfig) -> Result<Self> {
        tracing::info!(
            "Initialized completion backend: url={}, streaming={}, framing={:?}",
            config.base_url,
            config.streaming,
            config.framing
        );
        Ok(Self {
            client: http::build_client(config.timeout())?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            streaming: config.streaming,
            framing: config.framing,
            forward_agent_config: config.forward_agent_config,
        })
    }

    fn turn_url(&self, conversation_id: &str) -> String {
        let endpoint = if self.forward_agent_config {
            "turn_dev"
        } else {
            "turn"
        };
        format!(
            "{}/conversations/{}/{}",
            self.base_url, conversation_id, endpoint
        )
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletionBackend {
    async fn send_turn(
        &self,
        token: &str,
        conversation_id: &str,
        user_message: &str,
        agent_config: &AgentConfig,
    ) -> Result<FragmentStream> {
        let url = self.turn_url(conversation_id);
        tracing::debug!("Sending turn to {}", url);

        let request = TurnRequest {
            user_message,
            agent_config: self.forward_agent_config.then_some(agent_config),
        };
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Turn request for {} failed: {}", conversation_id, e);
                CloverError::from_transport(e)
            })?;
        let response = http::check_status(response, conversation_id).await?;

        if !self.streaming {
            let body = http::read_text(response).await?;
            let reply: TurnResponse = parse_remote(&body, "turn response")?;
            return Ok(Box::pin(futures::stream::once(async move {
                Ok(reply.assistant_response)
            })));
        }

        let bytes: ByteStream = Box::pin(response.bytes_stream());
        Ok(decode_fragments(bytes, FragmentDecoder::new(self.framing)))
    }
}

/// Turn a byte stream into a fragment stream
///
/// A transport error mid-body becomes a single
/// [`CloverError::StreamInterrupted`] item, after which the stream ends.
fn decode_fragments(bytes: ByteStream, decoder: FragmentDecoder) -> FragmentStream {
    let state = (bytes, decoder, VecDeque::<String>::new(), false);
    Box::pin(futures::stream::unfold(
        state,
        |(mut bytes, mut decoder, mut queue, mut done)| async move {
            loop {
                if let Some(fragment) = queue.pop_front() {
                    return Some((Ok(fragment), (bytes, decoder, queue, done)));
                }
                if done {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => queue.extend(decoder.push(&chunk)),
                    Some(Err(e)) => {
                        tracing::warn!("Reply stream broke: {}", e);
                        done = true;
                        let err = CloverError::StreamInterrupted(e.to_string());
                        return Some((Err(err), (bytes, decoder, queue, done)));
                    }
                    None => {
                        done = true;
                        queue.extend(decoder.finish());
                    }
                }
            }
        },
    ))
}

/// Incremental splitter from body bytes to text fragments
///
/// Code points split across chunk boundaries are carried to the next chunk.
/// Invalid UTF-8 is replaced with U+FFFD rather than failing the reply.
///
/// # Examples
///
/// ```
/// use clover::backend::FragmentDecoder;
/// use clover::config::FragmentFraming;
///
/// let mut decoder = FragmentDecoder::new(FragmentFraming::Lines);
/// assert_eq!(decoder.push(b"Hel"), Vec::<String>::new());
/// assert_eq!(decoder.push(b"lo\n\nwor"), vec!["Hello".to_string()]);
/// assert_eq!(decoder.finish(), vec!["wor".to_string()]);
/// ```
#[derive(Debug)]
pub struct FragmentDecoder {
    framing: FragmentFraming,
    pending: Vec<u8>,
}

impl FragmentDecoder {
    /// Create a decoder for the given framing
    pub fn new(framing: FragmentFraming) -> Self {
        Self {
            framing,
            pending: Vec::new(),
        }
    }

    /// Feed one received chunk, returning the fragments it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        match self.framing {
            FragmentFraming::Lines => self.drain_lines(),
            FragmentFraming::Raw => {
                let text = self.drain_utf8();
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![text]
                }
            }
        }
    }

    /// Flush whatever is left once the body has ended
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.pending);
        let mut text = String::from_utf8_lossy(&rest).into_owned();
        if self.framing == FragmentFraming::Lines && text.ends_with('\r') {
            text.pop();
        }
        if text.is_empty() {
            Vec::new()
        } else {
            vec![text]
        }
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let mut line = &raw[..raw.len() - 1];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            if !line.is_empty() {
                lines.push(String::from_utf8_lossy(line).into_owned());
            }
        }
        lines
    }

    fn drain_utf8(&mut self) -> String {
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            // Incomplete code point at the tail
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }
}
