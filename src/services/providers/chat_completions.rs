//! OpenAI-compatible chat-completions oracle
//!
//! Works against any endpoint exposing `POST {base}/chat/completions`,
//! including Volcengine Ark. Streaming responses are server-sent events whose
//! `data:` lines carry `choices[0].delta.reasoning_content` and
//! `choices[0].delta.content`, terminated by `data: [DONE]`.
use std::collections::VecDeque;

use futures::{stream::BoxStream, StreamExt};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};

use crate::services::providers::{DeltaStream, NarrationDelta, NarrationOracle, OracleError};

#[derive(Clone)]
pub struct ChatCompletionsOracle {
    http_client: HttpClient,
    api_key: Option<String>,
    api_url: String,
    model: String,
}

impl ChatCompletionsOracle {
    pub fn new(api_key: Option<String>, api_url: String, model: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url,
            model,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_url.trim_end_matches('/'))
    }

    fn request_body(&self, system_prompt: &str, user_prompt: &str, stream: bool) -> Value {
        json!({
            "model": self.model,
            "stream": stream,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
        })
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, OracleError> {
        let api_key = self.api_key.as_ref().ok_or(OracleError::Unavailable)?;

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = %status,
                body = %body,
                "Chat completions request failed"
            );
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl NarrationOracle for ChatCompletionsOracle {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, OracleError> {
        let body = self.request_body(system_prompt, user_prompt, false);
        let response = self.send(&body).await?;
        let json: Value = response.json().await?;
        extract_message_text(&json)
    }

    async fn stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<DeltaStream, OracleError> {
        let body = self.request_body(system_prompt, user_prompt, true);
        let response = self.send(&body).await?;

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(OracleError::from))
            .boxed();

        Ok(decode_event_stream(bytes))
    }

    fn name(&self) -> &'static str {
        "chat-completions"
    }
}

/// Pulls the answer text out of a non-streaming response
///
/// Accepts the chat-completions shape (`choices[0].message.content`) and the
/// responses shape (`output[].content[].text`).
fn extract_message_text(json: &Value) -> Result<String, OracleError> {
    if let Some(content) = json
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        return Ok(content.to_string());
    }

    let from_output = json
        .get("output")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("content").and_then(Value::as_array))
        .flatten()
        .find_map(|part| part.get("text").and_then(Value::as_str));

    from_output
        .map(str::to_string)
        .ok_or_else(|| OracleError::Malformed("response has no message content".to_string()))
}

/// Splits a byte stream into complete lines, tolerating chunk boundaries
/// anywhere, including inside multi-byte characters.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            lines.push(
                String::from_utf8_lossy(&line)
                    .trim_end_matches(['\r', '\n'])
                    .to_string(),
            );
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).trim_end().to_string())
    }
}

#[derive(Debug, PartialEq)]
enum StreamLine {
    Deltas(Vec<NarrationDelta>),
    Done,
}

/// Parses one server-sent-event line
///
/// Comments, blank lines and non-`data` fields yield `None`.
fn parse_stream_line(line: &str) -> Result<Option<StreamLine>, OracleError> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };

    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    if data == "[DONE]" {
        return Ok(Some(StreamLine::Done));
    }

    let chunk: Value = serde_json::from_str(data)
        .map_err(|e| OracleError::Malformed(format!("invalid stream chunk: {}", e)))?;

    if let Some(message) = chunk.pointer("/error/message").and_then(Value::as_str) {
        return Err(OracleError::Malformed(format!("stream error: {}", message)));
    }

    let delta = chunk.pointer("/choices/0/delta");
    let field = |name: &str| {
        delta
            .and_then(|d| d.get(name))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };

    let mut deltas = Vec::new();
    if let Some(reasoning) = field("reasoning_content") {
        deltas.push(NarrationDelta::reasoning(reasoning));
    }
    if let Some(text) = field("content") {
        deltas.push(NarrationDelta::text(text));
    }

    Ok(Some(StreamLine::Deltas(deltas)))
}

struct DecodeState {
    bytes: BoxStream<'static, Result<Vec<u8>, OracleError>>,
    lines: LineBuffer,
    pending: VecDeque<Result<NarrationDelta, OracleError>>,
    finished: bool,
}

impl DecodeState {
    /// Queues the outcome of one line; returns false once the stream is over
    fn accept(&mut self, line: &str) -> bool {
        match parse_stream_line(line) {
            Ok(Some(StreamLine::Deltas(deltas))) => {
                self.pending.extend(deltas.into_iter().map(Ok));
                true
            }
            Ok(Some(StreamLine::Done)) => false,
            Ok(None) => true,
            Err(e) => {
                self.pending.push_back(Err(e));
                false
            }
        }
    }
}

/// Turns raw server-sent-event bytes into ordered narration deltas
fn decode_event_stream(bytes: BoxStream<'static, Result<Vec<u8>, OracleError>>) -> DeltaStream {
    let state = DecodeState {
        bytes,
        lines: LineBuffer::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for line in state.lines.push(&chunk) {
                        if !state.accept(&line) {
                            state.finished = true;
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(e));
                    state.finished = true;
                }
                None => {
                    if let Some(line) = state.lines.finish() {
                        state.accept(&line);
                    }
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}
