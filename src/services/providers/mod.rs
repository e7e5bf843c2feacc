//! Text-generation oracle abstraction
//!
//! The narration augmenter depends only on this trait. Adapters own every
//! detail of the remote wire format and normalize it into plain text or a
//! stream of typed deltas.
use futures::stream::BoxStream;
use serde::Serialize;

pub mod chat_completions;

pub use chat_completions::ChatCompletionsOracle;

/// Output channel of a streamed narration delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Model reasoning, forwarded to the caller but never stored on candidates
    Reasoning,
    /// Final answer text
    Text,
}

/// One increment of a streamed narration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrationDelta {
    pub channel: Channel,
    pub content: String,
}

impl NarrationDelta {
    pub fn reasoning(content: impl Into<String>) -> Self {
        Self {
            channel: Channel::Reasoning,
            content: content.into(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            channel: Channel::Text,
            content: content.into(),
        }
    }
}

/// Ordered narration deltas; an `Err` item ends the stream
pub type DeltaStream = BoxStream<'static, Result<NarrationDelta, OracleError>>;

#[derive(thiserror::Error, Debug)]
pub enum OracleError {
    #[error("Text generation is not configured")]
    Unavailable,

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Oracle returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed oracle response: {0}")]
    Malformed(String),
}

/// Best-effort text generation service
///
/// Implementations return `OracleError::Unavailable` without any network
/// call when they have no credentials.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait NarrationOracle: Send + Sync {
    /// Generate a complete answer in one response
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, OracleError>;

    /// Generate an answer as an incremental stream
    async fn stream(&self, system_prompt: &str, user_prompt: &str)
        -> Result<DeltaStream, OracleError>;

    /// Oracle name for logging and debugging
    fn name(&self) -> &'static str;
}
