use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use crate::{
    db::{Cache, CacheKey},
    models::{Candidate, Strategy},
    services::providers::{Channel, DeltaStream, NarrationDelta, NarrationOracle},
};

/// Candidate titles included in a narration prompt
pub const MAX_PROMPT_TITLES: usize = 5;

pub const SYSTEM_PROMPT: &str =
    "You are a recommendation assistant. Give a concise reason for recommending these items.";

/// What to narrate and what to fall back to
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationRequest {
    pub user_id: String,
    pub strategy: Strategy,
    pub titles: Vec<String>,
    pub fallback: String,
}

impl NarrationRequest {
    /// Builds a request from a scored batch
    ///
    /// The fallback is the first candidate's current reason.
    pub fn for_candidates(user_id: &str, strategy: Strategy, candidates: &[Candidate]) -> Self {
        Self {
            user_id: user_id.to_string(),
            strategy,
            titles: candidates
                .iter()
                .take(MAX_PROMPT_TITLES)
                .map(|c| c.meta.title.clone())
                .collect(),
            fallback: candidates
                .first()
                .map(|c| c.reason.clone())
                .unwrap_or_default(),
        }
    }

    pub fn prompt(&self) -> String {
        format!(
            "User: {} Strategy: {} Candidates: [{}] Explain why these items are recommended.",
            self.user_id,
            self.strategy,
            self.titles.join(", ")
        )
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::Narration {
            strategy: self.strategy,
            user_id: self.user_id.clone(),
            titles: self.titles.clone(),
        }
    }
}

/// Attaches oracle-written justifications to candidates
///
/// Every failure of the oracle degrades to the request's fallback text.
#[derive(Clone)]
pub struct Augmenter {
    oracle: Arc<dyn NarrationOracle>,
    cache: Option<Cache>,
    cache_ttl: u64,
    timeout: Duration,
    idle_timeout: Duration,
}

impl Augmenter {
    pub fn new(oracle: Arc<dyn NarrationOracle>, timeout: Duration, idle_timeout: Duration) -> Self {
        Self {
            oracle,
            cache: None,
            cache_ttl: 0,
            timeout,
            idle_timeout,
        }
    }

    /// Caches atomic justifications in Redis for `ttl` seconds
    pub fn with_cache(mut self, cache: Cache, ttl: u64) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    /// Produces one justification string, bounded by the timeout
    pub async fn justify(&self, request: &NarrationRequest) -> String {
        let key = request.cache_key();
        if let Some(cache) = &self.cache {
            match cache.get_from_cache::<String>(&key).await {
                Ok(Some(reason)) => {
                    tracing::debug!(user_id = %request.user_id, "Narration cache hit");
                    return reason;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Narration cache read failed"),
            }
        }

        let prompt = request.prompt();
        let result = tokio::time::timeout(
            self.timeout,
            self.oracle.complete(SYSTEM_PROMPT, &prompt),
        )
        .await;

        match result {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                let reason = text.trim().to_string();
                if let Some(cache) = &self.cache {
                    cache.set_in_background(&key, &reason, self.cache_ttl);
                }
                reason
            }
            Ok(Ok(_)) => {
                tracing::warn!(
                    oracle = self.oracle.name(),
                    user_id = %request.user_id,
                    "Oracle returned empty text, using fallback"
                );
                request.fallback.clone()
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    oracle = self.oracle.name(),
                    user_id = %request.user_id,
                    error = %e,
                    "Narration failed, using fallback"
                );
                request.fallback.clone()
            }
            Err(_) => {
                tracing::warn!(
                    oracle = self.oracle.name(),
                    user_id = %request.user_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Narration timed out, using fallback"
                );
                request.fallback.clone()
            }
        }
    }

    /// Opens a streaming narration
    ///
    /// Opening the stream is bounded by the timeout; each later delta by the
    /// idle timeout. A stream that cannot be opened yields no deltas and
    /// finishes with the fallback.
    pub async fn narrate(&self, request: &NarrationRequest) -> NarrationStream {
        let prompt = request.prompt();
        let opened = tokio::time::timeout(
            self.timeout,
            self.oracle.stream(SYSTEM_PROMPT, &prompt),
        )
        .await;

        let inner = match opened {
            Ok(Ok(stream)) => Some(stream),
            Ok(Err(e)) => {
                tracing::warn!(
                    oracle = self.oracle.name(),
                    user_id = %request.user_id,
                    error = %e,
                    "Narration stream unavailable, using fallback"
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    oracle = self.oracle.name(),
                    user_id = %request.user_id,
                    "Narration stream timed out opening, using fallback"
                );
                None
            }
        };

        NarrationStream {
            failed: inner.is_none(),
            inner,
            idle_timeout: self.idle_timeout,
            text: String::new(),
            fallback: request.fallback.clone(),
        }
    }
}

/// An in-progress streamed narration
///
/// Text deltas are accumulated as they are handed out. Dropping the stream
/// releases the underlying oracle call.
pub struct NarrationStream {
    inner: Option<DeltaStream>,
    idle_timeout: Duration,
    text: String,
    failed: bool,
    fallback: String,
}

impl NarrationStream {
    /// The next delta, or `None` once the stream ended or failed
    pub async fn next(&mut self) -> Option<NarrationDelta> {
        let stream = self.inner.as_mut()?;

        match tokio::time::timeout(self.idle_timeout, stream.next()).await {
            Ok(Some(Ok(delta))) => {
                if delta.channel == Channel::Text {
                    self.text.push_str(&delta.content);
                }
                Some(delta)
            }
            Ok(Some(Err(e))) => {
                tracing::warn!(error = %e, "Narration stream failed, using fallback");
                self.fail();
                None
            }
            Ok(None) => {
                self.inner = None;
                None
            }
            Err(_) => {
                tracing::warn!(
                    idle_timeout_ms = self.idle_timeout.as_millis() as u64,
                    "Narration stream went idle, using fallback"
                );
                self.fail();
                None
            }
        }
    }

    fn fail(&mut self) {
        self.failed = true;
        self.inner = None;
    }

    /// Final justification: the concatenated text, or the fallback
    ///
    /// Any forwarded text wins, even whitespace, so the result always equals
    /// what was streamed.
    pub fn finish(self) -> String {
        if self.failed || self.text.is_empty() {
            self.fallback
        } else {
            self.text
        }
    }
}

/// Applies one justification to the whole batch
pub fn apply_reason(candidates: &mut [Candidate], reason: &str) {
    for candidate in candidates {
        candidate.reason = reason.to_string();
    }
}
