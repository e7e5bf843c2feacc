use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::{
    error::AppResult,
    models::{Mode, RecommendationEvent, RecommendationPayload},
    services::recommendations::{
        NarrationMode, RecommendationOptions, DEFAULT_THRESHOLD, DEFAULT_TOP_K,
    },
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    pub user_id: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default = "default_use_narration")]
    pub use_narration: bool,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_threshold() -> u32 {
    DEFAULT_THRESHOLD
}

fn default_use_narration() -> bool {
    true
}

impl RecommendationRequest {
    fn options(&self, narration: NarrationMode) -> RecommendationOptions {
        RecommendationOptions {
            top_k: self.top_k,
            threshold: self.threshold,
            mode: self.mode.as_deref().map(Mode::parse).unwrap_or_default(),
            use_narration: self.use_narration,
            narration,
        }
    }
}

/// Handler for the buffered recommendations endpoint
pub async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<RecommendationPayload>> {
    let payload = state
        .recommender
        .recommend(&request.user_id, request.options(NarrationMode::Atomic))
        .await?;
    Ok(Json(payload))
}

/// Handler for the server-sent events recommendations endpoint
///
/// Relays `initial`, `reasoning`, `text`, `update` and `done` events in run
/// order. A run that fails after the stream opened ends with an `error`
/// event instead of `done`.
pub async fn recommend_stream(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let rx = state
        .recommender
        .stream(&request.user_id, request.options(NarrationMode::Streaming))
        .await?;
    Ok(Sse::new(event_stream(rx)).keep_alive(KeepAlive::default()))
}

fn event_stream(
    rx: mpsc::Receiver<RecommendationEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::unfold((rx, false), |(mut rx, finished)| async move {
        if finished {
            return None;
        }
        match rx.recv().await {
            Some(event) => {
                let done = matches!(event, RecommendationEvent::Done);
                Some((Ok(to_sse_event(&event)), (rx, done)))
            }
            None => Some((Ok(error_event("recommendation run failed")), (rx, true))),
        }
    })
}

fn to_sse_event(event: &RecommendationEvent) -> Event {
    let sse = Event::default().event(event.name());
    let encoded = match event {
        RecommendationEvent::Initial(payload) | RecommendationEvent::Update(payload) => {
            sse.json_data(payload)
        }
        RecommendationEvent::Reasoning(content) | RecommendationEvent::Text(content) => {
            sse.json_data(json!({ "content": content }))
        }
        RecommendationEvent::Done => return sse.data("[DONE]"),
    };

    encoded.unwrap_or_else(|e| {
        tracing::error!(error = %e, event = event.name(), "Failed to encode SSE event");
        error_event("failed to encode event")
    })
}

fn error_event(message: &str) -> Event {
    Event::default()
        .event("error")
        .data(json!({ "error": message }).to_string())
}
