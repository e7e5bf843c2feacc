use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    models::{StartupType, User},
    services::{
        classifier::classify,
        insights::{self, SequenceEvent, SocialGraph},
        recommendations::DEFAULT_THRESHOLD,
        BehaviorIndex,
    },
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ThresholdQuery {
    pub threshold: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StartupTypeResponse {
    pub user_id: String,
    pub startup_type: StartupType,
    pub behavior_count: u64,
    pub threshold: u32,
}

#[derive(Debug, Serialize)]
pub struct SequenceResponse {
    pub events: Vec<SequenceEvent>,
}

/// Handler for the user profile endpoint
pub async fn profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<User>> {
    let user = state
        .store
        .user(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
    Ok(Json(user))
}

/// Handler for the startup classification endpoint
///
/// Unknown users are classified like any other user with no history.
pub async fn startup_type(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ThresholdQuery>,
) -> AppResult<Json<StartupTypeResponse>> {
    let threshold = query.threshold.unwrap_or(DEFAULT_THRESHOLD);
    let behavior = BehaviorIndex::new(state.store.clone());
    let classification = classify(&behavior, &user_id, threshold).await?;

    Ok(Json(StartupTypeResponse {
        user_id,
        startup_type: classification.startup_type,
        behavior_count: classification.behavior_count,
        threshold,
    }))
}

/// Handler for the behavior sequence endpoint
pub async fn sequence(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<SequenceResponse>> {
    let events = insights::sequence_events(&state.store, &user_id).await?;
    Ok(Json(SequenceResponse { events }))
}

/// Handler for the social graph endpoint
pub async fn social_graph(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<SocialGraph>> {
    let graph = insights::social_graph(&state.store, &user_id).await?;
    Ok(Json(graph))
}
