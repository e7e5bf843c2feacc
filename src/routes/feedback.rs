use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    models::FeedbackRecord,
    services::feedback::record_feedback,
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub user_id: String,
    pub item_id: String,
    pub score: i64,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub ok: bool,
    pub record: FeedbackRecord,
}

/// Handler for the feedback endpoint
pub async fn submit(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> AppResult<Json<FeedbackResponse>> {
    let score = u8::try_from(request.score)
        .map_err(|_| AppError::InvalidInput(format!("score {} is out of range", request.score)))?;
    let record =
        record_feedback(state.store.as_ref(), &request.user_id, &request.item_id, score).await?;
    Ok(Json(FeedbackResponse { ok: true, record }))
}
