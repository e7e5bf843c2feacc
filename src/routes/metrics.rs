use axum::{extract::State, Json};
use serde::Serialize;

use crate::{
    error::AppResult,
    services::metrics::{compute_metrics, Metrics},
};

use super::AppState;

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub metrics: Metrics,
}

/// Handler for the metrics endpoint
pub async fn metrics(State(state): State<AppState>) -> AppResult<Json<MetricsResponse>> {
    let metrics = compute_metrics(state.store.as_ref(), &state.last_recommendation).await?;
    Ok(Json(MetricsResponse { metrics }))
}
