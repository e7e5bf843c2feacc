use axum::{
    http::StatusCode,
    middleware::from_fn,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{make_span_with_request_id, request_id_middleware};

pub mod feedback;
pub mod metrics;
pub mod recommendations;
pub mod state;
pub mod users;

pub use state::AppState;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// API routes under /api
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:user_id", get(users::profile))
        .route("/users/:user_id/startup-type", get(users::startup_type))
        .route("/users/:user_id/sequence", get(users::sequence))
        .route("/users/:user_id/social-graph", get(users::social_graph))
        .route("/recommend", post(recommendations::recommend))
        .route("/recommend/stream", post(recommendations::recommend_stream))
        .route("/feedback", post(feedback::submit))
        .route("/metrics", get(metrics::metrics))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
