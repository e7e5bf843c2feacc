use crate::{
    db::RecommendationStore,
    error::{AppError, AppResult},
    models::FeedbackRecord,
};

/// Validates and appends one feedback record
///
/// Both ids must exist in the store. The record is stamped with the current
/// time. Nothing is written when validation fails.
pub async fn record_feedback(
    store: &dyn RecommendationStore,
    user_id: &str,
    item_id: &str,
    score: u8,
) -> AppResult<FeedbackRecord> {
    if user_id.trim().is_empty() || item_id.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "user_id and item_id are required".to_string(),
        ));
    }
    if !(FeedbackRecord::MIN_SCORE..=FeedbackRecord::MAX_SCORE).contains(&score) {
        return Err(AppError::InvalidInput(format!(
            "score must be between {} and {}",
            FeedbackRecord::MIN_SCORE,
            FeedbackRecord::MAX_SCORE
        )));
    }

    if store.user(user_id).await?.is_none() {
        return Err(AppError::NotFound(format!("User {} not found", user_id)));
    }
    if store.item(item_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Item {} not found", item_id)));
    }

    let record = FeedbackRecord {
        user_id: user_id.to_string(),
        item_id: item_id.to_string(),
        score,
        timestamp: chrono::Utc::now().timestamp(),
    };
    store.append_feedback(&record).await?;

    tracing::info!(
        user_id = %record.user_id,
        item_id = %record.item_id,
        score = record.score,
        "Feedback recorded"
    );

    Ok(record)
}
