use serde::Serialize;

use crate::{error::AppResult, models::StartupType, services::behavior_index::BehaviorIndex};

/// Result of classifying a user by interaction volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartupClassification {
    pub startup_type: StartupType,
    pub behavior_count: u64,
    pub threshold: u32,
}

/// Classifies the user as cold (`count < threshold`) or hot
///
/// Unknown users simply have zero interactions.
pub async fn classify(
    behavior: &BehaviorIndex,
    user_id: &str,
    threshold: u32,
) -> AppResult<StartupClassification> {
    let behavior_count = behavior.interaction_count(user_id).await?;
    let startup_type = StartupType::classify(behavior_count, threshold);

    tracing::debug!(
        user_id = %user_id,
        behavior_count,
        threshold,
        startup_type = %startup_type,
        "Classified user"
    );

    Ok(StartupClassification {
        startup_type,
        behavior_count,
        threshold,
    })
}
