use std::sync::Arc;

use crate::{
    db::RecommendationStore,
    services::{Augmenter, LastRecommendationSlot, Recommender},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecommendationStore>,
    pub recommender: Recommender,
    /// Last completed batch, read by the metrics endpoint
    pub last_recommendation: LastRecommendationSlot,
}

impl AppState {
    pub fn new(store: Arc<dyn RecommendationStore>, augmenter: Augmenter) -> Self {
        let last_recommendation = LastRecommendationSlot::new();
        Self {
            recommender: Recommender::new(store.clone(), augmenter, last_recommendation.clone()),
            store,
            last_recommendation,
        }
    }
}
