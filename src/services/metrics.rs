use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::{
    db::RecommendationStore,
    error::AppResult,
    models::{recommendation::round4, Candidate, FeedbackRecord, Strategy},
};

/// The most recently completed recommendation batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastRecommendation {
    pub user_id: String,
    pub strategy: Strategy,
    pub items: Vec<Candidate>,
}

/// Single-slot holder for the last recommendation batch
///
/// Concurrent writers overwrite each other; the last one wins. The slot only
/// feeds the metrics endpoint.
#[derive(Clone, Default)]
pub struct LastRecommendationSlot {
    inner: Arc<RwLock<Option<LastRecommendation>>>,
}

impl LastRecommendationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn store(&self, recommendation: LastRecommendation) {
        *self.inner.write().await = Some(recommendation);
    }

    pub async fn get(&self) -> Option<LastRecommendation> {
        self.inner.read().await.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    /// Share of feedback scored as positive
    pub ctr: f64,
    /// Distinct recommended items over catalog size
    pub coverage: f64,
    /// Distinct leaf categories over distinct recommended items
    pub diversity: f64,
    pub feedback_count: usize,
    /// Distinct items in the last recommendation
    pub last_recommendations: usize,
}

pub fn compute(
    feedback: &[FeedbackRecord],
    catalog_size: usize,
    last: Option<&LastRecommendation>,
) -> Metrics {
    let positive = feedback.iter().filter(|f| f.is_positive()).count();
    let ctr = if feedback.is_empty() {
        0.0
    } else {
        positive as f64 / feedback.len() as f64
    };

    let items: &[Candidate] = last.map(|l| l.items.as_slice()).unwrap_or_default();
    let distinct_items: HashSet<&str> = items.iter().map(|c| c.item_id.as_str()).collect();
    let categories: HashSet<&str> = items.iter().map(|c| c.meta.leaf_category()).collect();

    let coverage = if catalog_size == 0 {
        0.0
    } else {
        distinct_items.len() as f64 / catalog_size as f64
    };
    let diversity = if distinct_items.is_empty() {
        0.0
    } else {
        categories.len() as f64 / distinct_items.len() as f64
    };

    Metrics {
        ctr: round4(ctr),
        coverage: round4(coverage),
        diversity: round4(diversity),
        feedback_count: feedback.len(),
        last_recommendations: distinct_items.len(),
    }
}

/// Computes metrics from the store's feedback log and the slot
pub async fn compute_metrics(
    store: &dyn RecommendationStore,
    slot: &LastRecommendationSlot,
) -> AppResult<Metrics> {
    let feedback = store.feedback().await?;
    let catalog_size = store.all_items().await?.len();
    let last = slot.get().await;
    Ok(compute(&feedback, catalog_size, last.as_ref()))
}
