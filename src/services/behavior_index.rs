use std::collections::HashMap;
use std::sync::Arc;

use crate::{db::RecommendationStore, error::AppResult, models::Interaction};

/// Read-side view over the interaction log
#[derive(Clone)]
pub struct BehaviorIndex {
    store: Arc<dyn RecommendationStore>,
}

impl BehaviorIndex {
    pub fn new(store: Arc<dyn RecommendationStore>) -> Self {
        Self { store }
    }

    /// Number of interactions recorded for the user
    pub async fn interaction_count(&self, user_id: &str) -> AppResult<u64> {
        self.store.count_interactions(user_id).await
    }

    /// The user's `limit` most recent interactions, oldest first
    pub async fn recent(&self, user_id: &str, limit: usize) -> AppResult<Vec<Interaction>> {
        self.store.recent_interactions(user_id, limit).await
    }

    /// Interaction counts per item across all users
    pub async fn popularity(&self) -> AppResult<Popularity> {
        let interactions = self.store.all_interactions().await?;
        Ok(Popularity::from_interactions(&interactions))
    }
}

/// Global interaction counts per item
///
/// Items are remembered in the order they were first seen in the log, which
/// is the tie-break for equal counts.
#[derive(Debug, Clone, Default)]
pub struct Popularity {
    order: Vec<String>,
    counts: HashMap<String, u64>,
}

impl Popularity {
    pub fn from_interactions(interactions: &[Interaction]) -> Self {
        let mut popularity = Self::default();
        for interaction in interactions {
            popularity.record(&interaction.item_id);
        }
        popularity
    }

    fn record(&mut self, item_id: &str) {
        match self.counts.get_mut(item_id) {
            Some(count) => *count += 1,
            None => {
                self.order.push(item_id.to_string());
                self.counts.insert(item_id.to_string(), 1);
            }
        }
    }

    /// Interaction count for the item, 0 when never seen
    pub fn count(&self, item_id: &str) -> u64 {
        self.counts.get(item_id).copied().unwrap_or(0)
    }

    /// Items by descending count; equal counts keep first-seen order
    pub fn ranked(&self) -> Vec<(&str, u64)> {
        let mut ranked: Vec<(&str, u64)> = self
            .order
            .iter()
            .map(|id| (id.as_str(), self.count(id)))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    /// 1-based position of every seen item in `ranked()`
    pub fn ranks(&self) -> HashMap<&str, usize> {
        self.ranked()
            .into_iter()
            .enumerate()
            .map(|(position, (id, _))| (id, position + 1))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
