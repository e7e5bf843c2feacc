use std::sync::Arc;

use crate::{db::RecommendationStore, error::AppResult, models::SocialEdge};

/// An outgoing neighbor and the weight of the edge leading to it
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub user_id: String,
    pub weight: f64,
}

/// Read-side view over the social graph
#[derive(Clone)]
pub struct SocialIndex {
    store: Arc<dyn RecommendationStore>,
}

impl SocialIndex {
    pub fn new(store: Arc<dyn RecommendationStore>) -> Self {
        Self { store }
    }

    /// Outgoing neighbors in edge order
    ///
    /// Duplicate edges are kept. Self-loops and weights outside (0, 1] are
    /// dropped.
    pub async fn neighbors(&self, user_id: &str) -> AppResult<Vec<Neighbor>> {
        let edges = self.store.outgoing_edges(user_id).await?;
        Ok(usable_neighbors(user_id, edges))
    }
}

fn usable_neighbors(user_id: &str, edges: Vec<SocialEdge>) -> Vec<Neighbor> {
    edges
        .into_iter()
        .filter(|edge| {
            if edge.is_self_loop() {
                tracing::warn!(user_id = %user_id, "Dropping self-loop social edge");
                return false;
            }
            if !(edge.weight > 0.0 && edge.weight <= 1.0) {
                tracing::warn!(
                    user_id = %user_id,
                    target = %edge.target,
                    weight = edge.weight,
                    "Dropping social edge with out-of-range weight"
                );
                return false;
            }
            true
        })
        .map(|edge| Neighbor {
            user_id: edge.target,
            weight: edge.weight,
        })
        .collect()
}
