use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::{
    db::RecommendationStore,
    error::AppResult,
    services::{behavior_index::BehaviorIndex, social_index::SocialIndex},
};

/// Interactions shown in a user's behavior sequence
pub const SEQUENCE_VIEW_LIMIT: usize = 20;

/// One interaction enriched with item display fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceEvent {
    pub item_id: String,
    pub title: String,
    pub category: String,
    pub timestamp: i64,
    pub rating: f64,
    pub summary: String,
    /// Global popularity rank of the item, 1 being the most interacted with
    pub popularity_rank: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    /// 0 for the requested user, 1 for neighbors
    pub category: u8,
    pub symbol_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SocialGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// The user's most recent interactions, newest first
///
/// Items missing from the catalog are shown with an empty title.
pub async fn sequence_events(
    store: &Arc<dyn RecommendationStore>,
    user_id: &str,
) -> AppResult<Vec<SequenceEvent>> {
    let behavior = BehaviorIndex::new(store.clone());
    let recent = behavior.recent(user_id, SEQUENCE_VIEW_LIMIT).await?;
    let popularity = behavior.popularity().await?;
    let ranks = popularity.ranks();

    let mut events = Vec::with_capacity(recent.len());
    for interaction in recent.into_iter().rev() {
        let item = store.item(&interaction.item_id).await?;
        let (title, category) = match item {
            Some(item) => {
                let category = item.leaf_category().to_string();
                (item.title, category)
            }
            None => (String::new(), crate::models::UNKNOWN_CATEGORY.to_string()),
        };
        events.push(SequenceEvent {
            popularity_rank: ranks.get(interaction.item_id.as_str()).copied(),
            item_id: interaction.item_id,
            title,
            category,
            timestamp: interaction.timestamp,
            rating: interaction.rating,
            summary: interaction.summary,
        });
    }

    Ok(events)
}

/// Ego graph of the user's usable outgoing edges
///
/// Each neighbor appears once as a node; duplicate edges stay separate.
pub async fn social_graph(
    store: &Arc<dyn RecommendationStore>,
    user_id: &str,
) -> AppResult<SocialGraph> {
    let neighbors = SocialIndex::new(store.clone()).neighbors(user_id).await?;

    let mut nodes = vec![GraphNode {
        id: user_id.to_string(),
        name: user_id.to_string(),
        category: 0,
        symbol_size: 40,
        value: None,
    }];
    let mut seen = HashSet::new();
    let mut edges = Vec::with_capacity(neighbors.len());

    for neighbor in neighbors {
        if seen.insert(neighbor.user_id.clone()) {
            nodes.push(GraphNode {
                id: neighbor.user_id.clone(),
                name: neighbor.user_id.clone(),
                category: 1,
                symbol_size: 30,
                value: Some(neighbor.weight),
            });
        }
        edges.push(GraphEdge {
            source: user_id.to_string(),
            target: neighbor.user_id,
            value: neighbor.weight,
        });
    }

    Ok(SocialGraph { nodes, edges })
}
