use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    db::RecommendationStore,
    error::AppResult,
    models::{Candidate, Interaction, Item, Strategy},
    services::{
        behavior_index::{BehaviorIndex, Popularity},
        scoring::{catalog_index, rank_descending, Scorer},
        social_index::{Neighbor, SocialIndex},
    },
};

/// Interactions taken from each neighbor
pub const NEIGHBOR_WINDOW: usize = 10;
pub const POPULARITY_WEIGHT: f64 = 0.02;

/// Ranks items by what the user's outgoing neighbors recently touched
#[derive(Clone)]
pub struct SocialScorer {
    store: Arc<dyn RecommendationStore>,
    behavior: BehaviorIndex,
    social: SocialIndex,
}

impl SocialScorer {
    pub fn new(store: Arc<dyn RecommendationStore>) -> Self {
        Self {
            behavior: BehaviorIndex::new(store.clone()),
            social: SocialIndex::new(store.clone()),
            store,
        }
    }
}

#[async_trait::async_trait]
impl Scorer for SocialScorer {
    async fn score(&self, user_id: &str, top_k: usize) -> AppResult<Vec<Candidate>> {
        let neighbors = self.social.neighbors(user_id).await?;

        let mut neighbor_events = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let events = self
                .behavior
                .recent(&neighbor.user_id, NEIGHBOR_WINDOW)
                .await?;
            neighbor_events.push((neighbor, events));
        }

        let items = self.store.all_items().await?;
        let popularity = self.behavior.popularity().await?;

        let candidates = rank(&neighbor_events, &items, &popularity, top_k);

        tracing::info!(
            user_id = %user_id,
            neighbors = neighbor_events.len(),
            returned = candidates.len(),
            "Social scoring completed"
        );

        Ok(candidates)
    }

    fn strategy(&self) -> Strategy {
        Strategy::Social
    }
}

/// Accumulates neighbor edge weights per item in first-accumulation order
fn accumulate(neighbor_events: &[(Neighbor, Vec<Interaction>)]) -> Vec<(String, f64)> {
    let mut order: Vec<(String, f64)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for (neighbor, events) in neighbor_events {
        let start = events.len().saturating_sub(NEIGHBOR_WINDOW);
        for event in &events[start..] {
            match positions.get(event.item_id.as_str()) {
                Some(&pos) => order[pos].1 += neighbor.weight,
                None => {
                    positions.insert(event.item_id.as_str(), order.len());
                    order.push((event.item_id.clone(), neighbor.weight));
                }
            }
        }
    }

    order
}

/// Ranks neighbor-touched items, falling back to global popularity
///
/// Items missing from the catalog are dropped. When no neighbor-derived item
/// survives, the result is the popularity ranking.
pub fn rank(
    neighbor_events: &[(Neighbor, Vec<Interaction>)],
    items: &[Item],
    popularity: &Popularity,
    top_k: usize,
) -> Vec<Candidate> {
    let catalog = catalog_index(items);

    let mut scored: Vec<(&Item, f64)> = accumulate(neighbor_events)
        .into_iter()
        .filter_map(|(item_id, weight)| {
            let item = catalog.get(item_id.as_str())?;
            let score = weight + popularity.count(&item_id) as f64 * POPULARITY_WEIGHT;
            Some((*item, score))
        })
        .collect();

    if scored.is_empty() {
        tracing::debug!("No neighbor-derived items, using popularity ranking");
        return popularity_fallback(&catalog, popularity, top_k);
    }

    rank_descending(&mut scored);
    scored
        .into_iter()
        .take(top_k)
        .map(|(item, score)| Candidate::new(item.clone(), score, Strategy::Social))
        .collect()
}

/// Global popularity top-K, scored by raw interaction count
pub fn popularity_fallback(
    catalog: &HashMap<&str, &Item>,
    popularity: &Popularity,
    top_k: usize,
) -> Vec<Candidate> {
    popularity
        .ranked()
        .into_iter()
        .filter_map(|(item_id, count)| catalog.get(item_id).map(|item| (*item, count)))
        .take(top_k)
        .map(|(item, count)| Candidate::new(item.clone(), count as f64, Strategy::Social))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, Snapshot};
    use crate::models::{EdgeKind, SocialEdge};

    fn catalog() -> Vec<Item> {
        vec![
            Item::new("a", "Item A", &["Books"]),
            Item::new("b", "Item B", &["Books"]),
            Item::new("c", "Item C", &["Music"]),
            Item::new("d", "Item D", &["Music"]),
        ]
    }

    fn neighbor(id: &str, weight: f64) -> Neighbor {
        Neighbor {
            user_id: id.to_string(),
            weight,
        }
    }

    fn events(user: &str, items: &[&str]) -> Vec<Interaction> {
        items
            .iter()
            .enumerate()
            .map(|(ts, item)| Interaction::new(user, *item, ts as i64))
            .collect()
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.item_id.as_str()).collect()
    }

    #[test]
    fn test_neighbor_weights_accumulate_with_popularity() {
        let items = catalog();
        let n1 = events("n1", &["a", "b"]);
        let n2 = events("n2", &["b"]);
        let mut log = n1.clone();
        log.extend(n2.clone());
        let popularity = Popularity::from_interactions(&log);

        let ranked = rank(
            &[(neighbor("n1", 0.5), n1), (neighbor("n2", 0.4), n2)],
            &items,
            &popularity,
            10,
        );
        // b: 0.5 + 0.4 + 2 * 0.02; a: 0.5 + 0.02
        assert_eq!(ids(&ranked), vec!["b", "a"]);
        assert_eq!(ranked[0].score, 0.94);
        assert_eq!(ranked[1].score, 0.52);
        assert!(ranked.iter().all(|c| c.source == Strategy::Social));
    }

    #[test]
    fn test_duplicate_edges_sum() {
        let items = catalog();
        let n = events("n1", &["c"]);
        let popularity = Popularity::from_interactions(&n);
        let ranked = rank(
            &[(neighbor("n1", 0.3), n.clone()), (neighbor("n1", 0.3), n)],
            &items,
            &popularity,
            10,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score, 0.62);
    }

    #[test]
    fn test_only_last_ten_neighbor_events_count() {
        let items = catalog();
        let mut touched = vec!["d"];
        touched.extend(vec!["a"; 10]);
        let n = events("n1", &touched);
        let ranked = rank(
            &[(neighbor("n1", 1.0), n)],
            &items,
            &Popularity::default(),
            10,
        );
        assert_eq!(ids(&ranked), vec!["a"]);
    }

    #[test]
    fn test_ties_keep_first_accumulation_order() {
        let items = catalog();
        let n = events("n1", &["d", "a", "c"]);
        let ranked = rank(
            &[(neighbor("n1", 0.5), n)],
            &items,
            &Popularity::default(),
            2,
        );
        assert_eq!(ids(&ranked), vec!["d", "a"]);
    }

    #[test]
    fn test_unknown_items_fall_back_to_popularity() {
        let items = catalog();
        let n = events("n1", &["ghost"]);
        let log = events("x", &["c", "a", "c"]);
        let popularity = Popularity::from_interactions(&log);
        let ranked = rank(&[(neighbor("n1", 0.9), n)], &items, &popularity, 10);
        assert_eq!(ids(&ranked), vec!["c", "a"]);
        assert_eq!(ranked[0].score, 2.0);
    }

    #[tokio::test]
    async fn test_zero_edges_equals_popularity_top_k() {
        let log = vec![
            Interaction::new("x", "b", 1),
            Interaction::new("y", "d", 2),
            Interaction::new("z", "d", 3),
            Interaction::new("z", "a", 4),
        ];
        let items = catalog();
        let popularity = Popularity::from_interactions(&log);
        let expected = popularity_fallback(&catalog_index(&items), &popularity, 2);

        let store = MemoryStore::from_snapshot(Snapshot {
            items,
            interactions: log,
            ..Snapshot::default()
        });
        let scorer = SocialScorer::new(Arc::new(store));
        let ranked = scorer.score("loner", 2).await.unwrap();

        assert_eq!(ids(&ranked), vec!["d", "b"]);
        assert_eq!(ids(&ranked), ids(&expected));
    }

    #[tokio::test]
    async fn test_scorer_reads_neighbors_from_store() {
        let store = MemoryStore::from_snapshot(Snapshot {
            items: catalog(),
            interactions: vec![
                Interaction::new("n1", "c", 1),
                Interaction::new("n2", "a", 2),
                Interaction::new("u1", "b", 3),
            ],
            social_edges: vec![
                SocialEdge::new("u1", "n1", 0.2, EdgeKind::Follow),
                SocialEdge::new("u1", "n2", 0.8, EdgeKind::Friend),
                SocialEdge::new("u1", "u1", 1.0, EdgeKind::Follow),
            ],
            ..Snapshot::default()
        });
        let scorer = SocialScorer::new(Arc::new(store));
        let ranked = scorer.score("u1", 10).await.unwrap();
        assert_eq!(ids(&ranked), vec!["a", "c"]);
        assert_eq!(scorer.strategy(), Strategy::Social);
    }

    #[test]
    fn test_empty_catalog_yields_empty_list() {
        let log = events("x", &["a"]);
        let popularity = Popularity::from_interactions(&log);
        assert!(rank(&[], &[], &popularity, 5).is_empty());
    }
}
