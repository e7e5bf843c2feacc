use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::{
    db::RecommendationStore,
    error::AppResult,
    models::{Candidate, Interaction, Item, Strategy},
    services::{
        behavior_index::{BehaviorIndex, Popularity},
        scoring::{catalog_index, rank_descending, Scorer},
    },
};

/// Interactions used to compute category affinity
pub const AFFINITY_WINDOW: usize = 10;
/// Interactions whose items are never recommended back
pub const EXCLUSION_WINDOW: usize = 20;
/// Weight increment per step back from the most recent interaction
pub const RECENCY_STEP: f64 = 0.1;
pub const POPULARITY_WEIGHT: f64 = 0.05;

/// Ranks items by recent category affinity plus global popularity
#[derive(Clone)]
pub struct SequenceScorer {
    store: Arc<dyn RecommendationStore>,
    behavior: BehaviorIndex,
}

impl SequenceScorer {
    pub fn new(store: Arc<dyn RecommendationStore>) -> Self {
        Self {
            behavior: BehaviorIndex::new(store.clone()),
            store,
        }
    }
}

#[async_trait::async_trait]
impl Scorer for SequenceScorer {
    async fn score(&self, user_id: &str, top_k: usize) -> AppResult<Vec<Candidate>> {
        // The affinity window is the tail of the exclusion window
        let recent = self.behavior.recent(user_id, EXCLUSION_WINDOW).await?;
        let items = self.store.all_items().await?;
        let popularity = self.behavior.popularity().await?;

        let candidates = rank(&recent, &items, &popularity, top_k);

        tracing::info!(
            user_id = %user_id,
            history = recent.len(),
            catalog = items.len(),
            returned = candidates.len(),
            "Sequence scoring completed"
        );

        Ok(candidates)
    }

    fn strategy(&self) -> Strategy {
        Strategy::Sequence
    }
}

/// Category weights from the last `AFFINITY_WINDOW` interactions
///
/// `history` is oldest first. The most recent interaction gets weight 1.0 and
/// each step further back adds `RECENCY_STEP`. Interactions whose item is not
/// in the catalog are skipped.
pub fn category_affinity(
    history: &[Interaction],
    catalog: &HashMap<&str, &Item>,
) -> HashMap<String, f64> {
    let start = history.len().saturating_sub(AFFINITY_WINDOW);
    let mut scores: HashMap<String, f64> = HashMap::new();

    for (index, event) in history[start..].iter().rev().enumerate() {
        let Some(item) = catalog.get(event.item_id.as_str()) else {
            continue;
        };
        let weight = 1.0 + index as f64 * RECENCY_STEP;
        *scores.entry(item.leaf_category().to_string()).or_insert(0.0) += weight;
    }

    scores
}

/// Scores every catalog item and returns the top `top_k` not touched in the
/// user's last `EXCLUSION_WINDOW` interactions
pub fn rank(
    history: &[Interaction],
    items: &[Item],
    popularity: &Popularity,
    top_k: usize,
) -> Vec<Candidate> {
    let catalog = catalog_index(items);
    let affinity = category_affinity(history, &catalog);

    let start = history.len().saturating_sub(EXCLUSION_WINDOW);
    let excluded: HashSet<&str> = history[start..]
        .iter()
        .map(|e| e.item_id.as_str())
        .collect();

    let mut scored: Vec<(&Item, f64)> = items
        .iter()
        .map(|item| {
            let affinity_score = affinity.get(item.leaf_category()).copied().unwrap_or(0.0);
            let popularity_score = popularity.count(&item.item_id) as f64 * POPULARITY_WEIGHT;
            (item, affinity_score + popularity_score)
        })
        .collect();
    rank_descending(&mut scored);

    scored
        .into_iter()
        .filter(|(item, _)| !excluded.contains(item.item_id.as_str()))
        .take(top_k)
        .map(|(item, score)| Candidate::new(item.clone(), score, Strategy::Sequence))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<Item> {
        vec![
            Item::new("kb1", "Mechanical Keyboard", &["Electronics", "Keyboards"]),
            Item::new("kb2", "Compact Keyboard", &["Electronics", "Keyboards"]),
            Item::new("ms1", "Wireless Mouse", &["Electronics", "Mice"]),
            Item::new("ms2", "Gaming Mouse", &["Electronics", "Mice"]),
            Item::new("hp1", "Headphones", &["Electronics", "Audio"]),
            Item::new("misc", "Mystery", &[]),
        ]
    }

    fn history(items: &[&str]) -> Vec<Interaction> {
        items
            .iter()
            .enumerate()
            .map(|(ts, item)| Interaction::new("u1", *item, ts as i64))
            .collect()
    }

    #[test]
    fn test_most_recent_interaction_gets_lowest_weight() {
        let items = catalog();
        let index = catalog_index(&items);
        // Oldest first: keyboard, then mouse (most recent)
        let affinity = category_affinity(&history(&["kb1", "ms1"]), &index);
        assert!((affinity["Mice"] - 1.0).abs() < 1e-9);
        assert!((affinity["Keyboards"] - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_affinity_only_uses_last_ten() {
        let items = catalog();
        let index = catalog_index(&items);
        let mut events = vec!["hp1"; 5];
        events.extend(vec!["ms1"; 10]);
        let affinity = category_affinity(&history(&events), &index);
        assert!(!affinity.contains_key("Audio"));
        // 1.0 + 1.1 + ... + 1.9
        assert!((affinity["Mice"] - 14.5).abs() < 1e-9);
    }

    #[test]
    fn test_affinity_skips_unknown_items_and_keeps_index() {
        let items = catalog();
        let index = catalog_index(&items);
        let affinity = category_affinity(&history(&["kb1", "gone", "misc"]), &index);
        assert!((affinity["Unknown"] - 1.0).abs() < 1e-9);
        assert!((affinity["Keyboards"] - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_never_returns_items_from_last_twenty() {
        let items = catalog();
        let events = history(&["kb1", "ms1"]);
        let popularity = Popularity::from_interactions(&events);
        let ranked = rank(&events, &items, &popularity, 10);
        let ids: Vec<&str> = ranked.iter().map(|c| c.item_id.as_str()).collect();
        assert!(!ids.contains(&"kb1"));
        assert!(!ids.contains(&"ms1"));
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_exclusion_window_is_wider_than_affinity_window() {
        let items = catalog();
        // hp1 is 15 interactions back: outside affinity, inside exclusion
        let mut events = vec!["hp1"];
        events.extend(vec!["kb1"; 14]);
        let events = history(&events);
        let popularity = Popularity::from_interactions(&events);
        let ranked = rank(&events, &items, &popularity, 10);
        assert!(ranked.iter().all(|c| c.item_id != "hp1"));
    }

    #[test]
    fn test_scores_combine_affinity_and_popularity() {
        let items = catalog();
        let events = history(&["kb1", "ms1"]);
        let mut log = events.clone();
        log.push(Interaction::new("u2", "ms2", 10));
        log.push(Interaction::new("u3", "ms2", 11));
        let popularity = Popularity::from_interactions(&log);

        let ranked = rank(&events, &items, &popularity, 10);
        let ids: Vec<&str> = ranked.iter().map(|c| c.item_id.as_str()).collect();
        // kb2: 1.1; ms2: 1.0 + 2 * 0.05 = 1.1 -> catalog order breaks the tie
        assert_eq!(ids, vec!["kb2", "ms2", "hp1", "misc"]);
        assert_eq!(ranked[0].score, 1.1);
        assert_eq!(ranked[1].score, 1.1);
        assert_eq!(ranked[2].score, 0.0);
        assert!(ranked.iter().all(|c| c.source == Strategy::Sequence));
    }

    #[test]
    fn test_no_history_ranks_by_popularity() {
        let items = catalog();
        let log = vec![
            Interaction::new("u2", "hp1", 1),
            Interaction::new("u2", "hp1", 2),
            Interaction::new("u3", "ms2", 3),
        ];
        let popularity = Popularity::from_interactions(&log);
        let ranked = rank(&[], &items, &popularity, 3);
        let ids: Vec<&str> = ranked.iter().map(|c| c.item_id.as_str()).collect();
        assert_eq!(ids, vec!["hp1", "ms2", "kb1"]);
    }

    #[test]
    fn test_top_k_larger_than_eligible_returns_fewer() {
        let items = vec![
            Item::new("a", "A", &["X"]),
            Item::new("b", "B", &["X"]),
            Item::new("c", "C", &["X"]),
            Item::new("d", "D", &["Y"]),
        ];
        let events = history(&["a", "b"]);
        let popularity = Popularity::from_interactions(&events);
        let ranked = rank(&events, &items, &popularity, 3);
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_scores_are_non_increasing() {
        let items = catalog();
        let events = history(&["kb1", "hp1", "ms1", "kb1"]);
        let popularity = Popularity::from_interactions(&events);
        let ranked = rank(&events, &items, &popularity, 10);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(ranked.iter().all(|c| c.score >= 0.0));
    }
}
