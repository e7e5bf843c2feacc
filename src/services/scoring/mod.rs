//! Candidate scoring strategies
//!
//! Both scorers rank with a stable descending sort, so equal scores keep the
//! order in which items were enumerated (catalog order for the sequence
//! scorer, first-accumulation order for the social scorer). That tie-break
//! is deliberately weak and depends on store iteration order.
use std::collections::HashMap;

use crate::{
    error::AppResult,
    models::{Candidate, Item, Strategy},
};

pub mod sequence;
pub mod social;

pub use sequence::SequenceScorer;
pub use social::SocialScorer;

/// Produces a ranked candidate list for a user
#[async_trait::async_trait]
pub trait Scorer: Send + Sync {
    /// At most `top_k` candidates, non-increasing by score
    async fn score(&self, user_id: &str, top_k: usize) -> AppResult<Vec<Candidate>>;

    fn strategy(&self) -> Strategy;
}

/// Stable descending sort by score
pub(crate) fn rank_descending<K>(scored: &mut [(K, f64)]) {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
}

/// Index of catalog items by id
pub(crate) fn catalog_index(items: &[Item]) -> HashMap<&str, &Item> {
    items.iter().map(|item| (item.item_id.as_str(), item)).collect()
}
