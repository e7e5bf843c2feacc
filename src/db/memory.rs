use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    db::RecommendationStore,
    error::{AppError, AppResult},
    models::{FeedbackRecord, Interaction, Item, SocialEdge, User},
};

/// Serialized dataset loaded into a `MemoryStore`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    #[serde(default)]
    pub social_edges: Vec<SocialEdge>,
}

impl Snapshot {
    /// Reads a JSON snapshot from disk
    pub async fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::Snapshot(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| AppError::Snapshot(format!("{}: {}", path.display(), e)))
    }
}

/// In-process store keeping insertion order for every collection
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

struct MemoryStoreInner {
    users: HashMap<String, User>,
    items: Vec<Item>,
    item_index: HashMap<String, usize>,
    interactions: Vec<Interaction>,
    social_edges: Vec<SocialEdge>,
    feedback: Vec<FeedbackRecord>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::default())
    }

    /// Creates a store holding the snapshot's data
    ///
    /// A later item with a duplicate id replaces the earlier one in place.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let users = snapshot
            .users
            .into_iter()
            .map(|user| (user.user_id.clone(), user))
            .collect();

        let mut items: Vec<Item> = Vec::with_capacity(snapshot.items.len());
        let mut item_index = HashMap::new();
        for item in snapshot.items {
            match item_index.get(&item.item_id) {
                Some(&position) => items[position] = item,
                None => {
                    item_index.insert(item.item_id.clone(), items.len());
                    items.push(item);
                }
            }
        }

        Self {
            inner: RwLock::new(MemoryStoreInner {
                users,
                items,
                item_index,
                interactions: snapshot.interactions,
                social_edges: snapshot.social_edges,
                feedback: Vec::new(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl RecommendationStore for MemoryStore {
    async fn user(&self, user_id: &str) -> AppResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(user_id).cloned())
    }

    async fn count_interactions(&self, user_id: &str) -> AppResult<u64> {
        let inner = self.inner.read().await;
        let count = inner
            .interactions
            .iter()
            .filter(|i| i.user_id == user_id)
            .count();
        Ok(count as u64)
    }

    async fn recent_interactions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> AppResult<Vec<Interaction>> {
        let inner = self.inner.read().await;
        let mut events: Vec<Interaction> = inner
            .interactions
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();

        // Stable: equal timestamps keep insertion order
        events.sort_by_key(|e| e.timestamp);
        let skip = events.len().saturating_sub(limit);
        Ok(events.split_off(skip))
    }

    async fn all_interactions(&self) -> AppResult<Vec<Interaction>> {
        let inner = self.inner.read().await;
        Ok(inner.interactions.clone())
    }

    async fn item(&self, item_id: &str) -> AppResult<Option<Item>> {
        let inner = self.inner.read().await;
        Ok(inner
            .item_index
            .get(item_id)
            .map(|&position| inner.items[position].clone()))
    }

    async fn all_items(&self) -> AppResult<Vec<Item>> {
        let inner = self.inner.read().await;
        Ok(inner.items.clone())
    }

    async fn outgoing_edges(&self, user_id: &str) -> AppResult<Vec<SocialEdge>> {
        let inner = self.inner.read().await;
        Ok(inner
            .social_edges
            .iter()
            .filter(|e| e.source == user_id)
            .cloned()
            .collect())
    }

    async fn append_feedback(&self, record: &FeedbackRecord) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner.feedback.push(record.clone());
        Ok(())
    }

    async fn feedback(&self) -> AppResult<Vec<FeedbackRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.feedback.clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
