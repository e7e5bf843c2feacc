pub mod memory;
pub mod postgres;
pub mod redis;

pub use memory::{MemoryStore, Snapshot};
pub use postgres::{create_pool, PgStore};
pub use redis::create_redis_client;
pub use redis::Cache;
pub use redis::CacheKey;

use crate::{
    error::AppResult,
    models::{FeedbackRecord, Interaction, Item, SocialEdge, User},
};

/// Read-mostly access to users, items, interactions and social edges
///
/// The only write is `append_feedback`. Enumeration order of `all_items` and
/// `all_interactions` is the store's natural order and serves as the ranking
/// tie-break.
#[async_trait::async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn user(&self, user_id: &str) -> AppResult<Option<User>>;

    async fn count_interactions(&self, user_id: &str) -> AppResult<u64>;

    /// The user's most recent `limit` interactions, oldest first
    async fn recent_interactions(&self, user_id: &str, limit: usize)
        -> AppResult<Vec<Interaction>>;

    async fn all_interactions(&self) -> AppResult<Vec<Interaction>>;

    async fn item(&self, item_id: &str) -> AppResult<Option<Item>>;

    async fn all_items(&self) -> AppResult<Vec<Item>>;

    async fn outgoing_edges(&self, user_id: &str) -> AppResult<Vec<SocialEdge>>;

    async fn append_feedback(&self, record: &FeedbackRecord) -> AppResult<()>;

    async fn feedback(&self) -> AppResult<Vec<FeedbackRecord>>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
