use serde_json::{Map, Value};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool};

use crate::{
    db::RecommendationStore,
    error::AppResult,
    models::{EdgeKind, FeedbackRecord, Interaction, Item, SocialEdge, User},
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the bundled schema migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const INTERACTION_COLUMNS: &str = "user_id, item_id, ts, rating, review_text, summary, \
     verified, vote, style, images";

const ITEM_COLUMNS: &str = "item_id, title, price, brand, description, features, categories, \
     also_buy, also_viewed, image_url, image_url_high_res";

#[derive(FromRow)]
struct UserRow {
    user_id: String,
    name: Option<String>,
    meta: Option<Json<Map<String, Value>>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            user_id: row.user_id,
            name: row.name.unwrap_or_default(),
            meta: row.meta.map(|m| m.0).unwrap_or_default(),
        }
    }
}

#[derive(FromRow)]
struct ItemRow {
    item_id: String,
    title: String,
    price: Option<f64>,
    brand: Option<String>,
    description: Option<String>,
    features: Option<Json<Vec<String>>>,
    categories: Option<Json<Vec<Vec<String>>>>,
    also_buy: Option<Json<Vec<String>>>,
    also_viewed: Option<Json<Vec<String>>>,
    image_url: Option<String>,
    image_url_high_res: Option<String>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            item_id: row.item_id,
            title: row.title,
            price: row.price.unwrap_or_default(),
            brand: row.brand.unwrap_or_default(),
            description: row.description.unwrap_or_default(),
            features: row.features.map(|j| j.0).unwrap_or_default(),
            categories: row.categories.map(|j| j.0).unwrap_or_default(),
            also_buy: row.also_buy.map(|j| j.0).unwrap_or_default(),
            also_viewed: row.also_viewed.map(|j| j.0).unwrap_or_default(),
            image_url: row.image_url.unwrap_or_default(),
            image_url_high_res: row.image_url_high_res.unwrap_or_default(),
        }
    }
}

#[derive(FromRow)]
struct InteractionRow {
    user_id: String,
    item_id: String,
    ts: i64,
    rating: Option<f64>,
    review_text: Option<String>,
    summary: Option<String>,
    verified: bool,
    vote: Option<String>,
    style: Option<Json<Map<String, Value>>>,
    images: Option<Json<Vec<String>>>,
}

impl From<InteractionRow> for Interaction {
    fn from(row: InteractionRow) -> Self {
        Interaction {
            user_id: row.user_id,
            item_id: row.item_id,
            timestamp: row.ts,
            rating: row.rating.unwrap_or_default(),
            text: row.review_text.unwrap_or_default(),
            summary: row.summary.unwrap_or_default(),
            verified: row.verified,
            vote: row.vote.unwrap_or_else(|| "0".to_string()),
            style: row.style.map(|j| j.0).unwrap_or_default(),
            images: row.images.map(|j| j.0).unwrap_or_default(),
        }
    }
}

#[derive(FromRow)]
struct EdgeRow {
    source: String,
    target: String,
    weight: f64,
    kind: Option<String>,
}

impl From<EdgeRow> for SocialEdge {
    fn from(row: EdgeRow) -> Self {
        let kind = match row.kind.as_deref() {
            Some("friend") => EdgeKind::Friend,
            _ => EdgeKind::Follow,
        };
        SocialEdge {
            source: row.source,
            target: row.target,
            weight: row.weight,
            kind,
        }
    }
}

#[derive(FromRow)]
struct FeedbackRow {
    user_id: String,
    item_id: String,
    score: i16,
    ts: i64,
}

impl From<FeedbackRow> for FeedbackRecord {
    fn from(row: FeedbackRow) -> Self {
        FeedbackRecord {
            user_id: row.user_id,
            item_id: row.item_id,
            score: row.score.clamp(0, i16::from(u8::MAX)) as u8,
            timestamp: row.ts,
        }
    }
}

/// Postgres-backed store
///
/// Rows are enumerated by their serial `seq`/`id` columns so ranking ties
/// follow insertion order.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RecommendationStore for PgStore {
    async fn user(&self, user_id: &str) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT user_id, name, meta FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn count_interactions(&self, user_id: &str) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn recent_interactions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> AppResult<Vec<Interaction>> {
        let query = format!(
            "SELECT {} FROM interactions WHERE user_id = $1 ORDER BY ts DESC, id DESC LIMIT $2",
            INTERACTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, InteractionRow>(&query)
            .bind(user_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        // Fetched newest first; callers expect oldest first
        Ok(rows.into_iter().rev().map(Interaction::from).collect())
    }

    async fn all_interactions(&self) -> AppResult<Vec<Interaction>> {
        let query = format!("SELECT {} FROM interactions ORDER BY id", INTERACTION_COLUMNS);
        let rows = sqlx::query_as::<_, InteractionRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Interaction::from).collect())
    }

    async fn item(&self, item_id: &str) -> AppResult<Option<Item>> {
        let query = format!("SELECT {} FROM items WHERE item_id = $1", ITEM_COLUMNS);
        let row = sqlx::query_as::<_, ItemRow>(&query)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Item::from))
    }

    async fn all_items(&self) -> AppResult<Vec<Item>> {
        let query = format!("SELECT {} FROM items ORDER BY seq", ITEM_COLUMNS);
        let rows = sqlx::query_as::<_, ItemRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn outgoing_edges(&self, user_id: &str) -> AppResult<Vec<SocialEdge>> {
        let rows = sqlx::query_as::<_, EdgeRow>(
            "SELECT source, target, weight, kind FROM social_edges WHERE source = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SocialEdge::from).collect())
    }

    async fn append_feedback(&self, record: &FeedbackRecord) -> AppResult<()> {
        sqlx::query("INSERT INTO feedback (user_id, item_id, score, ts) VALUES ($1, $2, $3, $4)")
            .bind(&record.user_id)
            .bind(&record.item_id)
            .bind(i16::from(record.score))
            .bind(record.timestamp)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn feedback(&self) -> AppResult<Vec<FeedbackRecord>> {
        let rows = sqlx::query_as::<_, FeedbackRow>(
            "SELECT user_id, item_id, score, ts FROM feedback ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedbackRecord::from).collect())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_row_kind_mapping() {
        let edge = SocialEdge::from(EdgeRow {
            source: "u1".to_string(),
            target: "u2".to_string(),
            weight: 0.8,
            kind: Some("friend".to_string()),
        });
        assert_eq!(edge.kind, EdgeKind::Friend);

        let edge = SocialEdge::from(EdgeRow {
            source: "u1".to_string(),
            target: "u2".to_string(),
            weight: 0.8,
            kind: None,
        });
        assert_eq!(edge.kind, EdgeKind::Follow);
    }

    #[test]
    fn test_item_row_defaults_missing_columns() {
        let item = Item::from(ItemRow {
            item_id: "i1".to_string(),
            title: "Keyboard".to_string(),
            price: None,
            brand: None,
            description: None,
            features: None,
            categories: Some(Json(vec![vec![
                "Electronics".to_string(),
                "Keyboards".to_string(),
            ]])),
            also_buy: None,
            also_viewed: None,
            image_url: None,
            image_url_high_res: None,
        });
        assert_eq!(item.price, 0.0);
        assert_eq!(item.leaf_category(), "Keyboards");
    }

    #[test]
    fn test_interaction_row_conversion() {
        let interaction = Interaction::from(InteractionRow {
            user_id: "u1".to_string(),
            item_id: "i1".to_string(),
            ts: 1_400_000_000,
            rating: Some(4.0),
            review_text: None,
            summary: Some("Solid".to_string()),
            verified: true,
            vote: None,
            style: None,
            images: None,
        });
        assert_eq!(interaction.timestamp, 1_400_000_000);
        assert_eq!(interaction.summary, "Solid");
        assert_eq!(interaction.vote, "0");
    }
}
