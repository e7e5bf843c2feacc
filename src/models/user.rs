use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A user of the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl User {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            meta: Map::new(),
        }
    }
}

/// A timestamped review/feedback event. Repeated events for the same pair are kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub user_id: String,
    pub item_id: String,
    /// Unix seconds
    pub timestamp: i64,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub vote: String,
    #[serde(default)]
    pub style: Map<String, Value>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl Interaction {
    pub fn new(user_id: impl Into<String>, item_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            user_id: user_id.into(),
            item_id: item_id.into(),
            timestamp,
            rating: 5.0,
            text: String::new(),
            summary: String::new(),
            verified: false,
            vote: "0".to_string(),
            style: Map::new(),
            images: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Follow,
    Friend,
}

/// Directed, weighted social edge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SocialEdge {
    pub source: String,
    pub target: String,
    /// In (0, 1]
    pub weight: f64,
    pub kind: EdgeKind,
}

impl SocialEdge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        weight: f64,
        kind: EdgeKind,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            weight,
            kind,
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}

/// Explicit user feedback on an item, append-only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRecord {
    pub user_id: String,
    pub item_id: String,
    /// 1..=5
    pub score: u8,
    /// Unix seconds
    pub timestamp: i64,
}

impl FeedbackRecord {
    pub const MIN_SCORE: u8 = 1;
    pub const MAX_SCORE: u8 = 5;
    /// Scores at or above this count as positive feedback
    pub const POSITIVE_SCORE: u8 = 4;

    pub fn is_positive(&self) -> bool {
        self.score >= Self::POSITIVE_SCORE
    }
}
