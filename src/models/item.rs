use serde::{Deserialize, Serialize};

/// Category assigned to items without any category path
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// A catalog item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub item_id: String,
    pub title: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub features: Vec<String>,
    /// Hierarchical category paths; the first path's leaf is the canonical category
    #[serde(default)]
    pub categories: Vec<Vec<String>>,
    #[serde(default)]
    pub also_buy: Vec<String>,
    #[serde(default)]
    pub also_viewed: Vec<String>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub image_url_high_res: String,
}

impl Item {
    /// Creates an item with a title and a single category path
    pub fn new(item_id: impl Into<String>, title: impl Into<String>, path: &[&str]) -> Self {
        let categories = if path.is_empty() {
            Vec::new()
        } else {
            vec![path.iter().map(|c| c.to_string()).collect()]
        };

        Self {
            item_id: item_id.into(),
            title: title.into(),
            price: 0.0,
            brand: String::new(),
            description: String::new(),
            features: Vec::new(),
            categories,
            also_buy: Vec::new(),
            also_viewed: Vec::new(),
            image_url: String::new(),
            image_url_high_res: String::new(),
        }
    }

    /// Last element of the first category path, or `"Unknown"`
    pub fn leaf_category(&self) -> &str {
        self.categories
            .first()
            .and_then(|path| path.last())
            .map(String::as_str)
            .unwrap_or(UNKNOWN_CATEGORY)
    }
}
