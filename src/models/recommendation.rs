use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Display;

use super::Item;

/// Startup classification of a user by interaction volume
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StartupType {
    Cold,
    Hot,
}

impl StartupType {
    /// `Cold` iff `count < threshold`; `count == threshold` is `Hot`
    pub fn classify(count: u64, threshold: u32) -> Self {
        if count < u64::from(threshold) {
            StartupType::Cold
        } else {
            StartupType::Hot
        }
    }

    /// Strategy used when the caller does not override it
    pub fn default_strategy(self) -> Strategy {
        match self {
            StartupType::Hot => Strategy::Sequence,
            StartupType::Cold => Strategy::Social,
        }
    }
}

impl Display for StartupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupType::Cold => write!(f, "cold"),
            StartupType::Hot => write!(f, "hot"),
        }
    }
}

/// Scoring strategy that produced a candidate list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Sequence,
    Social,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Sequence => "sequence",
            Strategy::Social => "social",
        }
    }

    /// Human-readable description of which strategy fired
    pub fn summary(&self) -> &'static str {
        match self {
            Strategy::Sequence => "Hot-start user served by sequence recommendation",
            Strategy::Social => "Cold-start user served by social recommendation",
        }
    }

    /// Placeholder justification attached before narration
    pub fn default_reason(&self) -> &'static str {
        match self {
            Strategy::Sequence => {
                "Recommended from your recent behavior sequence and content preferences"
            }
            Strategy::Social => "Recommended from your social neighbors' behavior and influence",
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller's strategy preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Auto,
    Sequence,
    Social,
}

impl Mode {
    /// Unrecognized values fall back to `Auto`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "sequence" => Mode::Sequence,
            "social" => Mode::Social,
            _ => Mode::Auto,
        }
    }

    /// An explicit override wins over the classifier's mapping
    pub fn resolve(self, startup_type: StartupType) -> Strategy {
        match self {
            Mode::Sequence => Strategy::Sequence,
            Mode::Social => Strategy::Social,
            Mode::Auto => startup_type.default_strategy(),
        }
    }
}

/// A scored recommendation for one request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub item_id: String,
    pub score: f64,
    pub reason: String,
    pub source: Strategy,
    /// Item metadata as of scoring time
    pub meta: Item,
    /// Transport passthrough fields
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Candidate {
    pub fn new(item: Item, score: f64, source: Strategy) -> Self {
        Self {
            item_id: item.item_id.clone(),
            score: round4(score),
            reason: source.default_reason().to_string(),
            source,
            meta: item,
            extra: Map::new(),
        }
    }
}

pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    /// Narration still running
    Calculating,
    Completed,
}

/// Payload emitted on the initial and update events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationPayload {
    pub user_id: String,
    pub startup_type: StartupType,
    pub behavior_count: u64,
    pub strategy: Strategy,
    pub items: Vec<Candidate>,
    pub summary: String,
    pub status: RecommendationStatus,
}

/// Ordered protocol events of one recommendation run
#[derive(Debug, Clone, PartialEq)]
pub enum RecommendationEvent {
    Initial(RecommendationPayload),
    Reasoning(String),
    Text(String),
    Update(RecommendationPayload),
    Done,
}

impl RecommendationEvent {
    /// Event name used on the wire
    pub fn name(&self) -> &'static str {
        match self {
            RecommendationEvent::Initial(_) => "initial",
            RecommendationEvent::Reasoning(_) => "reasoning",
            RecommendationEvent::Text(_) => "text",
            RecommendationEvent::Update(_) => "update",
            RecommendationEvent::Done => "done",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_boundary_is_hot() {
        assert_eq!(StartupType::classify(4, 5), StartupType::Cold);
        assert_eq!(StartupType::classify(5, 5), StartupType::Hot);
        assert_eq!(StartupType::classify(6, 5), StartupType::Hot);
    }

    #[test]
    fn test_classify_zero_threshold_always_hot() {
        assert_eq!(StartupType::classify(0, 0), StartupType::Hot);
    }

    #[test]
    fn test_mode_parse_ignores_unknown_values() {
        assert_eq!(Mode::parse("sequence"), Mode::Sequence);
        assert_eq!(Mode::parse("Social"), Mode::Social);
        assert_eq!(Mode::parse("auto"), Mode::Auto);
        assert_eq!(Mode::parse("graph"), Mode::Auto);
        assert_eq!(Mode::parse(""), Mode::Auto);
    }

    #[test]
    fn test_mode_override_takes_precedence() {
        assert_eq!(Mode::Auto.resolve(StartupType::Hot), Strategy::Sequence);
        assert_eq!(Mode::Auto.resolve(StartupType::Cold), Strategy::Social);
        assert_eq!(Mode::Social.resolve(StartupType::Hot), Strategy::Social);
        assert_eq!(Mode::Sequence.resolve(StartupType::Cold), Strategy::Sequence);
    }

    #[test]
    fn test_candidate_rounds_score() {
        let item = Item::new("B001", "Speaker", &["Audio"]);
        let candidate = Candidate::new(item, 1.234_567, Strategy::Social);
        assert_eq!(candidate.score, 1.2346);
        assert_eq!(candidate.reason, Strategy::Social.default_reason());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&RecommendationStatus::Calculating).unwrap(),
            "\"calculating\""
        );
        assert_eq!(
            serde_json::to_string(&RecommendationStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}
