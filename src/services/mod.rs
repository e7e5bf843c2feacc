pub mod behavior_index;
pub mod classifier;
pub mod feedback;
pub mod insights;
pub mod metrics;
pub mod narration;
pub mod providers;
pub mod recommendations;
pub mod scoring;
pub mod social_index;

pub use behavior_index::{BehaviorIndex, Popularity};
pub use metrics::{LastRecommendation, LastRecommendationSlot};
pub use narration::Augmenter;
pub use recommendations::{NarrationMode, RecommendationOptions, Recommender};
pub use social_index::SocialIndex;
