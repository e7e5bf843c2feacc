pub mod item;
pub mod recommendation;
pub mod user;

pub use item::{Item, UNKNOWN_CATEGORY};
pub use recommendation::{
    Candidate, Mode, RecommendationEvent, RecommendationPayload, RecommendationStatus,
    StartupType, Strategy,
};
pub use user::{EdgeKind, FeedbackRecord, Interaction, SocialEdge, User};
