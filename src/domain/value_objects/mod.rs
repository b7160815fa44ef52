pub mod feed_scope;
pub mod ids;

pub use feed_scope::FeedScope;
pub use ids::{PostId, UserId};
