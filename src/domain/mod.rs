pub mod entities;
pub mod value_objects;

pub use entities::{Post, PostDraft, Profile, SessionUser};
pub use value_objects::{FeedScope, PostId, UserId};
