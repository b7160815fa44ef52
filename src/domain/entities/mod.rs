pub mod post;
pub mod user;

pub use post::{AuthorSummary, Post, PostDraft, PostStats};
pub use user::{Profile, SessionUser};
