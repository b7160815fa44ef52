pub mod content_store;
pub mod session_store;

pub use content_store::{ContentSnapshot, ContentStore, FeedView, ScopePhase, ScopeState};
pub use session_store::{SessionPhase, SessionSnapshot, SessionStore};
