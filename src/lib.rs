pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use application::ports::{BackendClient, SessionListener};
pub use application::services::{
    ContentSnapshot, ContentStore, FeedView, ScopePhase, ScopeState, SessionPhase,
    SessionSnapshot, SessionStore,
};
pub use domain::entities::{AuthorSummary, Post, PostDraft, PostStats, Profile, SessionUser};
pub use domain::value_objects::{FeedScope, PostId, UserId};
pub use infrastructure::backend::RestBackendClient;
pub use shared::{AppConfig, AppError, ErrorKind};
pub use state::AppStores;

const DEFAULT_LOG_FILTER: &str = "verse_store=debug,info";

/// ログ設定の初期化（`RUST_LOG` が優先）
pub fn init_logging() {
    init_logging_with(DEFAULT_LOG_FILTER);
}

pub fn init_logging_with(filter: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    // 二重初期化は無視する
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
