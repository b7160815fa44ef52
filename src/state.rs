use crate::application::ports::{BackendClient, SessionListener};
use crate::application::services::{ContentStore, SessionStore};
use crate::infrastructure::backend::RestBackendClient;
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use std::sync::Arc;
use tracing::info;

/// セッションストアとコンテンツストアを束ねたアプリケーション状態
#[derive(Clone)]
pub struct AppStores {
    pub session: SessionStore,
    pub content: ContentStore,
}

impl AppStores {
    /// 任意のバックエンドで組み立てる。サインアウトはコンテンツストアへ伝播する
    pub async fn new(backend: Arc<dyn BackendClient>, config: &AppConfig) -> Self {
        let session = SessionStore::new(Arc::clone(&backend), config);
        let content = ContentStore::new(backend, session.subscribe(), config);
        session
            .add_listener(Arc::new(content.clone()) as Arc<dyn SessionListener>)
            .await;
        Self { session, content }
    }

    /// 設定から REST クライアントを作って組み立てる
    pub async fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let backend = Arc::new(RestBackendClient::new(config)?);
        info!("Using backend at {}", backend.base_url());
        Ok(Self::new(backend, config).await)
    }
}
