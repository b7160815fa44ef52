use crate::domain::entities::{Post, PostDraft, Profile, SessionUser};
use crate::domain::value_objects::{FeedScope, PostId, UserId};
use crate::shared::error::AppError;
use async_trait::async_trait;

/// リモートバックエンドへのポート
///
/// トランスポートには依存しない。ストアはこのトレイト越しにのみ通信する。
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// 現在のセッション（未ログインなら `None`）
    async fn get_session(&self) -> Result<Option<SessionUser>, AppError>;

    async fn get_profile(&self, user_id: &UserId) -> Result<Profile, AppError>;

    /// スコープの投稿一覧（バックエンドの並び順のまま）
    async fn list_posts(&self, scope: &FeedScope) -> Result<Vec<Post>, AppError>;

    async fn create_post(&self, draft: &PostDraft) -> Result<Post, AppError>;

    async fn sign_out(&self) -> Result<(), AppError>;

    /// いいねの設定/解除。確定後の投稿を返す
    async fn set_like(&self, post_id: &PostId, liked: bool) -> Result<Post, AppError>;

    /// ブックマークの設定/解除。確定後の投稿を返す
    async fn set_bookmark(&self, post_id: &PostId, bookmarked: bool) -> Result<Post, AppError>;
}
