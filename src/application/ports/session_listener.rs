use crate::domain::value_objects::UserId;
use async_trait::async_trait;

/// セッション終了を他のストアへ伝えるポート
#[async_trait]
pub trait SessionListener: Send + Sync {
    /// サインアウト完了時に呼ばれる。`user_id` は直前までのユーザー
    async fn on_signed_out(&self, user_id: Option<&UserId>);
}
