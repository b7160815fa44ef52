use crate::domain::entities::Post;
use crate::domain::value_objects::{FeedScope, PostId};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// スコープごとの状態遷移
///
/// `Uninitialized → Loading → {Populated, Failed}`。どの状態からでも再取得できる。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum ScopePhase {
    #[default]
    Uninitialized,
    Loading,
    Populated,
    Failed(AppError),
}

/// 1 スコープ分のキャッシュ
///
/// `posts` は最後に成功したフェッチ結果で、失敗や再取得中も残る。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScopeState {
    pub phase: ScopePhase,
    pub posts: Option<Arc<Vec<Post>>>,
    pub loaded_at: Option<DateTime<Utc>>,
}

/// ビューが描画を分岐するための見え方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedView<'a> {
    /// まだ一度も取得していない
    NotLoaded,
    Loading { stale: Option<&'a [Post]> },
    /// 取得に成功したが 0 件
    Empty,
    Ready(&'a [Post]),
    Failed {
        error: &'a AppError,
        stale: Option<&'a [Post]>,
    },
}

impl ScopeState {
    pub fn is_loading(&self) -> bool {
        self.phase == ScopePhase::Loading
    }

    pub fn error(&self) -> Option<&AppError> {
        match &self.phase {
            ScopePhase::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn posts(&self) -> &[Post] {
        self.posts.as_deref().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn holds_data(&self) -> bool {
        self.posts.is_some()
    }

    pub fn view(&self) -> FeedView<'_> {
        let stale = self.posts.as_deref().map(Vec::as_slice);
        match &self.phase {
            ScopePhase::Uninitialized => FeedView::NotLoaded,
            ScopePhase::Loading => FeedView::Loading { stale },
            ScopePhase::Populated => match stale {
                Some(posts) if !posts.is_empty() => FeedView::Ready(posts),
                _ => FeedView::Empty,
            },
            ScopePhase::Failed(error) => FeedView::Failed { error, stale },
        }
    }

    pub(crate) fn mark_loading(&mut self) {
        self.phase = ScopePhase::Loading;
    }

    pub(crate) fn apply_result(&mut self, result: &Result<Arc<Vec<Post>>, AppError>) {
        match result {
            Ok(posts) => {
                self.phase = ScopePhase::Populated;
                self.posts = Some(Arc::clone(posts));
                self.loaded_at = Some(Utc::now());
            }
            Err(error) => {
                // 直前のデータは残す
                self.phase = ScopePhase::Failed(error.clone());
            }
        }
    }

    /// 先頭に追加する。同じ ID の投稿は移動させる。データが無いスコープは触らない
    pub(crate) fn prepend(&mut self, post: &Post) -> bool {
        let Some(current) = self.posts.as_ref() else {
            return false;
        };
        let mut next = Vec::with_capacity(current.len() + 1);
        next.push(post.clone());
        next.extend(current.iter().filter(|p| p.id != post.id).cloned());
        self.posts = Some(Arc::new(next));
        true
    }

    /// ID が一致する投稿を差し替える（並び順は変えない）
    pub(crate) fn replace(&mut self, post: &Post) -> bool {
        let Some(current) = self.posts.as_ref() else {
            return false;
        };
        let Some(index) = current.iter().position(|p| p.id == post.id) else {
            return false;
        };
        if current[index] == *post {
            return false;
        }
        let mut next = current.as_ref().clone();
        next[index] = post.clone();
        self.posts = Some(Arc::new(next));
        true
    }

    pub(crate) fn remove(&mut self, post_id: &PostId) -> bool {
        let Some(current) = self.posts.as_ref() else {
            return false;
        };
        if !current.iter().any(|p| &p.id == post_id) {
            return false;
        }
        let next: Vec<Post> = current.iter().filter(|p| &p.id != post_id).cloned().collect();
        self.posts = Some(Arc::new(next));
        true
    }

    /// 閲覧者依存のフラグを落とす（サインアウト後）
    pub(crate) fn clear_viewer_flags(&mut self) -> bool {
        let Some(current) = self.posts.as_ref() else {
            return false;
        };
        if !current.iter().any(|p| p.liked_by_me || p.bookmarked_by_me) {
            return false;
        }
        let next: Vec<Post> = current
            .iter()
            .cloned()
            .map(|mut post| {
                post.liked_by_me = false;
                post.bookmarked_by_me = false;
                post
            })
            .collect();
        self.posts = Some(Arc::new(next));
        true
    }
}

/// コンテンツストア全体のスナップショット
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentSnapshot {
    pub(crate) scopes: HashMap<FeedScope, ScopeState>,
}

impl ContentSnapshot {
    pub fn get(&self, scope: &FeedScope) -> Option<&ScopeState> {
        self.scopes.get(scope)
    }

    /// 未取得のスコープは `Uninitialized` として返す
    pub fn scope(&self, scope: &FeedScope) -> ScopeState {
        self.scopes.get(scope).cloned().unwrap_or_default()
    }

    pub fn scopes(&self) -> impl Iterator<Item = (&FeedScope, &ScopeState)> {
        self.scopes.iter()
    }

    pub fn is_any_loading(&self) -> bool {
        self.scopes.values().any(ScopeState::is_loading)
    }
}
