mod scope_state;
#[cfg(test)]
mod tests;

pub use scope_state::{ContentSnapshot, FeedView, ScopePhase, ScopeState};

use crate::application::ports::{BackendClient, SessionListener};
use crate::application::services::session_store::SessionSnapshot;
use crate::domain::entities::{Post, PostDraft};
use crate::domain::value_objects::{FeedScope, PostId, UserId};
use crate::infrastructure::cache::{FetchSlots, FetchTicket};
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub type PostList = Arc<Vec<Post>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchMode {
    /// 進行中のフェッチがあれば合流する
    JoinPending,
    /// 進行中のフェッチを置き換える
    Supersede,
}

/// 進行中フェッチより後に作成された投稿
///
/// そのフェッチの応答には含まれないので、適用時に先頭へ戻す。
struct CreatedDuringFetch {
    generation: u64,
    posts: Vec<Post>,
}

struct ContentInner {
    backend: Arc<dyn BackendClient>,
    request_timeout: Duration,
    max_user_scopes: usize,
    session: watch::Receiver<SessionSnapshot>,
    state: watch::Sender<ContentSnapshot>,
    slots: Mutex<FetchSlots<FeedScope, PostList>>,
    // ロック順は slots → created_during_fetch
    created_during_fetch: Mutex<HashMap<FeedScope, CreatedDuringFetch>>,
}

/// スコープ単位で投稿コレクションをキャッシュするストア
#[derive(Clone)]
pub struct ContentStore {
    inner: Arc<ContentInner>,
}

impl ContentStore {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        session: watch::Receiver<SessionSnapshot>,
        config: &AppConfig,
    ) -> Self {
        let (state, _) = watch::channel(ContentSnapshot::default());
        Self {
            inner: Arc::new(ContentInner {
                backend,
                request_timeout: config.request_timeout(),
                max_user_scopes: config.cache.max_user_scopes,
                session,
                state,
                slots: Mutex::new(FetchSlots::new()),
                created_during_fetch: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ContentSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> ContentSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn scope(&self, scope: &FeedScope) -> ScopeState {
        self.inner.state.borrow().scope(scope)
    }

    /// スコープの投稿を取得（進行中のリクエストがあれば合流）
    pub async fn fetch_posts(&self, scope: FeedScope) -> Result<PostList, AppError> {
        self.request(scope, FetchMode::JoinPending).await
    }

    /// スコープの投稿を取り直す。進行中のリクエストの応答は破棄される
    pub async fn refresh_posts(&self, scope: FeedScope) -> Result<PostList, AppError> {
        self.request(scope, FetchMode::Supersede).await
    }

    /// 投稿を作成し、確定した投稿を `All` と著者スコープの先頭に入れる
    pub async fn create_post(&self, draft: PostDraft) -> Result<Post, AppError> {
        let author = self
            .inner
            .session_user_id()
            .ok_or_else(|| AppError::unauthorized("Creating a post requires a signed-in user"))?;
        let draft = draft.validate()?;
        debug!("Creating post for {}", author);

        let post = timeout(
            self.inner.request_timeout,
            self.inner.backend.create_post(&draft),
        )
        .await
        .map_err(AppError::from)
        .and_then(|result| result)
        .inspect_err(|e| warn!("Failed to create post: {}", e))?;

        let slots = self.inner.slots.lock().await;
        let mut targets = vec![FeedScope::All];
        if post.is_authored_by(&author) {
            targets.push(FeedScope::User(author));
        } else {
            warn!(
                "Created post {} is attributed to {}, not the session user",
                post.id, post.author_id
            );
        }

        {
            let mut created = self.inner.created_during_fetch.lock().await;
            for scope in &targets {
                if !slots.is_pending(scope) {
                    continue;
                }
                let Some(generation) = slots.generation(scope) else {
                    continue;
                };
                let entry = created
                    .entry(scope.clone())
                    .or_insert_with(|| CreatedDuringFetch {
                        generation,
                        posts: Vec::new(),
                    });
                if entry.generation != generation {
                    entry.generation = generation;
                    entry.posts.clear();
                }
                entry.posts.push(post.clone());
                debug!("Holding post {} for in-flight fetch of {}", post.id, scope);
            }
        }

        self.inner.state.send_if_modified(|snapshot| {
            let mut changed = false;
            for scope in &targets {
                if let Some(entry) = snapshot.scopes.get_mut(scope) {
                    changed |= entry.prepend(&post);
                }
            }
            changed
        });
        drop(slots);

        info!("Created post {} by {}", post.id, post.author_id);
        Ok(post)
    }

    /// いいねを設定/解除し、確定値をキャッシュ全体へ反映する
    pub async fn set_like(&self, post_id: &PostId, liked: bool) -> Result<Post, AppError> {
        self.inner
            .session_user_id()
            .ok_or_else(|| AppError::unauthorized("Liking a post requires a signed-in user"))?;

        let post = timeout(
            self.inner.request_timeout,
            self.inner.backend.set_like(post_id, liked),
        )
        .await
        .map_err(AppError::from)
        .and_then(|result| result)?;

        let _slots = self.inner.slots.lock().await;
        self.inner
            .state
            .send_if_modified(|snapshot| replace_everywhere(snapshot, &post));
        Ok(post)
    }

    /// ブックマークを設定/解除する。自分のブックマークスコープも更新する
    pub async fn set_bookmark(&self, post_id: &PostId, bookmarked: bool) -> Result<Post, AppError> {
        let me = self.inner.session_user_id().ok_or_else(|| {
            AppError::unauthorized("Bookmarking a post requires a signed-in user")
        })?;

        let post = timeout(
            self.inner.request_timeout,
            self.inner.backend.set_bookmark(post_id, bookmarked),
        )
        .await
        .map_err(AppError::from)
        .and_then(|result| result)?;

        let _slots = self.inner.slots.lock().await;
        let bookmarks = FeedScope::Bookmarks(me);
        self.inner.state.send_if_modified(|snapshot| {
            let mut changed = replace_everywhere(snapshot, &post);
            if let Some(entry) = snapshot.scopes.get_mut(&bookmarks) {
                changed |= if bookmarked {
                    entry.prepend(&post)
                } else {
                    entry.remove(&post.id)
                };
            }
            changed
        });
        Ok(post)
    }

    /// ユーザースコープを全て破棄する。進行中の応答も以後捨てられる
    pub async fn invalidate_user_scopes(&self) {
        let mut slots = self.inner.slots.lock().await;
        let dropped = slots.invalidate_where(FeedScope::is_user_scoped);
        self.inner
            .created_during_fetch
            .lock()
            .await
            .retain(|scope, _| !scope.is_user_scoped());
        self.inner.state.send_if_modified(|snapshot| {
            let before = snapshot.scopes.len();
            snapshot.scopes.retain(|scope, _| !scope.is_user_scoped());
            let mut changed = before != snapshot.scopes.len();
            for entry in snapshot.scopes.values_mut() {
                changed |= entry.clear_viewer_flags();
            }
            changed
        });
        debug!("Invalidated user-scoped cache entries ({dropped} fetch slots)");
    }

    async fn request(&self, scope: FeedScope, mode: FetchMode) -> Result<PostList, AppError> {
        self.inner.authorize(&scope)?;

        let mut ticket = {
            let mut slots = self.inner.slots.lock().await;
            match (mode, slots.join(&scope)) {
                (FetchMode::JoinPending, Some(ticket)) => {
                    debug!("Joining in-flight fetch for {}", scope);
                    ticket
                }
                (_, pending) => {
                    if pending.is_some() {
                        debug!("Superseding in-flight fetch for {}", scope);
                    }
                    self.inner.start_fetch(&mut slots, &scope)
                }
            }
        };

        loop {
            let result = ticket.future.clone().await;

            let slots = self.inner.slots.lock().await;
            if slots.is_current(&scope, ticket.generation) {
                return result;
            }
            // 新しいリクエストに置き換えられたので、その結果に追従する
            match slots.join(&scope) {
                Some(next) => ticket = next,
                None => {
                    drop(slots);
                    return self.inner.settled_result(&scope, result);
                }
            }
        }
    }
}

impl ContentInner {
    fn session_user_id(&self) -> Option<UserId> {
        self.session.borrow().user_id().cloned()
    }

    fn authorize(&self, scope: &FeedScope) -> Result<(), AppError> {
        if scope.is_user_scoped() && self.session_user_id().is_none() {
            warn!("Rejected fetch for {} without a session", scope);
            return Err(AppError::Unauthorized(format!(
                "Fetching {scope} requires a signed-in user"
            )));
        }
        Ok(())
    }

    fn start_fetch(
        self: &Arc<Self>,
        slots: &mut FetchSlots<FeedScope, PostList>,
        scope: &FeedScope,
    ) -> FetchTicket<PostList> {
        let generation = slots.begin(scope);
        self.state.send_modify(|snapshot| {
            snapshot
                .scopes
                .entry(scope.clone())
                .or_default()
                .mark_loading();
        });
        debug!("Fetching {} (generation {})", scope, generation);

        let inner = Arc::clone(self);
        let owned = scope.clone();
        slots.attach(
            scope,
            generation,
            async move { inner.load_and_apply(owned, generation).await }.boxed(),
        )
    }

    async fn load_and_apply(
        self: Arc<Self>,
        scope: FeedScope,
        generation: u64,
    ) -> Result<PostList, AppError> {
        let result = timeout(self.request_timeout, self.backend.list_posts(&scope))
            .await
            .map_err(AppError::from)
            .and_then(|result| result)
            .map(Arc::new);

        let mut slots = self.slots.lock().await;
        if !slots.finish(&scope, generation) {
            debug!(
                "Discarding superseded response for {} (generation {})",
                scope, generation
            );
            return result;
        }

        let created = self.created_during_fetch.lock().await.remove(&scope);
        let result = match (result, created) {
            (Ok(fetched), Some(created)) if created.generation == generation => {
                Ok(Arc::new(with_created(&fetched, &created.posts)))
            }
            (result, _) => result,
        };

        match &result {
            Ok(posts) => debug!("Loaded {} posts for {}", posts.len(), scope),
            Err(e) => warn!("Failed to fetch {}: {}", scope, e),
        }
        self.state.send_modify(|snapshot| {
            snapshot
                .scopes
                .entry(scope.clone())
                .or_default()
                .apply_result(&result);
        });

        if result.is_ok() && scope.is_user_scoped() {
            self.evict_foreign_scopes(&mut slots, &scope);
        }
        drop(slots);

        result
    }

    /// 置き換え・破棄された後の呼び出し元に返す値
    fn settled_result(
        &self,
        scope: &FeedScope,
        own: Result<PostList, AppError>,
    ) -> Result<PostList, AppError> {
        if scope.is_user_scoped() && self.session_user_id().is_none() {
            return Err(AppError::Unauthorized(format!(
                "Session ended before {scope} was loaded"
            )));
        }
        let state = self.state.borrow().scope(scope);
        match state.phase {
            ScopePhase::Populated => Ok(state.posts.unwrap_or_default()),
            ScopePhase::Failed(error) => Err(error),
            ScopePhase::Uninitialized | ScopePhase::Loading => own,
        }
    }

    /// セッションユーザー以外のユーザースコープを上限まで間引く
    fn evict_foreign_scopes(&self, slots: &mut FetchSlots<FeedScope, PostList>, keep: &FeedScope) {
        if self.max_user_scopes == 0 {
            return;
        }
        let me = self.session_user_id();
        let is_foreign =
            |scope: &FeedScope| scope.is_user_scoped() && scope.owner() != me.as_ref();

        let evicted: Vec<FeedScope> = {
            let snapshot = self.state.borrow();
            let foreign = snapshot.scopes.keys().filter(|scope| is_foreign(*scope)).count();
            if foreign <= self.max_user_scopes {
                return;
            }
            // 直近のリクエストが古いものから捨てる
            let mut idle: Vec<(&FeedScope, u64)> = snapshot
                .scopes
                .keys()
                .filter(|scope| is_foreign(*scope) && *scope != keep && !slots.is_pending(*scope))
                .map(|scope| (scope, slots.generation(scope).unwrap_or(0)))
                .collect();
            idle.sort_by_key(|(_, generation)| *generation);
            idle.into_iter()
                .take(foreign - self.max_user_scopes)
                .map(|(scope, _)| scope.clone())
                .collect()
        };
        if evicted.is_empty() {
            return;
        }

        for scope in &evicted {
            slots.invalidate(scope);
        }
        self.state.send_modify(|snapshot| {
            for scope in &evicted {
                snapshot.scopes.remove(scope);
            }
        });
        debug!("Evicted {} idle user scopes", evicted.len());
    }
}

/// 作成済み投稿（新しい順）をフェッチ結果の先頭に置く
fn with_created(fetched: &[Post], created: &[Post]) -> Vec<Post> {
    let mut merged: Vec<Post> = created.iter().rev().cloned().collect();
    merged.extend(
        fetched
            .iter()
            .filter(|post| !created.iter().any(|c| c.id == post.id))
            .cloned(),
    );
    merged
}

fn replace_everywhere(snapshot: &mut ContentSnapshot, post: &Post) -> bool {
    let mut changed = false;
    for entry in snapshot.scopes.values_mut() {
        changed |= entry.replace(post);
    }
    changed
}

#[async_trait]
impl SessionListener for ContentStore {
    async fn on_signed_out(&self, user_id: Option<&UserId>) {
        debug!(
            "Session ended for {:?}; dropping user-scoped content",
            user_id.map(UserId::as_str)
        );
        self.invalidate_user_scopes().await;
    }
}
