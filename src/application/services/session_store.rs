use crate::application::ports::{BackendClient, SessionListener};
use crate::domain::entities::{Profile, SessionUser};
use crate::domain::value_objects::UserId;
use crate::infrastructure::cache::FetchSlots;
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use futures::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// セッションのライフサイクル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Anonymous,
    Loading,
    Authenticated,
}

/// 購読者に公開するセッション状態
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub user: Option<SessionUser>,
    pub profile: Option<Profile>,
    pub phase: SessionPhase,
    pub is_loading: bool,
    pub error: Option<AppError>,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user.as_ref().map(|user| &user.id)
    }
}

#[derive(Debug, Clone)]
struct SessionIdentity {
    user: SessionUser,
    profile: Profile,
}

// セッションのフェッチは 1 本しかないので単一キー
const SESSION_KEY: () = ();

struct SessionInner {
    backend: Arc<dyn BackendClient>,
    request_timeout: Duration,
    state: watch::Sender<SessionSnapshot>,
    slots: Mutex<FetchSlots<(), Option<SessionIdentity>>>,
    listeners: RwLock<Vec<Arc<dyn SessionListener>>>,
}

/// 現在ユーザーとプロフィールを保持するストア
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn BackendClient>, config: &AppConfig) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(SessionInner {
                backend,
                request_timeout: config.request_timeout(),
                state,
                slots: Mutex::new(FetchSlots::new()),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn current_user_id(&self) -> Option<UserId> {
        self.inner.state.borrow().user_id().cloned()
    }

    /// サインアウト通知の受け手を登録
    pub async fn add_listener(&self, listener: Arc<dyn SessionListener>) {
        self.inner.listeners.write().await.push(listener);
    }

    /// セッションとプロフィールを取得する
    ///
    /// 取得中に呼ばれた場合は進行中のリクエストに合流する。失敗は `error` に記録され、
    /// 直前の `user`/`profile` はそのまま残る。セッションが消えた・別ユーザーに
    /// 変わった場合はサインアウトと同様にリスナーへ通知してから返る。
    pub async fn fetch_profile(&self) -> SessionSnapshot {
        let ticket = {
            let mut slots = self.inner.slots.lock().await;
            match slots.join(&SESSION_KEY) {
                Some(ticket) => {
                    debug!("Joining in-flight session fetch");
                    ticket
                }
                None => {
                    let generation = slots.begin(&SESSION_KEY);
                    self.inner.state.send_modify(|state| {
                        state.is_loading = true;
                        if state.user.is_none() {
                            state.phase = SessionPhase::Loading;
                        }
                    });
                    let inner = Arc::clone(&self.inner);
                    slots.attach(
                        &SESSION_KEY,
                        generation,
                        async move { inner.load_and_apply(generation).await }.boxed(),
                    )
                }
            }
        };

        let _ = ticket.future.await;
        self.snapshot()
    }

    /// サインアウト
    ///
    /// バックエンドの成否に関わらずセッションとユーザースコープのキャッシュを消す。
    pub async fn sign_out(&self) -> SessionSnapshot {
        let outcome = match timeout(self.inner.request_timeout, self.inner.backend.sign_out()).await
        {
            Ok(result) => result,
            Err(elapsed) => Err(AppError::from(elapsed)),
        };

        let previous = {
            let mut slots = self.inner.slots.lock().await;
            // 進行中のプロフィール取得は以後破棄される
            slots.invalidate(&SESSION_KEY);

            let mut previous = None;
            self.inner.state.send_modify(|state| {
                previous = state.user.take().map(|user| user.id);
                state.profile = None;
                state.phase = SessionPhase::Anonymous;
                state.is_loading = false;
                state.error = outcome.as_ref().err().cloned();
            });
            previous
        };

        match &outcome {
            Ok(()) => info!("Signed out user {:?}", previous.as_ref().map(UserId::as_str)),
            Err(e) => warn!("Backend sign-out failed, clearing local session anyway: {}", e),
        }

        self.inner.notify_signed_out(previous.as_ref()).await;
        self.snapshot()
    }
}

impl SessionInner {
    async fn load_identity(&self) -> Result<Option<SessionIdentity>, AppError> {
        let session = timeout(self.request_timeout, self.backend.get_session()).await??;
        let Some(user) = session else {
            return Ok(None);
        };

        let profile = timeout(self.request_timeout, self.backend.get_profile(&user.id)).await??;
        if !profile.belongs_to(&user) {
            return Err(AppError::Conflict(format!(
                "Profile {} does not match session user {}",
                profile.id, user.id
            )));
        }

        Ok(Some(SessionIdentity { user, profile }))
    }

    async fn load_and_apply(
        self: Arc<Self>,
        generation: u64,
    ) -> Result<Option<SessionIdentity>, AppError> {
        let result = self.load_identity().await;

        let mut slots = self.slots.lock().await;
        if !slots.finish(&SESSION_KEY, generation) {
            debug!("Discarding superseded session response (generation {generation})");
            return result;
        }

        let previous = self.state.borrow().user_id().cloned();
        match &result {
            Ok(Some(identity)) => {
                info!("Session resolved for user {}", identity.user.id);
                self.state.send_modify(|state| {
                    state.user = Some(identity.user.clone());
                    state.profile = Some(identity.profile.clone());
                    state.phase = SessionPhase::Authenticated;
                    state.is_loading = false;
                    state.error = None;
                });
            }
            Ok(None) => {
                debug!("No active session");
                self.state.send_modify(|state| {
                    state.user = None;
                    state.profile = None;
                    state.phase = SessionPhase::Anonymous;
                    state.is_loading = false;
                    state.error = None;
                });
            }
            Err(e) => {
                warn!("Failed to fetch session profile: {}", e);
                self.state.send_modify(|state| {
                    state.is_loading = false;
                    state.phase = if state.user.is_some() {
                        SessionPhase::Authenticated
                    } else {
                        SessionPhase::Anonymous
                    };
                    state.error = Some(e.clone());
                });
            }
        }
        let current = self.state.borrow().user_id().cloned();
        drop(slots);

        // セッション切れ・別ユーザーへの切り替えはサインアウトと同じく通知する
        if previous.is_some() && previous != current {
            info!(
                "Session changed from {:?} to {:?}",
                previous.as_ref().map(UserId::as_str),
                current.as_ref().map(UserId::as_str)
            );
            self.notify_signed_out(previous.as_ref()).await;
        }

        result
    }

    async fn notify_signed_out(&self, user_id: Option<&UserId>) {
        let listeners = self.listeners.read().await.clone();
        for listener in listeners {
            listener.on_signed_out(user_id).await;
        }
    }
}
