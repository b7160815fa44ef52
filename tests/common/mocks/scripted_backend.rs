use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::oneshot;
use verse_store::{
    AppError, BackendClient, FeedScope, Post, PostDraft, PostId, Profile, SessionUser, UserId,
};

type PostsResult = Result<Vec<Post>, AppError>;

enum Reply<T> {
    Ready(Result<T, AppError>),
    Gated(oneshot::Receiver<Result<T, AppError>>),
    Hang,
}

impl<T> Reply<T> {
    async fn resolve(self) -> Result<T, AppError> {
        match self {
            Reply::Ready(result) => result,
            Reply::Gated(rx) => rx
                .await
                .unwrap_or_else(|_| Err(AppError::Internal("gate dropped".to_string()))),
            Reply::Hang => futures::future::pending().await,
        }
    }
}

/// 応答を台本どおりに返すバックエンド
///
/// 台本が尽きた `list_posts` は空の一覧を返す。
#[derive(Default)]
pub struct ScriptedBackend {
    session: Mutex<Option<SessionUser>>,
    profiles: Mutex<HashMap<UserId, Profile>>,
    session_replies: Mutex<VecDeque<Reply<Option<SessionUser>>>>,
    list_replies: Mutex<HashMap<FeedScope, VecDeque<Reply<Vec<Post>>>>>,
    create_replies: Mutex<VecDeque<Reply<Post>>>,
    sign_out_error: Mutex<Option<AppError>>,
    sign_out_hangs: Mutex<bool>,
    session_calls: Mutex<usize>,
    list_calls: Mutex<HashMap<FeedScope, usize>>,
    sign_out_calls: Mutex<usize>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// ログイン済みのバックエンド
    pub fn signed_in(user: SessionUser, profile: Profile) -> Self {
        let backend = Self::new();
        backend.profiles.lock().unwrap().insert(profile.id.clone(), profile);
        *backend.session.lock().unwrap() = Some(user);
        backend
    }

    pub fn reply_posts(&self, scope: FeedScope, result: PostsResult) {
        self.push_list(scope, Reply::Ready(result));
    }

    /// 呼び出し側が送るまで応答を保留する
    pub fn gate_posts(&self, scope: FeedScope) -> oneshot::Sender<PostsResult> {
        let (tx, rx) = oneshot::channel();
        self.push_list(scope, Reply::Gated(rx));
        tx
    }

    /// 応答を返さない
    pub fn hang_posts(&self, scope: FeedScope) {
        self.push_list(scope, Reply::Hang);
    }

    pub fn gate_session(&self) -> oneshot::Sender<Result<Option<SessionUser>, AppError>> {
        let (tx, rx) = oneshot::channel();
        self.session_replies.lock().unwrap().push_back(Reply::Gated(rx));
        tx
    }

    pub fn reply_create(&self, result: Result<Post, AppError>) {
        self.create_replies
            .lock()
            .unwrap()
            .push_back(Reply::Ready(result));
    }

    pub fn fail_sign_out(&self, error: AppError) {
        *self.sign_out_error.lock().unwrap() = Some(error);
    }

    /// サインアウト要求に応答しない
    pub fn hang_sign_out(&self) {
        *self.sign_out_hangs.lock().unwrap() = true;
    }

    pub fn list_calls(&self, scope: &FeedScope) -> usize {
        self.list_calls
            .lock()
            .unwrap()
            .get(scope)
            .copied()
            .unwrap_or(0)
    }

    pub fn session_calls(&self) -> usize {
        *self.session_calls.lock().unwrap()
    }

    pub fn sign_out_calls(&self) -> usize {
        *self.sign_out_calls.lock().unwrap()
    }

    /// `list_posts` が `count` 回呼ばれるまで待つ
    pub async fn wait_for_list_calls(&self, scope: &FeedScope, count: usize) {
        while self.list_calls(scope) < count {
            tokio::task::yield_now().await;
        }
    }

    pub async fn wait_for_session_calls(&self, count: usize) {
        while self.session_calls() < count {
            tokio::task::yield_now().await;
        }
    }

    fn push_list(&self, scope: FeedScope, reply: Reply<Vec<Post>>) {
        self.list_replies
            .lock()
            .unwrap()
            .entry(scope)
            .or_default()
            .push_back(reply);
    }
}

#[async_trait]
impl BackendClient for ScriptedBackend {
    async fn get_session(&self) -> Result<Option<SessionUser>, AppError> {
        *self.session_calls.lock().unwrap() += 1;
        let scripted = self.session_replies.lock().unwrap().pop_front();
        match scripted {
            Some(reply) => reply.resolve().await,
            None => Ok(self.session.lock().unwrap().clone()),
        }
    }

    async fn get_profile(&self, user_id: &UserId) -> Result<Profile, AppError> {
        self.profiles
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("profile {user_id}")))
    }

    async fn list_posts(&self, scope: &FeedScope) -> Result<Vec<Post>, AppError> {
        *self
            .list_calls
            .lock()
            .unwrap()
            .entry(scope.clone())
            .or_default() += 1;
        let scripted = self
            .list_replies
            .lock()
            .unwrap()
            .get_mut(scope)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(reply) => reply.resolve().await,
            None => Ok(Vec::new()),
        }
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<Post, AppError> {
        let scripted = self.create_replies.lock().unwrap().pop_front();
        match scripted {
            Some(reply) => reply.resolve().await,
            None => Err(AppError::Internal(format!(
                "unexpected create_post: {}",
                draft.title
            ))),
        }
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        *self.sign_out_calls.lock().unwrap() += 1;
        let hangs = *self.sign_out_hangs.lock().unwrap();
        if hangs {
            return futures::future::pending().await;
        }
        *self.session.lock().unwrap() = None;
        match self.sign_out_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn set_like(&self, post_id: &PostId, _liked: bool) -> Result<Post, AppError> {
        Err(AppError::NotFound(format!("post {post_id}")))
    }

    async fn set_bookmark(&self, post_id: &PostId, _bookmarked: bool) -> Result<Post, AppError> {
        Err(AppError::NotFound(format!("post {post_id}")))
    }
}
