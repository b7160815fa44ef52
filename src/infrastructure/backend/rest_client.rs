use crate::application::ports::BackendClient;
use crate::domain::entities::{Post, PostDraft, Profile, SessionUser};
use crate::domain::value_objects::{FeedScope, PostId, UserId};
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::debug;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    #[serde(default)]
    user: Option<SessionUser>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// REST バックエンドクライアント
pub struct RestBackendClient {
    client: Client,
    base_url: String,
    access_token: RwLock<Option<String>>,
}

impl RestBackendClient {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| AppError::Configuration(format!("HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: config.backend.base_url.trim_end_matches('/').to_string(),
            access_token: RwLock::new(config.backend.access_token.clone()),
        })
    }

    /// アクセストークンを差し替える（ログイン後など）
    pub async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token;
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = build_url(&self.base_url, path);
        debug!("{} {}", method, url);
        let builder = self.client.request(method, url);
        match self.access_token.read().await.as_ref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn toggle(&self, post_id: &PostId, action: &str, enabled: bool) -> Result<Post, AppError> {
        let method = if enabled { Method::PUT } else { Method::DELETE };
        let path = format!("/posts/{}/{action}", post_id);
        request_json(self.request(method, &path).await).await
    }
}

#[async_trait]
impl BackendClient for RestBackendClient {
    async fn get_session(&self) -> Result<Option<SessionUser>, AppError> {
        let response = self
            .request(Method::GET, "/auth/session")
            .await
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(error_for_status(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(None);
        }
        let envelope: SessionEnvelope = serde_json::from_str(&body)?;
        Ok(envelope.user)
    }

    async fn get_profile(&self, user_id: &UserId) -> Result<Profile, AppError> {
        let path = format!("/profiles/{user_id}");
        request_json(self.request(Method::GET, &path).await).await
    }

    async fn list_posts(&self, scope: &FeedScope) -> Result<Vec<Post>, AppError> {
        let (key, value) = scope.as_query();
        let builder = self
            .request(Method::GET, "/posts")
            .await
            .query(&[(key, value)]);
        request_json(builder).await
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<Post, AppError> {
        let builder = self
            .request(Method::POST, "/posts")
            .await
            .header(IDEMPOTENCY_HEADER, uuid::Uuid::new_v4().to_string())
            .json(draft);
        request_json(builder).await
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        let response = self
            .request(Method::POST, "/auth/sign-out")
            .await
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(status, &body))
    }

    async fn set_like(&self, post_id: &PostId, liked: bool) -> Result<Post, AppError> {
        self.toggle(post_id, "like", liked).await
    }

    async fn set_bookmark(&self, post_id: &PostId, bookmarked: bool) -> Result<Post, AppError> {
        self.toggle(post_id, "bookmark", bookmarked).await
    }
}

fn build_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

async fn request_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, AppError> {
    let response = builder.send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(error_for_status(status, &body));
    }
    serde_json::from_str(&body).map_err(AppError::from)
}

/// HTTP ステータスをエラー種別へ写像する
pub(crate) fn error_for_status(status: StatusCode, body: &str) -> AppError {
    let detail = error_detail(body).unwrap_or_else(|| status.to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Unauthorized(detail),
        StatusCode::NOT_FOUND => AppError::NotFound(detail),
        StatusCode::CONFLICT => AppError::Conflict(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            AppError::InvalidInput(detail)
        }
        _ => AppError::Network(format!("Backend error ({status}): {detail}")),
    }
}

fn error_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<ErrorBody>(trimmed) {
        Ok(parsed) => parsed.message.or(parsed.error),
        Err(_) => Some(trimmed.to_string()),
    }
}
