use crate::domain::value_objects::{PostId, UserId};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const MAX_TAGS: usize = 10;
pub const MAX_TITLE_CHARS: usize = 200;

/// 表示専用の著者情報
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorSummary {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostStats {
    pub likes: u32,
    pub bookmarks: u32,
}

/// 投稿（詩）
///
/// カウンタはバックエンドが確定した値のみを保持する。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    #[serde(default)]
    pub author: Option<AuthorSummary>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub stats: PostStats,
    #[serde(default)]
    pub liked_by_me: bool,
    #[serde(default)]
    pub bookmarked_by_me: bool,
}

impl Post {
    pub fn new_with_id(
        id: impl Into<PostId>,
        author_id: impl Into<UserId>,
        title: impl Into<String>,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            author_id: author_id.into(),
            author: None,
            title: title.into(),
            body: body.into(),
            tags: BTreeSet::new(),
            created_at,
            stats: PostStats::default(),
            liked_by_me: false,
            bookmarked_by_me: false,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_authored_by(&self, user_id: &UserId) -> bool {
        &self.author_id == user_id
    }
}

/// 新規投稿の下書き
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostDraft {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PostDraft {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// 送信前の検証と正規化
    pub fn validate(&self) -> Result<PostDraft, AppError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(AppError::invalid_input("Title is required"));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(AppError::invalid_input(format!(
                "Title must be at most {MAX_TITLE_CHARS} characters"
            )));
        }
        if self.body.trim().is_empty() {
            return Err(AppError::invalid_input("Body is required"));
        }

        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for raw in &self.tags {
            let tag = normalize_tag(raw);
            if tag.is_empty() {
                return Err(AppError::invalid_input("Tags must not be empty"));
            }
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        if tags.len() > MAX_TAGS {
            return Err(AppError::invalid_input(format!(
                "At most {MAX_TAGS} tags are allowed"
            )));
        }

        Ok(PostDraft {
            title: title.to_string(),
            body: self.body.trim_end().to_string(),
            tags,
        })
    }
}

fn normalize_tag(raw: &str) -> String {
    raw.trim().trim_start_matches('#').trim().to_lowercase()
}
