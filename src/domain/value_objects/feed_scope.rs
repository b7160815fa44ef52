use super::ids::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// キャッシュ対象となる投稿コレクションの選択子
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "user_id", rename_all = "snake_case")]
pub enum FeedScope {
    /// 新着フィード
    All,
    /// トレンド（順位はバックエンドが決める）
    Trending,
    /// 特定ユーザーの投稿
    User(UserId),
    /// 特定ユーザーのブックマーク
    Bookmarks(UserId),
}

impl FeedScope {
    pub fn user(id: impl Into<UserId>) -> Self {
        FeedScope::User(id.into())
    }

    pub fn bookmarks(id: impl Into<UserId>) -> Self {
        FeedScope::Bookmarks(id.into())
    }

    /// セッションが必要なスコープか
    pub fn is_user_scoped(&self) -> bool {
        matches!(self, FeedScope::User(_) | FeedScope::Bookmarks(_))
    }

    pub fn owner(&self) -> Option<&UserId> {
        match self {
            FeedScope::User(id) | FeedScope::Bookmarks(id) => Some(id),
            FeedScope::All | FeedScope::Trending => None,
        }
    }

    /// REST クエリ用の (key, value)
    pub fn as_query(&self) -> (&'static str, String) {
        match self {
            FeedScope::All => ("scope", "all".to_string()),
            FeedScope::Trending => ("scope", "trending".to_string()),
            FeedScope::User(id) => ("author", id.to_string()),
            FeedScope::Bookmarks(id) => ("bookmarked_by", id.to_string()),
        }
    }
}

impl fmt::Display for FeedScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedScope::All => write!(f, "all"),
            FeedScope::Trending => write!(f, "trending"),
            FeedScope::User(id) => write!(f, "user:{id}"),
            FeedScope::Bookmarks(id) => write!(f, "bookmarks:{id}"),
        }
    }
}

impl FromStr for FeedScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split_once(':') {
            None if value == "all" => Ok(FeedScope::All),
            None if value == "trending" => Ok(FeedScope::Trending),
            Some(("user", id)) => UserId::new(id).map(FeedScope::User),
            Some(("bookmarks", id)) => UserId::new(id).map(FeedScope::Bookmarks),
            _ => Err(format!("Unknown feed scope: {value}")),
        }
    }
}
