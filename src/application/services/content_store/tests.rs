use super::*;
use crate::application::shared::tests::fixtures::{anonymous, posts, sample_post, signed_in};
use crate::application::shared::tests::mocks::MockBackend;
use mockall::predicate::*;

fn store(backend: MockBackend, session: watch::Receiver<SessionSnapshot>) -> ContentStore {
    ContentStore::new(Arc::new(backend), session, &AppConfig::default())
}

fn ids(state: &ScopeState) -> Vec<String> {
    state.posts().iter().map(|p| p.id.to_string()).collect()
}

#[tokio::test]
async fn user_scope_without_session_is_unauthorized() {
    let mut backend = MockBackend::new();
    backend.expect_list_posts().never();
    let (_tx, rx) = anonymous();
    let store = store(backend, rx);

    let result = store.fetch_posts(FeedScope::user("u1")).await;

    assert!(matches!(result, Err(AppError::Unauthorized(_))));
    assert_eq!(store.scope(&FeedScope::user("u1")).phase, ScopePhase::Uninitialized);
    assert!(store.snapshot().get(&FeedScope::user("u1")).is_none());
}

#[tokio::test]
async fn fetch_preserves_backend_order() {
    let mut backend = MockBackend::new();
    backend
        .expect_list_posts()
        .with(eq(FeedScope::Trending))
        .times(1)
        .returning(|_| Ok(posts(&["p3", "p1", "p2"], "u9")));
    let (_tx, rx) = anonymous();
    let store = store(backend, rx);

    let fetched = store.fetch_posts(FeedScope::Trending).await.unwrap();

    let state = store.scope(&FeedScope::Trending);
    assert_eq!(state.phase, ScopePhase::Populated);
    assert_eq!(ids(&state), vec!["p3", "p1", "p2"]);
    assert_eq!(fetched.len(), 3);
    assert!(state.loaded_at.is_some());
}

#[tokio::test]
async fn failed_refetch_keeps_stale_posts() {
    let mut backend = MockBackend::new();
    let mut calls = 0;
    backend.expect_list_posts().times(2).returning(move |_| {
        calls += 1;
        if calls == 1 {
            Ok(posts(&["p1", "p2"], "u1"))
        } else {
            Err(AppError::Network("503".into()))
        }
    });
    let (_tx, rx) = anonymous();
    let store = store(backend, rx);

    store.fetch_posts(FeedScope::All).await.unwrap();
    let err = store.fetch_posts(FeedScope::All).await.unwrap_err();

    let state = store.scope(&FeedScope::All);
    assert_eq!(err, AppError::Network("503".into()));
    assert_eq!(state.error(), Some(&err));
    assert_eq!(ids(&state), vec!["p1", "p2"]);
    assert!(!state.is_loading());
}

#[tokio::test]
async fn never_fetched_empty_and_failed_are_distinguishable() {
    let mut backend = MockBackend::new();
    backend
        .expect_list_posts()
        .with(eq(FeedScope::All))
        .returning(|_| Ok(Vec::new()));
    backend
        .expect_list_posts()
        .with(eq(FeedScope::Trending))
        .returning(|_| Err(AppError::Network("unreachable".into())));
    let (_tx, rx) = signed_in("u1");
    let store = store(backend, rx);

    store.fetch_posts(FeedScope::All).await.unwrap();
    store.fetch_posts(FeedScope::Trending).await.unwrap_err();

    let never = store.scope(&FeedScope::user("u1"));
    let empty = store.scope(&FeedScope::All);
    let failed = store.scope(&FeedScope::Trending);

    assert_eq!(never.view(), FeedView::NotLoaded);
    assert_eq!(empty.view(), FeedView::Empty);
    assert!(matches!(failed.view(), FeedView::Failed { .. }));
}

#[tokio::test]
async fn create_post_prepends_to_cached_scopes_only() {
    let mut backend = MockBackend::new();
    backend
        .expect_list_posts()
        .with(eq(FeedScope::All))
        .returning(|_| Ok(posts(&["p1", "p2"], "u2")));
    backend
        .expect_list_posts()
        .with(eq(FeedScope::user("u1")))
        .returning(|_| Ok(posts(&["mine-old"], "u1")));
    backend
        .expect_create_post()
        .times(1)
        .returning(|_| Ok(sample_post("new", "u1")));
    let (_tx, rx) = signed_in("u1");
    let store = store(backend, rx);

    store.fetch_posts(FeedScope::All).await.unwrap();
    store.fetch_posts(FeedScope::user("u1")).await.unwrap();

    let created = store
        .create_post(PostDraft::new("New", "fresh ink"))
        .await
        .unwrap();

    assert_eq!(created.id.as_str(), "new");
    assert_eq!(ids(&store.scope(&FeedScope::All)), vec!["new", "p1", "p2"]);
    assert_eq!(
        ids(&store.scope(&FeedScope::user("u1"))),
        vec!["new", "mine-old"]
    );
    assert_eq!(store.scope(&FeedScope::Trending).phase, ScopePhase::Uninitialized);
}

#[tokio::test]
async fn failed_create_leaves_cache_untouched() {
    let mut backend = MockBackend::new();
    backend
        .expect_list_posts()
        .returning(|_| Ok(posts(&["p1"], "u1")));
    backend
        .expect_create_post()
        .returning(|_| Err(AppError::Conflict("duplicate post".into())));
    let (_tx, rx) = signed_in("u1");
    let store = store(backend, rx);
    store.fetch_posts(FeedScope::All).await.unwrap();
    let before = store.snapshot();

    let err = store
        .create_post(PostDraft::new("Twice", "same words"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn create_post_requires_session_and_valid_draft() {
    let mut backend = MockBackend::new();
    backend.expect_create_post().never();

    let (_tx, rx) = anonymous();
    let anonymous_store = store(backend, rx);
    let err = anonymous_store
        .create_post(PostDraft::new("t", "b"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    let mut backend = MockBackend::new();
    backend.expect_create_post().never();
    let (_tx, rx) = signed_in("u1");
    let err = store(backend, rx)
        .create_post(PostDraft::new("   ", "b"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn bookmark_updates_every_scope_and_my_bookmarks() {
    let mut backend = MockBackend::new();
    backend
        .expect_list_posts()
        .with(eq(FeedScope::All))
        .returning(|_| Ok(posts(&["p1", "p2"], "u2")));
    backend
        .expect_list_posts()
        .with(eq(FeedScope::bookmarks("u1")))
        .returning(|_| Ok(Vec::new()));
    backend
        .expect_set_bookmark()
        .with(eq(PostId::from("p2")), eq(true))
        .returning(|_, _| {
            let mut post = sample_post("p2", "u2");
            post.bookmarked_by_me = true;
            post.stats.bookmarks = 1;
            Ok(post)
        });
    let (_tx, rx) = signed_in("u1");
    let store = store(backend, rx);
    store.fetch_posts(FeedScope::All).await.unwrap();
    store.fetch_posts(FeedScope::bookmarks("u1")).await.unwrap();

    store.set_bookmark(&PostId::from("p2"), true).await.unwrap();

    let all = store.scope(&FeedScope::All);
    assert_eq!(ids(&all), vec!["p1", "p2"]);
    assert!(all.posts()[1].bookmarked_by_me);
    assert_eq!(all.posts()[1].stats.bookmarks, 1);
    assert_eq!(ids(&store.scope(&FeedScope::bookmarks("u1"))), vec!["p2"]);
}

#[tokio::test]
async fn failed_like_changes_nothing() {
    let mut backend = MockBackend::new();
    backend
        .expect_list_posts()
        .returning(|_| Ok(posts(&["p1"], "u2")));
    backend
        .expect_set_like()
        .returning(|_, _| Err(AppError::NotFound("post p1".into())));
    let (_tx, rx) = signed_in("u1");
    let store = store(backend, rx);
    store.fetch_posts(FeedScope::All).await.unwrap();

    let err = store.set_like(&PostId::from("p1"), true).await.unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(store.scope(&FeedScope::All).posts()[0].stats.likes, 0);
}

#[tokio::test]
async fn invalidate_user_scopes_keeps_public_feeds() {
    let mut backend = MockBackend::new();
    backend.expect_list_posts().returning(|scope| {
        let mut list = posts(&["p1"], "u1");
        if *scope == FeedScope::All {
            list[0].liked_by_me = true;
        }
        Ok(list)
    });
    let (_tx, rx) = signed_in("u1");
    let store = store(backend, rx);
    store.fetch_posts(FeedScope::All).await.unwrap();
    store.fetch_posts(FeedScope::user("u1")).await.unwrap();
    store.fetch_posts(FeedScope::bookmarks("u1")).await.unwrap();

    store.invalidate_user_scopes().await;

    let snapshot = store.snapshot();
    assert!(snapshot.get(&FeedScope::user("u1")).is_none());
    assert!(snapshot.get(&FeedScope::bookmarks("u1")).is_none());
    let all = snapshot.scope(&FeedScope::All);
    assert_eq!(all.phase, ScopePhase::Populated);
    assert!(!all.posts()[0].liked_by_me);
}

#[tokio::test]
async fn foreign_user_scopes_are_capped() {
    let mut backend = MockBackend::new();
    backend
        .expect_list_posts()
        .returning(|scope| Ok(posts(&["p"], scope.owner().map(|u| u.as_str()).unwrap_or("x"))));
    let (_tx, rx) = signed_in("me");
    let mut config = AppConfig::default();
    config.cache.max_user_scopes = 2;
    let store = ContentStore::new(Arc::new(backend), rx, &config);

    store.fetch_posts(FeedScope::user("me")).await.unwrap();
    for id in ["a", "b", "c"] {
        store.fetch_posts(FeedScope::user(id)).await.unwrap();
    }

    let snapshot = store.snapshot();
    assert!(snapshot.get(&FeedScope::user("me")).is_some());
    assert!(snapshot.get(&FeedScope::user("a")).is_none());
    assert!(snapshot.get(&FeedScope::user("b")).is_some());
    assert!(snapshot.get(&FeedScope::user("c")).is_some());
}

#[tokio::test]
async fn subscribers_see_loading_then_populated() {
    let mut backend = MockBackend::new();
    backend
        .expect_list_posts()
        .returning(|_| Ok(posts(&["p1"], "u1")));
    let (_tx, rx) = anonymous();
    let store = store(backend, rx);
    let mut updates = store.subscribe();

    store.fetch_posts(FeedScope::All).await.unwrap();

    assert!(updates.has_changed().unwrap());
    let latest = updates.borrow_and_update().scope(&FeedScope::All);
    assert_eq!(latest.phase, ScopePhase::Populated);
}
