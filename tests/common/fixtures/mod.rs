use chrono::{Duration, TimeZone, Utc};
use verse_store::{Post, Profile, SessionUser};

pub fn user(id: &str) -> SessionUser {
    SessionUser::new(id, Some(format!("{id}@example.com")))
}

pub fn profile(id: &str) -> Profile {
    Profile::new(id, format!("poet_{id}")).with_display_name(format!("Poet {id}"))
}

/// 古い順に並べるとIDの並びと一致する投稿
pub fn post(id: &str, author: &str, minutes: i64) -> Post {
    let base = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
    Post::new_with_id(
        id,
        author,
        format!("Poem {id}"),
        "The quiet hour keeps its own counsel.",
        base + Duration::minutes(minutes),
    )
}

pub fn posts(ids: &[&str], author: &str) -> Vec<Post> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| post(id, author, i as i64))
        .collect()
}

pub fn ids(posts: &[Post]) -> Vec<&str> {
    posts.iter().map(|p| p.id.as_str()).collect()
}
