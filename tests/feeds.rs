mod support;

use std::{sync::Arc, time::Duration};

use yatube::application::{
    cache::{FeedCache, INDEX_PAGE_KEY},
    feed::FeedError,
    follow::{FollowError, FollowOutcome},
    pagination::PageNumber,
    posting::{PostForm, PostingError},
};
use yatube::infra::{
    cache::{MemoryFeedCache, NoopFeedCache},
    uploads::UploadStorage,
};

use support::{
    MemoryStore, feed_service, feed_service_with_ttl, follow_service, posting_service, viewer,
};

fn page(raw: &str) -> PageNumber {
    PageNumber::new(Some(raw.to_string()))
}

#[tokio::test]
async fn home_feed_splits_thirteen_posts_into_ten_and_three() {
    let store = MemoryStore::new();
    let leo = store.user("leo").await;
    for n in 0..13 {
        store.post(&leo, &format!("post {n}"), None).await;
    }
    let feed = feed_service(&store, Arc::new(NoopFeedCache));

    let first = feed.home(&page("1")).await.expect("page 1");
    let second = feed.home(&page("2")).await.expect("page 2");
    let beyond = feed.home(&page("99")).await.expect("page 99");

    assert_eq!(first.items.len(), 10);
    assert_eq!(second.items.len(), 3);
    assert_eq!(first.num_pages, 2);
    assert_eq!(beyond.number, 2);
    assert_eq!(first.items[0].text, "post 12");
}

#[tokio::test]
async fn cached_home_feed_hides_new_posts_until_cleared() {
    let store = MemoryStore::new();
    let leo = store.user("leo").await;
    store.post(&leo, "first", None).await;

    let cache = Arc::new(MemoryFeedCache::new());
    let feed = feed_service(&store, cache.clone());

    let before = feed.home(&PageNumber::first()).await.expect("home");
    assert_eq!(before.total_count, 1);
    assert!(cache.get(INDEX_PAGE_KEY).is_some());

    store.post(&leo, "second", None).await;
    let stale = feed.home(&PageNumber::first()).await.expect("home");
    assert_eq!(stale.total_count, 1);
    assert!(stale.items.iter().all(|post| post.text != "second"));

    cache.clear();
    let fresh = feed.home(&PageNumber::first()).await.expect("home");
    assert_eq!(fresh.total_count, 2);
    assert_eq!(fresh.items[0].text, "second");
}

#[tokio::test]
async fn cached_home_feed_refreshes_once_the_entry_expires() {
    let store = MemoryStore::new();
    let leo = store.user("leo").await;
    store.post(&leo, "first", None).await;

    let cache = Arc::new(MemoryFeedCache::new());
    let feed = feed_service_with_ttl(&store, cache.clone(), Duration::from_millis(200));

    assert_eq!(feed.home(&PageNumber::first()).await.expect("home").total_count, 1);
    store.post(&leo, "second", None).await;
    assert_eq!(feed.home(&PageNumber::first()).await.expect("home").total_count, 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let fresh = feed.home(&PageNumber::first()).await.expect("home");
    assert_eq!(fresh.total_count, 2);
    assert_eq!(fresh.items[0].text, "second");
}

#[tokio::test]
async fn zero_ttl_makes_every_home_read_fresh() {
    let store = MemoryStore::new();
    let leo = store.user("leo").await;
    store.post(&leo, "first", None).await;

    let feed = feed_service_with_ttl(&store, Arc::new(MemoryFeedCache::new()), Duration::ZERO);
    assert_eq!(feed.home(&PageNumber::first()).await.expect("home").total_count, 1);

    store.post(&leo, "second", None).await;
    assert_eq!(feed.home(&PageNumber::first()).await.expect("home").total_count, 2);
}

#[tokio::test]
async fn group_feed_contains_only_that_group() {
    let store = MemoryStore::new();
    let leo = store.user("leo").await;
    let cats = store.group("cats", "Cats").await;
    let dogs = store.group("dogs", "Dogs").await;
    store.post(&leo, "meow", Some(&cats)).await;
    store.post(&leo, "woof", Some(&dogs)).await;
    store.post(&leo, "no group", None).await;
    let feed = feed_service(&store, Arc::new(NoopFeedCache));

    let group = feed.group("cats", &PageNumber::first()).await.expect("group feed");
    assert_eq!(group.group.title, "Cats");
    assert_eq!(group.page.items.len(), 1);
    assert_eq!(group.page.items[0].text, "meow");

    assert!(matches!(
        feed.group("birds", &PageNumber::first()).await,
        Err(FeedError::UnknownGroup(_))
    ));
}

#[tokio::test]
async fn follow_then_unfollow_round_trip() {
    let store = MemoryStore::new();
    let reader = store.user("reader").await;
    let author = store.user("author").await;
    let follows = follow_service(&store);
    let me = viewer(&reader);

    assert!(matches!(
        follows.follow(&me, "author").await,
        Ok(FollowOutcome::Created)
    ));
    assert!(follows.is_following(reader.id, author.id).await.expect("query"));

    assert!(matches!(
        follows.follow(&me, "author").await,
        Ok(FollowOutcome::AlreadyFollowing)
    ));
    assert_eq!(store.follow_edges().await, 1);

    follows.unfollow(&me, "author").await.expect("unfollow");
    assert!(!follows.is_following(reader.id, author.id).await.expect("query"));

    assert!(matches!(
        follows.unfollow(&me, "author").await,
        Err(FollowError::NotFollowing { .. })
    ));
    assert!(matches!(
        follows.follow(&me, "ghost").await,
        Err(FollowError::UnknownAuthor(_))
    ));
}

#[tokio::test]
async fn self_follow_is_ignored() {
    let store = MemoryStore::new();
    let leo = store.user("leo").await;
    let follows = follow_service(&store);

    assert!(matches!(
        follows.follow(&viewer(&leo), "leo").await,
        Ok(FollowOutcome::SelfFollowIgnored)
    ));
    assert_eq!(store.follow_edges().await, 0);
}

#[tokio::test]
async fn followed_feed_has_exactly_followed_authors_newest_first() {
    let store = MemoryStore::new();
    let reader = store.user("reader").await;
    let liked = store.user("liked").await;
    let other = store.user("other").await;
    store.post(&liked, "older", None).await;
    store.post(&other, "unrelated", None).await;
    store.post(&liked, "newer", None).await;

    follow_service(&store)
        .follow(&viewer(&reader), "liked")
        .await
        .expect("follow");
    let feed = feed_service(&store, Arc::new(NoopFeedCache));

    let page = feed
        .followed(&viewer(&reader), &PageNumber::first())
        .await
        .expect("followed feed");
    let texts: Vec<&str> = page.items.iter().map(|post| post.text.as_str()).collect();
    assert_eq!(texts, vec!["newer", "older"]);

    let lonely = feed
        .followed(&viewer(&other), &PageNumber::first())
        .await
        .expect("followed feed");
    assert!(lonely.items.is_empty());
    assert_eq!(lonely.num_pages, 1);
}

#[tokio::test]
async fn profile_panel_reports_follow_state() {
    let store = MemoryStore::new();
    let reader = store.user("reader").await;
    let author = store.user("author").await;
    store.post(&author, "hello", None).await;
    follow_service(&store)
        .follow(&viewer(&reader), "author")
        .await
        .expect("follow");
    let feed = feed_service(&store, Arc::new(NoopFeedCache));

    let profile = feed
        .profile("author", Some(&viewer(&reader)), &PageNumber::first())
        .await
        .expect("profile");
    assert!(profile.panel.following);
    assert!(!profile.panel.is_self);
    assert_eq!(profile.panel.post_count, 1);
    assert_eq!(profile.panel.followers, 1);

    let anonymous = feed
        .profile("author", None, &PageNumber::first())
        .await
        .expect("profile");
    assert!(!anonymous.panel.following);
}

#[tokio::test]
async fn non_author_cannot_edit_a_post() {
    let store = MemoryStore::new();
    let author = store.user("author").await;
    let intruder = store.user("intruder").await;
    let post = store.post(&author, "original", None).await;

    let media = tempfile::tempdir().expect("tempdir");
    let uploads = Arc::new(UploadStorage::new(media.path().to_path_buf()).expect("storage"));
    let posting = posting_service(&store, uploads);

    let form = PostForm {
        text: "vandalised".into(),
        ..PostForm::default()
    };
    let result = posting
        .update_post(&viewer(&intruder), "author", post.id, form)
        .await;

    match result {
        Err(PostingError::NotAuthor { post_path, .. }) => {
            assert_eq!(post_path, format!("/author/{}/", post.id));
        }
        other => panic!("expected NotAuthor, got {other:?}"),
    }
    assert_eq!(store.post_text(post.id).await.as_deref(), Some("original"));
}

#[tokio::test]
async fn post_validation_collects_field_errors() {
    let store = MemoryStore::new();
    let author = store.user("author").await;
    let media = tempfile::tempdir().expect("tempdir");
    let uploads = Arc::new(UploadStorage::new(media.path().to_path_buf()).expect("storage"));
    let posting = posting_service(&store, uploads);

    let form = PostForm {
        text: "   ".into(),
        group: "42".into(),
        ..PostForm::default()
    };
    match posting.create_post(&viewer(&author), form).await {
        Err(PostingError::Validation(errors)) => {
            assert!(!errors.for_field("text").is_empty());
            assert!(!errors.for_field("group").is_empty());
        }
        other => panic!("expected validation errors, got {other:?}"),
    }
}

#[tokio::test]
async fn comments_are_attached_to_the_post_detail() {
    let store = MemoryStore::new();
    let author = store.user("author").await;
    let reader = store.user("reader").await;
    let post = store.post(&author, "hello", None).await;

    let media = tempfile::tempdir().expect("tempdir");
    let uploads = Arc::new(UploadStorage::new(media.path().to_path_buf()).expect("storage"));
    let posting = posting_service(&store, uploads);
    posting
        .add_comment(&viewer(&reader), "author", post.id, "nice")
        .await
        .expect("comment");
    assert!(matches!(
        posting
            .add_comment(&viewer(&reader), "author", post.id, "  ")
            .await,
        Err(PostingError::Validation(_))
    ));

    let detail = feed_service(&store, Arc::new(NoopFeedCache))
        .post_detail("author", post.id, Some(&viewer(&reader)))
        .await
        .expect("detail");
    assert_eq!(detail.comments.len(), 1);
    assert_eq!(detail.comments[0].author_username, "reader");
    assert!(!detail.can_edit);

    assert!(matches!(
        feed_service(&store, Arc::new(NoopFeedCache))
            .post_detail("reader", post.id, None)
            .await,
        Err(FeedError::UnknownPost { .. })
    ));
}
