use std::sync::Arc;

use sqlx::PgPool;
use time::{Duration, OffsetDateTime};

use yatube::application::{
    feed::FeedService,
    follow::{FollowError, FollowOutcome, FollowService},
    pagination::{PageNumber, Paginator},
    repos::{
        CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, CreateUserParams,
        FollowsRepo, GroupsWriteRepo, PostScope, PostsRepo, PostsWriteRepo, RepoError, UsersRepo,
    },
};
use yatube::domain::{
    entities::{GroupRecord, PostRecord, UserRecord},
    viewer::Viewer,
};
use yatube::infra::{cache::NoopFeedCache, db::PostgresRepositories};

fn repositories(pool: PgPool) -> Arc<PostgresRepositories> {
    Arc::new(PostgresRepositories::new(pool))
}

async fn user(repos: &PostgresRepositories, username: &str) -> UserRecord {
    repos
        .create_user(CreateUserParams {
            username: username.to_string(),
            display_name: String::new(),
        })
        .await
        .expect("insert user")
}

async fn group(repos: &PostgresRepositories, slug: &str) -> GroupRecord {
    repos
        .create_group(CreateGroupParams {
            title: slug.to_uppercase(),
            slug: slug.to_string(),
            description: String::new(),
        })
        .await
        .expect("insert group")
}

async fn post(
    repos: &PostgresRepositories,
    author: &UserRecord,
    text: &str,
    group: Option<&GroupRecord>,
) -> PostRecord {
    repos
        .create_post(CreatePostParams {
            author_id: author.id,
            text: text.to_string(),
            group_id: group.map(|group| group.id),
            image: None,
        })
        .await
        .expect("insert post")
}

async fn backdate(pool: &PgPool, post: &PostRecord, by: Duration) {
    sqlx::query("UPDATE posts SET pub_date = $1 WHERE id = $2")
        .bind(OffsetDateTime::now_utc() - by)
        .bind(post.id)
        .execute(pool)
        .await
        .expect("backdate post");
}

fn viewer(user: &UserRecord) -> Viewer {
    Viewer::new(user.id, user.username.clone())
}

fn feed(repos: &Arc<PostgresRepositories>) -> FeedService {
    FeedService::new(
        repos.clone(),
        repos.clone(),
        repos.clone(),
        repos.clone(),
        repos.clone(),
        Arc::new(NoopFeedCache),
        Paginator::default(),
        std::time::Duration::ZERO,
    )
}

fn texts(posts: &[PostRecord]) -> Vec<&str> {
    posts.iter().map(|post| post.text.as_str()).collect()
}

#[sqlx::test(migrations = "./migrations")]
async fn followed_feed_orders_by_publication_date(pool: PgPool) {
    let repos = repositories(pool.clone());
    let reader = user(&repos, "reader").await;
    let liked = user(&repos, "liked").await;
    let other = user(&repos, "other").await;

    post(&repos, &liked, "newer", None).await;
    let older = post(&repos, &liked, "older", None).await;
    backdate(&pool, &older, Duration::days(1)).await;
    post(&repos, &other, "unrelated", None).await;

    assert!(repos.create_if_absent(reader.id, liked.id).await.expect("follow"));

    let page = feed(&repos)
        .followed(&viewer(&reader), &PageNumber::first())
        .await
        .expect("followed feed");
    assert_eq!(texts(&page.items), vec!["newer", "older"]);
    assert_eq!(page.total_count, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn home_listing_is_windowed_newest_first(pool: PgPool) {
    let repos = repositories(pool);
    let leo = user(&repos, "leo").await;
    for n in 0..13 {
        post(&repos, &leo, &format!("post {n}"), None).await;
    }

    assert_eq!(repos.count_posts(PostScope::All).await.expect("count"), 13);
    let window = repos
        .list_posts(PostScope::All, 10, 10)
        .await
        .expect("window");
    assert_eq!(texts(&window), vec!["post 2", "post 1", "post 0"]);

    let all = repos.list_all_posts().await.expect("all posts");
    assert_eq!(all.first().map(|post| post.text.as_str()), Some("post 12"));
}

#[sqlx::test(migrations = "./migrations")]
async fn following_twice_keeps_one_edge(pool: PgPool) {
    let repos = repositories(pool);
    let reader = user(&repos, "reader").await;
    let author = user(&repos, "author").await;
    let follows = FollowService::new(repos.clone(), repos.clone());

    assert!(matches!(
        follows.follow(&viewer(&reader), "author").await,
        Ok(FollowOutcome::Created)
    ));
    assert!(!repos.create_if_absent(reader.id, author.id).await.expect("repeat"));
    assert!(matches!(
        follows.follow(&viewer(&reader), "author").await,
        Ok(FollowOutcome::AlreadyFollowing)
    ));

    assert_eq!(repos.count_followers(author.id).await.expect("followers"), 1);
    assert_eq!(repos.count_following(reader.id).await.expect("following"), 1);
    assert!(repos.exists(reader.id, author.id).await.expect("exists"));
    assert!(!repos.exists(author.id, reader.id).await.expect("reverse"));
}

#[sqlx::test(migrations = "./migrations")]
async fn self_follow_violates_the_schema(pool: PgPool) {
    let repos = repositories(pool);
    let leo = user(&repos, "leo").await;

    assert!(matches!(
        repos.create_if_absent(leo.id, leo.id).await,
        Err(RepoError::Integrity { .. })
    ));

    let follows = FollowService::new(repos.clone(), repos.clone());
    assert!(matches!(
        follows.follow(&viewer(&leo), "leo").await,
        Ok(FollowOutcome::SelfFollowIgnored)
    ));
    assert_eq!(repos.count_following(leo.id).await.expect("following"), 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn unfollowing_a_missing_edge_is_not_found(pool: PgPool) {
    let repos = repositories(pool);
    let reader = user(&repos, "reader").await;
    let author = user(&repos, "author").await;

    assert!(matches!(
        repos.delete(reader.id, author.id).await,
        Err(RepoError::NotFound)
    ));

    let follows = FollowService::new(repos.clone(), repos.clone());
    follows.follow(&viewer(&reader), "author").await.expect("follow");
    follows.unfollow(&viewer(&reader), "author").await.expect("unfollow");
    assert!(matches!(
        follows.unfollow(&viewer(&reader), "author").await,
        Err(FollowError::NotFollowing { .. })
    ));
}

#[sqlx::test(migrations = "./migrations")]
async fn group_scope_and_counts(pool: PgPool) {
    let repos = repositories(pool);
    let leo = user(&repos, "leo").await;
    let ann = user(&repos, "ann").await;
    let cats = group(&repos, "cats").await;
    let dogs = group(&repos, "dogs").await;

    post(&repos, &leo, "meow", Some(&cats)).await;
    post(&repos, &ann, "purr", Some(&cats)).await;
    post(&repos, &leo, "woof", Some(&dogs)).await;
    post(&repos, &leo, "no group", None).await;

    let in_cats = repos
        .list_posts(PostScope::Group(cats.id), 0, 10)
        .await
        .expect("group posts");
    assert_eq!(texts(&in_cats), vec!["purr", "meow"]);
    assert!(in_cats.iter().all(|post| post.group.as_ref().map(|g| g.id) == Some(cats.id)));
    assert_eq!(repos.count_posts(PostScope::Group(cats.id)).await.expect("count"), 2);
    assert_eq!(repos.count_posts(PostScope::Author(leo.id)).await.expect("count"), 3);

    let group_feed = feed(&repos)
        .group("dogs", &PageNumber::first())
        .await
        .expect("group feed");
    assert_eq!(texts(&group_feed.page.items), vec!["woof"]);
}

#[sqlx::test(migrations = "./migrations")]
async fn comments_come_back_with_their_author(pool: PgPool) {
    let repos = repositories(pool);
    let author = user(&repos, "author").await;
    let reader = user(&repos, "reader").await;
    let hello = post(&repos, &author, "hello", None).await;

    let comment = repos
        .create_comment(CreateCommentParams {
            post_id: hello.id,
            author_id: reader.id,
            text: "nice".to_string(),
        })
        .await
        .expect("insert comment");
    assert_eq!(comment.author_username, "reader");

    let listed = repos.list_for_post(hello.id).await.expect("comments");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].text, "nice");

    assert!(repos.find_post("reader", hello.id).await.expect("lookup").is_none());
    assert!(repos.find_post("author", hello.id).await.expect("lookup").is_some());
}
