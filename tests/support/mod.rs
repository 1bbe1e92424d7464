//! In-memory repositories and service wiring shared by the integration tests.

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use time::{OffsetDateTime, macros::datetime};
use tokio::sync::Mutex;

use yatube::application::{
    cache::{DEFAULT_INDEX_TTL, FeedCache},
    feed::FeedService,
    follow::FollowService,
    pagination::Paginator,
    posting::PostingService,
    repos::{
        CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams,
        CreateSessionParams, CreateUserParams, FollowsRepo, GroupsRepo, GroupsWriteRepo,
        PostScope, PostsRepo, PostsWriteRepo, RepoError, SessionsRepo, StoreHealth,
        UpdatePostParams, UsersRepo,
    },
    sessions::SessionService,
};
use yatube::domain::{
    entities::{CommentRecord, GroupRecord, GroupRef, PostRecord, SessionRecord, UserRecord},
    viewer::Viewer,
};
use yatube::infra::{
    cache::MemoryFeedCache,
    http::{HttpState, SessionCookie},
    uploads::UploadStorage,
};

const EPOCH: OffsetDateTime = datetime!(2021-03-01 09:00 UTC);

#[derive(Default)]
struct Tables {
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<StoredPost>,
    comments: Vec<CommentRecord>,
    follows: Vec<(i64, i64)>,
    sessions: Vec<SessionRecord>,
    next_id: i64,
}

#[derive(Clone)]
struct StoredPost {
    id: i64,
    text: String,
    pub_date: OffsetDateTime,
    author_id: i64,
    group_id: Option<i64>,
    image: Option<String>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing timestamps so that id order and date order agree.
    fn tick(&self) -> OffsetDateTime {
        EPOCH + Duration::from_secs(self.next_id as u64 * 60)
    }

    fn username(&self, user_id: i64) -> String {
        self.users
            .iter()
            .find(|user| user.id == user_id)
            .map(|user| user.username.clone())
            .unwrap_or_default()
    }

    fn record(&self, post: &StoredPost) -> PostRecord {
        PostRecord {
            id: post.id,
            text: post.text.clone(),
            pub_date: post.pub_date,
            author_id: post.author_id,
            author_username: self.username(post.author_id),
            group: post.group_id.and_then(|id| {
                self.groups.iter().find(|group| group.id == id).map(|group| GroupRef {
                    id: group.id,
                    slug: group.slug.clone(),
                    title: group.title.clone(),
                })
            }),
            image: post.image.clone(),
        }
    }

    fn in_scope(&self, post: &StoredPost, scope: PostScope) -> bool {
        match scope {
            PostScope::All => true,
            PostScope::Group(group_id) => post.group_id == Some(group_id),
            PostScope::Author(author_id) => post.author_id == author_id,
            PostScope::FollowedBy(user_id) => self
                .follows
                .iter()
                .any(|(follower, author)| *follower == user_id && *author == post.author_id),
        }
    }

    fn scoped(&self, scope: PostScope) -> Vec<PostRecord> {
        let mut posts: Vec<&StoredPost> = self
            .posts
            .iter()
            .filter(|post| self.in_scope(post, scope))
            .collect();
        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        posts.into_iter().map(|post| self.record(post)).collect()
    }
}

/// Every repository port backed by one shared set of in-memory tables.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn user(&self, username: &str) -> UserRecord {
        self.create_user(CreateUserParams {
            username: username.to_string(),
            display_name: String::new(),
        })
        .await
        .expect("user created")
    }

    pub async fn group(&self, slug: &str, title: &str) -> GroupRecord {
        self.create_group(CreateGroupParams {
            title: title.to_string(),
            slug: slug.to_string(),
            description: format!("All about {title}"),
        })
        .await
        .expect("group created")
    }

    pub async fn post(&self, author: &UserRecord, text: &str, group: Option<&GroupRecord>) -> PostRecord {
        self.create_post(CreatePostParams {
            author_id: author.id,
            text: text.to_string(),
            group_id: group.map(|group| group.id),
            image: None,
        })
        .await
        .expect("post created")
    }

    pub async fn post_text(&self, id: i64) -> Option<String> {
        let tables = self.tables.lock().await;
        tables
            .posts
            .iter()
            .find(|post| post.id == id)
            .map(|post| post.text.clone())
    }

    pub async fn follow_edges(&self) -> usize {
        self.tables.lock().await.follows.len()
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn list_posts(
        &self,
        scope: PostScope,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .scoped(scope)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .posts
            .iter()
            .filter(|post| tables.in_scope(post, scope))
            .count() as u64)
    }

    async fn list_all_posts(&self) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self.tables.lock().await.scoped(PostScope::All))
    }

    async fn find_post(&self, username: &str, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .posts
            .iter()
            .find(|post| post.id == id)
            .map(|post| tables.record(post))
            .filter(|post| post.author_username == username))
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        let post = StoredPost {
            id,
            text: params.text,
            pub_date: tables.tick(),
            author_id: params.author_id,
            group_id: params.group_id,
            image: params.image,
        };
        let record = tables.record(&post);
        tables.posts.push(post);
        Ok(record)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let index = tables
            .posts
            .iter()
            .position(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        let post = &mut tables.posts[index];
        post.text = params.text;
        post.group_id = params.group_id;
        post.image = params.image;
        let post = post.clone();
        Ok(tables.record(&post))
    }
}

#[async_trait]
impl GroupsRepo for MemoryStore {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|group| group.slug == slug).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|group| group.id == id).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let mut groups = self.tables.lock().await.groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(groups)
    }
}

#[async_trait]
impl GroupsWriteRepo for MemoryStore {
    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.groups.iter().any(|group| group.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".into(),
            });
        }
        let group = GroupRecord {
            id: tables.next_id(),
            title: params.title,
            slug: params.slug,
            description: params.description,
        };
        tables.groups.push(group.clone());
        Ok(group)
    }
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|user| user.username == username).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|user| user.id == id).cloned())
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|user| user.username == params.username) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".into(),
            });
        }
        let user = UserRecord {
            id: tables.next_id(),
            username: params.username,
            display_name: params.display_name,
            joined_at: EPOCH,
        };
        tables.users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError> {
        let tables = self.tables.lock().await;
        let mut comments: Vec<CommentRecord> = tables
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        Ok(comments)
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        let comment = CommentRecord {
            id,
            post_id: params.post_id,
            author_id: params.author_id,
            author_username: tables.username(params.author_id),
            text: params.text,
            created: tables.tick(),
        };
        tables.comments.push(comment.clone());
        Ok(comment)
    }
}

#[async_trait]
impl FollowsRepo for MemoryStore {
    async fn exists(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.follows.contains(&(user_id, author_id)))
    }

    async fn create_if_absent(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.follows.contains(&(user_id, author_id)) {
            return Ok(false);
        }
        tables.follows.push((user_id, author_id));
        Ok(true)
    }

    async fn delete(&self, user_id: i64, author_id: i64) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.follows.len();
        tables.follows.retain(|edge| *edge != (user_id, author_id));
        if tables.follows.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn count_followers(&self, author_id: i64) -> Result<u64, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.follows.iter().filter(|(_, author)| *author == author_id).count() as u64)
    }

    async fn count_following(&self, user_id: i64) -> Result<u64, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.follows.iter().filter(|(user, _)| *user == user_id).count() as u64)
    }
}

#[async_trait]
impl SessionsRepo for MemoryStore {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let session = SessionRecord {
            id: tables.next_id(),
            user_id: params.user_id,
            username: tables.username(params.user_id),
            prefix: params.prefix,
            hashed_secret: params.hashed_secret,
            created_at: EPOCH,
            revoked_at: None,
        };
        tables.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<SessionRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .iter()
            .find(|session| session.prefix == prefix)
            .cloned())
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

/// Session store whose every lookup fails, as when the database is down.
pub struct UnavailableSessions;

#[async_trait]
impl SessionsRepo for UnavailableSessions {
    async fn create_session(
        &self,
        _params: CreateSessionParams,
    ) -> Result<SessionRecord, RepoError> {
        Err(RepoError::Persistence("connection refused".into()))
    }

    async fn find_by_prefix(&self, _prefix: &str) -> Result<Option<SessionRecord>, RepoError> {
        Err(RepoError::Persistence("connection refused".into()))
    }
}

pub fn viewer(user: &UserRecord) -> Viewer {
    Viewer::new(user.id, user.username.clone())
}

pub fn feed_service(store: &Arc<MemoryStore>, cache: Arc<dyn FeedCache>) -> FeedService {
    feed_service_with_ttl(store, cache, DEFAULT_INDEX_TTL)
}

pub fn feed_service_with_ttl(
    store: &Arc<MemoryStore>,
    cache: Arc<dyn FeedCache>,
    index_ttl: Duration,
) -> FeedService {
    FeedService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        cache,
        Paginator::default(),
        index_ttl,
    )
}

pub fn follow_service(store: &Arc<MemoryStore>) -> FollowService {
    FollowService::new(store.clone(), store.clone())
}

pub fn posting_service(store: &Arc<MemoryStore>, uploads: Arc<UploadStorage>) -> PostingService {
    PostingService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        uploads,
    )
}

/// Router state over a fresh store; the returned tempdir must outlive the state.
pub fn http_state(store: &Arc<MemoryStore>) -> (HttpState, tempfile::TempDir) {
    let media = tempfile::tempdir().expect("tempdir");
    let uploads = Arc::new(UploadStorage::new(media.path().to_path_buf()).expect("storage"));

    let state = HttpState {
        feed: Arc::new(feed_service(store, Arc::new(MemoryFeedCache::new()))),
        follows: Arc::new(follow_service(store)),
        posting: Arc::new(posting_service(store, uploads.clone())),
        sessions: Arc::new(SessionService::new(store.clone(), store.clone())),
        health: store.clone(),
        uploads,
        session_cookie: SessionCookie::default(),
        max_request_bytes: 10 * 1024 * 1024,
    };
    (state, media)
}
