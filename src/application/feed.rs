use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use tracing::debug;

use crate::application::cache::{FeedCache, FeedSnapshot, INDEX_PAGE_KEY};
use crate::application::pagination::{Page, PageNumber, PageSource, Paginator};
use crate::application::repos::{
    CommentsRepo, FollowsRepo, GroupsRepo, PostScope, PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};
use crate::domain::viewer::Viewer;

pub const METRIC_INDEX_CACHE_HIT: &str = "yatube_index_cache_hit_total";
pub const METRIC_INDEX_CACHE_MISS: &str = "yatube_index_cache_miss_total";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("group `{0}` not found")]
    UnknownGroup(String),
    #[error("user `{0}` not found")]
    UnknownAuthor(String),
    #[error("post {id} by `{username}` not found")]
    UnknownPost { username: String, id: i64 },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Author heading shared by the profile page and the post page.
#[derive(Debug, Clone)]
pub struct AuthorPanel {
    pub author: UserRecord,
    pub post_count: u64,
    pub followers: u64,
    pub following_count: u64,
    /// Whether the viewer follows this author. Always false for anonymous viewers.
    pub following: bool,
    pub is_self: bool,
}

#[derive(Debug, Clone)]
pub struct GroupFeed {
    pub group: GroupRecord,
    pub page: Page<PostRecord>,
}

#[derive(Debug, Clone)]
pub struct ProfileFeed {
    pub panel: AuthorPanel,
    pub page: Page<PostRecord>,
}

#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: PostRecord,
    pub panel: AuthorPanel,
    pub comments: Vec<CommentRecord>,
    pub can_edit: bool,
}

/// Live, scope-filtered post listing.
struct ScopedPosts {
    posts: Arc<dyn PostsRepo>,
    scope: PostScope,
}

#[async_trait]
impl PageSource<PostRecord> for ScopedPosts {
    async fn total(&self) -> Result<u64, RepoError> {
        self.posts.count_posts(self.scope).await
    }

    async fn fetch(&self, offset: u64, limit: u32) -> Result<Vec<PostRecord>, RepoError> {
        self.posts.list_posts(self.scope, offset, limit).await
    }
}

#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    comments: Arc<dyn CommentsRepo>,
    follows: Arc<dyn FollowsRepo>,
    cache: Arc<dyn FeedCache>,
    paginator: Paginator,
    index_ttl: Duration,
}

impl FeedService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        comments: Arc<dyn CommentsRepo>,
        follows: Arc<dyn FollowsRepo>,
        cache: Arc<dyn FeedCache>,
        paginator: Paginator,
        index_ttl: Duration,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            comments,
            follows,
            cache,
            paginator,
            index_ttl,
        }
    }

    /// Home feed, served from the cached snapshot.
    pub async fn home(&self, page: &PageNumber) -> Result<Page<PostRecord>, FeedError> {
        let snapshot = self.home_snapshot().await?;
        Ok(self.paginator.paginate(&snapshot, page).await?)
    }

    pub async fn group(&self, slug: &str, page: &PageNumber) -> Result<GroupFeed, FeedError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| FeedError::UnknownGroup(slug.to_string()))?;

        let page = self.live_page(PostScope::Group(group.id), page).await?;
        Ok(GroupFeed { group, page })
    }

    pub async fn profile(
        &self,
        username: &str,
        viewer: Option<&Viewer>,
        page: &PageNumber,
    ) -> Result<ProfileFeed, FeedError> {
        let author = self.require_author(username).await?;
        let page = self.live_page(PostScope::Author(author.id), page).await?;
        let panel = self.author_panel(author, viewer).await?;
        Ok(ProfileFeed { panel, page })
    }

    /// Posts of every author the viewer follows, newest first.
    pub async fn followed(
        &self,
        viewer: &Viewer,
        page: &PageNumber,
    ) -> Result<Page<PostRecord>, FeedError> {
        self.live_page(PostScope::FollowedBy(viewer.user_id), page)
            .await
    }

    pub async fn post_detail(
        &self,
        username: &str,
        post_id: i64,
        viewer: Option<&Viewer>,
    ) -> Result<PostDetail, FeedError> {
        let post = self
            .posts
            .find_post(username, post_id)
            .await?
            .ok_or_else(|| FeedError::UnknownPost {
                username: username.to_string(),
                id: post_id,
            })?;
        let author = self.require_author(username).await?;
        let comments = self.comments.list_for_post(post.id).await?;
        let can_edit = viewer.is_some_and(|viewer| viewer.is(post.author_id));
        let panel = self.author_panel(author, viewer).await?;

        Ok(PostDetail {
            post,
            panel,
            comments,
            can_edit,
        })
    }

    async fn home_snapshot(&self) -> Result<FeedSnapshot, FeedError> {
        if let Some(snapshot) = self.cache.get(INDEX_PAGE_KEY) {
            counter!(METRIC_INDEX_CACHE_HIT).increment(1);
            debug!(
                target = "yatube::application::feed",
                key = INDEX_PAGE_KEY,
                posts = snapshot.len(),
                "index cache hit"
            );
            return Ok(snapshot);
        }

        counter!(METRIC_INDEX_CACHE_MISS).increment(1);
        let snapshot: FeedSnapshot = self.posts.list_all_posts().await?.into();
        self.cache
            .set(INDEX_PAGE_KEY, Arc::clone(&snapshot), self.index_ttl);
        debug!(
            target = "yatube::application::feed",
            key = INDEX_PAGE_KEY,
            posts = snapshot.len(),
            ttl_secs = self.index_ttl.as_secs(),
            "index cache miss, snapshot stored"
        );
        Ok(snapshot)
    }

    async fn live_page(
        &self,
        scope: PostScope,
        page: &PageNumber,
    ) -> Result<Page<PostRecord>, FeedError> {
        let source = ScopedPosts {
            posts: Arc::clone(&self.posts),
            scope,
        };
        Ok(self.paginator.paginate(&source, page).await?)
    }

    async fn require_author(&self, username: &str) -> Result<UserRecord, FeedError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or_else(|| FeedError::UnknownAuthor(username.to_string()))
    }

    async fn author_panel(
        &self,
        author: UserRecord,
        viewer: Option<&Viewer>,
    ) -> Result<AuthorPanel, FeedError> {
        let following = match viewer {
            Some(viewer) if !viewer.is(author.id) => {
                self.follows.exists(viewer.user_id, author.id).await?
            }
            _ => false,
        };
        let is_self = viewer.is_some_and(|viewer| viewer.is(author.id));
        let post_count = self.posts.count_posts(PostScope::Author(author.id)).await?;
        let followers = self.follows.count_followers(author.id).await?;
        let following_count = self.follows.count_following(author.id).await?;

        Ok(AuthorPanel {
            author,
            post_count,
            followers,
            following_count,
            following,
            is_self,
        })
    }
}
