//! Follower → author subscriptions.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::{UserRecord, describe_follow};
use crate::domain::viewer::Viewer;

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("user `{0}` not found")]
    UnknownAuthor(String),
    #[error("`{follower}` does not follow `{author}`")]
    NotFollowing { follower: String, author: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// What a follow request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Created,
    AlreadyFollowing,
    SelfFollowIgnored,
}

#[derive(Clone)]
pub struct FollowService {
    follows: Arc<dyn FollowsRepo>,
    users: Arc<dyn UsersRepo>,
}

impl FollowService {
    pub fn new(follows: Arc<dyn FollowsRepo>, users: Arc<dyn UsersRepo>) -> Self {
        Self { follows, users }
    }

    pub async fn is_following(&self, follower_id: i64, author_id: i64) -> Result<bool, FollowError> {
        Ok(self.follows.exists(follower_id, author_id).await?)
    }

    /// Subscribe the viewer to `username`. Following oneself does nothing.
    pub async fn follow(&self, viewer: &Viewer, username: &str) -> Result<FollowOutcome, FollowError> {
        let author = self.require_author(username).await?;
        if viewer.is(author.id) {
            return Ok(FollowOutcome::SelfFollowIgnored);
        }

        if self.follows.create_if_absent(viewer.user_id, author.id).await? {
            info!(
                target = "yatube::application::follow",
                follower_id = viewer.user_id,
                author_id = author.id,
                "{}",
                describe_follow(&viewer.username, &author.username)
            );
            Ok(FollowOutcome::Created)
        } else {
            Ok(FollowOutcome::AlreadyFollowing)
        }
    }

    pub async fn unfollow(&self, viewer: &Viewer, username: &str) -> Result<(), FollowError> {
        let author = self.require_author(username).await?;
        match self.follows.delete(viewer.user_id, author.id).await {
            Ok(()) => {
                info!(
                    target = "yatube::application::follow",
                    follower_id = viewer.user_id,
                    author_id = author.id,
                    "follow removed"
                );
                Ok(())
            }
            Err(RepoError::NotFound) => Err(FollowError::NotFollowing {
                follower: viewer.username.clone(),
                author: author.username,
            }),
            Err(other) => Err(other.into()),
        }
    }

    async fn require_author(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or_else(|| FollowError::UnknownAuthor(username.to_string()))
    }
}
