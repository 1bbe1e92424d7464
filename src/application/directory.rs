//! Operator-side management of users and groups.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{
    CreateGroupParams, CreateUserParams, GroupsWriteRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{GroupRecord, UserRecord};
use crate::domain::error::DomainError;
use crate::domain::slug::derive_slug;

const MAX_GROUP_TITLE: usize = 200;
const MAX_USERNAME: usize = 150;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateGroupCommand {
    pub slug: String,
    pub title: String,
    pub description: String,
}

#[derive(Clone)]
pub struct DirectoryService {
    users: Arc<dyn UsersRepo>,
    groups: Arc<dyn GroupsWriteRepo>,
}

impl DirectoryService {
    pub fn new(users: Arc<dyn UsersRepo>, groups: Arc<dyn GroupsWriteRepo>) -> Self {
        Self { users, groups }
    }

    pub async fn create_user(
        &self,
        username: &str,
        display_name: Option<&str>,
    ) -> Result<UserRecord, DirectoryError> {
        let username = validate_username(username)?;
        let user = self
            .users
            .create_user(CreateUserParams {
                username,
                display_name: display_name.unwrap_or_default().trim().to_string(),
            })
            .await?;
        info!(
            target = "yatube::application::directory",
            user_id = user.id,
            username = %user.username,
            "user created"
        );
        Ok(user)
    }

    pub async fn create_group(
        &self,
        command: CreateGroupCommand,
    ) -> Result<GroupRecord, DirectoryError> {
        let slug = derive_slug(&command.slug).map_err(DomainError::from)?;
        let title = command.title.trim();
        if title.is_empty() {
            return Err(DomainError::validation("group title must not be empty").into());
        }
        if title.chars().count() > MAX_GROUP_TITLE {
            return Err(DomainError::validation(format!(
                "group title exceeds {MAX_GROUP_TITLE} characters"
            ))
            .into());
        }

        let group = self
            .groups
            .create_group(CreateGroupParams {
                title: title.to_string(),
                slug,
                description: command.description.trim().to_string(),
            })
            .await?;
        info!(
            target = "yatube::application::directory",
            group_id = group.id,
            slug = %group.slug,
            "group created"
        );
        Ok(group)
    }
}

/// Usernames share the first URL segment with fixed routes.
fn validate_username(raw: &str) -> Result<String, DomainError> {
    const RESERVED: [&str; 7] = ["new", "follow", "group", "about", "auth", "media", "_health"];

    let username = raw.trim();
    if username.is_empty() {
        return Err(DomainError::validation("username must not be empty"));
    }
    if username.chars().count() > MAX_USERNAME {
        return Err(DomainError::validation(format!(
            "username exceeds {MAX_USERNAME} characters"
        )));
    }
    if !username
        .chars()
        .all(|ch| ch.is_alphanumeric() || matches!(ch, '.' | '-' | '_'))
    {
        return Err(DomainError::validation(
            "username may only contain letters, digits and . - _",
        ));
    }
    if RESERVED.contains(&username) {
        return Err(DomainError::validation(format!(
            "username `{username}` is reserved"
        )));
    }
    Ok(username.to_string())
}
