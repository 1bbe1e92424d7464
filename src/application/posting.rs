//! Writing posts and comments on behalf of the viewer.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, GroupsRepo, PostsRepo, PostsWriteRepo,
    RepoError, UpdatePostParams,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord};
use crate::domain::posts::{FieldErrors, required_text};
use crate::domain::viewer::Viewer;
use crate::infra::uploads::{UploadStorage, UploadStorageError};

const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
const IMAGE_DIRECTORY: &str = "posts";

#[derive(Debug, Error)]
pub enum PostingError {
    #[error("form validation failed")]
    Validation(FieldErrors),
    #[error("post {id} by `{username}` not found")]
    UnknownPost { username: String, id: i64 },
    #[error("user `{viewer}` is not the author of post {id}")]
    NotAuthor {
        viewer: String,
        id: i64,
        post_path: String,
    },
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Storage(#[from] UploadStorageError),
}

/// A file field from the post form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub data: Bytes,
}

/// Raw post form as submitted.
#[derive(Debug, Clone, Default)]
pub struct PostForm {
    pub text: String,
    /// Selected group id, empty for "no group".
    pub group: String,
    pub image: Option<ImageUpload>,
    /// Edit form only: drop the current image.
    pub clear_image: bool,
}

impl PostForm {
    pub fn from_post(post: &PostRecord) -> Self {
        Self {
            text: post.text.clone(),
            group: post
                .group
                .as_ref()
                .map(|group| group.id.to_string())
                .unwrap_or_default(),
            image: None,
            clear_image: false,
        }
    }
}

struct ValidPostForm {
    text: String,
    group_id: Option<i64>,
    image: Option<ImageUpload>,
    clear_image: bool,
}

#[derive(Clone)]
pub struct PostingService {
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
    storage: Arc<UploadStorage>,
}

impl PostingService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
        storage: Arc<UploadStorage>,
    ) -> Self {
        Self {
            posts,
            writer,
            groups,
            comments,
            storage,
        }
    }

    /// Groups offered by the post form, in display order.
    pub async fn group_choices(&self) -> Result<Vec<GroupRecord>, PostingError> {
        Ok(self.groups.list_groups().await?)
    }

    pub async fn create_post(
        &self,
        viewer: &Viewer,
        form: PostForm,
    ) -> Result<PostRecord, PostingError> {
        let valid = self.validate(form).await?;
        let image = match valid.image {
            Some(upload) => Some(self.store_image(upload).await?),
            None => None,
        };

        let post = self
            .writer
            .create_post(CreatePostParams {
                author_id: viewer.user_id,
                text: valid.text,
                group_id: valid.group_id,
                image,
            })
            .await?;

        info!(
            target = "yatube::application::posting",
            post_id = post.id,
            author = %viewer.username,
            "post created"
        );
        Ok(post)
    }

    /// Load a post for editing, refusing anyone but its author.
    pub async fn editable_post(
        &self,
        viewer: &Viewer,
        username: &str,
        post_id: i64,
    ) -> Result<PostRecord, PostingError> {
        let post = self.require_post(username, post_id).await?;
        if !viewer.is(post.author_id) {
            return Err(PostingError::NotAuthor {
                viewer: viewer.username.clone(),
                id: post.id,
                post_path: post.canonical_path(),
            });
        }
        Ok(post)
    }

    pub async fn update_post(
        &self,
        viewer: &Viewer,
        username: &str,
        post_id: i64,
        form: PostForm,
    ) -> Result<PostRecord, PostingError> {
        let current = self.editable_post(viewer, username, post_id).await?;
        let valid = self.validate(form).await?;

        let image = match (valid.image, valid.clear_image) {
            (Some(upload), _) => Some(self.store_image(upload).await?),
            (None, true) => None,
            (None, false) => current.image.clone(),
        };

        let updated = self
            .writer
            .update_post(UpdatePostParams {
                id: current.id,
                text: valid.text,
                group_id: valid.group_id,
                image: image.clone(),
            })
            .await?;

        if let Some(previous) = current.image.as_deref()
            && image.as_deref() != Some(previous)
            && let Err(err) = self.storage.delete(previous).await
        {
            warn!(
                target = "yatube::application::posting",
                post_id = current.id,
                path = previous,
                error = %err,
                "failed to remove replaced post image"
            );
        }

        info!(
            target = "yatube::application::posting",
            post_id = updated.id,
            author = %viewer.username,
            "post updated"
        );
        Ok(updated)
    }

    /// The post a comment would be attached to.
    pub async fn commentable_post(
        &self,
        username: &str,
        post_id: i64,
    ) -> Result<PostRecord, PostingError> {
        self.require_post(username, post_id).await
    }

    pub async fn add_comment(
        &self,
        viewer: &Viewer,
        username: &str,
        post_id: i64,
        text: &str,
    ) -> Result<CommentRecord, PostingError> {
        let post = self.require_post(username, post_id).await?;

        let mut errors = FieldErrors::new();
        let text = required_text("text", text, &mut errors);
        if !errors.is_empty() {
            return Err(PostingError::Validation(errors));
        }

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id: post.id,
                author_id: viewer.user_id,
                text,
            })
            .await?;

        info!(
            target = "yatube::application::posting",
            post_id = post.id,
            comment_id = comment.id,
            author = %viewer.username,
            "comment added"
        );
        Ok(comment)
    }

    async fn require_post(&self, username: &str, post_id: i64) -> Result<PostRecord, PostingError> {
        self.posts
            .find_post(username, post_id)
            .await?
            .ok_or_else(|| PostingError::UnknownPost {
                username: username.to_string(),
                id: post_id,
            })
    }

    async fn validate(&self, form: PostForm) -> Result<ValidPostForm, PostingError> {
        let mut errors = FieldErrors::new();
        let text = required_text("text", &form.text, &mut errors);

        let group_id = match form.group.trim() {
            "" => None,
            raw => match raw.parse::<i64>() {
                Ok(id) if self.groups.find_by_id(id).await?.is_some() => Some(id),
                _ => {
                    errors.push("group", INVALID_CHOICE);
                    None
                }
            },
        };

        let image = form.image.filter(|upload| !upload.data.is_empty());
        if let Some(upload) = image.as_ref()
            && !is_image(&upload.data)
        {
            errors.push("image", INVALID_IMAGE);
        }

        if !errors.is_empty() {
            return Err(PostingError::Validation(errors));
        }

        Ok(ValidPostForm {
            text,
            group_id,
            image,
            clear_image: form.clear_image,
        })
    }

    async fn store_image(&self, upload: ImageUpload) -> Result<String, PostingError> {
        let stored = self
            .storage
            .store_in(IMAGE_DIRECTORY, &upload.filename, upload.data)
            .await?;
        Ok(stored.stored_path)
    }
}

/// True when the payload decodes as an image with non-zero dimensions.
pub fn is_image(data: &[u8]) -> bool {
    match imagesize::blob_size(data) {
        Ok(size) => size.width > 0 && size.height > 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent GIF
    const TINY_GIF: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
        0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
        0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
    ];

    #[test]
    fn is_image_accepts_gif_and_rejects_text() {
        assert!(is_image(TINY_GIF));
        assert!(!is_image(b"definitely not an image"));
        assert!(!is_image(&[]));
    }

    #[test]
    fn post_form_prefills_from_existing_post() {
        let post = PostRecord {
            id: 3,
            text: "hello".into(),
            pub_date: time::macros::datetime!(2021-03-01 10:00 UTC),
            author_id: 1,
            author_username: "leo".into(),
            group: Some(crate::domain::entities::GroupRef {
                id: 9,
                slug: "cats".into(),
                title: "Cats".into(),
            }),
            image: Some("posts/a.gif".into()),
        };
        let form = PostForm::from_post(&post);
        assert_eq!(form.text, "hello");
        assert_eq!(form.group, "9");
        assert!(form.image.is_none());
    }
}
