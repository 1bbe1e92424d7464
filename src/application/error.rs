use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{
        directory::DirectoryError, feed::FeedError, follow::FollowError, posting::PostingError,
        repos::RepoError, sessions::SessionError,
    },
    domain::error::DomainError,
    infra::error::InfraError,
    presentation::views::render_error_page,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// An error that has been decided at the HTTP boundary: it renders the error
/// page with a public message and carries the full chain for logging.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn not_found(source: &'static str, error: &dyn StdError) -> Self {
        Self::from_error(source, StatusCode::NOT_FOUND, "Page not found", error)
    }

    pub fn internal(source: &'static str, error: &dyn StdError) -> Self {
        Self::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            error,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = render_error_page(self.status, self.public_message);
        self.report.attach(&mut response);
        response
    }
}

impl From<RepoError> for HttpError {
    fn from(error: RepoError) -> Self {
        match error {
            RepoError::NotFound => HttpError::not_found("infra::http::repo_error_to_http_error", &error),
            other => HttpError::internal("infra::http::repo_error_to_http_error", &other),
        }
    }
}

impl From<FeedError> for HttpError {
    fn from(error: FeedError) -> Self {
        const SOURCE: &str = "infra::http::feed_error_to_http_error";
        match error {
            FeedError::UnknownGroup(_)
            | FeedError::UnknownAuthor(_)
            | FeedError::UnknownPost { .. } => HttpError::not_found(SOURCE, &error),
            FeedError::Repo(err) => HttpError::from(err),
        }
    }
}

impl From<FollowError> for HttpError {
    fn from(error: FollowError) -> Self {
        const SOURCE: &str = "infra::http::follow_error_to_http_error";
        match error {
            FollowError::UnknownAuthor(_) | FollowError::NotFollowing { .. } => {
                HttpError::not_found(SOURCE, &error)
            }
            FollowError::Repo(err) => HttpError::from(err),
        }
    }
}

impl From<PostingError> for HttpError {
    fn from(error: PostingError) -> Self {
        const SOURCE: &str = "infra::http::posting_error_to_http_error";
        match error {
            PostingError::UnknownPost { .. } => HttpError::not_found(SOURCE, &error),
            PostingError::NotAuthor { .. } => HttpError::from_error(
                SOURCE,
                StatusCode::FORBIDDEN,
                "You cannot change this post",
                &error,
            ),
            PostingError::Validation(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Request could not be processed",
                &error,
            ),
            PostingError::Repo(err) => HttpError::from(err),
            PostingError::Storage(_) => HttpError::internal(SOURCE, &error),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

impl From<DirectoryError> for AppError {
    fn from(error: DirectoryError) -> Self {
        match error {
            DirectoryError::Domain(err) => AppError::Domain(err),
            DirectoryError::Repo(err) => AppError::Repo(err),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::UnknownUser(username) => {
                AppError::NotFound(format!("user `{username}`"))
            }
            SessionError::Repo(err) => AppError::Repo(err),
        }
    }
}
