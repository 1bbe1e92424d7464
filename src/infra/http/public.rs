//! Read-only pages: feeds, profiles, post detail, static pages and media.

use std::io::ErrorKind;

use axum::{
    Router,
    body::Body,
    extract::{Path, Query, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::error;

use crate::application::error::HttpError;
use crate::application::feed::PostDetail;
use crate::application::pagination::PageNumber;
use crate::domain::viewer::Viewer;
use crate::infra::uploads::UploadStorageError;
use crate::presentation::views::{
    AboutAuthorTemplate, AboutTechTemplate, AuthorPanelView, CommentFormView, CommentView,
    FeedView, FollowTemplate, GroupTemplate, GroupView, IndexTemplate, LayoutChrome,
    LayoutContext, PostCard, PostDetailView, PostTemplate, ProfileTemplate, ProfileView,
    render_template_response,
};

use super::{HttpState, MaybeViewer, SignedIn, parse_post_id};

pub(super) fn routes() -> Router<HttpState> {
    Router::new()
        .route("/", get(index))
        .route("/follow/", get(follow_index))
        .route("/group/{slug}/", get(group_posts))
        .route("/about/author/", get(about_author))
        .route("/about/tech/", get(about_tech))
        .route("/media/{*path}", get(serve_upload))
        .route("/{username}/", get(profile))
        .route("/{username}/{post_id}/", get(post_detail))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageQuery {
    page: Option<String>,
}

impl PageQuery {
    fn number(self) -> PageNumber {
        PageNumber::new(self.page)
    }
}

async fn index(
    State(state): State<HttpState>,
    MaybeViewer(viewer): MaybeViewer,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let page = state.feed.home(&query.number()).await?;
    let view = LayoutContext::new(
        LayoutChrome::new("Latest posts", viewer.as_ref()),
        FeedView::new(&page, "/", "No posts yet."),
    );
    Ok(render_template_response(IndexTemplate { view }, StatusCode::OK))
}

async fn follow_index(
    State(state): State<HttpState>,
    SignedIn(viewer): SignedIn,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let page = state.feed.followed(&viewer, &query.number()).await?;
    let view = LayoutContext::new(
        LayoutChrome::new("Your subscriptions", Some(&viewer)),
        FeedView::new(
            &page,
            "/follow/",
            "Authors you follow have not posted anything yet.",
        ),
    );
    Ok(render_template_response(FollowTemplate { view }, StatusCode::OK))
}

async fn group_posts(
    State(state): State<HttpState>,
    MaybeViewer(viewer): MaybeViewer,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let feed = state.feed.group(&slug, &query.number()).await?;
    let view = LayoutContext::new(
        LayoutChrome::new(feed.group.title.clone(), viewer.as_ref()),
        GroupView::new(&feed.group, &feed.page),
    );
    Ok(render_template_response(GroupTemplate { view }, StatusCode::OK))
}

async fn profile(
    State(state): State<HttpState>,
    MaybeViewer(viewer): MaybeViewer,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let feed = state
        .feed
        .profile(&username, viewer.as_ref(), &query.number())
        .await?;
    let author = AuthorPanelView::new(&feed.panel, viewer.as_ref());
    let view = LayoutContext::new(
        LayoutChrome::new(
            format!("Posts by {}", feed.panel.author.shown_name()),
            viewer.as_ref(),
        ),
        ProfileView {
            feed: FeedView::new(&feed.page, &author.href, "No posts yet."),
            author,
        },
    );
    Ok(render_template_response(ProfileTemplate { view }, StatusCode::OK))
}

async fn post_detail(
    State(state): State<HttpState>,
    MaybeViewer(viewer): MaybeViewer,
    Path((username, post_id)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    let id = parse_post_id(&post_id).ok_or_else(|| unknown_post(&username, &post_id))?;
    let detail = state
        .feed
        .post_detail(&username, id, viewer.as_ref())
        .await?;
    let form = viewer
        .as_ref()
        .map(|_| CommentFormView::blank(&detail.post.canonical_path()));
    Ok(render_post_page(&detail, viewer.as_ref(), form))
}

/// Render the post page; `comment_form` is `None` for anonymous viewers.
pub(super) fn render_post_page(
    detail: &PostDetail,
    viewer: Option<&Viewer>,
    comment_form: Option<CommentFormView>,
) -> Response {
    let post = PostCard::from(&detail.post);
    let view = LayoutContext::new(
        LayoutChrome::new(detail.post.label(), viewer),
        PostDetailView {
            edit_href: format!("{}edit/", post.href),
            post,
            author: AuthorPanelView::new(&detail.panel, viewer),
            comments: detail.comments.iter().map(CommentView::from).collect(),
            can_edit: detail.can_edit,
            comment_form,
        },
    );
    render_template_response(PostTemplate { view }, StatusCode::OK)
}

/// 404 for a post path whose id segment is not a post id.
pub(super) fn unknown_post(username: &str, raw_id: &str) -> HttpError {
    HttpError::new(
        "infra::http::public::unknown_post",
        StatusCode::NOT_FOUND,
        "Page not found",
        format!("no post `{raw_id}` for author `{username}`"),
    )
}

async fn about_author(MaybeViewer(viewer): MaybeViewer) -> Response {
    let view = LayoutContext::new(LayoutChrome::new("About the author", viewer.as_ref()), ());
    render_template_response(AboutAuthorTemplate { view }, StatusCode::OK)
}

async fn about_tech(MaybeViewer(viewer): MaybeViewer) -> Response {
    let view = LayoutContext::new(LayoutChrome::new("Technologies", viewer.as_ref()), ());
    render_template_response(AboutTechTemplate { view }, StatusCode::OK)
}

async fn serve_upload(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_upload";

    match state.uploads.read(&path).await {
        Ok(bytes) => upload_response(&path, bytes),
        Err(UploadStorageError::InvalidPath) => missing_upload(SOURCE),
        Err(UploadStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => {
            missing_upload(SOURCE)
        }
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored upload"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read uploaded file",
                err.to_string(),
            )
            .into_response()
        }
    }
}

fn missing_upload(source: &'static str) -> Response {
    HttpError::new(
        source,
        StatusCode::NOT_FOUND,
        "Page not found",
        "The requested upload is not available",
    )
    .into_response()
}

fn upload_response(path: &str, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    // Stored names carry a random prefix, so a path never changes content.
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    response
}
