//! Post authoring: create, edit and comment.

use axum::{
    Form, Router,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;

use crate::application::error::HttpError;
use crate::application::posting::{ImageUpload, PostForm, PostingError};
use crate::domain::viewer::Viewer;
use crate::presentation::views::{
    CommentFormView, LayoutChrome, LayoutContext, PostFormTemplate, PostFormView,
    render_template_response,
};

use super::{HttpState, SignedIn, parse_post_id, public};

pub(super) fn routes() -> Router<HttpState> {
    Router::new()
        .route("/new/", get(new_post_page).post(new_post_submit))
        .route(
            "/{username}/{post_id}/edit/",
            get(edit_post_page).post(edit_post_submit),
        )
        .route(
            "/{username}/{post_id}/comment/",
            get(comment_redirect).post(comment_submit),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommentForm {
    text: String,
}

fn render_form(view: PostFormView, viewer: &Viewer) -> Response {
    let title = view.heading;
    let view = LayoutContext::new(LayoutChrome::new(title, Some(viewer)), view);
    render_template_response(PostFormTemplate { view }, StatusCode::OK)
}

async fn new_post_page(
    State(state): State<HttpState>,
    SignedIn(viewer): SignedIn,
) -> Result<Response, HttpError> {
    let groups = state.posting.group_choices().await?;
    Ok(render_form(PostFormView::create("", "", &groups), &viewer))
}

async fn new_post_submit(
    State(state): State<HttpState>,
    SignedIn(viewer): SignedIn,
    multipart: Multipart,
) -> Result<Response, HttpError> {
    let form = read_post_form(multipart).await?;
    let (text, group) = (form.text.clone(), form.group.clone());

    match state.posting.create_post(&viewer, form).await {
        Ok(_) => Ok(Redirect::to("/").into_response()),
        Err(PostingError::Validation(errors)) => {
            let groups = state.posting.group_choices().await?;
            let view = PostFormView::create(&text, &group, &groups).with_errors(&errors);
            Ok(render_form(view, &viewer))
        }
        Err(err) => Err(err.into()),
    }
}

async fn edit_post_page(
    State(state): State<HttpState>,
    SignedIn(viewer): SignedIn,
    Path((username, post_id)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    let id = parse_post_id(&post_id).ok_or_else(|| public::unknown_post(&username, &post_id))?;
    let post = match state.posting.editable_post(&viewer, &username, id).await {
        Ok(post) => post,
        Err(err) => return posting_failure(err),
    };

    let groups = state.posting.group_choices().await?;
    let current = PostForm::from_post(&post);
    Ok(render_form(
        PostFormView::edit(&post, &current.text, &current.group, &groups),
        &viewer,
    ))
}

async fn edit_post_submit(
    State(state): State<HttpState>,
    SignedIn(viewer): SignedIn,
    Path((username, post_id)): Path<(String, String)>,
    multipart: Multipart,
) -> Result<Response, HttpError> {
    let id = parse_post_id(&post_id).ok_or_else(|| public::unknown_post(&username, &post_id))?;
    let form = read_post_form(multipart).await?;
    let (text, group) = (form.text.clone(), form.group.clone());

    match state.posting.update_post(&viewer, &username, id, form).await {
        Ok(post) => Ok(Redirect::to(&post.canonical_path()).into_response()),
        Err(PostingError::Validation(errors)) => {
            let post = state.posting.editable_post(&viewer, &username, id).await?;
            let groups = state.posting.group_choices().await?;
            let view = PostFormView::edit(&post, &text, &group, &groups).with_errors(&errors);
            Ok(render_form(view, &viewer))
        }
        Err(err) => posting_failure(err),
    }
}

async fn comment_redirect(
    State(state): State<HttpState>,
    SignedIn(_viewer): SignedIn,
    Path((username, post_id)): Path<(String, String)>,
) -> Result<Redirect, HttpError> {
    let id = parse_post_id(&post_id).ok_or_else(|| public::unknown_post(&username, &post_id))?;
    let post = state.posting.commentable_post(&username, id).await?;
    Ok(Redirect::to(&post.canonical_path()))
}

async fn comment_submit(
    State(state): State<HttpState>,
    SignedIn(viewer): SignedIn,
    Path((username, post_id)): Path<(String, String)>,
    Form(form): Form<CommentForm>,
) -> Result<Response, HttpError> {
    let id = parse_post_id(&post_id).ok_or_else(|| public::unknown_post(&username, &post_id))?;

    match state
        .posting
        .add_comment(&viewer, &username, id, &form.text)
        .await
    {
        Ok(_) => Ok(Redirect::to(&format!("/{username}/{id}/")).into_response()),
        Err(PostingError::Validation(errors)) => {
            let detail = state
                .feed
                .post_detail(&username, id, Some(&viewer))
                .await?;
            let comment_form =
                CommentFormView::rejected(&detail.post.canonical_path(), &form.text, &errors);
            Ok(public::render_post_page(
                &detail,
                Some(&viewer),
                Some(comment_form),
            ))
        }
        Err(err) => Err(err.into()),
    }
}

/// Editing someone else's post sends the viewer back to that post.
fn posting_failure(err: PostingError) -> Result<Response, HttpError> {
    match err {
        PostingError::NotAuthor { post_path, .. } => Ok(Redirect::to(&post_path).into_response()),
        other => Err(other.into()),
    }
}

async fn read_post_form(mut multipart: Multipart) -> Result<PostForm, HttpError> {
    let mut form = PostForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "text" => form.text = field.text().await.map_err(multipart_error)?,
            "group" => form.group = field.text().await.map_err(multipart_error)?,
            "image" => {
                let filename = field.file_name().unwrap_or("image").to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                if !data.is_empty() {
                    form.image = Some(ImageUpload { filename, data });
                }
            }
            "image-clear" => {
                field.bytes().await.map_err(multipart_error)?;
                form.clear_image = true;
            }
            _ => {
                field.bytes().await.map_err(multipart_error)?;
            }
        }
    }

    Ok(form)
}

fn multipart_error(err: MultipartError) -> HttpError {
    const SOURCE: &str = "infra::http::posts::read_post_form";
    let status = err.status();
    let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "Upload too large"
    } else {
        "Request could not be processed"
    };
    HttpError::from_error(SOURCE, status, message, &err)
}
