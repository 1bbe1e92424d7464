use axum::{
    Router,
    extract::{Path, State},
    response::Redirect,
    routing::get,
};

use crate::application::error::HttpError;
use crate::presentation::views::profile_path;

use super::{HttpState, SignedIn};

pub(super) fn routes() -> Router<HttpState> {
    Router::new()
        .route("/{username}/follow/", get(follow_author))
        .route("/{username}/unfollow/", get(unfollow_author))
}

async fn follow_author(
    State(state): State<HttpState>,
    SignedIn(viewer): SignedIn,
    Path(username): Path<String>,
) -> Result<Redirect, HttpError> {
    state.follows.follow(&viewer, &username).await?;
    Ok(Redirect::to(&profile_path(&username)))
}

async fn unfollow_author(
    State(state): State<HttpState>,
    SignedIn(viewer): SignedIn,
    Path(username): Path<String>,
) -> Result<Redirect, HttpError> {
    state.follows.unfollow(&viewer, &username).await?;
    Ok(Redirect::to(&profile_path(&username)))
}
