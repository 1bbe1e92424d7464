//! HTTP surface: router, middleware and handlers.

mod auth;
mod follow;
mod middleware;
mod posts;
mod public;

pub use auth::{MaybeViewer, SignedIn, login_redirect};
pub use middleware::RequestContext;

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::get,
};

use crate::application::{
    error::ErrorReport,
    feed::FeedService,
    follow::FollowService,
    posting::PostingService,
    repos::{RepoError, StoreHealth},
    sessions::SessionService,
};
use crate::infra::uploads::UploadStorage;
use crate::presentation::views::render_not_found_response;

pub const METRIC_HTTP_CLIENT_ERRORS: &str = "yatube_http_client_errors_total";
pub const METRIC_HTTP_SERVER_ERRORS: &str = "yatube_http_server_errors_total";

/// Name and flags of the cookie carrying the session token.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    pub name: String,
    pub secure: bool,
}

impl Default for SessionCookie {
    fn default() -> Self {
        Self {
            name: "yatube_session".to_string(),
            secure: false,
        }
    }
}

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub follows: Arc<FollowService>,
    pub posting: Arc<PostingService>,
    pub sessions: Arc<SessionService>,
    pub health: Arc<dyn StoreHealth>,
    pub uploads: Arc<UploadStorage>,
    pub session_cookie: SessionCookie,
    pub max_request_bytes: usize,
}

pub fn build_router(state: HttpState) -> Router {
    let upload_limit = state.max_request_bytes;

    Router::new()
        .merge(public::routes())
        .merge(posts::routes())
        .merge(follow::routes())
        .merge(auth::routes())
        .route("/_health/db", get(db_health))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(from_fn_with_state(state.clone(), middleware::resolve_viewer))
        .layer(from_fn(middleware::log_responses))
        .layer(from_fn(middleware::set_request_context))
        .with_state(state)
}

async fn db_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.health_check().await)
}

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

async fn not_found() -> Response {
    render_not_found_response()
}

/// Path segment parsed as a post id; anything else is a missing page.
fn parse_post_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}
