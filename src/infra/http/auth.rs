//! Session login/logout and viewer extractors.

use std::convert::Infallible;

use axum::{
    Form, Router,
    extract::{FromRequestParts, Query, State},
    http::{StatusCode, Uri, request::Parts},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use tracing::info;

use crate::application::{error::HttpError, sessions::SessionAuthError};
use crate::domain::viewer::Viewer;
use crate::presentation::views::{
    LayoutChrome, LayoutContext, LoginTemplate, LoginView, render_template_response,
};

use super::HttpState;

const LOGIN_PATH: &str = "/auth/login/";

/// The viewer attached by `resolve_viewer`, or `None` for anonymous requests.
pub struct MaybeViewer(pub Option<Viewer>);

impl<S> FromRequestParts<S> for MaybeViewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Viewer>().cloned()))
    }
}

/// A signed-in viewer. Anonymous requests are sent to the login page.
pub struct SignedIn(pub Viewer);

impl<S> FromRequestParts<S> for SignedIn
where
    S: Send + Sync,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Viewer>() {
            Some(viewer) => Ok(Self(viewer.clone())),
            None => Err(login_redirect(&parts.uri)),
        }
    }
}

/// Redirect to the login page, remembering where the viewer was going.
pub fn login_redirect(uri: &Uri) -> Redirect {
    let target = uri
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or_else(|| uri.path());
    Redirect::to(&format!("{LOGIN_PATH}?next={}", encode_next(target)))
}

fn encode_next(target: &str) -> String {
    url::form_urlencoded::byte_serialize(target.as_bytes())
        .collect::<String>()
        .replace("%2F", "/")
}

/// Only same-site absolute paths are followed after login.
fn safe_next(raw: Option<&str>) -> &str {
    match raw.map(str::trim) {
        Some(next) if next.starts_with('/') && !next.starts_with("//") && !next.contains('\\') => {
            next
        }
        _ => "/",
    }
}

pub(super) fn routes() -> Router<HttpState> {
    Router::new()
        .route(LOGIN_PATH, get(login_page).post(login_submit))
        .route("/auth/logout/", post(logout))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NextQuery {
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginForm {
    token: String,
    next: Option<String>,
}

fn render_login(next: &str, error: Option<String>) -> Response {
    let view = LayoutContext::new(
        LayoutChrome::new("Log in", None),
        LoginView {
            next: next.to_string(),
            error,
        },
    );
    render_template_response(LoginTemplate { view }, StatusCode::OK)
}

async fn login_page(Query(query): Query<NextQuery>) -> Response {
    render_login(safe_next(query.next.as_deref()), None)
}

async fn login_submit(
    State(state): State<HttpState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let next = safe_next(form.next.as_deref()).to_string();

    match state.sessions.authenticate(&form.token).await {
        Ok(viewer) => {
            info!(
                target = "yatube::http::session",
                user_id = viewer.user_id,
                username = %viewer.username,
                "viewer signed in"
            );
            let cookie = Cookie::build((state.session_cookie.name.clone(), form.token.trim().to_string()))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .secure(state.session_cookie.secure);
            (jar.add(cookie), Redirect::to(&next)).into_response()
        }
        Err(SessionAuthError::Store(err)) => {
            HttpError::internal("infra::http::login_submit", &err).into_response()
        }
        Err(_) => render_login(&next, Some("Invalid session token.".to_string())),
    }
}

async fn logout(State(state): State<HttpState>, jar: CookieJar) -> Response {
    let cookie = Cookie::build((state.session_cookie.name.clone(), "")).path("/");
    (jar.remove(cookie), Redirect::to("/")).into_response()
}
