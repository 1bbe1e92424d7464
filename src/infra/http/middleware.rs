use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use metrics::counter;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::error::{ErrorReport, HttpError};
use crate::application::sessions::SessionAuthError;
use crate::domain::viewer::Viewer;

use super::{HttpState, METRIC_HTTP_CLIENT_ERRORS, METRIC_HTTP_SERVER_ERRORS};

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Attach the authenticated `Viewer`, if any, to the request.
///
/// The token comes from the session cookie or an `Authorization: Bearer`
/// header. A missing or rejected token leaves the request anonymous; a store
/// failure while checking it ends the request with a 500.
pub async fn resolve_viewer(
    State(state): State<HttpState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let mut resolved = None;
    if let Some(token) = session_token(request.headers(), &state.session_cookie.name) {
        match state.sessions.authenticate(&token).await {
            Ok(viewer) => {
                request.extensions_mut().insert(viewer.clone());
                resolved = Some(viewer);
            }
            Err(SessionAuthError::Store(err)) => {
                return HttpError::internal("infra::http::resolve_viewer", &err).into_response();
            }
            Err(err) => {
                debug!(
                    target = "yatube::http::session",
                    error = %err,
                    "session token rejected; continuing anonymously"
                );
            }
        }
    }

    let mut response = next.run(request).await;
    if let Some(viewer) = resolved {
        response.extensions_mut().insert(viewer);
    }
    response
}

fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(cookie_name) {
        let value = cookie.value().trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());
        let viewer = response
            .extensions()
            .get::<Viewer>()
            .map(|viewer| viewer.username.clone())
            .unwrap_or_default();

        if status.is_server_error() {
            counter!(METRIC_HTTP_SERVER_ERRORS).increment(1);
            error!(
                target = "yatube::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                viewer = viewer,
                "request failed",
            );
        } else {
            counter!(METRIC_HTTP_CLIENT_ERRORS).increment(1);
            warn!(
                target = "yatube::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                viewer = viewer,
                "client request error",
            );
        }
    }

    response
}
