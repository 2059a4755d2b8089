//! HTTP basic auth for the coordination routes.
//!
//! Requests are checked against the same [`SharedCredentials`] the JMX client uses.
//! Until the admin secret has been loaded every request is rejected.
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::{event, Level};

use crate::credentials::SharedCredentials;

const REALM: &str = "Basic realm=Restricted";

/// Extracts `(user, password)` from a `Authorization: Basic <base64>` header
pub fn basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;

    Some((user.to_string(), password.to_string()))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, REALM)],
        "Unauthorized",
    )
        .into_response()
}

pub async fn require_basic_auth(
    State(credentials): State<SharedCredentials>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let current = match credentials.current() {
        Ok(current) => current,
        Err(err) => return err.into_response(),
    };

    match basic_auth(request.headers()) {
        Some((user, password)) if current.matches(&user, &password) => next.run(request).await,
        Some((user, _)) => {
            event!(Level::DEBUG, user = %user, path = %request.uri().path(), "invalid credentials");
            unauthorized()
        }
        None => {
            event!(Level::DEBUG, path = %request.uri().path(), "missing basic auth");
            unauthorized()
        }
    }
}
