//! This module defines the errors visible to callers of the prober's HTTP control surface.

use std::fmt::Display;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{event, Level};

pub type Result<T> = std::result::Result<T, Error>;

/// Error enum with all possible variants
#[derive(Debug, Serialize)]
pub enum Error {
    InvalidRequest(InvalidRequest),
    Internal(Internal),
    Io { reason: String },
}

impl Error {
    /// HTTP status returned for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Internal(_) | Error::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            event!(Level::ERROR, "request failed: {}", self);
        } else {
            event!(Level::WARN, "invalid request: {}", self);
        }

        (status, self.to_string()).into_response()
    }
}

impl From<crate::cluster::error::Error> for Error {
    fn from(err: crate::cluster::error::Error) -> Self {
        Self::Internal(Internal::Cluster(err))
    }
}

#[derive(Debug, Serialize)]
pub enum Internal {
    Logic { reason: String },
    Cluster(crate::cluster::error::Error),
}

#[derive(Debug, Serialize)]
pub enum InvalidRequest {
    InvalidJsonPayload(String),
    InvalidBoolean(String),
    BodyNotUtf8,
    MissingRemoteAddress,
}
