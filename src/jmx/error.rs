use serde::Serialize;

use crate::gossip::DecodeError;

/// Concrete type for a [`crate::jmx::JmxClient`] error
pub type Result<T> = std::result::Result<T, Error>;

/// Status recorded for failures that don't carry one of their own
const INTERNAL_ERROR_STATUS: u16 = 500;

/// Enum that represents a [`crate::jmx::JmxClient`] error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Error {
    /// Unable to reach the proxy at all (connection refused, timeout...)
    Transport { reason: String },
    /// The proxy answered with a non-2xx HTTP status
    HttpStatus { status: u16, body: String },
    /// The proxy answered but the JMX read itself failed (bad credentials, node unreachable...)
    Jolokia { status: u16, reason: String },
    /// The proxy returned an empty list of responses
    EmptyResponse,
    /// Unable to interpret the proxy response
    InvalidResponse { reason: String },
    /// The `AllEndpointStates` dump doesn't follow the gossip grammar
    Decode(DecodeError),
}

impl Error {
    /// Numeric status recorded in place of a node's simple state when polling it fails
    pub fn status_code(&self) -> u16 {
        match self {
            Error::HttpStatus { status, .. } | Error::Jolokia { status, .. } => *status,
            Error::Transport { .. }
            | Error::EmptyResponse
            | Error::InvalidResponse { .. }
            | Error::Decode(_) => INTERNAL_ERROR_STATUS,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport {
            reason: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidResponse {
            reason: value.to_string(),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn status_codes() {
        assert_eq!(
            Error::HttpStatus {
                status: 404,
                body: String::new()
            }
            .status_code(),
            404
        );
        assert_eq!(
            Error::Jolokia {
                status: 403,
                reason: "java.lang.SecurityException".to_string()
            }
            .status_code(),
            403
        );
        assert_eq!(
            Error::Transport {
                reason: "connection refused".to_string()
            }
            .status_code(),
            500
        );
        assert_eq!(Error::EmptyResponse.status_code(), 500);
    }
}
