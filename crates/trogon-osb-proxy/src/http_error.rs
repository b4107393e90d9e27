//! Canonical OSB error body.
//!
//! Every failure that reaches the platform is rendered as
//! `{"error": "...", "description": "..."}`. The status code travels on the
//! HTTP status line and is never part of the JSON body.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// Error returned by a broker, or produced by this proxy, in OSB wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{error}")]
pub struct HttpError {
    pub error: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip, default = "default_status")]
    pub status: StatusCode,
}

fn default_status() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

impl HttpError {
    pub fn new(error: impl Into<String>, status: StatusCode) -> Self {
        Self {
            error: error.into(),
            description: String::new(),
            status,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Shapes any error as an [`HttpError`].
    ///
    /// An error that already is an `HttpError` keeps its own status; anything
    /// else becomes `{"error": err.to_string()}` with `status`.
    pub fn from_error(err: &(dyn std::error::Error + 'static), status: StatusCode) -> Self {
        match err.downcast_ref::<HttpError>() {
            Some(http_error) => http_error.clone(),
            None => Self::new(err.to_string(), status),
        }
    }

    /// Decides whether a downstream response succeeded.
    ///
    /// Returns `None` for any 2xx status. Otherwise the body is parsed as an
    /// OSB error; a body that does not parse becomes the error message as-is.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Option<Self> {
        if status.is_success() {
            return None;
        }

        let error = match serde_json::from_slice::<HttpError>(body) {
            Ok(mut parsed) => {
                parsed.status = status;
                parsed
            }
            Err(_) => Self::new(String::from_utf8_lossy(body), status),
        };
        Some(error)
    }

    /// JSON body of this error. Serializing two plain strings cannot fail.
    pub fn to_body(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}
