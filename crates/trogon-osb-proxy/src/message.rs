//! Request-scoped exchange values and the next-handler seam.

use std::future::Future;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Serialize;

use crate::http_error::HttpError;

/// Inbound OSB call as seen by the filter, and outbound call as sent to the
/// next handler.
#[derive(Debug, Clone)]
pub struct OsbRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OsbRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Path plus query string, used in log lines and error messages.
    pub fn url(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsbResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OsbResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Re-encodes `value` as the body, keeping status and the original
    /// headers except the now stale `Content-Length`.
    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        self.body = Bytes::from(serde_json::to_vec(value)?);
        self.headers.remove(header::CONTENT_LENGTH);
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(self)
    }
}

impl From<&HttpError> for OsbResponse {
    fn from(err: &HttpError) -> Self {
        let mut response = OsbResponse::new(err.status, err.to_body());
        response.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}

impl IntoResponse for OsbResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Next hop of the filter chain: the broker itself, or whatever transport
/// the host puts in front of it.
///
/// `Err` means the call never produced an HTTP response. Any status code,
/// including 4xx/5xx, is an `Ok` response.
pub trait Handler: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn handle(
        &self,
        request: OsbRequest,
    ) -> impl Future<Output = Result<OsbResponse, Self::Error>> + Send;
}
