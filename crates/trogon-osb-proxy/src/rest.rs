//! Single-use fluent client over a [`Handler`].
//!
//! ```text
//! RestClient::new(next, request).post(&body).path(p).send().await.into_json::<T>()
//! ```
//!
//! Every failure (body encoding, transport, non-2xx status, body decoding)
//! lands in one error slot that is carried through the chain. Each step
//! short-circuits once the slot is filled, so callers check the outcome once,
//! at the end.

use axum::http::{HeaderValue, Method, StatusCode, header};
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::http_error::HttpError;
use crate::message::{Handler, OsbRequest, OsbResponse};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("Can't marshal request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Request to {url} failed: {source}")]
    Transport { url: String, source: BoxError },

    /// Non-2xx answer. The raw response is kept so it can be passed on verbatim.
    #[error("{error}")]
    Status {
        error: HttpError,
        response: OsbResponse,
    },

    #[error("Can't unmarshal response from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },
}

impl RestError {
    /// Shapes the error for the wire. A non-2xx answer keeps the downstream
    /// status; every other failure gets `status`.
    pub fn to_http_error(&self, status: StatusCode) -> HttpError {
        match self {
            Self::Status { error, .. } => error.clone(),
            other => HttpError::new(other.to_string(), status),
        }
    }
}

pub struct RestClient<'a, H> {
    next: &'a H,
    request: OsbRequest,
}

impl<'a, H: Handler> RestClient<'a, H> {
    /// Starts from a copy of the inbound request so headers (notably
    /// authentication), path and query carry over to the outbound call.
    pub fn new(next: &'a H, request: OsbRequest) -> Self {
        Self { next, request }
    }

    pub fn get(self) -> RestRequest<'a, H> {
        self.without_body(Method::GET)
    }

    pub fn delete(self) -> RestRequest<'a, H> {
        self.without_body(Method::DELETE)
    }

    pub fn post<T: Serialize + ?Sized>(self, payload: &T) -> RestRequest<'a, H> {
        self.with_body(Method::POST, payload)
    }

    pub fn put<T: Serialize + ?Sized>(self, payload: &T) -> RestRequest<'a, H> {
        self.with_body(Method::PUT, payload)
    }

    fn without_body(mut self, method: Method) -> RestRequest<'a, H> {
        self.request.method = method;
        self.request.body = Bytes::new();
        self.request.headers.remove(header::CONTENT_LENGTH);
        RestRequest {
            next: self.next,
            request: self.request,
            pending: None,
        }
    }

    fn with_body<T: Serialize + ?Sized>(
        mut self,
        method: Method,
        payload: &T,
    ) -> RestRequest<'a, H> {
        self.request.method = method;
        let pending = match serde_json::to_vec(payload) {
            Ok(body) => {
                self.request.body = Bytes::from(body);
                self.request.headers.remove(header::CONTENT_LENGTH);
                self.request.headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                None
            }
            Err(e) => Some(RestError::Encode(e)),
        };
        RestRequest {
            next: self.next,
            request: self.request,
            pending,
        }
    }
}

pub struct RestRequest<'a, H> {
    next: &'a H,
    request: OsbRequest,
    pending: Option<RestError>,
}

impl<H: Handler> RestRequest<'_, H> {
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.request.path = path.into();
        self
    }

    /// Dispatches through the next handler unless an earlier step failed.
    ///
    /// A non-2xx answer is turned into [`RestError::Status`] here, before
    /// anyone looks at the body.
    pub async fn send(self) -> RestResponse {
        let url = self.request.url();
        if let Some(error) = self.pending {
            return RestResponse {
                url,
                outcome: Err(error),
            };
        }

        let outcome = match self.next.handle(self.request).await {
            Err(e) => Err(RestError::Transport {
                url: url.clone(),
                source: Box::new(e),
            }),
            Ok(response) => match HttpError::from_response(response.status, &response.body) {
                Some(error) => Err(RestError::Status { error, response }),
                None => Ok(response),
            },
        };

        RestResponse { url, outcome }
    }
}

pub struct RestResponse {
    url: String,
    outcome: Result<OsbResponse, RestError>,
}

impl RestResponse {
    pub fn error(&self) -> Option<&RestError> {
        self.outcome.as_ref().err()
    }

    pub fn into_response(self) -> Result<OsbResponse, RestError> {
        self.outcome
    }

    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, RestError> {
        self.into_json_response().map(|(value, _)| value)
    }

    /// Decodes the body and hands back the raw response alongside, for callers
    /// that need the downstream status and headers.
    pub fn into_json_response<T: DeserializeOwned>(self) -> Result<(T, OsbResponse), RestError> {
        let response = self.outcome?;
        match serde_json::from_slice(&response.body) {
            Ok(value) => Ok((value, response)),
            Err(source) => {
                let err = RestError::Decode {
                    url: self.url,
                    source,
                };
                tracing::error!(error = %err, "Failed to decode downstream response");
                Err(err)
            }
        }
    }
}
