//! Test doubles for the next handler and the interceptor.
//!
//! Enabled with the `test-support` feature:
//!
//! ```toml
//! [dev-dependencies]
//! trogon-osb-proxy = { path = "...", features = ["test-support"] }
//! ```

use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use bytes::Bytes;

use crate::interceptor::{CredentialAdapter, InterceptorError, ServiceBrokerInterceptor};
use crate::message::{Handler, OsbRequest, OsbResponse};
use crate::model::{BindRequest, BindResponse, Catalog, EndpointMapping};

// ── SpyHandler ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct MockTransportError(pub String);

impl std::fmt::Display for MockTransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MockTransportError {}

#[derive(Clone)]
struct Reply {
    status: StatusCode,
    body: Bytes,
}

struct SpyState {
    requests: Vec<OsbRequest>,
    default_reply: Reply,
    suffix_replies: Vec<(String, Reply)>,
    transport_error: Option<String>,
}

/// Records every forwarded request and answers from a canned script.
///
/// By default every call gets `200` with an empty body.
#[derive(Clone)]
pub struct SpyHandler {
    state: Arc<Mutex<SpyState>>,
}

impl Default for SpyHandler {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(SpyState {
                requests: Vec::new(),
                default_reply: Reply {
                    status: StatusCode::OK,
                    body: Bytes::new(),
                },
                suffix_replies: Vec::new(),
                transport_error: None,
            })),
        }
    }
}

impl SpyHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer for every path without a more specific reply.
    pub fn respond(self, status: StatusCode, body: impl Into<Bytes>) -> Self {
        self.state.lock().unwrap().default_reply = Reply {
            status,
            body: body.into(),
        };
        self
    }

    /// Answer for paths ending in `suffix` (e.g. `adapt_credentials`).
    pub fn respond_on_suffix(
        self,
        suffix: impl Into<String>,
        status: StatusCode,
        body: impl Into<Bytes>,
    ) -> Self {
        self.state.lock().unwrap().suffix_replies.push((
            suffix.into(),
            Reply {
                status,
                body: body.into(),
            },
        ));
        self
    }

    /// Fail every call before any HTTP response exists.
    pub fn fail_with(self, message: impl Into<String>) -> Self {
        self.state.lock().unwrap().transport_error = Some(message.into());
        self
    }

    pub fn requests(&self) -> Vec<OsbRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn last_request(&self) -> Option<OsbRequest> {
        self.state.lock().unwrap().requests.last().cloned()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }
}

impl Handler for SpyHandler {
    type Error = MockTransportError;

    async fn handle(&self, request: OsbRequest) -> Result<OsbResponse, Self::Error> {
        let mut state = self.state.lock().unwrap();
        let reply = state
            .suffix_replies
            .iter()
            .find(|(suffix, _)| request.path.ends_with(suffix.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| state.default_reply.clone());
        state.requests.push(request);

        if let Some(message) = &state.transport_error {
            return Err(MockTransportError(message.clone()));
        }
        Ok(OsbResponse::new(reply.status, reply.body))
    }
}

// ── SpyInterceptor ────────────────────────────────────────────────────────────

#[derive(Default)]
struct SpyRecords {
    bound: Vec<String>,
    deleted: Vec<String>,
    catalogs: usize,
}

/// Records the binding ids it sees. Optionally runs the credential
/// adaptation, or fails `post_delete`.
#[derive(Clone, Default)]
pub struct SpyInterceptor {
    records: Arc<Mutex<SpyRecords>>,
    adapt_with: Option<Vec<EndpointMapping>>,
    delete_error: Option<String>,
}

impl SpyInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// `post_bind` calls the adaptation with these mappings and returns its result.
    pub fn adapting(mut self, endpoint_mappings: Vec<EndpointMapping>) -> Self {
        self.adapt_with = Some(endpoint_mappings);
        self
    }

    pub fn failing_delete(mut self, message: impl Into<String>) -> Self {
        self.delete_error = Some(message.into());
        self
    }

    pub fn bound_ids(&self) -> Vec<String> {
        self.records.lock().unwrap().bound.clone()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.records.lock().unwrap().deleted.clone()
    }

    pub fn catalog_calls(&self) -> usize {
        self.records.lock().unwrap().catalogs
    }
}

impl ServiceBrokerInterceptor for SpyInterceptor {
    fn pre_bind(&self, request: BindRequest) -> BindRequest {
        request
    }

    async fn post_bind<A: CredentialAdapter>(
        &self,
        _request: &BindRequest,
        response: BindResponse,
        binding_id: &str,
        adapt: A,
    ) -> Result<BindResponse, InterceptorError> {
        self.records.lock().unwrap().bound.push(binding_id.to_string());
        match &self.adapt_with {
            Some(mappings) => Ok(adapt.adapt(response.credentials, mappings.clone()).await?),
            None => Ok(response),
        }
    }

    async fn post_delete(&self, binding_id: &str) -> Result<(), InterceptorError> {
        self.records.lock().unwrap().deleted.push(binding_id.to_string());
        match &self.delete_error {
            Some(message) => Err(InterceptorError::Failed(message.clone())),
            None => Ok(()),
        }
    }

    fn post_catalog(&self, _catalog: &mut Catalog) {
        self.records.lock().unwrap().catalogs += 1;
    }
}
