//! Hooks the filter calls around each OSB operation.
//!
//! The filter only depends on [`ServiceBrokerInterceptor`]; which
//! implementation runs (mesh consumer, no-op, test spy) is a deployment
//! choice.

use std::future::Future;

use axum::http::StatusCode;

use crate::http_error::HttpError;
use crate::model::{BindRequest, BindResponse, Catalog, Credentials, EndpointMapping};
use crate::rest::BoxError;

#[derive(Debug, thiserror::Error)]
pub enum InterceptorError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Route store error: {0}")]
    RouteStore(#[source] BoxError),

    #[error("{0}")]
    Failed(String),
}

impl From<&InterceptorError> for HttpError {
    /// A typed HTTP error keeps its status; anything else is a 500.
    fn from(err: &InterceptorError) -> Self {
        match err {
            InterceptorError::Http(http_error) => http_error.clone(),
            other => HttpError::new(other.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

/// Second round trip of a bind: rewrites broker credentials for the mesh
/// addresses in `endpoint_mappings`.
///
/// Taking `self` by value means a hook can run the adaptation at most once.
pub trait CredentialAdapter: Send {
    fn adapt(
        self,
        credentials: Credentials,
        endpoint_mappings: Vec<EndpointMapping>,
    ) -> impl Future<Output = Result<BindResponse, HttpError>> + Send;
}

pub trait ServiceBrokerInterceptor: Send + Sync {
    /// Rewrites the bind request before it is forwarded.
    fn pre_bind(&self, request: BindRequest) -> BindRequest;

    /// Runs after the broker accepted the bind. May call `adapt` once and
    /// return its result.
    fn post_bind<A: CredentialAdapter>(
        &self,
        request: &BindRequest,
        response: BindResponse,
        binding_id: &str,
        adapt: A,
    ) -> impl Future<Output = Result<BindResponse, InterceptorError>> + Send;

    /// Releases whatever the interceptor holds for `binding_id`. Runs after
    /// the broker already removed the binding.
    fn post_delete(
        &self,
        binding_id: &str,
    ) -> impl Future<Output = Result<(), InterceptorError>> + Send;

    fn post_catalog(&self, catalog: &mut Catalog);
}

/// Leaves every message as it is.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpInterceptor;

impl ServiceBrokerInterceptor for NoOpInterceptor {
    fn pre_bind(&self, request: BindRequest) -> BindRequest {
        request
    }

    async fn post_bind<A: CredentialAdapter>(
        &self,
        _request: &BindRequest,
        response: BindResponse,
        _binding_id: &str,
        _adapt: A,
    ) -> Result<BindResponse, InterceptorError> {
        Ok(response)
    }

    async fn post_delete(&self, _binding_id: &str) -> Result<(), InterceptorError> {
        Ok(())
    }

    fn post_catalog(&self, _catalog: &mut Catalog) {}
}
