//! Bind, unbind and catalog pipelines.
//!
//! ```text
//! platform ──► OsbFilter ──► next handler ──► broker
//!                 │  pre_bind / post_bind / post_delete / post_catalog
//!                 ▼
//!            interceptor ── adapt ──► POST {binding path}/adapt_credentials
//! ```
//!
//! Each operation issues its primary call itself through [`RestClient`]; the
//! next handler is only the transport. A non-2xx primary answer is handed
//! back untouched. Everything else that goes wrong becomes a [`FilterError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{Span, error, info, instrument, warn};

use crate::http_error::HttpError;
use crate::interceptor::{CredentialAdapter, InterceptorError, ServiceBrokerInterceptor};
use crate::message::{Handler, OsbRequest, OsbResponse};
use crate::model::{
    AdaptCredentialsRequest, BindRequest, BindResponse, Catalog, Credentials, EndpointMapping,
};
use crate::path::{PathError, extract_bind_id, extract_service_id_bind_id};
use crate::rest::{RestClient, RestError};

const ADAPT_CREDENTIALS_SEGMENT: &str = "adapt_credentials";
const ADAPT_CREDENTIALS_FAILED: &str = "Error during call of adapt credentials";

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// The platform sent a body that is not a bind request.
    #[error("Invalid request body: {0}")]
    InvalidRequest(#[source] serde_json::Error),

    #[error("Failed to read request body: {0}")]
    ReadBody(#[source] axum::Error),

    /// The broker could not be reached.
    #[error(transparent)]
    Upstream(RestError),

    /// The broker answered 2xx but the exchange could not be encoded or decoded locally.
    #[error(transparent)]
    Internal(RestError),

    #[error(transparent)]
    Interceptor(#[from] InterceptorError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("Can't marshal response body: {0}")]
    Encode(#[source] serde_json::Error),
}

impl FilterError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::ReadBody(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Interceptor(e) => HttpError::from(e).status,
            Self::Internal(_) | Self::Path(_) | Self::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn to_http_error(&self) -> HttpError {
        match self {
            Self::Interceptor(e) => HttpError::from(e),
            other => HttpError::from_error(other, other.status()),
        }
    }
}

impl IntoResponse for FilterError {
    fn into_response(self) -> Response {
        let http_error = self.to_http_error();
        if http_error.status.is_server_error() {
            error!(status = %http_error.status, error = %self, "OSB request failed");
        } else {
            warn!(status = %http_error.status, error = %self, "OSB request rejected");
        }
        OsbResponse::from(&http_error).into_response()
    }
}

/// Sorts out a failed primary call: broker errors pass through, the rest is ours.
fn primary_failure(err: RestError) -> Result<OsbResponse, FilterError> {
    match err {
        RestError::Status { error, response } => {
            info!(status = %error.status, error = %error, "Passing broker error through");
            Ok(response)
        }
        err @ RestError::Transport { .. } => Err(FilterError::Upstream(err)),
        err @ (RestError::Encode(_) | RestError::Decode { .. }) => Err(FilterError::Internal(err)),
    }
}

/// The adaptation round trip handed to `post_bind`. Reuses the inbound
/// request, so its headers and query reach the broker again.
pub struct AdaptCredentialsCall<'a, H> {
    next: &'a H,
    request: OsbRequest,
}

impl<H: Handler> CredentialAdapter for AdaptCredentialsCall<'_, H> {
    async fn adapt(
        self,
        credentials: Credentials,
        endpoint_mappings: Vec<EndpointMapping>,
    ) -> Result<BindResponse, HttpError> {
        let path = format!("{}/{}", self.request.path, ADAPT_CREDENTIALS_SEGMENT);
        let payload = AdaptCredentialsRequest {
            credentials,
            endpoint_mappings,
        };

        RestClient::new(self.next, self.request)
            .post(&payload)
            .path(path)
            .send()
            .await
            .into_json::<BindResponse>()
            .map_err(|err| match err {
                RestError::Status { error, .. } => {
                    warn!(
                        status = %error.status,
                        error = %error,
                        "Broker rejected credential adaptation"
                    );
                    HttpError::new(ADAPT_CREDENTIALS_FAILED, error.status)
                        .with_description(error.error)
                }
                other => {
                    warn!(error = %other, "Credential adaptation failed");
                    other.to_http_error(StatusCode::BAD_GATEWAY)
                }
            })
    }
}

pub struct OsbFilter<I> {
    interceptor: I,
}

impl<I: ServiceBrokerInterceptor> OsbFilter<I> {
    pub fn new(interceptor: I) -> Self {
        Self { interceptor }
    }

    #[instrument(
        name = "osb.bind",
        skip_all,
        fields(
            instance_id = tracing::field::Empty,
            binding_id = tracing::field::Empty,
        )
    )]
    pub async fn bind<H: Handler>(
        &self,
        request: OsbRequest,
        next: &H,
    ) -> Result<OsbResponse, FilterError> {
        let ids = extract_service_id_bind_id(&request.path)?;
        let binding_id = ids.binding_id.to_string();
        Span::current()
            .record("instance_id", ids.instance_id)
            .record("binding_id", ids.binding_id);

        let bind_request: BindRequest =
            serde_json::from_slice(&request.body).map_err(FilterError::InvalidRequest)?;
        let bind_request = self.interceptor.pre_bind(bind_request);

        let (bind_response, raw) = match RestClient::new(next, request.clone())
            .put(&bind_request)
            .send()
            .await
            .into_json_response::<BindResponse>()
        {
            Ok(decoded) => decoded,
            Err(err) => return primary_failure(err),
        };

        let adapt = AdaptCredentialsCall { next, request };
        let bind_response = self
            .interceptor
            .post_bind(&bind_request, bind_response, &binding_id, adapt)
            .await?;

        info!(status = %raw.status, "Binding created");
        raw.with_json(&bind_response).map_err(FilterError::Encode)
    }

    #[instrument(name = "osb.unbind", skip_all, fields(binding_id = tracing::field::Empty))]
    pub async fn unbind<H: Handler>(
        &self,
        request: OsbRequest,
        next: &H,
    ) -> Result<OsbResponse, FilterError> {
        let binding_id = extract_bind_id(&request.path)?.to_string();
        Span::current().record("binding_id", binding_id.as_str());

        let response = match RestClient::new(next, request).delete().send().await.into_response() {
            Ok(response) => response,
            Err(err) => return primary_failure(err),
        };

        if let Err(err) = self.interceptor.post_delete(&binding_id).await {
            error!(error = %err, "Broker removed the binding but interceptor cleanup failed");
            return Err(err.into());
        }

        info!(status = %response.status, "Binding removed");
        Ok(response)
    }

    #[instrument(name = "osb.catalog", skip_all)]
    pub async fn fetch_catalog<H: Handler>(
        &self,
        request: OsbRequest,
        next: &H,
    ) -> Result<OsbResponse, FilterError> {
        let (mut catalog, raw) = match RestClient::new(next, request)
            .get()
            .send()
            .await
            .into_json_response::<Catalog>()
        {
            Ok(decoded) => decoded,
            Err(err) => return primary_failure(err),
        };

        self.interceptor.post_catalog(&mut catalog);
        raw.with_json(&catalog).map_err(FilterError::Encode)
    }

    /// Hands a request the filter does not intercept to the broker as it came.
    #[instrument(
        name = "osb.pass_through",
        skip_all,
        fields(method = %request.method, path = %request.path)
    )]
    pub async fn pass_through<H: Handler>(
        &self,
        request: OsbRequest,
        next: &H,
    ) -> Result<OsbResponse, FilterError> {
        let url = request.url();
        next.handle(request).await.map_err(|e| {
            FilterError::Upstream(RestError::Transport {
                url,
                source: Box::new(e),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use axum::http::{HeaderValue, Method, header};
    use serde_json::{Value, json};

    use super::*;
    use crate::config::InterceptorConfig;
    use crate::consumer::ConsumerInterceptor;
    use crate::interceptor::NoOpInterceptor;
    use crate::mocks::{MockTransportError, SpyHandler, SpyInterceptor};
    use crate::model::Endpoint;
    use crate::route_store::MemoryRouteStore;

    const BINDING_PATH: &str = "/v2/service_instances/i-1/service_bindings/b-1";

    fn bind_request(body: &str) -> OsbRequest {
        OsbRequest::new(Method::PUT, BINDING_PATH)
            .with_query("accepts_incomplete=true")
            .with_header(header::AUTHORIZATION, HeaderValue::from_static("Basic YWRtaW46YWRtaW4="))
            .with_body(body.to_string())
    }

    fn json_body(response: &OsbResponse) -> Value {
        serde_json::from_slice(&response.body).unwrap()
    }

    fn mapping() -> EndpointMapping {
        EndpointMapping {
            source: Endpoint::new("host", 1234),
            target: Endpoint::new("host2", 8888),
        }
    }

    #[tokio::test]
    async fn bind_returns_adapted_response() {
        let next = SpyHandler::new()
            .respond(
                StatusCode::CREATED,
                r#"{"credentials":{"password":"abc"},"endpoints":[{"host":"host","port":1234}]}"#,
            )
            .respond_on_suffix(
                "adapt_credentials",
                StatusCode::OK,
                r#"{"credentials":{"password":"abc"},"endpoints":[{"host":"host2","port":8888}]}"#,
            );
        let interceptor = SpyInterceptor::new().adapting(vec![mapping()]);
        let filter = OsbFilter::new(interceptor.clone());

        let response = filter.bind(bind_request(r#"{"service_id":"s"}"#), &next).await.unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(
            json_body(&response)["endpoints"],
            json!([{"host": "host2", "port": 8888}])
        );
        assert_eq!(interceptor.bound_ids(), vec!["b-1".to_string()]);

        let requests = next.requests();
        assert_eq!(requests.len(), 2);
        let adapt = &requests[1];
        assert_eq!(adapt.method, Method::POST);
        assert_eq!(adapt.path, format!("{BINDING_PATH}/adapt_credentials"));
        assert_eq!(adapt.headers[header::AUTHORIZATION], "Basic YWRtaW46YWRtaW4=");
        let adapt_body: Value = serde_json::from_slice(&adapt.body).unwrap();
        assert_eq!(
            adapt_body,
            json!({
                "credentials": {"password": "abc"},
                "endpoint_mappings": [{
                    "source": {"host": "host", "port": 1234},
                    "target": {"host": "host2", "port": 8888}
                }]
            })
        );
    }

    #[tokio::test]
    async fn bind_forwards_rewritten_request() {
        let next = SpyHandler::new().respond(StatusCode::CREATED, "{}");
        let config = InterceptorConfig {
            network_profile: "urn:mesh".to_string(),
            consumer_id: "c-1".to_string(),
            ..InterceptorConfig::default()
        };
        let filter = OsbFilter::new(ConsumerInterceptor::new(config, MemoryRouteStore::new()));

        filter
            .bind(bind_request(r#"{"service_id":"s","plan_id":"p"}"#), &next)
            .await
            .unwrap();

        let forwarded = &next.requests()[0];
        assert_eq!(forwarded.method, Method::PUT);
        assert_eq!(forwarded.path, BINDING_PATH);
        assert_eq!(forwarded.query.as_deref(), Some("accepts_incomplete=true"));
        assert_eq!(
            serde_json::from_slice::<Value>(&forwarded.body).unwrap(),
            json!({
                "service_id": "s",
                "plan_id": "p",
                "network_data": {"network_profile_id": "urn:mesh", "data": {"consumer_id": "c-1"}}
            })
        );
    }

    #[tokio::test]
    async fn bind_passes_broker_error_through() {
        let body = r#"{"error":"forbidden","description":"no access"}"#;
        let next = SpyHandler::new().respond(StatusCode::FORBIDDEN, body);
        let interceptor = SpyInterceptor::new();
        let filter = OsbFilter::new(interceptor.clone());

        let response = filter.bind(bind_request("{}"), &next).await.unwrap();

        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(response.body, body);
        assert!(interceptor.bound_ids().is_empty());
    }

    #[tokio::test]
    async fn bind_rejects_malformed_body_without_calling_broker() {
        let next = SpyHandler::new();
        let filter = OsbFilter::new(NoOpInterceptor);

        let err = filter.bind(bind_request("sdfsf"), &next).await.unwrap_err();

        assert!(matches!(err, FilterError::InvalidRequest(_)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(next.call_count(), 0);
    }

    #[tokio::test]
    async fn bind_with_undecodable_broker_response_is_internal() {
        let next = SpyHandler::new().respond(StatusCode::OK, "not json");
        let filter = OsbFilter::new(NoOpInterceptor);

        let err = filter.bind(bind_request("{}"), &next).await.unwrap_err();

        assert!(matches!(err, FilterError::Internal(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn bind_adapt_failure_reports_adapt_error() {
        let next = SpyHandler::new()
            .respond(StatusCode::CREATED, r#"{"credentials":{"password":"abc"}}"#)
            .respond_on_suffix(
                "adapt_credentials",
                StatusCode::BAD_REQUEST,
                r#"{"error":"bad mappings"}"#,
            );
        let filter = OsbFilter::new(SpyInterceptor::new().adapting(vec![mapping()]));

        let err = filter.bind(bind_request("{}"), &next).await.unwrap_err();

        let http_error = err.to_http_error();
        assert_eq!(http_error.error, "Error during call of adapt credentials");
        assert_eq!(http_error.description, "bad mappings");
        assert_eq!(http_error.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn bind_transport_failure_is_bad_gateway() {
        let next = SpyHandler::new().fail_with("connection refused");
        let filter = OsbFilter::new(NoOpInterceptor);

        let err = filter.bind(bind_request("{}"), &next).await.unwrap_err();

        assert!(matches!(err, FilterError::Upstream(_)));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        let cause = err.source().unwrap().downcast_ref::<MockTransportError>().unwrap();
        assert_eq!(cause.0, "connection refused");
    }

    #[tokio::test]
    async fn bind_on_foreign_path_is_internal_error() {
        let next = SpyHandler::new();
        let filter = OsbFilter::new(NoOpInterceptor);

        let err = filter
            .bind(OsbRequest::new(Method::PUT, "/v2/catalog").with_body("{}"), &next)
            .await
            .unwrap_err();

        assert!(matches!(err, FilterError::Path(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(next.call_count(), 0);
    }

    #[tokio::test]
    async fn unbind_returns_broker_response_and_releases() {
        let next = SpyHandler::new().respond(StatusCode::OK, "{}");
        let interceptor = SpyInterceptor::new();
        let filter = OsbFilter::new(interceptor.clone());

        let response = filter
            .unbind(OsbRequest::new(Method::DELETE, BINDING_PATH), &next)
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, "{}");
        assert_eq!(interceptor.deleted_ids(), vec!["b-1".to_string()]);
        assert_eq!(next.last_request().unwrap().method, Method::DELETE);
    }

    #[tokio::test]
    async fn unbind_fails_when_post_delete_fails() {
        let next = SpyHandler::new().respond(StatusCode::OK, "{}");
        let filter = OsbFilter::new(SpyInterceptor::new().failing_delete("delete failed"));

        let err = filter
            .unbind(OsbRequest::new(Method::DELETE, BINDING_PATH), &next)
            .await
            .unwrap_err();

        assert_eq!(err.to_http_error().error, "delete failed");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(next.call_count(), 1);
    }

    #[tokio::test]
    async fn unbind_passes_gone_through_without_release() {
        let next = SpyHandler::new().respond(StatusCode::GONE, "{}");
        let interceptor = SpyInterceptor::new();
        let filter = OsbFilter::new(interceptor.clone());

        let response = filter
            .unbind(OsbRequest::new(Method::DELETE, BINDING_PATH), &next)
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::GONE);
        assert!(interceptor.deleted_ids().is_empty());
    }

    #[tokio::test]
    async fn catalog_names_lose_prefix() {
        let next = SpyHandler::new().respond(
            StatusCode::OK,
            r#"{"services":[{"name":"istio-servicename","id":"1","bindable":true}]}"#,
        );
        let filter = OsbFilter::new(ConsumerInterceptor::new(
            InterceptorConfig::default(),
            MemoryRouteStore::new(),
        ));

        let response = filter
            .fetch_catalog(OsbRequest::new(Method::GET, "/v2/catalog"), &next)
            .await
            .unwrap();

        let body = String::from_utf8(response.body.to_vec()).unwrap();
        assert!(body.contains("servicename"));
        assert!(!body.contains("istio-"));
        assert_eq!(json_body(&response)["services"][0]["bindable"], true);
    }

    #[tokio::test]
    async fn catalog_broker_error_passes_through() {
        let next = SpyHandler::new().respond(StatusCode::UNAUTHORIZED, "nope");
        let interceptor = SpyInterceptor::new();
        let filter = OsbFilter::new(interceptor.clone());

        let response = filter
            .fetch_catalog(OsbRequest::new(Method::GET, "/v2/catalog"), &next)
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body, "nope");
        assert_eq!(interceptor.catalog_calls(), 0);
    }

    #[tokio::test]
    async fn pass_through_forwards_request_unchanged() {
        let next = SpyHandler::new().respond(StatusCode::ACCEPTED, r#"{"operation":"op-1"}"#);
        let interceptor = SpyInterceptor::new();
        let filter = OsbFilter::new(interceptor.clone());
        let request = OsbRequest::new(Method::PUT, "/v2/service_instances/i-1")
            .with_query("accepts_incomplete=true")
            .with_body(r#"{"service_id":"s"}"#);

        let response = filter.pass_through(request, &next).await.unwrap();

        assert_eq!(response.status, StatusCode::ACCEPTED);
        let sent = next.last_request().unwrap();
        assert_eq!(sent.method, Method::PUT);
        assert_eq!(sent.url(), "/v2/service_instances/i-1?accepts_incomplete=true");
        assert_eq!(sent.body, r#"{"service_id":"s"}"#);
        assert!(interceptor.bound_ids().is_empty());
    }

    #[tokio::test]
    async fn pass_through_transport_failure_is_bad_gateway() {
        let next = SpyHandler::new().fail_with("connection reset");
        let filter = OsbFilter::new(NoOpInterceptor);

        let err = filter
            .pass_through(OsbRequest::new(Method::GET, "/v2/service_instances/i-1"), &next)
            .await
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn filter_error_renders_osb_error_body() {
        let err = FilterError::Interceptor(InterceptorError::Failed("delete failed".to_string()));

        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({"error": "delete failed", "description": ""}));
    }
}
