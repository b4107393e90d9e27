//! Axum host for [`OsbFilter`].
//!
//! Binding and catalog routes run through the filter; every other OSB route
//! goes to the broker untouched.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::routing::{get, put};
use tracing::info;

use crate::config::ProxyConfig;
use crate::filter::{FilterError, OsbFilter};
use crate::forward::BrokerForwarder;
use crate::interceptor::ServiceBrokerInterceptor;
use crate::message::{OsbRequest, OsbResponse};
use crate::rest::BoxError;

const BINDING_ROUTE: &str = "/v2/service_instances/{instance_id}/service_bindings/{binding_id}";
const CATALOG_ROUTE: &str = "/v2/catalog";

#[derive(Debug, thiserror::Error)]
#[error("OSB_BROKER_URL is not set")]
pub struct MissingBrokerUrl;

pub struct AppState<I> {
    pub filter: Arc<OsbFilter<I>>,
    pub broker: BrokerForwarder,
}

impl<I> Clone for AppState<I> {
    fn clone(&self) -> Self {
        Self {
            filter: Arc::clone(&self.filter),
            broker: self.broker.clone(),
        }
    }
}

impl<I: ServiceBrokerInterceptor> AppState<I> {
    pub fn new(interceptor: I, broker: BrokerForwarder) -> Self {
        Self {
            filter: Arc::new(OsbFilter::new(interceptor)),
            broker,
        }
    }
}

/// Build the axum router for the proxy.
pub fn router<I: ServiceBrokerInterceptor + 'static>(state: AppState<I>) -> Router {
    Router::new()
        .route(BINDING_ROUTE, put(bind::<I>).delete(unbind::<I>))
        .route(CATALOG_ROUTE, get(fetch_catalog::<I>))
        .fallback(pass_through::<I>)
        .with_state(state)
}

/// Starts the proxy on `0.0.0.0:{port}` in front of `OSB_BROKER_URL`.
pub async fn serve<I: ServiceBrokerInterceptor + 'static>(
    config: ProxyConfig,
    interceptor: I,
) -> Result<(), BoxError> {
    let broker_url = config.broker_url.ok_or(MissingBrokerUrl)?;
    let broker = BrokerForwarder::new(broker_url, config.upstream_timeout)?;
    info!(broker = %broker.base_url(), "Forwarding to service broker");

    let app = router(AppState::new(interceptor, broker));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(addr = %addr, "OSB proxy listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn read_request(request: Request) -> Result<OsbRequest, FilterError> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(FilterError::ReadBody)?;

    Ok(OsbRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
    })
}

async fn bind<I: ServiceBrokerInterceptor>(
    State(state): State<AppState<I>>,
    request: Request,
) -> Result<OsbResponse, FilterError> {
    let request = read_request(request).await?;
    state.filter.bind(request, &state.broker).await
}

async fn unbind<I: ServiceBrokerInterceptor>(
    State(state): State<AppState<I>>,
    request: Request,
) -> Result<OsbResponse, FilterError> {
    let request = read_request(request).await?;
    state.filter.unbind(request, &state.broker).await
}

async fn fetch_catalog<I: ServiceBrokerInterceptor>(
    State(state): State<AppState<I>>,
    request: Request,
) -> Result<OsbResponse, FilterError> {
    let request = read_request(request).await?;
    state.filter.fetch_catalog(request, &state.broker).await
}

async fn pass_through<I: ServiceBrokerInterceptor>(
    State(state): State<AppState<I>>,
    request: Request,
) -> Result<OsbResponse, FilterError> {
    let request = read_request(request).await?;
    state.filter.pass_through(request, &state.broker).await
}
