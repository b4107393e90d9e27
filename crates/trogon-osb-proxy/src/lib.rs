//! # trogon-osb-proxy
//!
//! Open Service Broker filter that sits between a platform and a service
//! broker and routes bindings through a service mesh.
//!
//! ## How it works
//!
//! ```text
//! Platform → PUT /v2/service_instances/{instance_id}/service_bindings/{binding_id}
//!               ↓
//!          [OSB proxy (axum)]
//!               ↓ pre_bind: request the configured network profile
//!               ↓ PUT to the broker (reqwest)
//!               ↓ post_bind: map broker endpoints to mesh-local services
//!               ↓ POST {binding path}/adapt_credentials to the broker
//!          [Platform receives credentials pointing at the mesh]
//! ```
//!
//! `DELETE` on the binding path releases the routes of the binding after the
//! broker removed it. `GET /v2/catalog` strips the service name prefix.
//! Everything else is passed to the broker unchanged. Broker errors reach the
//! platform verbatim; failures of the proxy itself are rendered as
//! `{"error": "...", "description": "..."}`.
//!
//! ## Configuration (env vars)
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `OSB_PROXY_PORT` | `8080` | HTTP listening port |
//! | `OSB_BROKER_URL` | unset | Base URL of the service broker (required) |
//! | `OSB_UPSTREAM_TIMEOUT_SECS` | `30` | Timeout of each broker call |
//! | `OSB_INTERCEPTOR` | `consumer` | `consumer` or `noop` |
//! | `ISTIO_SERVICE_NAME_PREFIX` | `istio-` | Prefix stripped from catalog service names |
//! | `ISTIO_CONSUMER_ID` | unset | Consumer id sent with bind requests |
//! | `ISTIO_NETWORK_PROFILE` | unset | Network profile requested on bind |
//! | `ISTIO_SERVICE_DOMAIN` | `svc.cluster.local` | Domain of the mesh-local service hosts |
//! | `ISTIO_SERVICE_PORT` | `5555` | Port of the mesh-local services |
//! | `RUST_LOG` | `info` | Log filter (tracing-subscriber) |

pub mod config;
pub mod consumer;
pub mod env;
pub mod filter;
pub mod forward;
pub mod http_error;
pub mod interceptor;
pub mod message;
pub mod model;
pub mod path;
pub mod rest;
pub mod route_store;
pub mod server;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

pub use config::{InterceptorConfig, InterceptorKind, ProxyConfig};
pub use consumer::ConsumerInterceptor;
pub use filter::{FilterError, OsbFilter};
pub use forward::BrokerForwarder;
pub use http_error::HttpError;
pub use interceptor::{CredentialAdapter, NoOpInterceptor, ServiceBrokerInterceptor};
pub use message::{Handler, OsbRequest, OsbResponse};
pub use route_store::{MemoryRouteStore, RouteStore};
pub use server::{AppState, router, serve};
