//! Interceptor for the consumer side of the mesh.
//!
//! On bind it asks the broker for the configured network profile, maps every
//! broker endpoint to a mesh-local service, records those routes, and lets
//! the broker rewrite the credentials for the mesh addresses. On unbind the
//! routes are released. Catalog service names lose the configured prefix.

use tracing::{info, warn};

use crate::config::InterceptorConfig;
use crate::interceptor::{CredentialAdapter, InterceptorError, ServiceBrokerInterceptor};
use crate::model::{
    BindRequest, BindResponse, Catalog, DataResponse, Endpoint, EndpointMapping,
    NetworkDataResponse,
};
use crate::route_store::RouteStore;

pub struct ConsumerInterceptor<S> {
    config: InterceptorConfig,
    routes: S,
}

impl<S: RouteStore> ConsumerInterceptor<S> {
    pub fn new(config: InterceptorConfig, routes: S) -> Self {
        Self { config, routes }
    }

    fn mesh_endpoint(&self, index: usize, binding_id: &str) -> Endpoint {
        Endpoint::new(
            format!("svc-{index}-{binding_id}.{}", self.config.service_domain),
            self.config.service_port,
        )
    }

    fn endpoint_mappings(
        &self,
        response: &BindResponse,
        binding_id: &str,
    ) -> Vec<EndpointMapping> {
        response
            .endpoints
            .iter()
            .enumerate()
            .map(|(index, endpoint)| EndpointMapping {
                source: endpoint.clone(),
                target: self.mesh_endpoint(index, binding_id),
            })
            .collect()
    }
}

impl<S: RouteStore> ServiceBrokerInterceptor for ConsumerInterceptor<S> {
    fn pre_bind(&self, mut request: BindRequest) -> BindRequest {
        if !self.config.network_profile.is_empty() {
            request.network_data.network_profile_id = self.config.network_profile.clone();
        }
        if !self.config.consumer_id.is_empty() {
            request.network_data.data.consumer_id = self.config.consumer_id.clone();
        }
        request
    }

    async fn post_bind<A: CredentialAdapter>(
        &self,
        _request: &BindRequest,
        response: BindResponse,
        binding_id: &str,
        adapt: A,
    ) -> Result<BindResponse, InterceptorError> {
        let provider_endpoints = response.network_data.data.endpoints.len();
        if provider_endpoints > 0 && provider_endpoints != response.endpoints.len() {
            return Err(InterceptorError::Failed(format!(
                "Number of endpoints in network_data ({}) doesn't match number of endpoints ({})",
                provider_endpoints,
                response.endpoints.len()
            )));
        }

        let mappings = self.endpoint_mappings(&response, binding_id);
        self.routes
            .register(binding_id, &mappings)
            .await
            .map_err(|e| InterceptorError::RouteStore(Box::new(e)))?;
        info!(binding_id, routes = mappings.len(), "Registered mesh routes");

        let BindResponse {
            credentials,
            network_data: provider_network,
            mut additional_properties,
            ..
        } = response;
        let targets: Vec<Endpoint> = mappings.iter().map(|m| m.target.clone()).collect();
        let adapted = match adapt.adapt(credentials, mappings).await {
            Ok(adapted) => adapted,
            Err(e) => {
                if let Err(release_err) = self.routes.release(binding_id).await {
                    warn!(
                        binding_id,
                        error = %release_err,
                        "Failed to release routes after adapt failure"
                    );
                }
                return Err(e.into());
            }
        };

        // Broker fields outside the model survive; the adaptation wins on overlap.
        additional_properties.extend(adapted.additional_properties);
        let network_data = if !adapted.network_data.is_empty() {
            adapted.network_data
        } else if !self.config.network_profile.is_empty() {
            NetworkDataResponse {
                network_profile_id: self.config.network_profile.clone(),
                data: DataResponse {
                    provider_id: provider_network.data.provider_id,
                    endpoints: targets,
                },
            }
        } else {
            NetworkDataResponse::default()
        };

        Ok(BindResponse {
            credentials: adapted.credentials,
            endpoints: adapted.endpoints,
            network_data,
            additional_properties,
        })
    }

    async fn post_delete(&self, binding_id: &str) -> Result<(), InterceptorError> {
        self.routes
            .release(binding_id)
            .await
            .map_err(|e| InterceptorError::RouteStore(Box::new(e)))?;
        info!(binding_id, "Released mesh routes");
        Ok(())
    }

    fn post_catalog(&self, catalog: &mut Catalog) {
        let prefix = self.config.service_name_prefix.as_str();
        for service in &mut catalog.services {
            if let Some(stripped) = service.name.strip_prefix(prefix) {
                service.name = stripped.to_string();
            }
        }
    }
}
