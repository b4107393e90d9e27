//! [`RouteStore`]: where the consumer interceptor keeps the mesh routes it
//! creates per binding.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::model::EndpointMapping;

/// Backends must be `Send + Sync`; one store is shared by all requests.
pub trait RouteStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Record the routes of `binding_id`, replacing any earlier ones.
    fn register(
        &self,
        binding_id: &str,
        routes: &[EndpointMapping],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Drop every route of `binding_id`. Unknown bindings are not an error.
    fn release(&self, binding_id: &str) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

#[derive(Debug)]
pub struct MemoryRouteStoreError(String);

impl fmt::Display for MemoryRouteStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryRouteStore error: {}", self.0)
    }
}

impl std::error::Error for MemoryRouteStoreError {}

/// In-process route registry backed by `Arc<Mutex<HashMap>>`.
///
/// Routes live as long as the process; nothing is pushed to a mesh control
/// plane.
#[derive(Clone, Default)]
pub struct MemoryRouteStore {
    inner: Arc<Mutex<HashMap<String, Vec<EndpointMapping>>>>,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self, binding_id: &str) -> Option<Vec<EndpointMapping>> {
        self.inner.lock().unwrap().get(binding_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

impl RouteStore for MemoryRouteStore {
    type Error = MemoryRouteStoreError;

    async fn register(
        &self,
        binding_id: &str,
        routes: &[EndpointMapping],
    ) -> Result<(), Self::Error> {
        if binding_id.is_empty() {
            return Err(MemoryRouteStoreError("binding id must not be empty".to_string()));
        }
        self.inner
            .lock()
            .unwrap()
            .insert(binding_id.to_string(), routes.to_vec());
        Ok(())
    }

    async fn release(&self, binding_id: &str) -> Result<(), Self::Error> {
        self.inner.lock().unwrap().remove(binding_id);
        Ok(())
    }
}
