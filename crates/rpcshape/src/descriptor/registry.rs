use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use crate::descriptor::ServiceDescriptor;
use crate::error::ModelError;

/// Built services by name.
///
/// Shared between the components that dispatch calls; registration and
/// lookup may happen from any thread.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: DashMap<String, Arc<ServiceDescriptor>, ahash::RandomState>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service. Fails if another service already uses its name.
    pub fn register(&self, descriptor: ServiceDescriptor) -> Result<Arc<ServiceDescriptor>, ModelError> {
        match self.services.entry(descriptor.name().to_string()) {
            Entry::Occupied(entry) => Err(ModelError::DuplicateService(entry.key().clone())),
            Entry::Vacant(entry) => {
                let descriptor = Arc::new(descriptor);
                info!(
                    service = %descriptor.name(),
                    methods = descriptor.len(),
                    "Registered service"
                );
                entry.insert(Arc::clone(&descriptor));
                Ok(descriptor)
            }
        }
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<ServiceDescriptor>> {
        let removed = self.services.remove(name).map(|(_, descriptor)| descriptor);
        if removed.is_some() {
            debug!(service = %name, "Unregistered service");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServiceDescriptor>> {
        self.services.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Look up a `{service}/{method}` path.
    ///
    /// A leading `/` is ignored. Service names may contain dots but not
    /// slashes, so the path splits at its last `/`.
    pub fn route<'p>(&self, path: &'p str) -> Option<(Arc<ServiceDescriptor>, &'p str)> {
        let path = path.strip_prefix('/').unwrap_or(path);
        let (service, method) = path.rsplit_once('/')?;
        let descriptor = self.get(service)?;
        descriptor.method(method)?;
        Some((descriptor, method))
    }

    /// Registered service names, sorted.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|entry| entry.key().clone()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
