//! Immutable per-service method tables.

mod builder;
mod config;
mod registry;

pub use builder::ServiceModeller;
pub use config::ModellerConfig;
pub use registry::ServiceRegistry;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::classify::{CallConvention, CallShape};
use crate::error::ModelWarning;
use crate::handler::MethodHandler;
use crate::interceptor::Interceptors;
use crate::marshal::Marshaller;
use crate::types::Class;

/// What a caller needs to know about one method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodInfo {
    pub name: String,
    pub shape: CallShape,
    pub request_type: Class,
    pub response_type: Class,
}

/// The published view of a service: its name and methods in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub methods: Vec<MethodInfo>,
}

impl ServiceInfo {
    /// Look a method up by name.
    pub fn method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|method| method.name == name)
    }
}

/// One adapted method of a [`ServiceDescriptor`].
pub struct MethodDescriptor {
    info: MethodInfo,
    convention: CallConvention,
    handler: Arc<dyn MethodHandler>,
    marshaller: Arc<dyn Marshaller>,
}

impl MethodDescriptor {
    /// The exposed method name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// The call shape the method was marked with.
    pub fn shape(&self) -> CallShape {
        self.info.shape
    }

    /// The signature convention the handler was adapted from.
    pub fn convention(&self) -> CallConvention {
        self.convention
    }

    /// Name, shape and resolved types.
    pub fn info(&self) -> &MethodInfo {
        &self.info
    }

    /// The handler, already wrapped by every interceptor.
    pub fn handler(&self) -> &Arc<dyn MethodHandler> {
        &self.handler
    }

    /// The marshaller for this method's payloads.
    pub fn marshaller(&self) -> &Arc<dyn Marshaller> {
        &self.marshaller
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("info", &self.info)
            .field("convention", &self.convention)
            .field("marshaller", &self.marshaller.name())
            .finish_non_exhaustive()
    }
}

/// A built service. Read-only; safe to share between calls.
pub struct ServiceDescriptor {
    name: String,
    class: Class,
    methods: Vec<MethodDescriptor>,
    index: HashMap<String, usize, ahash::RandomState>,
    marshaller: Arc<dyn Marshaller>,
    interceptors: Interceptors,
    warnings: Vec<ModelWarning>,
}

impl ServiceDescriptor {
    /// The published service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The class that carries the service marker.
    pub fn class(&self) -> &Class {
        &self.class
    }

    /// Methods in registration order.
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// Look a method up by its exposed name.
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.index.get(name).and_then(|&i| self.methods.get(i))
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// The service-level marshaller.
    pub fn marshaller(&self) -> &Arc<dyn Marshaller> {
        &self.marshaller
    }

    pub fn interceptors(&self) -> &Interceptors {
        &self.interceptors
    }

    /// Methods left out while building, and why.
    pub fn warnings(&self) -> &[ModelWarning] {
        &self.warnings
    }

    /// The caller-facing view of this service.
    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: self.name.clone(),
            methods: self.methods.iter().map(|m| m.info.clone()).collect(),
        }
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("marshaller", &self.marshaller.name())
            .field("interceptors", &self.interceptors)
            .field("warnings", &self.warnings)
            .finish()
    }
}
