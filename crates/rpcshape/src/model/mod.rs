//! Explicit registration table for a service.
//!
//! A [`ServiceModel`] lists the methods of one service implementation
//! together with their markers, declared signatures and closures. The
//! [`ServiceModeller`](crate::descriptor::ServiceModeller) validates and
//! adapts it into a [`ServiceDescriptor`](crate::descriptor::ServiceDescriptor).

mod annotation;
mod method;

pub use annotation::{Annotation, AnnotationSet, Placement, RpcMarker, ServiceAnnotation};
pub use method::{AnnotatedMethod, Arg, Args, Instance, MethodFn, Signature, Value, Visibility};

use crate::interceptor::{Interceptor, Interceptors};
use crate::types::Class;

/// One service implementation and the methods it exposes.
pub struct ServiceModel<S> {
    class: Class,
    service: Option<ServiceAnnotation>,
    instance: Instance<S>,
    methods: Vec<AnnotatedMethod<S>>,
    interceptors: Interceptors,
}

impl<S> ServiceModel<S> {
    /// An empty model for `class`, served by `instance`.
    pub fn new(class: Class, instance: Instance<S>) -> Self {
        Self {
            class,
            service: None,
            instance,
            methods: Vec::new(),
            interceptors: Interceptors::new(),
        }
    }

    /// Put the service marker on the class itself.
    pub fn service(mut self, annotation: ServiceAnnotation) -> Self {
        self.service = Some(annotation);
        self
    }

    /// Add a method. Order is kept in the built descriptor.
    pub fn method(mut self, method: AnnotatedMethod<S>) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a service-level interceptor; lower priorities run first.
    pub fn intercept(mut self, priority: i32, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.add(priority, interceptor);
        self
    }

    /// The implementation class.
    pub fn class(&self) -> &Class {
        &self.class
    }

    /// The marker set by [`ServiceModel::service`], if any.
    pub fn service_annotation(&self) -> Option<&ServiceAnnotation> {
        self.service.as_ref()
    }

    /// How instances are obtained for each call.
    pub fn instance(&self) -> &Instance<S> {
        &self.instance
    }

    /// Every candidate method, marked or not.
    pub fn methods(&self) -> &[AnnotatedMethod<S>] {
        &self.methods
    }

    /// Service-level interceptors.
    pub fn interceptors(&self) -> &Interceptors {
        &self.interceptors
    }
}

impl<S> std::fmt::Debug for ServiceModel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceModel")
            .field("class", &self.class)
            .field("service", &self.service)
            .field("instance", &self.instance)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}
