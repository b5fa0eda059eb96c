use std::collections::HashMap;
use std::sync::Arc;

use crate::model::ServiceAnnotation;
use crate::types::{Class, Type};

/// The declared shape of a class: its type parameters and supertypes.
#[derive(Debug, Clone)]
pub struct TypeDecl {
    class: Class,
    params: Vec<Arc<str>>,
    superclass: Option<Type>,
    interfaces: Vec<Type>,
    service: Option<ServiceAnnotation>,
}

impl TypeDecl {
    pub fn new(class: Class) -> Self {
        Self {
            class,
            params: Vec::new(),
            superclass: None,
            interfaces: Vec::new(),
            service: None,
        }
    }

    /// Declare the next type parameter.
    pub fn param(mut self, name: impl Into<Arc<str>>) -> Self {
        self.params.push(name.into());
        self
    }

    /// Set the superclass, usually a [`Type::Generic`] supplying arguments.
    pub fn extends(mut self, superclass: impl Into<Type>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<Type>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Mark this class as an RPC service.
    pub fn service(mut self, annotation: ServiceAnnotation) -> Self {
        self.service = Some(annotation);
        self
    }

    pub fn class(&self) -> &Class {
        &self.class
    }

    pub fn params(&self) -> &[Arc<str>] {
        &self.params
    }

    pub fn superclass(&self) -> Option<&Type> {
        self.superclass.as_ref()
    }

    pub fn interfaces(&self) -> &[Type] {
        &self.interfaces
    }

    pub fn service_annotation(&self) -> Option<&ServiceAnnotation> {
        self.service.as_ref()
    }
}

/// Declarations for every class that takes part in generic resolution.
///
/// Built once at startup and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    decls: HashMap<Class, TypeDecl, ahash::RandomState>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration, replacing any earlier one for the same class.
    pub fn declare(&mut self, decl: TypeDecl) -> &mut Self {
        self.decls.insert(decl.class.clone(), decl);
        self
    }

    pub fn with(mut self, decl: TypeDecl) -> Self {
        self.declare(decl);
        self
    }

    pub fn get(&self, class: &Class) -> Option<&TypeDecl> {
        self.decls.get(class)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Find the class in `class`'s hierarchy that carries the service marker.
    ///
    /// The superclass chain is searched first; the first interface found
    /// with the marker along the way is used only if no class has it. Falls
    /// back to `class` itself.
    pub fn annotated_service_class(&self, class: &Class) -> (Class, Option<&ServiceAnnotation>) {
        let mut found_interface = None;
        let mut current = Some(class.clone());
        let mut depth = 0;

        while let Some(cls) = current.take() {
            let Some(decl) = self.get(&cls) else {
                break;
            };
            if let Some(annotation) = decl.service_annotation() {
                return (cls, Some(annotation));
            }
            if found_interface.is_none() {
                found_interface = decl
                    .interfaces()
                    .iter()
                    .map(Type::raw)
                    .find_map(|raw| {
                        self.get(&raw)
                            .and_then(TypeDecl::service_annotation)
                            .map(|annotation| (raw, annotation))
                    });
            }
            depth += 1;
            if depth > super::resolve::MAX_DEPTH {
                break;
            }
            current = decl.superclass().map(Type::raw);
        }

        match found_interface {
            Some((raw, annotation)) => (raw, Some(annotation)),
            None => (class.clone(), None),
        }
    }
}
