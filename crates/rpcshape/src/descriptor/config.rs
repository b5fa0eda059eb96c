use crate::marshal::MarshallerRegistry;

/// Configuration for the service modeller.
#[derive(Debug, Clone, Default)]
pub struct ModellerConfig {
    /// Reject methods whose request or response type only resolves to
    /// its erased class. Off by default: such methods register with the
    /// erased type.
    pub strict_types: bool,

    /// Marshallers services and methods may select by name.
    pub marshallers: MarshallerRegistry,
}

impl ModellerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether unresolved generic types fail registration.
    pub fn with_strict_types(mut self, strict: bool) -> Self {
        self.strict_types = strict;
        self
    }

    /// Set the marshallers available to services.
    pub fn with_marshallers(mut self, marshallers: MarshallerRegistry) -> Self {
        self.marshallers = marshallers;
        self
    }
}
