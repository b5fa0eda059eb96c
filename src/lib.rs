pub mod greet;
pub mod proto;
pub mod strings;

use std::sync::Arc;

use rpcshape::marshal::{MarshallerRegistry, ProstMarshaller};
use rpcshape::{ModelError, ModellerConfig, ServiceDescriptor, ServiceModeller, ServiceRegistry, TypeRegistry};

use crate::proto::{GreetRequest, GreetResponse, SetGreetingRequest, SetGreetingResponse, StringMessage};

/// Protobuf codecs for every message the sample services exchange.
pub fn marshallers() -> MarshallerRegistry {
    let prost = ProstMarshaller::new()
        .with::<StringMessage>()
        .with::<GreetRequest>()
        .with::<GreetResponse>()
        .with::<SetGreetingRequest>()
        .with::<SetGreetingResponse>();
    MarshallerRegistry::new().with(prost)
}

/// A modeller that knows the sample services' type declarations.
pub fn modeller(config: ModellerConfig) -> ServiceModeller {
    let mut types = TypeRegistry::new();
    for decl in strings::types() {
        types.declare(decl);
    }
    ServiceModeller::new(config.with_marshallers(marshallers())).with_types(Arc::new(types))
}

/// Build both sample services.
pub fn build_services(modeller: &ServiceModeller) -> Result<Vec<ServiceDescriptor>, ModelError> {
    Ok(vec![
        modeller.build(&greet::model(greet::GreetService::default()))?,
        modeller.build(&strings::model())?,
    ])
}

/// Build and register both sample services.
pub fn register_services(registry: &ServiceRegistry, modeller: &ServiceModeller) -> Result<(), ModelError> {
    for descriptor in build_services(modeller)? {
        registry.register(descriptor)?;
    }
    Ok(())
}
