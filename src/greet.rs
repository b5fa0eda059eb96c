//! A greeting service whose greeting can be changed at runtime.

use std::sync::{Arc, RwLock};

use rpcshape::{
    AnnotatedMethod, Annotation, Class, Instance, ServiceAnnotation, ServiceModel, Signature, Type,
    Value,
};
use tracing::info;

use crate::proto::{GreetRequest, GreetResponse, SetGreetingRequest, SetGreetingResponse};

pub const SERVICE_NAME: &str = "GreetService";

#[derive(Debug)]
pub struct GreetService {
    greeting: RwLock<String>,
}

impl GreetService {
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            greeting: RwLock::new(greeting.into()),
        }
    }

    pub fn greet(&self, request: GreetRequest) -> GreetResponse {
        let name = request.name.as_deref().unwrap_or("World");
        let greeting = self.greeting.read().unwrap_or_else(|err| err.into_inner());
        GreetResponse {
            message: format!("{greeting} {name}!"),
        }
    }

    pub fn set_greeting(&self, request: SetGreetingRequest) -> SetGreetingResponse {
        let mut greeting = self.greeting.write().unwrap_or_else(|err| err.into_inner());
        info!(from = %greeting, to = %request.greeting, "Changing greeting");
        *greeting = request.greeting;
        SetGreetingResponse {
            greeting: greeting.clone(),
        }
    }
}

impl Default for GreetService {
    fn default() -> Self {
        Self::new("Hello")
    }
}

/// The registration table for one shared [`GreetService`].
pub fn model(service: GreetService) -> ServiceModel<GreetService> {
    ServiceModel::new(Class::of::<GreetService>(), Instance::singleton(service))
        .service(ServiceAnnotation::named(SERVICE_NAME))
        .method(
            AnnotatedMethod::new(
                "greet",
                Signature::new()
                    .param(Type::of::<GreetRequest>())
                    .returns(Type::of::<GreetResponse>()),
                |service: Arc<GreetService>, mut args| {
                    Ok(Value::payload(service.greet(args.request()?)))
                },
            )
            .annotate(Annotation::unary().named("Greet")),
        )
        .method(
            AnnotatedMethod::new(
                "set_greeting",
                Signature::new()
                    .param(Type::of::<SetGreetingRequest>())
                    .returns(Type::of::<SetGreetingResponse>()),
                |service: Arc<GreetService>, mut args| {
                    Ok(Value::payload(service.set_greeting(args.request()?)))
                },
            )
            .annotate(Annotation::unary().named("SetGreeting")),
        )
}
