//! String conversions in every RPC shape.
//!
//! The service marker sits on the [`STRING_SERVICE`] interface, so the
//! service is published under the interface's name rather than the
//! implementation's.

use std::sync::Arc;

use rpcshape::sink::SinkEvent;
use rpcshape::{
    AnnotatedMethod, Annotation, Args, Class, Instance, ServiceAnnotation, ServiceModel, Signature, Sink,
    Type, TypeDecl, Value,
};
use tonic::Status;

use crate::proto::StringMessage;

/// The interface the implementation publishes itself through.
pub const STRING_SERVICE: &str = "rpcshape_services::strings::StringService";

#[derive(Debug, Default)]
pub struct StringServiceImpl;

impl StringServiceImpl {
    pub fn upper(&self, request: StringMessage, mut responses: Sink) {
        responses.send(StringMessage::new(request.text.to_uppercase()));
        responses.complete();
    }

    pub fn lower(&self, request: StringMessage) -> StringMessage {
        StringMessage::new(request.text.to_lowercase())
    }

    pub fn split(&self, request: StringMessage) -> Vec<StringMessage> {
        request.text.split_whitespace().map(StringMessage::new).collect()
    }

    /// Collect every request and answer with them joined by spaces.
    pub fn join(&self, responses: Sink) -> Sink {
        let mut responses = Some(responses);
        let mut parts = Vec::new();
        Sink::from_fn(move |event| match event {
            SinkEvent::Emit(value) => match value.take::<StringMessage>() {
                Ok(part) => parts.push(part.text),
                Err(status) => {
                    if let Some(responses) = responses.take() {
                        responses.fail(status);
                    }
                }
            },
            SinkEvent::Complete => {
                if let Some(mut responses) = responses.take() {
                    responses.send(StringMessage::new(parts.join(" ")));
                    responses.complete();
                }
            }
            SinkEvent::Fail(status) => {
                if let Some(responses) = responses.take() {
                    responses.fail(status);
                }
            }
        })
    }

    /// Every request is sent straight back.
    pub fn echo(&self, responses: Sink) -> Sink {
        responses
    }
}

/// The declarations that carry the service marker to the implementation.
pub fn types() -> Vec<TypeDecl> {
    let interface = Class::named(STRING_SERVICE);
    vec![
        TypeDecl::new(interface.clone()).service(ServiceAnnotation::default()),
        TypeDecl::new(Class::of::<StringServiceImpl>()).implements(interface),
    ]
}

fn message() -> Type {
    Type::of::<StringMessage>()
}

/// A body handing the response sink to `f` and returning its request sink.
fn sink_body<F>(f: F) -> impl Fn(Arc<StringServiceImpl>, Args) -> Result<Value, Status> + Send + Sync + 'static
where
    F: Fn(&StringServiceImpl, Sink) -> Sink + Send + Sync + 'static,
{
    move |service: Arc<StringServiceImpl>, mut args: Args| Ok(Value::sink(f(&service, args.sink()?)))
}

pub fn model() -> ServiceModel<StringServiceImpl> {
    ServiceModel::new(
        Class::of::<StringServiceImpl>(),
        Instance::singleton(StringServiceImpl),
    )
    .method(
        AnnotatedMethod::new(
            "upper",
            Signature::new().param(message()).param(Type::sink_of(message())),
            |service: Arc<StringServiceImpl>, mut args| {
                let request = args.request()?;
                service.upper(request, args.sink()?);
                Ok(Value::Unit)
            },
        )
        .annotate(Annotation::unary().named("Upper")),
    )
    .method(
        AnnotatedMethod::new(
            "lower",
            Signature::new().param(message()).returns(message()),
            |service: Arc<StringServiceImpl>, mut args| Ok(Value::payload(service.lower(args.request()?))),
        )
        .annotate(Annotation::unary().named("Lower")),
    )
    .method(
        AnnotatedMethod::new(
            "split",
            Signature::new().param(message()).returns(Type::stream_of(message())),
            |service: Arc<StringServiceImpl>, mut args| Ok(Value::iter(service.split(args.request()?))),
        )
        .annotate(Annotation::server_streaming().named("Split")),
    )
    .method(
        AnnotatedMethod::new(
            "join",
            Signature::new()
                .param(Type::sink_of(message()))
                .returns(Type::sink_of(message())),
            sink_body(StringServiceImpl::join),
        )
        .annotate(Annotation::client_streaming().named("Join")),
    )
    .method(
        AnnotatedMethod::new(
            "echo",
            Signature::new()
                .param(Type::sink_of(message()))
                .returns(Type::sink_of(message())),
            sink_body(StringServiceImpl::echo),
        )
        .annotate(Annotation::bidi_streaming().named("Echo")),
    )
}
