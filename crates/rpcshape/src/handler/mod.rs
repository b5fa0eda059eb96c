//! Shape-uniform method handlers.
//!
//! Each calling convention has one strategy type. [`adapt`] picks the
//! strategy once, when the descriptor is built, and boxes it behind
//! [`MethodHandler`] together with the method body and its instance
//! supplier. Invocation never inspects the convention again.

mod bidi;
mod client_streaming;
mod server_streaming;
mod unary;

use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use tonic::Status;

use crate::classify::{CallConvention, CallShape};
use crate::error::panic_status;
use crate::model::{Arg, Args, Instance, MethodFn, Value};
use crate::payload::Payload;
use crate::sink::{Observer, Sink, SinkHandle};
use crate::types::Class;

/// The contract between the transport and an adapted method.
pub trait MethodHandler: Send + Sync {
    /// The exposed method name.
    fn method(&self) -> &str;

    fn shape(&self) -> CallShape;

    fn convention(&self) -> CallConvention;

    fn types(&self) -> &ResolvedTypes;

    fn request_type(&self) -> &Class {
        &self.types().request
    }

    fn response_type(&self) -> &Class {
        &self.types().response
    }

    /// Invoke a unary or server-streaming method with its single request.
    ///
    /// The method itself runs before this returns. The returned future
    /// drives whatever the method left pending (a returned future or
    /// stream) into `responses`; it is already complete for other
    /// conventions.
    fn invoke_unary(&self, request: Payload, responses: Sink) -> BoxFuture<'static, ()>;

    /// Start a client-streaming or bidi call, returning the sink the
    /// caller writes its requests to.
    fn invoke_stream_start(&self, responses: Sink) -> Sink;
}

/// Concrete request and response classes of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedTypes {
    pub request: Class,
    pub response: Class,
}

impl ResolvedTypes {
    pub fn new(request: Class, response: Class) -> Self {
        Self { request, response }
    }
}

impl Default for ResolvedTypes {
    fn default() -> Self {
        Self::new(Class::empty(), Class::empty())
    }
}

/// A method body bound to its instance supplier.
pub(crate) struct Target<S> {
    name: Arc<str>,
    body: MethodFn<S>,
    instance: Instance<S>,
}

impl<S> Target<S> {
    pub(crate) fn new(name: impl Into<Arc<str>>, body: MethodFn<S>, instance: Instance<S>) -> Self {
        Self {
            name: name.into(),
            body,
            instance,
        }
    }

    fn call(&self, args: Args) -> Result<Value, Status> {
        std::panic::catch_unwind(AssertUnwindSafe(|| (self.body)(self.instance.get(), args)))
            .unwrap_or_else(|panic| Err(panic_status(panic)))
    }

    /// Failure for a body whose value does not fit its convention.
    fn mismatch(&self, expected: &str, value: &Value) -> Status {
        tracing::warn!(
            method = %self.name,
            expected,
            got = value.kind(),
            "Method returned a value that does not match its signature"
        );
        Status::internal(format!(
            "method '{}' returned {}, expected {expected}",
            self.name,
            value.kind()
        ))
    }
}

/// One calling convention's way of driving a method.
pub(crate) trait Strategy: Send + Sync + 'static {
    const CONVENTION: CallConvention;

    fn unary<S>(target: &Target<S>, request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        let _ = request;
        responses.fail(Status::unimplemented(format!(
            "method '{}' is {} and does not take a single request",
            target.name,
            Self::CONVENTION.shape()
        )));
        ready()
    }

    fn stream_start<S>(target: &Target<S>, responses: Sink) -> Sink {
        responses.fail(Status::unimplemented(format!(
            "method '{}' is {} and does not take a request stream",
            target.name,
            Self::CONVENTION.shape()
        )));
        Sink::closed()
    }
}

pub(crate) struct Adapter<C, S> {
    target: Target<S>,
    types: ResolvedTypes,
    _strategy: PhantomData<fn() -> C>,
}

impl<C, S> MethodHandler for Adapter<C, S>
where
    C: Strategy,
    S: Send + Sync + 'static,
{
    fn method(&self) -> &str {
        &self.target.name
    }

    fn shape(&self) -> CallShape {
        C::CONVENTION.shape()
    }

    fn convention(&self) -> CallConvention {
        C::CONVENTION
    }

    fn types(&self) -> &ResolvedTypes {
        &self.types
    }

    fn invoke_unary(&self, request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        C::unary(&self.target, request, responses)
    }

    fn invoke_stream_start(&self, responses: Sink) -> Sink {
        C::stream_start(&self.target, responses)
    }
}

fn boxed<C, S>(target: Target<S>, types: ResolvedTypes) -> Arc<dyn MethodHandler>
where
    C: Strategy,
    S: Send + Sync + 'static,
{
    Arc::new(Adapter::<C, S> {
        target,
        types,
        _strategy: PhantomData,
    })
}

/// Build the handler for a classified method.
pub(crate) fn adapt<S>(
    convention: CallConvention,
    target: Target<S>,
    types: ResolvedTypes,
) -> Arc<dyn MethodHandler>
where
    S: Send + Sync + 'static,
{
    use CallConvention::*;
    match convention {
        RequestResponse => boxed::<unary::RequestResponse, S>(target, types),
        ResponseOnly => boxed::<unary::ResponseOnly, S>(target, types),
        RequestNoResponse => boxed::<unary::RequestNoResponse, S>(target, types),
        NoRequestNoResponse => boxed::<unary::NoRequestNoResponse, S>(target, types),
        FutureResponse => boxed::<unary::FutureResponse, S>(target, types),
        FutureResponseNoRequest => boxed::<unary::FutureResponseNoRequest, S>(target, types),
        RequestSink => boxed::<unary::RequestSink, S>(target, types),
        SinkOnly => boxed::<unary::SinkOnly, S>(target, types),
        RequestFuture => boxed::<unary::RequestFuture, S>(target, types),
        FutureOnly => boxed::<unary::FutureOnly, S>(target, types),
        ClientSink => boxed::<client_streaming::ClientSink, S>(target, types),
        ClientFuture => boxed::<client_streaming::ClientFuture, S>(target, types),
        ServerRequestSink => boxed::<server_streaming::ServerRequestSink, S>(target, types),
        ServerSinkOnly => boxed::<server_streaming::ServerSinkOnly, S>(target, types),
        ServerRequestStream => boxed::<server_streaming::ServerRequestStream, S>(target, types),
        ServerStream => boxed::<server_streaming::ServerStream, S>(target, types),
        Bidi => boxed::<bidi::Bidi, S>(target, types),
    }
}

fn ready() -> BoxFuture<'static, ()> {
    future::ready(()).boxed()
}

/// A `()` value is reported as the empty message.
fn normalize(value: Payload) -> Payload {
    if value.class().is_void() {
        Payload::empty()
    } else {
        value
    }
}

/// Complete `responses` from a future, catching panics while polling it.
async fn drive_future(future: BoxFuture<'static, Result<Payload, Status>>, responses: Sink) {
    let result = AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(panic_status(panic)));
    responses.resolve(result.map(normalize));
}

/// Emit every item of `stream` in order, then complete.
///
/// A failing item fails the sink; items emitted before it stand.
async fn drive_stream(mut stream: BoxStream<'static, Result<Payload, Status>>, mut responses: Sink) {
    loop {
        let next = AssertUnwindSafe(stream.next()).catch_unwind().await;
        match next {
            Ok(Some(Ok(value))) => responses.emit(value),
            Ok(Some(Err(status))) => return responses.fail(status),
            Ok(None) => return responses.complete(),
            Err(panic) => return responses.fail(panic_status(panic)),
        }
    }
}

/// Start a call whose method takes the response side as its only argument
/// and returns the request sink.
fn start_with<S>(target: &Target<S>, responses: Sink, into_arg: impl FnOnce(Sink) -> Arg) -> Sink {
    let handle = responses.handle();
    match target.call([into_arg(responses)].into_iter().collect()) {
        Ok(Value::Sink(requests)) => requests,
        Ok(other) => {
            handle.fail_if_open(target.mismatch("a request sink", &other));
            Sink::closed()
        }
        Err(status) => {
            handle.fail_if_open(status);
            Sink::closed()
        }
    }
}

/// Call a method that was handed its response side through `args`.
///
/// An error returned by the method fails the sink unless the method
/// already closed it.
fn call_with_sink<S>(target: &Target<S>, handle: SinkHandle, args: Args) {
    match target.call(args) {
        Ok(Value::Unit) => {}
        Ok(other) => handle.fail_if_open(target.mismatch("nothing", &other)),
        Err(status) => handle.fail_if_open(status),
    }
}

/// Wraps the response side of a single-response call.
///
/// Holds back the one value until `complete`, so downstream sees either
/// one emit followed by complete or a single failure.
struct SingleResponse {
    method: Arc<str>,
    downstream: Option<Sink>,
    value: Option<Payload>,
}

impl SingleResponse {
    fn guard(method: &Arc<str>, downstream: Sink) -> Sink {
        Sink::new(SingleResponse {
            method: Arc::clone(method),
            downstream: Some(downstream),
            value: None,
        })
    }
}

impl Observer for SingleResponse {
    fn emit(&mut self, value: Payload) {
        if self.downstream.is_none() {
            return;
        }
        if self.value.is_none() {
            self.value = Some(normalize(value));
            return;
        }
        tracing::warn!(method = %self.method, "Single-response method emitted more than one value");
        self.value = None;
        if let Some(downstream) = self.downstream.take() {
            downstream.fail(Status::internal(format!(
                "method '{}' emitted more than one response",
                self.method
            )));
        }
    }

    fn complete(&mut self) {
        let Some(downstream) = self.downstream.take() else {
            return;
        };
        match self.value.take() {
            Some(value) => downstream.resolve(Ok(value)),
            None => downstream.fail(Status::internal(format!(
                "method '{}' completed without a response",
                self.method
            ))),
        }
    }

    fn fail(&mut self, status: Status) {
        self.value = None;
        if let Some(downstream) = self.downstream.take() {
            downstream.fail(status);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::target;
    use super::*;
    use crate::sink::recording;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_response_buffers_until_complete() {
        let (downstream, recorder) = recording();
        let mut guard = SingleResponse::guard(&Arc::from("M"), downstream);
        guard.send(1u32);
        assert!(recorder.kinds().is_empty());
        guard.complete();

        assert_eq!(recorder.kinds(), vec!["emit", "complete"]);
    }

    #[test]
    fn test_single_response_rejects_second_value() {
        let (downstream, recorder) = recording();
        let mut guard = SingleResponse::guard(&Arc::from("M"), downstream);
        guard.send(1u32);
        guard.send(2u32);
        guard.complete();

        assert_eq!(recorder.kinds(), vec!["fail"]);
        assert!(recorder.failure().unwrap().message().contains("more than one"));
    }

    #[test]
    fn test_single_response_requires_a_value() {
        let (downstream, recorder) = recording();
        SingleResponse::guard(&Arc::from("M"), downstream).complete();

        assert_eq!(recorder.kinds(), vec!["fail"]);
    }

    #[test]
    fn test_adapt_reports_convention_and_shape() {
        let handler = adapt(
            CallConvention::ServerStream,
            target(|_| Ok(Value::iter(Vec::<u8>::new()))),
            ResolvedTypes::new(Class::empty(), Class::of::<u8>()),
        );
        assert_eq!(handler.method(), "Test");
        assert_eq!(handler.shape(), CallShape::ServerStreaming);
        assert_eq!(handler.convention(), CallConvention::ServerStream);
        assert_eq!(handler.response_type(), &Class::of::<u8>());
        assert_eq!(handler.request_type(), &Class::empty());
    }

    #[tokio::test]
    async fn test_wrong_entry_point_is_unimplemented() {
        let handler = adapt(
            CallConvention::Bidi,
            target(|mut args| args.sink().map(Value::sink)),
            ResolvedTypes::default(),
        );
        let (responses, recorder) = recording();
        handler.invoke_unary(Payload::empty(), responses).await;

        assert_eq!(recorder.failure().unwrap().code(), tonic::Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_panicking_body_fails_sink() {
        let handler = adapt(
            CallConvention::RequestResponse,
            target(|_| panic!("kaput")),
            ResolvedTypes::default(),
        );
        let (responses, recorder) = recording();
        handler.invoke_unary(Payload::empty(), responses).await;

        assert_eq!(recorder.kinds(), vec!["fail"]);
        assert_eq!(recorder.failure().unwrap().message(), "handler panicked: kaput");
    }
}
