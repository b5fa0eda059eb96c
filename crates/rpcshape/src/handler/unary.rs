use futures::FutureExt;
use futures::future::BoxFuture;

use super::{SingleResponse, Strategy, Target, call_with_sink, drive_future, ready};
use crate::classify::CallConvention;
use crate::model::{Arg, Args, Value};
use crate::payload::Payload;
use crate::sink::{Promise, Sink};

fn request_args(request: Payload) -> Args {
    [Arg::Request(request)].into_iter().collect()
}

/// Deliver a directly returned value.
fn returned<S>(target: &Target<S>, args: Args, responses: Sink) -> BoxFuture<'static, ()> {
    let responses = SingleResponse::guard(&target.name, responses);
    match target.call(args) {
        Ok(Value::Payload(value)) => responses.resolve(Ok(value)),
        Ok(other) => responses.fail(target.mismatch("a payload", &other)),
        Err(status) => responses.fail(status),
    }
    ready()
}

/// Run a method that produces nothing, answering with the empty message.
fn nothing<S>(target: &Target<S>, args: Args, responses: Sink) -> BoxFuture<'static, ()> {
    let responses = SingleResponse::guard(&target.name, responses);
    match target.call(args) {
        Ok(Value::Unit) => responses.resolve(Ok(Payload::empty())),
        Ok(other) => responses.fail(target.mismatch("nothing", &other)),
        Err(status) => responses.fail(status),
    }
    ready()
}

/// Deliver the outcome of a returned future once it resolves.
fn deferred<S>(target: &Target<S>, args: Args, responses: Sink) -> BoxFuture<'static, ()> {
    let responses = SingleResponse::guard(&target.name, responses);
    match target.call(args) {
        Ok(Value::Future(future)) => drive_future(future, responses).boxed(),
        Ok(other) => {
            responses.fail(target.mismatch("a future", &other));
            ready()
        }
        Err(status) => {
            responses.fail(status);
            ready()
        }
    }
}

/// Hand the response side to the method as a sink or a promise.
fn handed<S>(
    target: &Target<S>,
    request: Option<Payload>,
    responses: Sink,
    into_arg: impl FnOnce(Sink) -> Arg,
) -> BoxFuture<'static, ()> {
    let responses = SingleResponse::guard(&target.name, responses);
    let handle = responses.handle();
    let mut args = Args::new();
    if let Some(request) = request {
        args.push(Arg::Request(request));
    }
    args.push(into_arg(responses));
    call_with_sink(target, handle, args);
    ready()
}

fn promise(sink: Sink) -> Arg {
    Arg::Promise(Promise::new(sink))
}

pub(crate) struct RequestResponse;

impl Strategy for RequestResponse {
    const CONVENTION: CallConvention = CallConvention::RequestResponse;

    fn unary<S>(target: &Target<S>, request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        returned(target, request_args(request), responses)
    }
}

pub(crate) struct ResponseOnly;

impl Strategy for ResponseOnly {
    const CONVENTION: CallConvention = CallConvention::ResponseOnly;

    fn unary<S>(target: &Target<S>, _request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        returned(target, Args::new(), responses)
    }
}

pub(crate) struct RequestNoResponse;

impl Strategy for RequestNoResponse {
    const CONVENTION: CallConvention = CallConvention::RequestNoResponse;

    fn unary<S>(target: &Target<S>, request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        nothing(target, request_args(request), responses)
    }
}

pub(crate) struct NoRequestNoResponse;

impl Strategy for NoRequestNoResponse {
    const CONVENTION: CallConvention = CallConvention::NoRequestNoResponse;

    fn unary<S>(target: &Target<S>, _request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        nothing(target, Args::new(), responses)
    }
}

pub(crate) struct FutureResponse;

impl Strategy for FutureResponse {
    const CONVENTION: CallConvention = CallConvention::FutureResponse;

    fn unary<S>(target: &Target<S>, request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        deferred(target, request_args(request), responses)
    }
}

pub(crate) struct FutureResponseNoRequest;

impl Strategy for FutureResponseNoRequest {
    const CONVENTION: CallConvention = CallConvention::FutureResponseNoRequest;

    fn unary<S>(target: &Target<S>, _request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        deferred(target, Args::new(), responses)
    }
}

pub(crate) struct RequestSink;

impl Strategy for RequestSink {
    const CONVENTION: CallConvention = CallConvention::RequestSink;

    fn unary<S>(target: &Target<S>, request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        handed(target, Some(request), responses, Arg::Sink)
    }
}

pub(crate) struct SinkOnly;

impl Strategy for SinkOnly {
    const CONVENTION: CallConvention = CallConvention::SinkOnly;

    fn unary<S>(target: &Target<S>, _request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        handed(target, None, responses, Arg::Sink)
    }
}

pub(crate) struct RequestFuture;

impl Strategy for RequestFuture {
    const CONVENTION: CallConvention = CallConvention::RequestFuture;

    fn unary<S>(target: &Target<S>, request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        handed(target, Some(request), responses, promise)
    }
}

pub(crate) struct FutureOnly;

impl Strategy for FutureOnly {
    const CONVENTION: CallConvention = CallConvention::FutureOnly;

    fn unary<S>(target: &Target<S>, _request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        handed(target, None, responses, promise)
    }
}
