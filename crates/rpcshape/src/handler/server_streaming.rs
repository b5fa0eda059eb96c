use futures::FutureExt;
use futures::future::BoxFuture;

use super::{Strategy, Target, call_with_sink, drive_stream, ready};
use crate::classify::CallConvention;
use crate::model::{Arg, Args, Value};
use crate::payload::Payload;
use crate::sink::Sink;

fn streamed<S>(target: &Target<S>, args: Args, responses: Sink) -> BoxFuture<'static, ()> {
    match target.call(args) {
        Ok(Value::Stream(stream)) => drive_stream(stream, responses).boxed(),
        Ok(other) => {
            responses.fail(target.mismatch("a stream", &other));
            ready()
        }
        Err(status) => {
            responses.fail(status);
            ready()
        }
    }
}

fn with_sink<S>(target: &Target<S>, request: Option<Payload>, responses: Sink) -> BoxFuture<'static, ()> {
    let handle = responses.handle();
    let args = request
        .map(Arg::Request)
        .into_iter()
        .chain([Arg::Sink(responses)])
        .collect();
    call_with_sink(target, handle, args);
    ready()
}

pub(crate) struct ServerRequestSink;

impl Strategy for ServerRequestSink {
    const CONVENTION: CallConvention = CallConvention::ServerRequestSink;

    fn unary<S>(target: &Target<S>, request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        with_sink(target, Some(request), responses)
    }
}

pub(crate) struct ServerSinkOnly;

impl Strategy for ServerSinkOnly {
    const CONVENTION: CallConvention = CallConvention::ServerSinkOnly;

    fn unary<S>(target: &Target<S>, _request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        with_sink(target, None, responses)
    }
}

pub(crate) struct ServerRequestStream;

impl Strategy for ServerRequestStream {
    const CONVENTION: CallConvention = CallConvention::ServerRequestStream;

    fn unary<S>(target: &Target<S>, request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        streamed(target, [Arg::Request(request)].into_iter().collect(), responses)
    }
}

pub(crate) struct ServerStream;

impl Strategy for ServerStream {
    const CONVENTION: CallConvention = CallConvention::ServerStream;

    fn unary<S>(target: &Target<S>, _request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        streamed(target, Args::new(), responses)
    }
}
