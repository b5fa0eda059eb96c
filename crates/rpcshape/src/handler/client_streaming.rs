use super::{SingleResponse, Strategy, Target, start_with};
use crate::classify::CallConvention;
use crate::model::Arg;
use crate::sink::{Promise, Sink};

pub(crate) struct ClientSink;

impl Strategy for ClientSink {
    const CONVENTION: CallConvention = CallConvention::ClientSink;

    fn stream_start<S>(target: &Target<S>, responses: Sink) -> Sink {
        let responses = SingleResponse::guard(&target.name, responses);
        start_with(target, responses, Arg::Sink)
    }
}

pub(crate) struct ClientFuture;

impl Strategy for ClientFuture {
    const CONVENTION: CallConvention = CallConvention::ClientFuture;

    fn stream_start<S>(target: &Target<S>, responses: Sink) -> Sink {
        let responses = SingleResponse::guard(&target.name, responses);
        start_with(target, responses, |sink| Arg::Promise(Promise::new(sink)))
    }
}
