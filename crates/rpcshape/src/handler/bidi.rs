use super::{Strategy, Target, start_with};
use crate::classify::CallConvention;
use crate::model::Arg;
use crate::sink::Sink;

pub(crate) struct Bidi;

impl Strategy for Bidi {
    const CONVENTION: CallConvention = CallConvention::Bidi;

    fn stream_start<S>(target: &Target<S>, responses: Sink) -> Sink {
        start_with(target, responses, Arg::Sink)
    }
}
