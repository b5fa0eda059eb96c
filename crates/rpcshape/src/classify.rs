//! Structural classification of method signatures.
//!
//! Every RPC shape accepts a fixed set of calling conventions. A signature
//! either matches exactly one of them or is rejected; there is no partial
//! matching.

use std::fmt;

use thiserror::Error;

use crate::model::Signature;
use crate::types::{Class, ClassKind};

/// How many messages flow in each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallShape {
    Unary,
    ClientStreaming,
    ServerStreaming,
    BidiStreaming,
}

impl CallShape {
    pub const ALL: [CallShape; 4] = [
        CallShape::Unary,
        CallShape::ClientStreaming,
        CallShape::ServerStreaming,
        CallShape::BidiStreaming,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallShape::Unary => "unary",
            CallShape::ClientStreaming => "client-streaming",
            CallShape::ServerStreaming => "server-streaming",
            CallShape::BidiStreaming => "bidi-streaming",
        }
    }

    /// Whether the caller sends a stream of requests.
    pub fn streams_requests(&self) -> bool {
        matches!(self, CallShape::ClientStreaming | CallShape::BidiStreaming)
    }

    pub fn streams_responses(&self) -> bool {
        matches!(self, CallShape::ServerStreaming | CallShape::BidiStreaming)
    }

    pub fn conventions(&self) -> &'static [CallConvention] {
        use CallConvention::*;
        match self {
            CallShape::Unary => &[
                RequestResponse,
                ResponseOnly,
                RequestNoResponse,
                NoRequestNoResponse,
                FutureResponse,
                FutureResponseNoRequest,
                RequestSink,
                SinkOnly,
                RequestFuture,
                FutureOnly,
            ],
            CallShape::ClientStreaming => &[ClientSink, ClientFuture],
            CallShape::ServerStreaming => &[
                ServerRequestSink,
                ServerSinkOnly,
                ServerRequestStream,
                ServerStream,
            ],
            CallShape::BidiStreaming => &[Bidi],
        }
    }
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One supported method signature within a [`CallShape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallConvention {
    /// `(request) -> response`
    RequestResponse,
    /// `() -> response`
    ResponseOnly,
    /// `(request) -> ()`
    RequestNoResponse,
    /// `() -> ()`
    NoRequestNoResponse,
    /// `(request) -> Future<response>`
    FutureResponse,
    /// `() -> Future<response>`
    FutureResponseNoRequest,
    /// `(request, Sink<response>) -> ()`
    RequestSink,
    /// `(Sink<response>) -> ()`
    SinkOnly,
    /// `(request, Future<response>) -> ()`
    RequestFuture,
    /// `(Future<response>) -> ()`
    FutureOnly,
    /// `(Sink<response>) -> Sink<request>`
    ClientSink,
    /// `(Future<response>) -> Sink<request>`
    ClientFuture,
    /// `(request, Sink<response>) -> ()`
    ServerRequestSink,
    /// `(Sink<response>) -> ()`
    ServerSinkOnly,
    /// `(request) -> Stream<response>`
    ServerRequestStream,
    /// `() -> Stream<response>`
    ServerStream,
    /// `(Sink<response>) -> Sink<request>`
    Bidi,
}

/// Where in a signature a payload type is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSlot {
    /// The parameter's own type.
    Param(usize),
    /// The element type of a sink or future parameter.
    ParamArg(usize),
    Return,
    /// The element type of a returned future, stream or sink.
    ReturnArg,
}

impl CallConvention {
    pub fn shape(&self) -> CallShape {
        use CallConvention::*;
        match self {
            RequestResponse | ResponseOnly | RequestNoResponse | NoRequestNoResponse
            | FutureResponse | FutureResponseNoRequest | RequestSink | SinkOnly
            | RequestFuture | FutureOnly => CallShape::Unary,
            ClientSink | ClientFuture => CallShape::ClientStreaming,
            ServerRequestSink | ServerSinkOnly | ServerRequestStream | ServerStream => {
                CallShape::ServerStreaming
            }
            Bidi => CallShape::BidiStreaming,
        }
    }

    pub fn name(&self) -> &'static str {
        use CallConvention::*;
        match self {
            RequestResponse => "request-returns-response",
            ResponseOnly => "no-request-returns-response",
            RequestNoResponse => "request-no-response",
            NoRequestNoResponse => "no-request-no-response",
            FutureResponse => "request-returns-future",
            FutureResponseNoRequest => "no-request-returns-future",
            RequestSink | ServerRequestSink => "request+sink",
            SinkOnly | ServerSinkOnly => "sink-only",
            RequestFuture => "request+future",
            FutureOnly => "future-only",
            ClientSink | Bidi => "sink-returns-sink",
            ClientFuture => "future-returns-sink",
            ServerRequestStream => "request-returns-stream",
            ServerStream => "no-request-returns-stream",
        }
    }

    pub fn pattern(&self) -> &'static str {
        use CallConvention::*;
        match self {
            RequestResponse => "(request) -> response",
            ResponseOnly => "() -> response",
            RequestNoResponse => "(request) -> ()",
            NoRequestNoResponse => "() -> ()",
            FutureResponse => "(request) -> Future<response>",
            FutureResponseNoRequest => "() -> Future<response>",
            RequestSink | ServerRequestSink => "(request, Sink<response>) -> ()",
            SinkOnly | ServerSinkOnly => "(Sink<response>) -> ()",
            RequestFuture => "(request, Future<response>) -> ()",
            FutureOnly => "(Future<response>) -> ()",
            ClientSink | Bidi => "(Sink<response>) -> Sink<request>",
            ClientFuture => "(Future<response>) -> Sink<request>",
            ServerRequestStream => "(request) -> Stream<response>",
            ServerStream => "() -> Stream<response>",
        }
    }

    /// Where the request type is declared, `None` when there is no request.
    pub fn request_slot(&self) -> Option<TypeSlot> {
        use CallConvention::*;
        match self {
            RequestResponse | RequestNoResponse | FutureResponse | RequestSink | RequestFuture
            | ServerRequestSink | ServerRequestStream => Some(TypeSlot::Param(0)),
            ClientSink | ClientFuture | Bidi => Some(TypeSlot::ReturnArg),
            ResponseOnly | NoRequestNoResponse | FutureResponseNoRequest | SinkOnly
            | FutureOnly | ServerSinkOnly | ServerStream => None,
        }
    }

    /// Where the response type is declared, `None` when nothing is returned.
    pub fn response_slot(&self) -> Option<TypeSlot> {
        use CallConvention::*;
        match self {
            RequestResponse | ResponseOnly => Some(TypeSlot::Return),
            FutureResponse | FutureResponseNoRequest | ServerRequestStream | ServerStream => {
                Some(TypeSlot::ReturnArg)
            }
            RequestSink | RequestFuture | ServerRequestSink => Some(TypeSlot::ParamArg(1)),
            SinkOnly | FutureOnly | ServerSinkOnly | ClientSink | ClientFuture | Bidi => {
                Some(TypeSlot::ParamArg(0))
            }
            RequestNoResponse | NoRequestNoResponse => None,
        }
    }
}

impl fmt::Display for CallConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A signature that matches no convention of its shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}; {shape} methods must look like one of: {}", patterns(.shape))]
pub struct Unclassified {
    pub shape: CallShape,
    pub reason: String,
}

fn patterns(shape: &CallShape) -> String {
    let patterns: Vec<&str> = shape.conventions().iter().map(CallConvention::pattern).collect();
    patterns.join(", ")
}

/// A parameter or return type reduced to what classification looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Payload,
    Void,
    Sink,
    Future,
    Stream,
}

impl Kind {
    fn of(class: &Class) -> Self {
        match class.kind() {
            ClassKind::Void => Kind::Void,
            ClassKind::Sink => Kind::Sink,
            ClassKind::Future => Kind::Future,
            ClassKind::Stream => Kind::Stream,
            ClassKind::Payload | ClassKind::Any | ClassKind::Array | ClassKind::Declared => {
                Kind::Payload
            }
        }
    }
}

/// Determine the calling convention of `signature` under `shape`.
pub fn classify(shape: CallShape, signature: &Signature) -> Result<CallConvention, Unclassified> {
    use CallConvention::*;
    use Kind::*;

    let params: Vec<Kind> = signature.param_classes().map(|c| Kind::of(&c)).collect();
    let returns = Kind::of(&signature.return_class());
    let unclassified = |reason: String| Unclassified { shape, reason };

    if params.len() > 2 {
        return Err(unclassified(format!(
            "{} parameters is more than any convention takes",
            params.len()
        )));
    }

    let convention = match (shape, params.as_slice(), returns) {
        // A trailing sink or future means the response goes through it.
        (CallShape::Unary, [Payload, Sink], Void) => Some(RequestSink),
        (CallShape::Unary, [Payload, Future], Void) => Some(RequestFuture),
        (CallShape::Unary, [Sink], Void) => Some(SinkOnly),
        (CallShape::Unary, [Future], Void) => Some(FutureOnly),
        (CallShape::Unary, [Payload], Payload) => Some(RequestResponse),
        (CallShape::Unary, [Payload], Void) => Some(RequestNoResponse),
        (CallShape::Unary, [Payload], Future) => Some(FutureResponse),
        (CallShape::Unary, [], Payload) => Some(ResponseOnly),
        (CallShape::Unary, [], Void) => Some(NoRequestNoResponse),
        (CallShape::Unary, [], Future) => Some(FutureResponseNoRequest),

        (CallShape::ClientStreaming, [Sink], Sink) => Some(ClientSink),
        (CallShape::ClientStreaming, [Future], Sink) => Some(ClientFuture),

        (CallShape::ServerStreaming, [Payload, Sink], Void) => Some(ServerRequestSink),
        (CallShape::ServerStreaming, [Sink], Void) => Some(ServerSinkOnly),
        (CallShape::ServerStreaming, [Payload], Stream) => Some(ServerRequestStream),
        (CallShape::ServerStreaming, [], Stream) => Some(ServerStream),

        (CallShape::BidiStreaming, [Sink], Sink) => Some(Bidi),
        _ => None,
    };

    convention.ok_or_else(|| {
        let reason = match params.last() {
            Some(Sink | Future) if returns != Void && !shape.streams_requests() => {
                format!("{signature} takes its response through a parameter but returns a value")
            }
            _ => format!("{signature} matches no convention"),
        };
        unclassified(reason)
    })
}
