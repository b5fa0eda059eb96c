use std::any::Any;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::sync::oneshot;
use tonic::Status;

use crate::error::ClientError;
use crate::payload::Payload;
use crate::sink::{Observer, Sink, SinkStream};

/// Take a typed response out of a payload.
pub(crate) fn downcast<T: Any>(payload: Payload) -> Result<T, ClientError> {
    payload
        .downcast::<T>()
        .map_err(|payload| ClientError::UnexpectedPayload {
            expected: std::any::type_name::<T>(),
            found: payload.class().name().to_string(),
        })
}

pub(crate) type SingleResult = oneshot::Receiver<Result<Payload, ClientError>>;

/// A sink that collects exactly one response.
pub(crate) fn single() -> (Sink, SingleResult) {
    let (tx, rx) = oneshot::channel();
    let sink = Sink::new(Single {
        tx: Some(tx),
        value: None,
    });
    (sink, rx)
}

struct Single {
    tx: Option<oneshot::Sender<Result<Payload, ClientError>>>,
    value: Option<Payload>,
}

impl Single {
    fn finish(&mut self, result: Result<Payload, ClientError>) {
        self.value = None;
        if let Some(tx) = self.tx.take() {
            // caller stopped waiting
            let _ = tx.send(result);
        }
    }
}

impl Observer for Single {
    fn emit(&mut self, value: Payload) {
        if self.tx.is_none() {
            return;
        }
        if self.value.is_some() {
            self.finish(Err(ClientError::MoreThanOneResult));
        } else {
            self.value = Some(value);
        }
    }

    fn complete(&mut self) {
        match self.value.take() {
            Some(value) => self.finish(Ok(value)),
            None => self.finish(Err(ClientError::Closed)),
        }
    }

    fn fail(&mut self, status: Status) {
        self.finish(Err(ClientError::Status(status)));
    }
}

/// Responses of a streaming call, pulled from the calling thread.
///
/// Each `next` blocks until the following response or the end of the
/// call. Must not be used from within an async runtime.
pub struct BlockingStream<T> {
    source: SinkStream,
    done: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> BlockingStream<T> {
    pub(crate) fn new(source: SinkStream) -> Self {
        Self {
            source,
            done: false,
            _marker: PhantomData,
        }
    }
}

impl<T: Any> Iterator for BlockingStream<T> {
    type Item = Result<T, ClientError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match self.source.blocking_next()? {
            Ok(payload) => downcast(payload),
            Err(status) => Err(ClientError::Status(status)),
        };
        self.done = item.is_err();
        Some(item)
    }
}

/// Responses of a streaming call as an async [`Stream`].
///
/// Ends after the first error.
pub struct ResponseStream<T> {
    inner: BoxStream<'static, Result<T, ClientError>>,
}

impl<T: Any + Send> ResponseStream<T> {
    pub(crate) fn new(mut source: SinkStream) -> Self {
        let inner: BoxStream<'static, Result<T, ClientError>> = async_stream::try_stream! {
            while let Some(item) = source.next().await {
                let payload = item?;
                yield downcast::<T>(payload)?;
            }
        }
        .boxed();
        Self { inner }
    }
}

impl<T> Stream for ResponseStream<T> {
    type Item = Result<T, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}
