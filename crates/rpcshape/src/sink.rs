//! Push-based value channels.
//!
//! A [`Sink`] is a single-writer handle onto an [`Observer`]: any number of
//! `emit` calls followed by exactly one `complete` or `fail`. The terminal
//! methods consume the sink, so nothing can be written after them. A sink
//! that is dropped while still open fails its observer with `CANCELLED`
//! (or `INTERNAL` if the drop happens while unwinding from a panic), so the
//! other side always sees a terminal signal.

use std::any::Any;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, watch};
use tonic::Status;

use crate::payload::Payload;

/// The receiving end of a [`Sink`].
pub trait Observer: Send {
    /// One value.
    fn emit(&mut self, value: Payload);

    /// No more values follow.
    fn complete(&mut self);

    /// The stream ended with an error.
    fn fail(&mut self, status: Status);
}

/// One signal delivered to a sink.
#[derive(Debug)]
pub enum SinkEvent {
    Emit(Payload),
    Complete,
    Fail(Status),
}

struct State {
    observer: Option<Box<dyn Observer>>,
    // The observer is out of the slot for an `emit` callback.
    emitting: bool,
    // A failure that arrived during that callback.
    pending: Option<Status>,
    // Sink plus outstanding `SinkHandle`s. The last one to go closes an open observer.
    owners: usize,
}

type Shared = Arc<Mutex<State>>;

fn lock(shared: &Shared) -> MutexGuard<'_, State> {
    // Observers run user code; a panic there must not wedge the sink.
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn release(shared: &Shared) {
    let mut state = lock(shared);
    state.owners = state.owners.saturating_sub(1);
    if state.owners == 0 {
        let observer = state.observer.take();
        drop(state);
        if let Some(mut observer) = observer {
            let status = if std::thread::panicking() {
                Status::internal("sink dropped while panicking")
            } else {
                Status::cancelled("sink dropped without a terminal signal")
            };
            tracing::debug!(code = ?status.code(), "Closing abandoned sink");
            observer.fail(status);
        }
    }
}

/// The writing end of a value stream.
///
/// See the module docs for the signal protocol.
pub struct Sink {
    shared: Shared,
}

impl Sink {
    /// A sink delivering to `observer`.
    pub fn new(observer: impl Observer + 'static) -> Self {
        Self::boxed(Box::new(observer))
    }

    /// Like [`Sink::new`] for an observer that is already boxed.
    pub fn boxed(observer: Box<dyn Observer>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(State {
                observer: Some(observer),
                emitting: false,
                pending: None,
                owners: 1,
            })),
        }
    }

    /// A sink whose observer receives every signal through `f`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut(SinkEvent) + Send + 'static,
    {
        Self::new(FnObserver(f))
    }

    /// A sink that is already closed; everything written to it is dropped.
    pub fn closed() -> Self {
        Self {
            shared: Arc::new(Mutex::new(State {
                observer: None,
                emitting: false,
                pending: None,
                owners: 1,
            })),
        }
    }

    /// Write one value. Values written after the sink closed are dropped.
    ///
    /// The observer runs without the sink's lock held.
    pub fn emit(&mut self, value: Payload) {
        let observer = {
            let mut state = lock(&self.shared);
            let observer = state.observer.take();
            state.emitting = observer.is_some();
            observer
        };
        let mut delivery = Delivery {
            shared: &self.shared,
            observer,
        };
        match delivery.observer.as_mut() {
            Some(observer) => observer.emit(value),
            None => tracing::warn!(class = %value.class(), "Dropping value emitted on a closed sink"),
        }
    }

    /// Write one typed value.
    pub fn send<T: Any + Send>(&mut self, value: T) {
        self.emit(Payload::new(value));
    }

    /// End the stream successfully.
    pub fn complete(self) {
        let observer = lock(&self.shared).observer.take();
        if let Some(mut observer) = observer {
            observer.complete();
        }
    }

    /// End the stream with `status`.
    pub fn fail(self, status: Status) {
        let observer = lock(&self.shared).observer.take();
        if let Some(mut observer) = observer {
            observer.fail(status);
        }
    }

    /// Deliver a whole result: the value then `complete`, or `fail`.
    pub fn resolve(mut self, result: Result<Payload, Status>) {
        match result {
            Ok(value) => {
                self.emit(value);
                self.complete();
            }
            Err(status) => self.fail(status),
        }
    }

    /// Whether a terminal signal was already delivered.
    pub fn is_closed(&self) -> bool {
        let state = lock(&self.shared);
        state.observer.is_none() && !(state.emitting && state.pending.is_none())
    }

    /// A handle that can still fail this sink after it has been given away.
    pub(crate) fn handle(&self) -> SinkHandle {
        lock(&self.shared).owners += 1;
        SinkHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        release(&self.shared);
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Keeps a sink's observer reachable while user code owns the [`Sink`].
///
/// While a handle is alive, dropping the sink does not close it; the last
/// owner to go does.
pub(crate) struct SinkHandle {
    shared: Shared,
}

impl SinkHandle {
    /// Fail the sink unless it already saw a terminal signal.
    pub(crate) fn fail_if_open(&self, status: Status) {
        let mut state = lock(&self.shared);
        if state.emitting {
            // delivered once the running `emit` hands the observer back
            if state.pending.is_none() {
                state.pending = Some(status);
            }
            return;
        }
        let observer = state.observer.take();
        drop(state);
        if let Some(mut observer) = observer {
            observer.fail(status);
        }
    }
}

impl Drop for SinkHandle {
    fn drop(&mut self) {
        release(&self.shared);
    }
}

/// Puts the observer back after an `emit` callback, even when it unwinds.
struct Delivery<'a> {
    shared: &'a Shared,
    observer: Option<Box<dyn Observer>>,
}

impl Drop for Delivery<'_> {
    fn drop(&mut self) {
        let Some(mut observer) = self.observer.take() else {
            return;
        };
        let mut state = lock(self.shared);
        state.emitting = false;
        match state.pending.take() {
            Some(status) => {
                drop(state);
                observer.fail(status);
            }
            None => state.observer = Some(observer),
        }
    }
}

struct FnObserver<F>(F);

impl<F> Observer for FnObserver<F>
where
    F: FnMut(SinkEvent) + Send,
{
    fn emit(&mut self, value: Payload) {
        (self.0)(SinkEvent::Emit(value))
    }

    fn complete(&mut self) {
        (self.0)(SinkEvent::Complete)
    }

    fn fail(&mut self, status: Status) {
        (self.0)(SinkEvent::Fail(status))
    }
}

/// A single deferred value.
///
/// Completing a promise emits the value and completes the underlying sink.
/// Dropping it unresolved fails the sink like dropping the sink would.
#[derive(Debug)]
pub struct Promise {
    sink: Sink,
}

impl Promise {
    /// A promise resolving into `sink`.
    pub fn new(sink: Sink) -> Self {
        Self { sink }
    }

    /// Resolve with a typed value.
    pub fn complete<T: Any + Send>(self, value: T) {
        self.complete_payload(Payload::new(value));
    }

    pub fn complete_payload(self, value: Payload) {
        self.sink.resolve(Ok(value));
    }

    /// Complete with the empty message.
    pub fn complete_empty(self) {
        self.complete_payload(Payload::empty());
    }

    /// Resolve with an error.
    pub fn fail(self, status: Status) {
        self.sink.fail(status);
    }

    pub fn resolve<T: Any + Send>(self, result: Result<T, Status>) {
        self.sink.resolve(result.map(Payload::new));
    }

    /// The underlying sink, for adapters that stream into it.
    pub fn into_sink(self) -> Sink {
        self.sink
    }
}

/// A sink that forwards into an async [`SinkStream`].
pub fn channel() -> (Sink, SinkStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Sink::new(ChannelObserver { tx: Some(tx) }), SinkStream { rx })
}

struct ChannelObserver {
    tx: Option<mpsc::UnboundedSender<Result<Payload, Status>>>,
}

impl Observer for ChannelObserver {
    fn emit(&mut self, value: Payload) {
        if let Some(tx) = &self.tx {
            // receiver gone: nobody is listening any more
            let _ = tx.send(Ok(value));
        }
    }

    fn complete(&mut self) {
        self.tx = None;
    }

    fn fail(&mut self, status: Status) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(status));
        }
    }
}

/// Values written to a [`channel`] sink, ending after `complete` or the
/// failure.
#[derive(Debug)]
pub struct SinkStream {
    rx: mpsc::UnboundedReceiver<Result<Payload, Status>>,
}

impl SinkStream {
    /// Block the current thread for the next item.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_next(&mut self) -> Option<Result<Payload, Status>> {
        self.rx.blocking_recv()
    }
}

impl Stream for SinkStream {
    type Item = Result<Payload, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// A sink that records everything written to it.
pub fn recording() -> (Sink, Recorder) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, done_rx) = watch::channel(false);
    let observer = RecordingObserver {
        events: Arc::clone(&events),
        done: done_tx,
    };
    (
        Sink::new(observer),
        Recorder {
            events,
            done: done_rx,
        },
    )
}

struct RecordingObserver {
    events: Arc<Mutex<Vec<SinkEvent>>>,
    done: watch::Sender<bool>,
}

impl RecordingObserver {
    fn push(&self, event: SinkEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl Observer for RecordingObserver {
    fn emit(&mut self, value: Payload) {
        self.push(SinkEvent::Emit(value));
    }

    fn complete(&mut self) {
        self.push(SinkEvent::Complete);
        self.done.send_replace(true);
    }

    fn fail(&mut self, status: Status) {
        self.push(SinkEvent::Fail(status));
        self.done.send_replace(true);
    }
}

/// Read side of [`recording`].
#[derive(Debug, Clone)]
pub struct Recorder {
    events: Arc<Mutex<Vec<SinkEvent>>>,
    done: watch::Receiver<bool>,
}

impl Recorder {
    fn events(&self) -> MutexGuard<'_, Vec<SinkEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until the sink has completed or failed.
    pub async fn terminated(&self) {
        let mut done = self.done.clone();
        // sender dropped means the observer is gone, which only follows a terminal signal
        let _ = done.wait_for(|done| *done).await;
    }

    /// `"emit"`, `"complete"` and `"fail"` in the order they happened.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events()
            .iter()
            .map(|event| match event {
                SinkEvent::Emit(_) => "emit",
                SinkEvent::Complete => "complete",
                SinkEvent::Fail(_) => "fail",
            })
            .collect()
    }

    /// Every emitted value of type `T`, in order.
    pub fn emitted<T: Any + Clone>(&self) -> Vec<T> {
        self.events()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Emit(payload) => payload.downcast_ref::<T>().cloned(),
                _ => None,
            })
            .collect()
    }

    pub fn emit_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, SinkEvent::Emit(_)))
            .count()
    }

    pub fn is_completed(&self) -> bool {
        self.events()
            .iter()
            .any(|event| matches!(event, SinkEvent::Complete))
    }

    pub fn failure(&self) -> Option<Status> {
        self.events().iter().find_map(|event| match event {
            SinkEvent::Fail(status) => Some(status.clone()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_emit_then_complete() {
        let (mut sink, recorder) = recording();
        sink.send(1u32);
        sink.send(2u32);
        sink.complete();

        assert_eq!(recorder.kinds(), vec!["emit", "emit", "complete"]);
        assert_eq!(recorder.emitted::<u32>(), vec![1, 2]);
    }

    #[test]
    fn test_drop_open_sink_fails_cancelled() {
        let (sink, recorder) = recording();
        drop(sink);

        assert_eq!(recorder.kinds(), vec!["fail"]);
        assert_eq!(recorder.failure().unwrap().code(), tonic::Code::Cancelled);
    }

    #[test]
    fn test_handle_keeps_sink_open_after_drop() {
        let (sink, recorder) = recording();
        let handle = sink.handle();
        drop(sink);
        assert!(recorder.kinds().is_empty());

        handle.fail_if_open(Status::unavailable("gone"));
        drop(handle);
        assert_eq!(recorder.kinds(), vec!["fail"]);
        assert_eq!(recorder.failure().unwrap().message(), "gone");
    }

    #[test]
    fn test_handle_is_noop_after_complete() {
        let (sink, recorder) = recording();
        let handle = sink.handle();
        sink.complete();
        handle.fail_if_open(Status::internal("late"));
        drop(handle);

        assert_eq!(recorder.kinds(), vec!["complete"]);
    }

    #[test]
    fn test_handle_can_fail_sink_from_inside_emit() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let slot: Arc<Mutex<Option<SinkHandle>>> = Arc::default();

        let mut sink = {
            let events = Arc::clone(&events);
            let slot = Arc::clone(&slot);
            Sink::from_fn(move |event| {
                let mut events = events.lock().unwrap();
                match event {
                    SinkEvent::Emit(_) => {
                        events.push("emit".to_string());
                        drop(events);
                        if let Some(handle) = slot.lock().unwrap().take() {
                            handle.fail_if_open(Status::aborted("stop"));
                        }
                    }
                    SinkEvent::Complete => events.push("complete".to_string()),
                    SinkEvent::Fail(status) => events.push(format!("fail {}", status.message())),
                }
            })
        };
        *slot.lock().unwrap() = Some(sink.handle());

        sink.send(1u8);
        assert!(sink.is_closed());
        sink.send(2u8);
        drop(sink);

        assert_eq!(*events.lock().unwrap(), vec!["emit", "fail stop"]);
    }

    #[test]
    fn test_last_owner_closes_abandoned_sink() {
        let (sink, recorder) = recording();
        let handle = sink.handle();
        drop(sink);
        drop(handle);

        assert_eq!(recorder.failure().unwrap().code(), tonic::Code::Cancelled);
    }

    #[test]
    fn test_promise_resolve() {
        let (sink, recorder) = recording();
        Promise::new(sink).resolve::<String>(Err(Status::not_found("nope")));
        assert_eq!(recorder.kinds(), vec!["fail"]);

        let (sink, recorder) = recording();
        Promise::new(sink).complete(String::from("done"));
        assert_eq!(recorder.kinds(), vec!["emit", "complete"]);
        assert_eq!(recorder.emitted::<String>(), vec!["done".to_string()]);
    }

    #[test]
    fn test_closed_sink_ignores_writes() {
        let mut sink = Sink::closed();
        assert!(sink.is_closed());
        sink.send(1u8);
        sink.complete();
    }

    #[tokio::test]
    async fn test_channel_stream() {
        let (mut sink, mut stream) = channel();
        sink.send("a");
        sink.fail(Status::aborted("stop"));

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.downcast_ref::<&str>(), Some(&"a"));
        let second = stream.next().await.unwrap().unwrap_err();
        assert_eq!(second.code(), tonic::Code::Aborted);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_recorder_terminated() {
        let (mut sink, recorder) = recording();
        let task = tokio::spawn(async move {
            sink.send(5i64);
            sink.complete();
        });
        recorder.terminated().await;
        task.await.unwrap();
        assert_eq!(recorder.emitted::<i64>(), vec![5]);
    }
}
