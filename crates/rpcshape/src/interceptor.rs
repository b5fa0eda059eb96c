//! Extension point for wrapping method handlers.
//!
//! Interceptors run once, when a descriptor is built. Each one receives the
//! handler built so far and returns the handler to use in its place.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::classify::{CallConvention, CallShape};
use crate::descriptor::MethodInfo;
use crate::handler::{MethodHandler, ResolvedTypes};
use crate::payload::Payload;
use crate::sink::Sink;

pub trait Interceptor: Send + Sync {
    fn intercept(&self, method: &MethodInfo, next: Arc<dyn MethodHandler>) -> Arc<dyn MethodHandler>;
}

impl<F> Interceptor for F
where
    F: Fn(&MethodInfo, Arc<dyn MethodHandler>) -> Arc<dyn MethodHandler> + Send + Sync,
{
    fn intercept(&self, method: &MethodInfo, next: Arc<dyn MethodHandler>) -> Arc<dyn MethodHandler> {
        self(method, next)
    }
}

/// Interceptors ordered by priority, lowest value outermost.
///
/// Entries with equal priority keep the order they were added in.
#[derive(Clone, Default)]
pub struct Interceptors {
    entries: Vec<(i32, Arc<dyn Interceptor>)>,
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, priority: i32, interceptor: impl Interceptor + 'static) {
        let at = self.entries.partition_point(|(p, _)| *p <= priority);
        self.entries.insert(at, (priority, Arc::new(interceptor)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn priorities(&self) -> impl Iterator<Item = i32> + '_ {
        self.entries.iter().map(|(priority, _)| *priority)
    }

    /// Wrap `handler` so that the first interceptor is the outermost.
    pub fn wrap(&self, method: &MethodInfo, handler: Arc<dyn MethodHandler>) -> Arc<dyn MethodHandler> {
        self.entries
            .iter()
            .rev()
            .fold(handler, |next, (_, interceptor)| interceptor.intercept(method, next))
    }
}

impl fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.priorities()).finish()
    }
}

/// Runs a hook before every invocation of the wrapped handler.
pub struct BeforeCall<F>(pub F);

impl<F> Interceptor for BeforeCall<F>
where
    F: Fn(&MethodInfo) + Clone + Send + Sync + 'static,
{
    fn intercept(&self, method: &MethodInfo, next: Arc<dyn MethodHandler>) -> Arc<dyn MethodHandler> {
        Arc::new(Hooked {
            info: method.clone(),
            hook: self.0.clone(),
            next,
        })
    }
}

struct Hooked<F> {
    info: MethodInfo,
    hook: F,
    next: Arc<dyn MethodHandler>,
}

impl<F> MethodHandler for Hooked<F>
where
    F: Fn(&MethodInfo) + Send + Sync,
{
    fn method(&self) -> &str {
        self.next.method()
    }

    fn shape(&self) -> CallShape {
        self.next.shape()
    }

    fn convention(&self) -> CallConvention {
        self.next.convention()
    }

    fn types(&self) -> &ResolvedTypes {
        self.next.types()
    }

    fn invoke_unary(&self, request: Payload, responses: Sink) -> BoxFuture<'static, ()> {
        (self.hook)(&self.info);
        self.next.invoke_unary(request, responses)
    }

    fn invoke_stream_start(&self, responses: Sink) -> Sink {
        (self.hook)(&self.info);
        self.next.invoke_stream_start(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing::target;
    use crate::model::Value;
    use crate::sink::recording;
    use crate::types::Class;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn info() -> MethodInfo {
        MethodInfo {
            name: "Test".into(),
            shape: CallShape::Unary,
            request_type: Class::empty(),
            response_type: Class::empty(),
        }
    }

    fn logging(
        log: &Arc<Mutex<Vec<&'static str>>>,
        label: &'static str,
    ) -> BeforeCall<impl Fn(&MethodInfo) + Clone + Send + Sync + 'static> {
        let log = Arc::clone(log);
        BeforeCall(move |_: &MethodInfo| log.lock().unwrap().push(label))
    }

    #[test]
    fn test_equal_priorities_keep_insertion_order() {
        let mut interceptors = Interceptors::new();
        let passthrough = |_: &MethodInfo, next: Arc<dyn MethodHandler>| next;
        interceptors.add(10, passthrough);
        interceptors.add(-5, passthrough);
        interceptors.add(0, passthrough);
        interceptors.add(0, passthrough);
        assert_eq!(interceptors.priorities().collect::<Vec<_>>(), vec![-5, 0, 0, 10]);
        assert_eq!(interceptors.len(), 4);
    }

    #[tokio::test]
    async fn test_lowest_priority_runs_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut interceptors = Interceptors::new();
        interceptors.add(10, logging(&log, "late"));
        interceptors.add(-5, logging(&log, "first"));
        interceptors.add(0, logging(&log, "zero-a"));
        interceptors.add(0, logging(&log, "zero-b"));

        let handler = crate::handler::adapt(
            CallConvention::NoRequestNoResponse,
            target(|_| Ok(Value::Unit)),
            ResolvedTypes::default(),
        );
        let handler = interceptors.wrap(&info(), handler);
        assert_eq!(handler.convention(), CallConvention::NoRequestNoResponse);

        let (responses, recorder) = recording();
        handler.invoke_unary(Payload::empty(), responses).await;

        assert!(recorder.is_completed());
        assert_eq!(*log.lock().unwrap(), vec!["first", "zero-a", "zero-b", "late"]);
    }

    #[test]
    fn test_empty_chain_returns_handler() {
        let handler = crate::handler::adapt(
            CallConvention::NoRequestNoResponse,
            target(|_| Ok(Value::Unit)),
            ResolvedTypes::default(),
        );
        let wrapped = Interceptors::new().wrap(&info(), Arc::clone(&handler));
        assert!(Arc::ptr_eq(&handler, &wrapped));
    }
}
