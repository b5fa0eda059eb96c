use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt};
use tonic::Status;

use crate::interceptor::{Interceptor, Interceptors};
use crate::model::{Annotation, AnnotationSet};
use crate::payload::Payload;
use crate::sink::{Promise, Sink};
use crate::types::{Class, Type};

/// Declared parameter and return types of a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    params: Vec<Type>,
    returns: Type,
}

impl Signature {
    /// `() -> ()`.
    pub fn new() -> Self {
        Self {
            params: Vec::new(),
            returns: Type::void(),
        }
    }

    pub fn param(mut self, ty: impl Into<Type>) -> Self {
        self.params.push(ty.into());
        self
    }

    pub fn returns(mut self, ty: impl Into<Type>) -> Self {
        self.returns = ty.into();
        self
    }

    pub fn params(&self) -> &[Type] {
        &self.params
    }

    pub fn return_type(&self) -> &Type {
        &self.returns
    }

    pub fn param_classes(&self) -> impl Iterator<Item = Class> + '_ {
        self.params.iter().map(Type::raw)
    }

    pub fn return_class(&self) -> Class {
        self.returns.raw()
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> {}", self.returns)
    }
}

/// One argument handed to a method body.
#[derive(Debug)]
pub enum Arg {
    Request(Payload),
    Sink(Sink),
    Promise(Promise),
}

/// The arguments of one invocation, in declaration order.
#[derive(Debug, Default)]
pub struct Args(VecDeque<Arg>);

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, arg: Arg) {
        self.0.push_back(arg);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the next argument as a request of type `T`.
    pub fn request<T: Any>(&mut self) -> Result<T, Status> {
        match self.0.pop_front() {
            Some(Arg::Request(payload)) => payload.take(),
            other => Err(unexpected("request", other)),
        }
    }

    /// Take the next argument as an untyped request.
    pub fn request_payload(&mut self) -> Result<Payload, Status> {
        match self.0.pop_front() {
            Some(Arg::Request(payload)) => Ok(payload),
            other => Err(unexpected("request", other)),
        }
    }

    pub fn sink(&mut self) -> Result<Sink, Status> {
        match self.0.pop_front() {
            Some(Arg::Sink(sink)) => Ok(sink),
            other => Err(unexpected("sink", other)),
        }
    }

    pub fn promise(&mut self) -> Result<Promise, Status> {
        match self.0.pop_front() {
            Some(Arg::Promise(promise)) => Ok(promise),
            other => Err(unexpected("promise", other)),
        }
    }
}

impl FromIterator<Arg> for Args {
    fn from_iter<I: IntoIterator<Item = Arg>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn unexpected(wanted: &str, got: Option<Arg>) -> Status {
    let got = match got {
        Some(Arg::Request(_)) => "a request",
        Some(Arg::Sink(_)) => "a sink",
        Some(Arg::Promise(_)) => "a promise",
        None => "nothing",
    };
    Status::internal(format!("expected a {wanted} argument, got {got}"))
}

/// What a method body produced.
pub enum Value {
    Unit,
    Payload(Payload),
    Future(BoxFuture<'static, Result<Payload, Status>>),
    Stream(BoxStream<'static, Result<Payload, Status>>),
    Sink(Sink),
}

impl Value {
    pub fn payload<T: Any + Send>(value: T) -> Self {
        Value::Payload(Payload::new(value))
    }

    pub fn future<F, T>(future: F) -> Self
    where
        F: Future<Output = Result<T, Status>> + Send + 'static,
        T: Any + Send,
    {
        Value::Future(future.map(|result| result.map(Payload::new)).boxed())
    }

    pub fn stream<S, T>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, Status>> + Send + 'static,
        T: Any + Send,
    {
        Value::Stream(stream.map(|item| item.map(Payload::new)).boxed())
    }

    /// A stream over already computed values.
    pub fn iter<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::IntoIter: Send + 'static,
        I::Item: Any + Send,
    {
        Value::Stream(futures::stream::iter(values.into_iter().map(|v| Ok(Payload::new(v)))).boxed())
    }

    /// Like [`Value::iter`], for producers that can fail partway.
    pub fn try_iter<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = Result<T, Status>>,
        I::IntoIter: Send + 'static,
        T: Any + Send,
    {
        Value::Stream(futures::stream::iter(values.into_iter().map(|v| v.map(Payload::new))).boxed())
    }

    pub fn sink(sink: Sink) -> Self {
        Value::Sink(sink)
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "nothing",
            Value::Payload(_) => "a payload",
            Value::Future(_) => "a future",
            Value::Stream(_) => "a stream",
            Value::Sink(_) => "a sink",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Payload(payload) => f.debug_tuple("Payload").field(payload).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// The body of a method: a closure over the instance and the arguments.
pub type MethodFn<S> = Arc<dyn Fn(Arc<S>, Args) -> Result<Value, Status> + Send + Sync>;

/// Whether a method may be exposed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// One entry of a service's registration table.
pub struct AnnotatedMethod<S> {
    name: String,
    declaring: Option<Class>,
    signature: Signature,
    annotations: AnnotationSet,
    visibility: Visibility,
    interceptors: Interceptors,
    body: MethodFn<S>,
}

impl<S> AnnotatedMethod<S> {
    pub fn new<F>(name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(Arc<S>, Args) -> Result<Value, Status> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            declaring: None,
            signature,
            annotations: AnnotationSet::new(),
            visibility: Visibility::Public,
            interceptors: Interceptors::new(),
            body: Arc::new(body),
        }
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// The ancestor that declares this method's signature, when it is
    /// inherited from a generic template.
    pub fn declared_by(mut self, class: Class) -> Self {
        self.declaring = Some(class);
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn intercept(mut self, priority: i32, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.add(priority, interceptor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaring_class(&self) -> Option<&Class> {
        self.declaring.as_ref()
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn annotations(&self) -> &AnnotationSet {
        &self.annotations
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn interceptors(&self) -> &Interceptors {
        &self.interceptors
    }

    pub(crate) fn body(&self) -> MethodFn<S> {
        Arc::clone(&self.body)
    }
}

impl<S> fmt::Display for AnnotatedMethod<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.signature)
    }
}

impl<S> fmt::Debug for AnnotatedMethod<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotatedMethod")
            .field("name", &self.name)
            .field("signature", &self.signature.to_string())
            .field("annotations", &self.annotations)
            .field("visibility", &self.visibility)
            .finish_non_exhaustive()
    }
}

/// Supplies the instance a method is invoked on.
pub enum Instance<S> {
    /// One instance shared by every call.
    Singleton(Arc<S>),
    /// A fresh instance for every call.
    PerCall(Arc<dyn Fn() -> S + Send + Sync>),
}

impl<S> Instance<S> {
    pub fn singleton(value: S) -> Self {
        Instance::Singleton(Arc::new(value))
    }

    pub fn per_call<F>(factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        Instance::PerCall(Arc::new(factory))
    }

    pub fn get(&self) -> Arc<S> {
        match self {
            Instance::Singleton(value) => Arc::clone(value),
            Instance::PerCall(factory) => Arc::new(factory()),
        }
    }
}

impl<S> Clone for Instance<S> {
    fn clone(&self) -> Self {
        match self {
            Instance::Singleton(value) => Instance::Singleton(Arc::clone(value)),
            Instance::PerCall(factory) => Instance::PerCall(Arc::clone(factory)),
        }
    }
}

impl<S> fmt::Debug for Instance<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instance::Singleton(_) => f.write_str("Singleton"),
            Instance::PerCall(_) => f.write_str("PerCall"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_signature_display() {
        let signature = Signature::new()
            .param(Type::of::<String>())
            .param(Type::sink_of(Type::of::<String>()));
        assert_eq!(signature.to_string(), "(String, Sink<String>) -> ()");
    }

    #[test]
    fn test_args_in_order() {
        let (sink, _recorder) = crate::sink::recording();
        let mut args: Args = [Arg::Request(Payload::new(3u8)), Arg::Sink(sink)].into_iter().collect();

        assert_eq!(args.request::<u8>().unwrap(), 3);
        assert!(args.promise().is_err());
        assert!(args.is_empty());
    }

    #[test]
    fn test_per_call_instance_is_fresh() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let instance = Instance::per_call(move || counter.fetch_add(1, Ordering::SeqCst));

        assert_eq!(*instance.get(), 0);
        assert_eq!(*instance.get(), 1);

        let shared = Instance::singleton(7u8);
        assert!(Arc::ptr_eq(&shared.get(), &shared.get()));
    }
}
