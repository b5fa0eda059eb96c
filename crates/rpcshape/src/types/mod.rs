//! Runtime type model used to describe method signatures.
//!
//! Rust erases nothing at runtime, but a registration table still needs a
//! value-level description of each parameter and return type so it can be
//! classified and so generic templates can be resolved against the concrete
//! service that implements them. [`Class`] is a concrete runtime type and
//! [`Type`] is a possibly generic type expression built from classes and
//! type variables.

mod registry;
mod resolve;

pub use registry::{TypeDecl, TypeRegistry};
pub use resolve::GenericResolver;

use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::payload::Empty;

/// What role a class plays in a method signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// An ordinary message type.
    Payload,
    /// The absence of a value (`()`).
    Void,
    /// A push-based [`Sink`](crate::sink::Sink) of values.
    Sink,
    /// A single deferred value: a [`Promise`](crate::sink::Promise) when used
    /// as a parameter, a boxed future when returned.
    Future,
    /// A sequence of values produced by the method.
    Stream,
    /// The erased fallback when nothing more specific is known.
    Any,
    /// An array of some component class.
    Array,
    /// A named type known only through the [`TypeRegistry`], such as a
    /// service or a generic service template.
    Declared,
}

/// A concrete runtime class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Class {
    name: Cow<'static, str>,
    id: Option<TypeId>,
    kind: ClassKind,
    component: Option<Arc<Class>>,
}

impl Class {
    /// The class of a Rust type.
    ///
    /// `()` maps to [`Class::void`].
    pub fn of<T: 'static>() -> Self {
        let id = TypeId::of::<T>();
        if id == TypeId::of::<()>() {
            return Self::void();
        }
        Self {
            name: Cow::Borrowed(std::any::type_name::<T>()),
            id: Some(id),
            kind: ClassKind::Payload,
            component: None,
        }
    }

    /// A declared (registry-only) class such as a service or a template.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::special(name, ClassKind::Declared)
    }

    pub fn void() -> Self {
        Self::special("()", ClassKind::Void)
    }

    pub fn sink() -> Self {
        Self::special("Sink", ClassKind::Sink)
    }

    pub fn future() -> Self {
        Self::special("Future", ClassKind::Future)
    }

    pub fn stream() -> Self {
        Self::special("Stream", ClassKind::Stream)
    }

    /// The erased class an unresolved type falls back to.
    pub fn any() -> Self {
        Self::special("dyn Any", ClassKind::Any)
    }

    /// The canonical empty payload class.
    pub fn empty() -> Self {
        Self::of::<Empty>()
    }

    /// The array class whose elements are `component`.
    pub fn array_of(component: Class) -> Self {
        Self {
            name: Cow::Owned(format!("[{}]", component.name)),
            id: None,
            kind: ClassKind::Array,
            component: Some(Arc::new(component)),
        }
    }

    fn special(name: impl Into<Cow<'static, str>>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            id: None,
            kind,
            component: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The last path segment of the name, ignoring generic arguments.
    pub fn simple_name(&self) -> &str {
        let base = self.name.split('<').next().unwrap_or(&self.name);
        base.rsplit("::").next().unwrap_or(base)
    }

    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.id
    }

    pub fn component(&self) -> Option<&Class> {
        self.component.as_deref()
    }

    /// Whether this class can appear as a request or response value.
    pub fn is_payload(&self) -> bool {
        matches!(
            self.kind,
            ClassKind::Payload | ClassKind::Any | ClassKind::Array | ClassKind::Declared
        )
    }

    pub fn is_void(&self) -> bool {
        self.kind == ClassKind::Void
    }

    pub fn is_sink(&self) -> bool {
        self.kind == ClassKind::Sink
    }

    pub fn is_future(&self) -> bool {
        self.kind == ClassKind::Future
    }

    pub fn is_stream(&self) -> bool {
        self.kind == ClassKind::Stream
    }

    pub fn is_any(&self) -> bool {
        self.kind == ClassKind::Any
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.component {
            Some(component) => write!(f, "[{component}]"),
            None => f.write_str(self.simple_name()),
        }
    }
}

/// A type variable declared by a generic [`TypeDecl`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeVar {
    name: Arc<str>,
    bound: Option<Class>,
}

impl TypeVar {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            bound: None,
        }
    }

    /// Restrict the variable to `bound`, which becomes its erasure.
    pub fn bounded(mut self, bound: Class) -> Self {
        self.bound = Some(bound);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn erasure(&self) -> Class {
        self.bound.clone().unwrap_or_else(Class::any)
    }
}

/// A type expression as it appears in a declared signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Class(Class),
    Var(TypeVar),
    /// A generic class applied to arguments, e.g. `Sink<Reply>`.
    Generic(Class, Vec<Type>),
    Array(Box<Type>),
}

impl Type {
    pub fn of<T: 'static>() -> Self {
        Type::Class(Class::of::<T>())
    }

    pub fn var(name: impl Into<Arc<str>>) -> Self {
        Type::Var(TypeVar::new(name))
    }

    pub fn void() -> Self {
        Type::Class(Class::void())
    }

    /// A sink without a declared element type.
    pub fn raw_sink() -> Self {
        Type::Class(Class::sink())
    }

    pub fn sink_of(element: Type) -> Self {
        Type::Generic(Class::sink(), vec![element])
    }

    pub fn future_of(element: Type) -> Self {
        Type::Generic(Class::future(), vec![element])
    }

    pub fn stream_of(element: Type) -> Self {
        Type::Generic(Class::stream(), vec![element])
    }

    pub fn array(component: Type) -> Self {
        Type::Array(Box::new(component))
    }

    pub fn generic(raw: Class, args: impl IntoIterator<Item = Type>) -> Self {
        Type::Generic(raw, args.into_iter().collect())
    }

    /// The erased class of this expression.
    pub fn raw(&self) -> Class {
        match self {
            Type::Class(class) => class.clone(),
            Type::Var(var) => var.erasure(),
            Type::Generic(raw, _) => raw.clone(),
            Type::Array(component) => Class::array_of(component.raw()),
        }
    }

    /// The first type argument, if this is a generic application.
    pub fn first_argument(&self) -> Option<&Type> {
        match self {
            Type::Generic(_, args) => args.first(),
            _ => None,
        }
    }

    /// Whether a type variable occurs anywhere in this expression.
    pub fn has_variables(&self) -> bool {
        match self {
            Type::Class(_) => false,
            Type::Var(_) => true,
            Type::Generic(_, args) => args.iter().any(Type::has_variables),
            Type::Array(component) => component.has_variables(),
        }
    }
}

impl From<Class> for Type {
    fn from(class: Class) -> Self {
        Type::Class(class)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Class(class) => write!(f, "{class}"),
            Type::Var(var) => f.write_str(var.name()),
            Type::Generic(raw, args) => {
                write!(f, "{raw}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
            Type::Array(component) => write!(f, "[{component}]"),
        }
    }
}

/// A resolved class together with the type expression it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassAndType {
    pub raw: Class,
    pub ty: Type,
}

impl ClassAndType {
    pub fn of(raw: Class) -> Self {
        let ty = Type::Class(raw.clone());
        Self { raw, ty }
    }

    pub fn with_type(raw: Class, ty: Type) -> Self {
        Self { raw, ty }
    }
}
