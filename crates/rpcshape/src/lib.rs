//! Method-signature classification and call adaptation for four-shape RPC.
//!
//! Services describe their methods in a [`ServiceModel`]: a name, an RPC
//! shape marker, the declared signature and a closure that runs the method.
//! The [`ServiceModeller`] classifies every signature into one calling
//! convention, resolves its request and response types, and adapts it to
//! the uniform [`MethodHandler`] contract a transport drives. The resulting
//! [`ServiceDescriptor`] is read-only and shared between calls.
//!
//! # Example
//!
//! ```ignore
//! use rpcshape::{Annotation, AnnotatedMethod, Class, Instance, ServiceModel, ServiceModeller, Signature, Type, Value};
//!
//! let model = ServiceModel::new(Class::named("demo.Greeter"), Instance::singleton(Greeter))
//!     .method(
//!         AnnotatedMethod::new(
//!             "greet",
//!             Signature::new().param(Type::of::<String>()).returns(Type::of::<String>()),
//!             |greeter, mut args| Ok(Value::payload(greeter.greet(args.request()?))),
//!         )
//!         .annotate(Annotation::unary()),
//!     );
//!
//! let descriptor = ServiceModeller::default().build(&model)?;
//! ```

pub mod classify;
pub mod client;
pub mod descriptor;
pub mod error;
pub mod handler;
pub mod interceptor;
pub mod marshal;
pub mod model;
pub mod payload;
pub mod sink;
pub mod types;

pub use classify::{CallConvention, CallShape};
pub use descriptor::{
    MethodDescriptor, MethodInfo, ModellerConfig, ServiceDescriptor, ServiceInfo, ServiceModeller,
    ServiceRegistry,
};
pub use error::{ClientError, ModelError, ModelWarning, into_status};
pub use handler::{MethodHandler, ResolvedTypes};
pub use model::{
    AnnotatedMethod, Annotation, Args, Instance, ServiceAnnotation, ServiceModel, Signature, Value,
    Visibility,
};
pub use payload::{Empty, Payload};
pub use sink::{Observer, Promise, Sink};
pub use types::{Class, Type, TypeDecl, TypeRegistry, TypeVar};
