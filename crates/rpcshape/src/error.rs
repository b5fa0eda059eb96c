use std::any::Any;
use std::sync::Arc;

use thiserror::Error;
use tonic::Status;

use crate::classify::{CallShape, Unclassified};

/// Errors that abort building a service descriptor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// A marked method matches no calling convention of its shape.
    #[error("method '{method}' of service '{service}' has an unsupported {shape} signature: {source}")]
    Classification {
        service: String,
        method: String,
        shape: CallShape,
        #[source]
        source: Unclassified,
    },

    /// Two methods are exposed under the same name with the same shape.
    #[error("method '{method}' is registered more than once on service '{service}'")]
    DuplicateMethod { service: String, method: String },

    /// Two methods are exposed under the same name with different shapes.
    #[error(
        "method '{method}' of service '{service}' is registered as {existing} and again as {conflicting}"
    )]
    ConflictingMethod {
        service: String,
        method: String,
        existing: CallShape,
        conflicting: CallShape,
    },

    /// A payload type could only be resolved to its erased class.
    #[error(
        "cannot resolve the {side} type of method '{method}' on service '{service}' (declared as {declared})"
    )]
    UnresolvedType {
        service: String,
        method: String,
        side: &'static str,
        declared: String,
    },

    /// No marshaller is registered under the selected name.
    #[error("unknown marshaller '{name}' selected for service '{service}'")]
    UnknownMarshaller { service: String, name: String },

    /// A service with this name is already registered.
    #[error("service '{0}' is already registered")]
    DuplicateService(String),
}

/// Problems found while building a descriptor that do not stop it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ModelWarning {
    /// A method carries a shape marker but cannot be called; it is left out.
    #[error("method '{method}' of service '{service}' is marked as {shape} but is not public")]
    NotPublic {
        service: String,
        method: String,
        shape: CallShape,
    },
}

/// Errors returned to callers of a [`ServiceClient`](crate::client::ServiceClient).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The service publishes no method with this name.
    #[error("no method named '{method}' registered with service '{service}'")]
    UnknownMethod { service: String, method: String },

    /// The method exists but the requested calling style implies another shape.
    #[error(
        "method '{method}' of service '{service}' is registered as {registered}, not {requested}"
    )]
    ShapeMismatch {
        service: String,
        method: String,
        registered: CallShape,
        requested: CallShape,
    },

    /// The call failed.
    #[error(transparent)]
    Status(#[from] Status),

    /// A response did not have the expected type.
    #[error("expected a {expected} response, got {found}")]
    UnexpectedPayload {
        expected: &'static str,
        found: String,
    },

    /// A single-response call produced more than one value.
    #[error("more than one result received")]
    MoreThanOneResult,

    /// Timeout waiting for the response.
    #[error("timeout waiting for response")]
    Timeout(#[from] tokio::time::error::Elapsed),

    /// The call ended without a result.
    #[error("call closed without a result")]
    Closed,
}

/// Convert any error to a call failure.
///
/// A [`Status`] passes through unchanged. Anything else becomes `INTERNAL`
/// with the original message, keeping the original error as the source.
pub fn into_status(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Status {
    match err.into().downcast::<Status>() {
        Ok(status) => *status,
        Err(err) => {
            let mut status = Status::internal(err.to_string());
            status.set_source(Arc::from(err));
            status
        }
    }
}

/// The failure reported for a panicking handler.
pub(crate) fn panic_status(panic: Box<dyn Any + Send>) -> Status {
    let message = if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    };
    Status::internal(format!("handler panicked: {message}"))
}
