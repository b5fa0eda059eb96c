use std::any::Any;
use std::fmt;

use tonic::Status;

use crate::types::Class;

/// The canonical empty message, emitted by conventions that produce nothing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, prost::Message)]
pub struct Empty {}

/// A type-erased request or response value.
pub struct Payload {
    value: Box<dyn Any + Send>,
    class: Class,
}

impl Payload {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            class: Class::of::<T>(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Empty {})
    }

    /// Wrap an already boxed value, e.g. one produced by a decoder.
    pub fn from_parts(value: Box<dyn Any + Send>, class: Class) -> Self {
        Self { value, class }
    }

    pub fn class(&self) -> &Class {
        &self.class
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn is_empty(&self) -> bool {
        self.is::<Empty>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// Take the value out, handing the payload back on a type mismatch.
    pub fn downcast<T: Any>(self) -> Result<T, Payload> {
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Payload {
                value,
                class: self.class,
            }),
        }
    }

    /// Like [`Payload::downcast`], mapping a mismatch to `INVALID_ARGUMENT`.
    pub fn take<T: Any>(self) -> Result<T, Status> {
        self.downcast().map_err(|payload| {
            Status::invalid_argument(format!(
                "expected a {} payload, got {}",
                std::any::type_name::<T>(),
                payload.class.name()
            ))
        })
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("class", &self.class.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_mismatch_returns_payload() {
        let payload = Payload::new(String::from("hi"));
        let payload = payload.downcast::<u32>().unwrap_err();
        assert_eq!(payload.downcast::<String>().unwrap(), "hi");
    }

    #[test]
    fn test_take_mismatch_is_invalid_argument() {
        let status = Payload::new(7u32).take::<String>().unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert!(status.message().contains("u32"));
    }

    #[test]
    fn test_empty() {
        let payload = Payload::empty();
        assert!(payload.is_empty());
        assert_eq!(payload.class(), &Class::empty());
    }
}
