//! Payload (de)serialization strategies, selected per service or method.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tonic::Status;

use crate::payload::{Empty, Payload};
use crate::types::Class;

pub trait Marshaller: Send + Sync {
    /// The name services and methods select this marshaller by.
    fn name(&self) -> &str;

    fn encode(&self, value: &Payload) -> Result<Bytes, Status>;

    fn decode(&self, class: &Class, bytes: Bytes) -> Result<Payload, Status>;
}

type EncodeFn = fn(&Payload) -> Result<Bytes, Status>;
type DecodeFn = fn(Bytes) -> Result<Payload, Status>;

/// Protobuf encoding for registered [`prost::Message`] types.
#[derive(Clone)]
pub struct ProstMarshaller {
    codecs: HashMap<TypeId, (EncodeFn, DecodeFn), ahash::RandomState>,
}

impl ProstMarshaller {
    pub const NAME: &'static str = "prost";

    /// A marshaller that knows [`Empty`] only.
    pub fn new() -> Self {
        let mut marshaller = Self {
            codecs: HashMap::default(),
        };
        marshaller.register::<Empty>();
        marshaller
    }

    pub fn register<M>(&mut self) -> &mut Self
    where
        M: prost::Message + Default + 'static,
    {
        let codec = (encode_message::<M> as EncodeFn, decode_message::<M> as DecodeFn);
        self.codecs.insert(TypeId::of::<M>(), codec);
        self
    }

    pub fn with<M>(mut self) -> Self
    where
        M: prost::Message + Default + 'static,
    {
        self.register::<M>();
        self
    }

    pub fn supports(&self, class: &Class) -> bool {
        class
            .type_id()
            .is_some_and(|id| self.codecs.contains_key(&id))
    }

    fn codec(&self, class: &Class) -> Result<&(EncodeFn, DecodeFn), Status> {
        class
            .type_id()
            .and_then(|id| self.codecs.get(&id))
            .ok_or_else(|| Status::internal(format!("no protobuf codec registered for {}", class.name())))
    }
}

impl Default for ProstMarshaller {
    fn default() -> Self {
        Self::new()
    }
}

impl Marshaller for ProstMarshaller {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn encode(&self, value: &Payload) -> Result<Bytes, Status> {
        let (encode, _) = self.codec(value.class())?;
        encode(value)
    }

    fn decode(&self, class: &Class, bytes: Bytes) -> Result<Payload, Status> {
        let (_, decode) = self.codec(class)?;
        decode(bytes)
    }
}

impl fmt::Debug for ProstMarshaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProstMarshaller")
            .field("codecs", &self.codecs.len())
            .finish()
    }
}

fn encode_message<M: prost::Message + 'static>(value: &Payload) -> Result<Bytes, Status> {
    let message = value.downcast_ref::<M>().ok_or_else(|| {
        Status::internal(format!(
            "cannot encode {} as {}",
            value.class().name(),
            std::any::type_name::<M>()
        ))
    })?;
    Ok(Bytes::from(message.encode_to_vec()))
}

fn decode_message<M: prost::Message + Default + 'static>(bytes: Bytes) -> Result<Payload, Status> {
    M::decode(bytes).map(Payload::new).map_err(|err| {
        Status::invalid_argument(format!(
            "failed to decode {}: {err}",
            std::any::type_name::<M>()
        ))
    })
}

/// Marshallers by name, with one of them the default.
#[derive(Clone)]
pub struct MarshallerRegistry {
    marshallers: HashMap<String, Arc<dyn Marshaller>, ahash::RandomState>,
    default: String,
}

impl MarshallerRegistry {
    /// A registry holding a bare [`ProstMarshaller`] as the default.
    pub fn new() -> Self {
        let mut registry = Self {
            marshallers: HashMap::default(),
            default: ProstMarshaller::NAME.to_string(),
        };
        registry.register(ProstMarshaller::new());
        registry
    }

    /// Add a marshaller, replacing any registered under the same name.
    pub fn register(&mut self, marshaller: impl Marshaller + 'static) -> &mut Self {
        self.marshallers
            .insert(marshaller.name().to_string(), Arc::new(marshaller));
        self
    }

    pub fn with(mut self, marshaller: impl Marshaller + 'static) -> Self {
        self.register(marshaller);
        self
    }

    /// Select the marshaller used when nothing names one.
    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default = name.into();
        self
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Marshaller>> {
        self.marshallers.get(name).cloned()
    }

    /// The marshaller called `name`, or the default one.
    pub fn select(&self, name: Option<&str>) -> Option<Arc<dyn Marshaller>> {
        self.get(name.unwrap_or(&self.default))
    }
}

impl Default for MarshallerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MarshallerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.marshallers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("MarshallerRegistry")
            .field("marshallers", &names)
            .field("default", &self.default)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Note {
        #[prost(string, tag = "1")]
        text: String,
    }

    #[test]
    fn test_prost_round_trip() {
        let marshaller = ProstMarshaller::new().with::<Note>();
        let bytes = marshaller
            .encode(&Payload::new(Note { text: "hi".into() }))
            .unwrap();

        let decoded = marshaller.decode(&Class::of::<Note>(), bytes).unwrap();
        assert_eq!(decoded.downcast::<Note>().unwrap().text, "hi");
    }

    #[test]
    fn test_unregistered_type_is_an_error() {
        let marshaller = ProstMarshaller::new();
        let status = marshaller.encode(&Payload::new(Note::default())).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Internal);
        assert!(!marshaller.supports(&Class::of::<Note>()));
        assert!(marshaller.supports(&Class::empty()));
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        let marshaller = ProstMarshaller::new().with::<Note>();
        let status = marshaller
            .decode(&Class::of::<Note>(), Bytes::from_static(&[0x0a, 0xff]))
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn test_registry_default_and_lookup() {
        let registry = MarshallerRegistry::new();
        assert_eq!(registry.default_name(), "prost");
        assert_eq!(registry.select(None).unwrap().name(), "prost");
        assert!(registry.select(Some("json")).is_none());
    }
}
