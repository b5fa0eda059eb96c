use std::borrow::Cow;

use crate::classify::CallShape;
use crate::types::Class;

/// A marker attached to a method in a service model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// The RPC shape marker applied directly.
    Rpc {
        shape: CallShape,
        name: Option<String>,
    },
    /// A named marker that carries other markers on itself, such as
    /// `Unary`, which carries `Rpc { shape: Unary }`.
    Marker {
        marker: Cow<'static, str>,
        name: Option<String>,
        meta: Vec<Annotation>,
    },
    /// Explicit request type, bypassing generic resolution.
    RequestType(Class),
    /// Explicit response type, bypassing generic resolution.
    ResponseType(Class),
    /// Name of the marshaller to use for this method.
    Marshaller(String),
}

impl Annotation {
    pub fn rpc(shape: CallShape) -> Self {
        Annotation::Rpc { shape, name: None }
    }

    /// A marker named after `shape` that carries the shape marker.
    pub fn shape_marker(shape: CallShape) -> Self {
        let marker = match shape {
            CallShape::Unary => "Unary",
            CallShape::ClientStreaming => "ClientStreaming",
            CallShape::ServerStreaming => "ServerStreaming",
            CallShape::BidiStreaming => "Bidirectional",
        };
        Annotation::Marker {
            marker: Cow::Borrowed(marker),
            name: None,
            meta: vec![Annotation::rpc(shape)],
        }
    }

    pub fn unary() -> Self {
        Self::shape_marker(CallShape::Unary)
    }

    pub fn client_streaming() -> Self {
        Self::shape_marker(CallShape::ClientStreaming)
    }

    pub fn server_streaming() -> Self {
        Self::shape_marker(CallShape::ServerStreaming)
    }

    pub fn bidi_streaming() -> Self {
        Self::shape_marker(CallShape::BidiStreaming)
    }

    /// Set the exposed method name. Only shape markers carry one.
    pub fn named(mut self, exposed: impl Into<String>) -> Self {
        match &mut self {
            Annotation::Rpc { name, .. } | Annotation::Marker { name, .. } => {
                *name = Some(exposed.into());
            }
            _ => {}
        }
        self
    }
}

/// Where a shape marker was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Direct,
    Meta,
}

/// The shape marker found on a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcMarker<'a> {
    pub shape: CallShape,
    pub name: Option<&'a str>,
    pub placement: Placement,
}

/// All annotations on one method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationSet(Vec<Annotation>);

impl AnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, annotation: Annotation) {
        self.0.push(annotation);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.0.iter()
    }

    pub fn direct_rpc(&self) -> Option<RpcMarker<'_>> {
        self.0.iter().find_map(|annotation| match annotation {
            Annotation::Rpc { shape, name } => Some(RpcMarker {
                shape: *shape,
                name: non_blank(name),
                placement: Placement::Direct,
            }),
            _ => None,
        })
    }

    /// The shape marker carried one level up, on another marker.
    ///
    /// The exposed name comes from the carrying marker.
    pub fn meta_rpc(&self) -> Option<RpcMarker<'_>> {
        self.0.iter().find_map(|annotation| match annotation {
            Annotation::Marker { name, meta, .. } => {
                meta.iter().find_map(|inner| match inner {
                    Annotation::Rpc {
                        shape,
                        name: inner_name,
                    } => Some(RpcMarker {
                        shape: *shape,
                        name: non_blank(name).or(non_blank(inner_name)),
                        placement: Placement::Meta,
                    }),
                    _ => None,
                })
            }
            _ => None,
        })
    }

    /// The effective shape marker, direct placement first.
    pub fn rpc(&self) -> Option<RpcMarker<'_>> {
        self.direct_rpc().or_else(|| self.meta_rpc())
    }

    pub fn request_type(&self) -> Option<&Class> {
        self.0.iter().find_map(|annotation| match annotation {
            Annotation::RequestType(class) => Some(class),
            _ => None,
        })
    }

    pub fn response_type(&self) -> Option<&Class> {
        self.0.iter().find_map(|annotation| match annotation {
            Annotation::ResponseType(class) => Some(class),
            _ => None,
        })
    }

    pub fn marshaller(&self) -> Option<&str> {
        self.0.iter().find_map(|annotation| match annotation {
            Annotation::Marshaller(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

impl FromIterator<Annotation> for AnnotationSet {
    fn from_iter<I: IntoIterator<Item = Annotation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn non_blank(name: &Option<String>) -> Option<&str> {
    name.as_deref().map(str::trim).filter(|name| !name.is_empty())
}

/// The service marker placed on a class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceAnnotation {
    name: Option<String>,
    marshaller: Option<String>,
}

impl ServiceAnnotation {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            marshaller: None,
        }
    }

    pub fn with_marshaller(mut self, marshaller: impl Into<String>) -> Self {
        self.marshaller = Some(marshaller.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        non_blank(&self.name)
    }

    pub fn marshaller(&self) -> Option<&str> {
        non_blank(&self.marshaller)
    }
}
