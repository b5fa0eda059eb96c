use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classify::{CallConvention, TypeSlot, classify};
use crate::descriptor::{MethodDescriptor, MethodInfo, ModellerConfig, ServiceDescriptor};
use crate::error::{ModelError, ModelWarning};
use crate::handler::{ResolvedTypes, Target, adapt};
use crate::marshal::Marshaller;
use crate::model::{AnnotatedMethod, RpcMarker, ServiceAnnotation, ServiceModel, Signature};
use crate::types::{Class, GenericResolver, Type, TypeRegistry};

/// Builds [`ServiceDescriptor`]s from service models.
#[derive(Debug, Clone, Default)]
pub struct ServiceModeller {
    config: ModellerConfig,
    types: Arc<TypeRegistry>,
}

/// The method being built, for resolution and error reporting.
struct Site<'a> {
    service: &'a str,
    method: &'a str,
    concrete: &'a Class,
    declaring: &'a Class,
    signature: &'a Signature,
}

impl ServiceModeller {
    pub fn new(config: ModellerConfig) -> Self {
        Self {
            config,
            types: Arc::default(),
        }
    }

    /// Set the type declarations used to find the service marker and to
    /// resolve generic method signatures.
    pub fn with_types(mut self, types: Arc<TypeRegistry>) -> Self {
        self.types = types;
        self
    }

    pub fn config(&self) -> &ModellerConfig {
        &self.config
    }

    /// Validate and adapt every marked method of `model`.
    ///
    /// Methods marked directly come first, then methods marked through
    /// another marker. Methods that are not public are left out with a
    /// warning. Any method that cannot be classified, or whose exposed
    /// name is taken, fails the whole service.
    pub fn build<S>(&self, model: &ServiceModel<S>) -> Result<ServiceDescriptor, ModelError>
    where
        S: Send + Sync + 'static,
    {
        let (class, annotation) = match model.service_annotation() {
            Some(annotation) => (model.class().clone(), Some(annotation)),
            None => self.types.annotated_service_class(model.class()),
        };
        let service = annotation
            .and_then(ServiceAnnotation::name)
            .unwrap_or_else(|| class.simple_name())
            .to_string();
        let service_marshaller =
            self.marshaller(&service, annotation.and_then(ServiceAnnotation::marshaller))?;

        let mut methods: Vec<MethodDescriptor> = Vec::new();
        let mut index = HashMap::default();
        let mut warnings = Vec::new();

        for (method, marker) in scan(model.methods()) {
            let shape = marker.shape;
            if !method.is_public() {
                warn!(
                    service = %service,
                    method = %method.name(),
                    shape = %shape,
                    "Skipping marked method that is not public"
                );
                warnings.push(ModelWarning::NotPublic {
                    service: service.clone(),
                    method: method.name().to_string(),
                    shape,
                });
                continue;
            }

            let name = marker.name.unwrap_or(method.name()).to_string();
            if let Some(existing) = index.get(&name).and_then(|&i: &usize| methods.get(i)) {
                return Err(if existing.shape() == shape {
                    ModelError::DuplicateMethod {
                        service,
                        method: name,
                    }
                } else {
                    ModelError::ConflictingMethod {
                        service,
                        method: name,
                        existing: existing.shape(),
                        conflicting: shape,
                    }
                });
            }

            let convention =
                classify(shape, method.signature()).map_err(|source| ModelError::Classification {
                    service: service.clone(),
                    method: method.name().to_string(),
                    shape,
                    source,
                })?;

            let site = Site {
                service: &service,
                method: &name,
                concrete: model.class(),
                declaring: method.declaring_class().unwrap_or(model.class()),
                signature: method.signature(),
            };
            let types = self.resolve_types(&site, method, convention)?;

            let marshaller = match method.annotations().marshaller() {
                Some(selected) => self.marshaller(&service, Some(selected))?,
                None => Arc::clone(&service_marshaller),
            };

            let info = MethodInfo {
                name: name.clone(),
                shape,
                request_type: types.request.clone(),
                response_type: types.response.clone(),
            };
            let target = Target::new(name.as_str(), method.body(), model.instance().clone());
            let handler = adapt(convention, target, types);
            let handler = method.interceptors().wrap(&info, handler);
            let handler = model.interceptors().wrap(&info, handler);

            info!(
                service = %service,
                method = %name,
                shape = %shape,
                convention = %convention,
                "Registered RPC method"
            );
            index.insert(name, methods.len());
            methods.push(MethodDescriptor {
                info,
                convention,
                handler,
                marshaller,
            });
        }

        info!(service = %service, methods = methods.len(), "Built service descriptor");
        Ok(ServiceDescriptor {
            name: service,
            class,
            methods,
            index,
            marshaller: service_marshaller,
            interceptors: model.interceptors().clone(),
            warnings,
        })
    }

    fn marshaller(&self, service: &str, name: Option<&str>) -> Result<Arc<dyn Marshaller>, ModelError> {
        self.config
            .marshallers
            .select(name)
            .ok_or_else(|| ModelError::UnknownMarshaller {
                service: service.to_string(),
                name: name
                    .unwrap_or(self.config.marshallers.default_name())
                    .to_string(),
            })
    }

    fn resolve_types<S>(
        &self,
        site: &Site<'_>,
        method: &AnnotatedMethod<S>,
        convention: CallConvention,
    ) -> Result<ResolvedTypes, ModelError> {
        let annotations = method.annotations();
        let request = match annotations.request_type() {
            Some(class) => class.clone(),
            None => self.resolve_slot(site, "request", convention.request_slot())?,
        };
        let response = match annotations.response_type() {
            Some(class) => class.clone(),
            None => self.resolve_slot(site, "response", convention.response_slot())?,
        };
        Ok(ResolvedTypes::new(request, response))
    }

    fn resolve_slot(
        &self,
        site: &Site<'_>,
        side: &'static str,
        slot: Option<TypeSlot>,
    ) -> Result<Class, ModelError> {
        let Some(slot) = slot else {
            return Ok(Class::empty());
        };
        let declared = match slot {
            TypeSlot::Param(i) => site.signature.params().get(i),
            TypeSlot::ParamArg(i) => site.signature.params().get(i).and_then(Type::first_argument),
            TypeSlot::Return => Some(site.signature.return_type()),
            TypeSlot::ReturnArg => site.signature.return_type().first_argument(),
        };

        let resolver = GenericResolver::new(&self.types);
        let (class, erased) = match declared {
            Some(ty) => {
                let resolved = resolver.resolve(site.concrete, site.declaring, &ty.raw(), ty);
                let erased = resolved.ty.has_variables();
                (resolved.raw, erased)
            }
            // a sink, future or stream without an element type
            None => (Class::any(), true),
        };

        if erased {
            let declared = declared.map_or_else(|| "an untyped container".to_string(), Type::to_string);
            if self.config.strict_types {
                return Err(ModelError::UnresolvedType {
                    service: site.service.to_string(),
                    method: site.method.to_string(),
                    side,
                    declared,
                });
            }
            debug!(
                service = %site.service,
                method = %site.method,
                side,
                declared = %declared,
                erased = %class,
                "Falling back to erased type"
            );
        }

        Ok(if class.is_void() { Class::empty() } else { class })
    }
}

/// Marked methods, direct markers first.
///
/// A method with both a direct and a carried marker is only taken in the
/// direct pass.
fn scan<S>(methods: &[AnnotatedMethod<S>]) -> impl Iterator<Item = (&AnnotatedMethod<S>, RpcMarker<'_>)> {
    let direct = methods
        .iter()
        .filter_map(|method| method.annotations().direct_rpc().map(|marker| (method, marker)));
    let meta = methods
        .iter()
        .filter(|method| method.annotations().direct_rpc().is_none())
        .filter_map(|method| method.annotations().meta_rpc().map(|marker| (method, marker)));
    direct.chain(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::CallShape;
    use crate::model::{Annotation, Args, Instance, Value, Visibility};
    use tonic::Status;
    use crate::types::TypeDecl;
    use pretty_assertions::assert_eq;

    struct Greeter;

    fn greet() -> AnnotatedMethod<Greeter> {
        AnnotatedMethod::new(
            "greet",
            Signature::new().param(Type::of::<String>()).returns(Type::of::<String>()),
            |_, mut args| {
                let name: String = args.request()?;
                Ok(Value::payload(format!("Hello {name}!")))
            },
        )
        .annotate(Annotation::unary())
    }

    fn model() -> ServiceModel<Greeter> {
        ServiceModel::new(Class::named("demo.Greeter"), Instance::singleton(Greeter))
    }

    fn names(descriptor: &ServiceDescriptor) -> Vec<&str> {
        descriptor.methods().iter().map(MethodDescriptor::name).collect()
    }

    #[test]
    fn test_service_name_defaults_to_simple_name() {
        let descriptor = ServiceModeller::default().build(&model().method(greet())).unwrap();
        assert_eq!(descriptor.name(), "demo.Greeter");
        assert_eq!(descriptor.marshaller().name(), "prost");

        let greet = descriptor.method("greet").unwrap();
        assert_eq!(greet.convention(), CallConvention::RequestResponse);
        assert_eq!(greet.info().request_type, Class::of::<String>());
        assert_eq!(greet.info().response_type, Class::of::<String>());
    }

    #[test]
    fn test_direct_markers_are_scanned_first() {
        let noop = |_: Arc<Greeter>, _: Args| -> Result<Value, Status> { Ok(Value::Unit) };
        let model = model()
            .method(AnnotatedMethod::new("meta", Signature::new(), noop).annotate(Annotation::unary()))
            .method(
                AnnotatedMethod::new("direct", Signature::new(), noop)
                    .annotate(Annotation::rpc(CallShape::Unary)),
            )
            .method(
                AnnotatedMethod::new("both", Signature::new(), noop)
                    .annotate(Annotation::unary().named("fromMeta"))
                    .annotate(Annotation::rpc(CallShape::Unary)),
            )
            .method(AnnotatedMethod::new("plain", Signature::new(), noop));

        let descriptor = ServiceModeller::default().build(&model).unwrap();
        assert_eq!(names(&descriptor), vec!["direct", "both", "meta"]);
    }

    #[test]
    fn test_private_method_is_excluded_with_warning() {
        let model = model()
            .method(greet())
            .method(
                AnnotatedMethod::new("hidden", Signature::new(), |_, _| Ok(Value::Unit))
                    .annotate(Annotation::unary())
                    .visibility(Visibility::Private),
            );

        let descriptor = ServiceModeller::default().build(&model).unwrap();
        assert_eq!(names(&descriptor), vec!["greet"]);
        assert_eq!(
            descriptor.warnings(),
            &[ModelWarning::NotPublic {
                service: "demo.Greeter".into(),
                method: "hidden".into(),
                shape: CallShape::Unary,
            }]
        );
    }

    #[test]
    fn test_explicit_name_wins() {
        let model = model().method(
            AnnotatedMethod::new(
                "say_hello",
                Signature::new().returns(Type::of::<String>()),
                |_, _| Ok(Value::payload(String::new())),
            )
            .annotate(Annotation::unary().named("SayHello")),
        );

        let descriptor = ServiceModeller::default().build(&model).unwrap();
        assert_eq!(names(&descriptor), vec!["SayHello"]);
    }

    #[test]
    fn test_duplicate_and_conflicting_names() {
        let twice = model().method(greet()).method(greet());
        let err = ServiceModeller::default().build(&twice).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateMethod { ref method, .. } if method == "greet"));

        let stream = AnnotatedMethod::new(
            "other",
            Signature::new().returns(Type::stream_of(Type::of::<String>())),
            |_, _| Ok(Value::iter(Vec::<String>::new())),
        )
        .annotate(Annotation::server_streaming().named("greet"));
        let conflicting = model().method(greet()).method(stream);
        let err = ServiceModeller::default().build(&conflicting).unwrap_err();
        assert!(matches!(
            err,
            ModelError::ConflictingMethod {
                existing: CallShape::Unary,
                conflicting: CallShape::ServerStreaming,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_method_marshaller() {
        let model = model().method(greet().annotate(Annotation::Marshaller("json".into())));
        let err = ServiceModeller::default().build(&model).unwrap_err();
        assert!(matches!(err, ModelError::UnknownMarshaller { ref name, .. } if name == "json"));
    }

    #[test]
    fn test_service_marker_found_on_interface() {
        let api = Class::named("demo.GreeterApi");
        let types = TypeRegistry::new()
            .with(TypeDecl::new(api.clone()).service(ServiceAnnotation::named("Greetings")))
            .with(TypeDecl::new(Class::named("demo.Greeter")).implements(api.clone()));

        let descriptor = ServiceModeller::default()
            .with_types(Arc::new(types))
            .build(&model().method(greet()))
            .unwrap();
        assert_eq!(descriptor.name(), "Greetings");
        assert_eq!(descriptor.class(), &api);
    }

    #[test]
    fn test_void_future_response_is_empty() {
        let model = model().method(
            AnnotatedMethod::new(
                "ping",
                Signature::new().returns(Type::future_of(Type::void())),
                |_, _| Ok(Value::future(async { Ok(()) })),
            )
            .annotate(Annotation::unary()),
        );

        let descriptor = ServiceModeller::default().build(&model).unwrap();
        let info = descriptor.method("ping").unwrap().info();
        assert_eq!(info.request_type, Class::empty());
        assert_eq!(info.response_type, Class::empty());
    }
}
