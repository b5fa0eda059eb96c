use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{Class, ClassAndType, Type, TypeDecl, TypeRegistry, TypeVar};

/// Upper bound on hierarchy depth; deeper (or cyclic) declarations stop the walk.
pub(crate) const MAX_DEPTH: usize = 64;

type Substitutions = HashMap<Arc<str>, Type, ahash::RandomState>;

/// Resolves type variables declared on generic ancestors into the concrete
/// classes a particular service supplies for them.
///
/// Resolution never fails. When a variable cannot be traced to a concrete
/// argument the erased class passed in by the caller is returned instead;
/// explicit request/response overrides exist for exactly that case.
#[derive(Debug, Clone, Copy)]
pub struct GenericResolver<'a> {
    types: &'a TypeRegistry,
}

impl<'a> GenericResolver<'a> {
    pub fn new(types: &'a TypeRegistry) -> Self {
        Self { types }
    }

    /// Resolve `generic`, declared on `declaring`, as seen from `concrete`.
    ///
    /// `raw` is the erased class to fall back to.
    pub fn resolve(
        &self,
        concrete: &Class,
        declaring: &Class,
        raw: &Class,
        generic: &Type,
    ) -> ClassAndType {
        match generic {
            Type::Var(var) => {
                if let Some(resolved) = self.resolve_variable(concrete, declaring, var) {
                    return resolved;
                }
            }
            Type::Generic(generic_raw, args) => {
                let mut modified = false;
                let resolved: Vec<Type> = args
                    .iter()
                    .map(|arg| {
                        let ct = self.resolve(concrete, declaring, &arg.raw(), arg);
                        if ct.ty != *arg {
                            modified = true;
                        }
                        ct.ty
                    })
                    .collect();
                if modified {
                    return ClassAndType::with_type(
                        generic_raw.clone(),
                        Type::Generic(generic_raw.clone(), resolved),
                    );
                }
            }
            Type::Array(component) => {
                let ct = self.resolve(concrete, declaring, &component.raw(), component);
                if ct.ty != **component {
                    return ClassAndType::of(Class::array_of(ct.raw));
                }
            }
            Type::Class(_) => {}
        }
        ClassAndType::with_type(raw.clone(), generic.clone())
    }

    /// Trace `var`, declared on `declaring`, up from `concrete`.
    ///
    /// Returns `None` when the hierarchy never supplies a concrete argument.
    pub fn resolve_variable(
        &self,
        concrete: &Class,
        declaring: &Class,
        var: &TypeVar,
    ) -> Option<ClassAndType> {
        self.search_class(concrete, declaring, var, &Substitutions::default(), 0)
    }

    fn search_class(
        &self,
        class: &Class,
        declaring: &Class,
        var: &TypeVar,
        subs: &Substitutions,
        depth: usize,
    ) -> Option<ClassAndType> {
        if depth > MAX_DEPTH {
            return None;
        }
        let decl = self.types.get(class)?;

        // The whole superclass chain is explored before any interface.
        if let Some(superclass) = decl.superclass() {
            if let Some(found) = self.search_supertype(superclass, declaring, var, subs, depth + 1)
            {
                return Some(found);
            }
        }
        decl.interfaces()
            .iter()
            .find_map(|interface| self.search_supertype(interface, declaring, var, subs, depth + 1))
    }

    fn search_supertype(
        &self,
        supertype: &Type,
        declaring: &Class,
        var: &TypeVar,
        subs: &Substitutions,
        depth: usize,
    ) -> Option<ClassAndType> {
        let (raw, args) = match supertype {
            Type::Generic(raw, args) => (raw.clone(), args.as_slice()),
            other => (other.raw(), &[][..]),
        };

        let params = self.types.get(&raw).map(TypeDecl::params).unwrap_or(&[]);
        let mut level = Substitutions::default();
        for (param, arg) in params.iter().zip(args) {
            let substituted = substitute(arg, subs);
            if !matches!(substituted, Type::Var(_)) {
                level.insert(Arc::clone(param), substituted);
            }
        }

        if raw == *declaring {
            return level.get(var.name()).and_then(concrete_class);
        }
        self.search_class(&raw, declaring, var, &level, depth)
    }
}

/// Replace every variable bound in `subs`; unbound variables stay as they are.
fn substitute(ty: &Type, subs: &Substitutions) -> Type {
    match ty {
        Type::Var(var) => subs.get(var.name()).cloned().unwrap_or_else(|| ty.clone()),
        Type::Generic(raw, args) => {
            Type::Generic(raw.clone(), args.iter().map(|a| substitute(a, subs)).collect())
        }
        Type::Array(component) => Type::Array(Box::new(substitute(component, subs))),
        Type::Class(_) => ty.clone(),
    }
}

/// The concrete class backing the argument found at the declaring level.
fn concrete_class(ty: &Type) -> Option<ClassAndType> {
    match ty {
        Type::Class(class) => Some(ClassAndType::of(class.clone())),
        Type::Generic(raw, _) => Some(ClassAndType::with_type(raw.clone(), ty.clone())),
        Type::Array(component) => match component.as_ref() {
            Type::Class(class) => Some(ClassAndType::of(Class::array_of(class.clone()))),
            Type::Generic(raw, _) => Some(ClassAndType::with_type(
                Class::array_of(raw.clone()),
                ty.clone(),
            )),
            _ => None,
        },
        Type::Var(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn template() -> Class {
        Class::named("Template")
    }

    /// `Template<Req, Resp>` implemented by `Impl` with concrete arguments.
    fn simple_registry(req: Type, resp: Type) -> TypeRegistry {
        TypeRegistry::new()
            .with(TypeDecl::new(template()).param("Req").param("Resp"))
            .with(
                TypeDecl::new(Class::named("Impl"))
                    .extends(Type::generic(template(), [req, resp])),
            )
    }

    #[test]
    fn test_resolves_direct_superclass_arguments() {
        let types = simple_registry(Type::of::<String>(), Type::of::<u32>());
        let resolver = GenericResolver::new(&types);
        let concrete = Class::named("Impl");

        let req = resolver.resolve(&concrete, &template(), &Class::any(), &Type::var("Req"));
        let resp = resolver.resolve(&concrete, &template(), &Class::any(), &Type::var("Resp"));

        assert_eq!(req.raw, Class::of::<String>());
        assert_eq!(resp.raw, Class::of::<u32>());
    }

    #[test]
    fn test_resolves_through_renamed_variables() {
        // Base<A>, Mid<B> extends Base<B>, Leaf<C> extends Mid<C>, Impl extends Leaf<String>
        let base = Class::named("Base");
        let mid = Class::named("Mid");
        let leaf = Class::named("Leaf");
        let types = TypeRegistry::new()
            .with(TypeDecl::new(base.clone()).param("A"))
            .with(
                TypeDecl::new(mid.clone())
                    .param("B")
                    .extends(Type::generic(base.clone(), [Type::var("B")])),
            )
            .with(
                TypeDecl::new(leaf.clone())
                    .param("C")
                    .extends(Type::generic(mid, [Type::var("C")])),
            )
            .with(
                TypeDecl::new(Class::named("Impl"))
                    .extends(Type::generic(leaf, [Type::of::<String>()])),
            );

        let resolved = GenericResolver::new(&types)
            .resolve_variable(&Class::named("Impl"), &base, &TypeVar::new("A"))
            .unwrap();
        assert_eq!(resolved.raw, Class::of::<String>());
    }

    #[test]
    fn test_resolves_through_interface() {
        let api = Class::named("Api");
        let types = TypeRegistry::new()
            .with(TypeDecl::new(api.clone()).param("T"))
            .with(
                TypeDecl::new(Class::named("Impl"))
                    .implements(Type::generic(api.clone(), [Type::of::<u64>()])),
            );

        let resolved = GenericResolver::new(&types)
            .resolve_variable(&Class::named("Impl"), &api, &TypeVar::new("T"))
            .unwrap();
        assert_eq!(resolved.raw, Class::of::<u64>());
    }

    #[test]
    fn test_class_path_wins_over_interface_path() {
        let base = Class::named("Base");
        let mid = Class::named("Mid");
        let types = TypeRegistry::new()
            .with(TypeDecl::new(base.clone()).param("T"))
            .with(
                TypeDecl::new(mid.clone())
                    .extends(Type::generic(base.clone(), [Type::of::<String>()])),
            )
            .with(
                TypeDecl::new(Class::named("Impl"))
                    .extends(mid)
                    .implements(Type::generic(base.clone(), [Type::of::<u8>()])),
            );

        let resolved = GenericResolver::new(&types)
            .resolve_variable(&Class::named("Impl"), &base, &TypeVar::new("T"))
            .unwrap();
        assert_eq!(resolved.raw, Class::of::<String>());
    }

    #[test]
    fn test_rebuilds_parameterized_types() {
        let types = simple_registry(Type::of::<String>(), Type::of::<u32>());
        let generic = Type::sink_of(Type::var("Resp"));

        let resolved = GenericResolver::new(&types).resolve(
            &Class::named("Impl"),
            &template(),
            &Class::sink(),
            &generic,
        );

        assert_eq!(resolved.raw, Class::sink());
        assert_eq!(resolved.ty, Type::sink_of(Type::of::<u32>()));
    }

    #[test]
    fn test_rebuilds_array_of_variable() {
        let types = simple_registry(Type::of::<String>(), Type::of::<u32>());
        let generic = Type::array(Type::var("Req"));

        let resolved = GenericResolver::new(&types).resolve(
            &Class::named("Impl"),
            &template(),
            &generic.raw(),
            &generic,
        );

        assert_eq!(resolved.raw, Class::array_of(Class::of::<String>()));
    }

    #[test]
    fn test_array_argument_at_declaring_level() {
        let types = simple_registry(Type::array(Type::of::<u8>()), Type::of::<u32>());

        let resolved = GenericResolver::new(&types)
            .resolve_variable(&Class::named("Impl"), &template(), &TypeVar::new("Req"))
            .unwrap();
        assert_eq!(resolved.raw, Class::array_of(Class::of::<u8>()));
    }

    #[test]
    fn test_parameterized_argument_keeps_its_type() {
        let list = Class::named("List");
        let types = simple_registry(
            Type::generic(list.clone(), [Type::of::<String>()]),
            Type::of::<u32>(),
        );

        let resolved = GenericResolver::new(&types)
            .resolve_variable(&Class::named("Impl"), &template(), &TypeVar::new("Req"))
            .unwrap();
        assert_eq!(resolved.raw, list);
        assert_eq!(resolved.ty, Type::generic(Class::named("List"), [Type::of::<String>()]));
    }

    #[test]
    fn test_unresolved_variable_falls_back_to_erased_class() {
        // Lenient by default: no declarations means the erased class comes back.
        let types = TypeRegistry::new();
        let resolver = GenericResolver::new(&types);

        let plain = resolver.resolve(&Class::named("Impl"), &template(), &Class::any(), &Type::var("Req"));
        assert_eq!(plain.raw, Class::any());
        assert_eq!(plain.ty, Type::var("Req"));

        let bounded = Type::Var(TypeVar::new("Req").bounded(Class::of::<String>()));
        let resolved = resolver.resolve(&Class::named("Impl"), &template(), &bounded.raw(), &bounded);
        assert_eq!(resolved.raw, Class::of::<String>());
    }

    #[test]
    fn test_variable_left_open_by_hierarchy() {
        // Impl<X> extends Template<X, u32>: Req stays open.
        let types = TypeRegistry::new()
            .with(TypeDecl::new(template()).param("Req").param("Resp"))
            .with(
                TypeDecl::new(Class::named("Impl"))
                    .param("X")
                    .extends(Type::generic(template(), [Type::var("X"), Type::of::<u32>()])),
            );
        let resolver = GenericResolver::new(&types);

        assert!(resolver
            .resolve_variable(&Class::named("Impl"), &template(), &TypeVar::new("Req"))
            .is_none());
        assert_eq!(
            resolver
                .resolve_variable(&Class::named("Impl"), &template(), &TypeVar::new("Resp"))
                .map(|ct| ct.raw),
            Some(Class::of::<u32>())
        );
    }

    #[test]
    fn test_cyclic_declarations_terminate() {
        let a = Class::named("A");
        let b = Class::named("B");
        let types = TypeRegistry::new()
            .with(TypeDecl::new(a.clone()).extends(b.clone()))
            .with(TypeDecl::new(b.clone()).extends(a.clone()));

        let resolved = GenericResolver::new(&types).resolve(
            &a,
            &template(),
            &Class::any(),
            &Type::var("T"),
        );
        assert_eq!(resolved.raw, Class::any());
    }
}
