//! Resolution path of the container.
//!
//! A request is turned into a [Contract] and resolved in four steps:
//!
//! * Lookup: the registration is searched in the scope of the container then in the scopes of
//!   its parents. Closed generic types fall back to the registration of their open definition,
//!   and unregistered constructible types get an implicit registration in the root scope.
//! * Pipeline: the pipeline of the registration is built on first use and cached.
//! * Execution: the pipeline runs in a new frame linked to the frame of the dependent instance.
//! * Lifetime: the lifetime manager decides whether the instance is stored for later requests.
//!
//! Sequence types (`Vec<Arc<T>>` and `Box<[Arc<T>]>`) are resolved from all the
//! registrations of their element type.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::container::Container;
use crate::context::{find_cycle, PerResolve, PipelineContext, Resolver};
use crate::contract::Contract;
use crate::error::{ResolutionError, ResolutionErrorKind};
use crate::lifetime::LifetimeScope;
use crate::object::Object;
use crate::overrides::ResolverOverride;
use crate::pipeline::{Pipeline, Stage};
use crate::processors::{build_stages, BuildPlan};
use crate::registration::{Category, Factory, RegistrationKind, RegistrationManager};
use crate::types::{Reflect, Type, TypeKind};

impl Container {
    /// Resolve an instance of `ty`, registered under `name`.
    ///
    /// The overrides apply to the whole object graph built by this call.
    pub fn resolve(
        &self,
        ty: &Type,
        name: Option<&str>,
        overrides: &[ResolverOverride],
    ) -> Result<Object, ResolutionError> {
        let contract = Contract::new(ty.clone(), name);
        let per_resolve = PerResolve::default();
        self.resolve_in(&contract, None, overrides, &per_resolve)
    }

    pub fn resolve_as<T: ?Sized + Reflect + Send + Sync>(
        &self,
        name: Option<&str>,
    ) -> Result<Arc<T>, ResolutionError> {
        self.resolve_with::<T>(name, &[])
    }

    pub fn resolve_with<T: ?Sized + Reflect + Send + Sync>(
        &self,
        name: Option<&str>,
        overrides: &[ResolverOverride],
    ) -> Result<Arc<T>, ResolutionError> {
        let ty = T::type_of();
        let object = self.resolve(&ty, name, overrides)?;
        downcast::<T>(&Contract::new(ty, name), object)
    }

    /// Instances of every registration of `T`, the default one included
    pub fn resolve_all<T: ?Sized + Reflect + Send + Sync>(&self) -> Result<Vec<Arc<T>>, ResolutionError> {
        let element = T::type_of();
        let sequence = self.resolve(&Type::enumerable(element.clone()), None, &[])?;
        let contract = Contract::new(element, None);
        let items = sequence.items().unwrap_or_default();
        items
            .iter()
            .map(|item| downcast::<T>(&contract, item.clone()))
            .collect()
    }

    /// Resolve without failing: unresolvable requests give `None`
    pub fn get_service(&self, ty: &Type) -> Option<Object> {
        match self.resolve(ty, None, &[]) {
            Ok(object) => Some(object),
            Err(error) => {
                trace!(%error, "service not available");
                None
            }
        }
    }

    #[cfg(feature = "tokio")]
    /// Resolve on the blocking thread pool of the tokio runtime
    pub async fn resolve_async(
        &self,
        ty: Type,
        name: Option<String>,
        overrides: Vec<ResolverOverride>,
    ) -> Result<Object, crate::error::WiringError> {
        let container = self.clone();
        let object = tokio::task::spawn_blocking(move || {
            container.resolve(&ty, name.as_deref(), &overrides)
        })
        .await??;
        Ok(object)
    }

    /// Check if the container can provide the contract, without building anything
    pub fn can_resolve(&self, contract: &Contract) -> bool {
        let ty = contract.ty();
        match ty.kind() {
            TypeKind::Enumerable => return true,
            TypeKind::Array => return ty.rank() == 1,
            TypeKind::GenericDefinition => return false,
            _ => {}
        }
        self.is_explicit(contract) || ty.is_constructible()
    }

    /// Check for a registration of the contract, direct or through its open definition
    fn is_explicit(&self, contract: &Contract) -> bool {
        let scope = self.scope();
        if scope.contains(contract) {
            return true;
        }
        match contract.ty().generic_definition_of() {
            Some(definition) => {
                let generic = contract.with_type(definition.clone());
                scope.contains(&generic) || scope.contains(&generic.unnamed())
            }
            None => false,
        }
    }

    pub(crate) fn resolve_in(
        &self,
        contract: &Contract,
        parent: Option<&PipelineContext<'_>>,
        overrides: &[ResolverOverride],
        per_resolve: &PerResolve,
    ) -> Result<Object, ResolutionError> {
        if self.is_disposed() {
            return Err(ResolutionError::new(contract, ResolutionErrorKind::Disposed));
        }
        self.resolve_contract(contract, parent, overrides, per_resolve)
            .map_err(|mut error| {
                if self.options().diagnostics {
                    error.push_frame(format!("while resolving {}", contract));
                }
                error
            })
    }

    fn resolve_contract(
        &self,
        contract: &Contract,
        parent: Option<&PipelineContext<'_>>,
        overrides: &[ResolverOverride],
        per_resolve: &PerResolve,
    ) -> Result<Object, ResolutionError> {
        let ty = contract.ty();
        match ty.kind() {
            TypeKind::Enumerable | TypeKind::Array => {
                return self.resolve_sequence(contract, parent, overrides, per_resolve)
            }
            TypeKind::GenericDefinition => {
                return Err(ResolutionError::new(
                    contract,
                    ResolutionErrorKind::OpenGeneric(ty.name().to_string()),
                ))
            }
            _ => {}
        }

        let manager = self
            .lookup(contract)
            .ok_or_else(|| ResolutionError::new(contract, ResolutionErrorKind::NotResolvable))?;

        if let Some(path) = find_cycle(parent, contract, &manager) {
            debug!(%path, "circular dependency");
            return Err(ResolutionError::new(
                contract,
                ResolutionErrorKind::CircularDependency(path),
            ));
        }

        let lifetime = manager.lifetime().clone();
        let scope = LifetimeScope::new(self.id(), contract, per_resolve);
        let object = match lifetime.get_value(&scope) {
            Some(object) => object,
            None => {
                let pipeline = manager.pipeline(|| self.build_pipeline(contract, &manager))?;
                lifetime.get_or_create(&scope, &mut || {
                    let mut context = PipelineContext::new(
                        self,
                        contract.clone(),
                        Some(manager.clone()),
                        overrides,
                        per_resolve,
                        parent,
                    );
                    pipeline.execute(&mut context);
                    context.finish()
                })?
            }
        };
        self.cast(contract, &manager, object)
    }

    /// Find the registration of a contract, binding generics and creating implicit
    /// registrations when needed.
    ///
    /// Each scope is searched for the closed contract, then for its generic definition (named,
    /// then unnamed), before falling back to the parent scope.
    fn lookup(&self, contract: &Contract) -> Option<Arc<RegistrationManager>> {
        let generics = match contract.ty().generic_definition_of() {
            Some(definition) => {
                let generic = contract.with_type(definition.clone());
                let mut generics = vec![generic.clone()];
                if contract.name().is_some() {
                    generics.push(generic.unnamed());
                }
                generics
            }
            None => Vec::new(),
        };

        for scope in self.scopes() {
            if let Some(manager) = scope
                .get(contract)
                .filter(|m| m.category() != Category::Uninitialized)
            {
                return Some(manager);
            }
            for generic in &generics {
                if scope.get(generic).is_some() {
                    if let Some(manager) = scope.get_bound_generic(contract, generic) {
                        return Some(manager);
                    }
                }
            }
        }

        if contract.ty().is_constructible() {
            let manager = self
                .root_scope()
                .get_cache(contract, RegistrationManager::implicit);
            trace!(%contract, "implicit registration");
            return Some(manager);
        }
        None
    }

    /// Registration added for the contract itself, in this container or a parent
    fn explicit(&self, contract: &Contract) -> Option<Arc<RegistrationManager>> {
        self.scopes()
            .filter_map(|scope| scope.get(contract))
            .find(|manager| manager.category() != Category::Uninitialized)
    }

    fn build_pipeline(
        &self,
        contract: &Contract,
        manager: &RegistrationManager,
    ) -> Result<Pipeline, ResolutionError> {
        let executor = self.options().build_mode.executor();
        trace!(%contract, executor = executor.name(), "building pipeline");
        let stages = match manager.kind() {
            RegistrationKind::Uninitialized => self.member_stages(contract, contract.ty(), manager)?,
            RegistrationKind::Type(mapped) => {
                let mapped = self.close_mapping(contract, mapped)?;
                let target = contract.with_type(mapped.clone());
                let redirect = mapped != *contract.ty()
                    && self
                        .explicit(&target)
                        .map_or(false, |other| !std::ptr::eq(&*other, manager));
                if redirect {
                    vec![redirect_stage(target)]
                } else {
                    self.member_stages(contract, &mapped, manager)?
                }
            }
            RegistrationKind::Instance => vec![released_stage()],
            RegistrationKind::Factory(factory) => vec![factory_stage(factory.clone())],
            RegistrationKind::Internal => vec![container_stage()],
        };
        Ok(executor.build(stages))
    }

    fn member_stages(
        &self,
        contract: &Contract,
        ty: &Type,
        manager: &RegistrationManager,
    ) -> Result<Vec<Stage>, ResolutionError> {
        let plan = BuildPlan {
            container: self,
            contract,
            ty,
            members: manager.members(),
        };
        build_stages(&plan, &self.options().stages)
    }

    /// Mapped type, closed over the type arguments of the contract if needed
    fn close_mapping(&self, contract: &Contract, mapped: &Type) -> Result<Type, ResolutionError> {
        if !mapped.is_generic_definition() {
            return Ok(mapped.clone());
        }
        mapped
            .make_generic(contract.ty().generic_arguments())
            .ok_or_else(|| {
                ResolutionError::new(
                    contract,
                    ResolutionErrorKind::OpenGeneric(mapped.name().to_string()),
                )
            })
    }

    /// Convert a built instance to the type of the contract
    fn cast(
        &self,
        contract: &Contract,
        manager: &RegistrationManager,
        object: Object,
    ) -> Result<Object, ResolutionError> {
        if object.key() == contract.ty().key() {
            return Ok(object);
        }
        let source = match manager.kind() {
            RegistrationKind::Type(mapped) => self.close_mapping(contract, mapped).ok(),
            RegistrationKind::Uninitialized => Some(contract.ty().clone()),
            _ => None,
        };
        source
            .and_then(|source| source.cast(&object, contract.ty()))
            .ok_or_else(|| {
                ResolutionError::new(
                    contract,
                    ResolutionErrorKind::NotAssignable {
                        from: object.type_name().to_string(),
                        to: contract.ty().name().to_string(),
                    },
                )
            })
    }

    fn resolve_sequence(
        &self,
        contract: &Contract,
        parent: Option<&PipelineContext<'_>>,
        overrides: &[ResolverOverride],
        per_resolve: &PerResolve,
    ) -> Result<Object, ResolutionError> {
        let ty = contract.ty();
        let element = ty
            .element()
            .ok_or_else(|| ResolutionError::new(contract, ResolutionErrorKind::NotResolvable))?;
        let named_only = ty.kind() == TypeKind::Array;
        if named_only && ty.rank() != 1 {
            return Err(ResolutionError::new(
                contract,
                ResolutionErrorKind::UnsupportedArrayRank(ty.rank()),
            ));
        }

        let items = self
            .sequence_contracts(element, named_only)
            .iter()
            .map(|item| self.resolve_in(item, parent, overrides, per_resolve))
            .collect::<Result<Vec<_>, _>>()?;
        trace!(%contract, items = items.len(), "resolved sequence");
        Ok(Object::sequence(ty, items))
    }

    /// Contracts of the registrations of `element`, parents first. A child registration
    /// replaces the parent registration with the same name.
    fn sequence_contracts(&self, element: &Type, named_only: bool) -> Vec<Contract> {
        let mut scopes: Vec<_> = self.scopes().collect();
        scopes.reverse();

        let mut contracts: Vec<Contract> = Vec::new();
        for scope in scopes {
            let mut found: Vec<Contract> = scope
                .registrations_of(element)
                .into_iter()
                .map(|(contract, _)| contract)
                .collect();
            if let Some(definition) = element.generic_definition_of() {
                found.extend(
                    scope
                        .registrations_of(definition)
                        .into_iter()
                        .map(|(generic, _)| generic.with_type(element.clone())),
                );
            }
            for contract in found {
                if named_only && contract.name().is_none() {
                    continue;
                }
                if !contracts.contains(&contract) {
                    contracts.push(contract);
                }
            }
        }
        contracts
    }
}

fn downcast<T: ?Sized + 'static>(contract: &Contract, object: Object) -> Result<Arc<T>, ResolutionError> {
    object.downcast::<T>().ok_or_else(|| {
        ResolutionError::new(
            contract,
            ResolutionErrorKind::NotAssignable {
                from: object.type_name().to_string(),
                to: std::any::type_name::<T>().to_string(),
            },
        )
    })
}

/// Resolve the mapped type through its own registration
fn redirect_stage(target: Contract) -> Stage {
    Arc::new(move |context: &mut PipelineContext<'_>| match context.resolve(&target) {
        Ok(object) => context.existing = Some(object),
        Err(error) => context.fail_with(error),
    })
}

fn factory_stage(factory: Factory) -> Stage {
    Arc::new(move |context: &mut PipelineContext<'_>| {
        let result = factory(&Resolver::new(context));
        match result {
            Ok(object) => context.existing = Some(object),
            Err(error) => {
                let error = ResolutionError::construction(context.contract(), error);
                context.fail_with(error);
            }
        }
    })
}

/// Instance registrations only get here once the lifetime manager released the instance
fn released_stage() -> Stage {
    Arc::new(|context: &mut PipelineContext<'_>| context.fail(ResolutionErrorKind::NotResolvable))
}

/// Hands out a strong handle on the resolving container
fn container_stage() -> Stage {
    Arc::new(|context: &mut PipelineContext<'_>| {
        let container = context.container().clone();
        context.existing = Some(Object::from_value(container));
    })
}
