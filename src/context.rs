//! Resolution frames.
//!
//! Each resolution step (the requested contract and every nested dependency) runs in its own
//! [PipelineContext], living on the stack of the resolve call. Frames link to the frame of the
//! dependent instance, which gives the path used for cycle detection and error traces.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::container::Container;
use crate::contract::Contract;
use crate::error::{ResolutionError, ResolutionErrorKind};
use crate::injection::InjectionValue;
use crate::object::Object;
use crate::overrides::{self, ResolverOverride};
use crate::registration::RegistrationManager;
use crate::types::{DefaultValue, Reflect, Type};

pub(crate) type PerResolve = RefCell<FxHashMap<Contract, Object>>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemberKind {
    /// Constructor or method parameter
    Parameter,
    Field,
    Property,
}

/// Import instruction of a single member, decided when the pipeline is built
#[derive(Clone, Debug)]
pub struct ImportInfo {
    kind: MemberKind,
    name: Arc<str>,
    ty: Type,
    declaring: Type,
    contract: Contract,
    value: Option<InjectionValue>,
    allow_default: bool,
    default: DefaultValue,
    description: String,
}

impl ImportInfo {
    pub fn new(kind: MemberKind, name: &str, ty: Type, declaring: Type, contract: Contract) -> Self {
        let description = match kind {
            MemberKind::Parameter => format!("parameter `{}` of {}", name, declaring),
            MemberKind::Field => format!("field `{}.{}`", declaring, name),
            MemberKind::Property => format!("property `{}.{}`", declaring, name),
        };
        Self {
            kind,
            name: name.into(),
            ty,
            declaring,
            contract,
            value: None,
            allow_default: false,
            default: DefaultValue::Absent,
            description,
        }
    }

    /// Use an explicitly injected value instead of the member contract
    pub fn with_value(mut self, value: Option<InjectionValue>) -> Self {
        self.value = value;
        self
    }

    /// Fall back to `default` when the dependency can not be resolved
    pub fn with_default(mut self, allow: bool, default: DefaultValue) -> Self {
        self.allow_default = allow;
        self.default = default;
        self
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = description;
        self
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type of the member
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Type owning the member
    pub fn declaring(&self) -> &Type {
        &self.declaring
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    pub fn allow_default(&self) -> bool {
        self.allow_default
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn default_value(&self) -> Option<Object> {
        match &self.default {
            DefaultValue::Value(object) => Some(object.clone()),
            DefaultValue::Absent | DefaultValue::Null => None,
        }
    }
}

/// Frame of one resolution step
pub struct PipelineContext<'a> {
    container: &'a Container,
    contract: Contract,
    registration: Option<Arc<RegistrationManager>>,
    overrides: &'a [ResolverOverride],
    per_resolve: &'a PerResolve,
    parent: Option<&'a PipelineContext<'a>>,
    error: Option<ResolutionError>,
    /// Instance under construction
    pub(crate) target: Option<Box<dyn Any + Send + Sync>>,
    /// Finished instance
    pub(crate) existing: Option<Object>,
}

impl<'a> PipelineContext<'a> {
    pub(crate) fn new(
        container: &'a Container,
        contract: Contract,
        registration: Option<Arc<RegistrationManager>>,
        overrides: &'a [ResolverOverride],
        per_resolve: &'a PerResolve,
        parent: Option<&'a PipelineContext<'a>>,
    ) -> Self {
        Self {
            container,
            contract,
            registration,
            overrides,
            per_resolve,
            parent,
            error: None,
            target: None,
            existing: None,
        }
    }

    pub fn container(&self) -> &'a Container {
        self.container
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    pub fn registration(&self) -> Option<&Arc<RegistrationManager>> {
        self.registration.as_ref()
    }

    pub fn parent(&self) -> Option<&'a PipelineContext<'a>> {
        self.parent
    }

    pub fn overrides(&self) -> &'a [ResolverOverride] {
        self.overrides
    }

    pub fn is_faulted(&self) -> bool {
        self.error.is_some()
    }

    /// Record a failure, the first one is kept
    pub fn fail(&mut self, kind: ResolutionErrorKind) {
        let error = ResolutionError::new(&self.contract, kind);
        self.fail_with(error);
    }

    pub fn fail_with(&mut self, error: ResolutionError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Outcome of the pipeline run in this frame
    pub(crate) fn finish(mut self) -> Result<Object, ResolutionError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        match self.existing.take() {
            Some(object) => Ok(object),
            None => Err(ResolutionError::new(
                &self.contract,
                ResolutionErrorKind::NotResolvable,
            )),
        }
    }

    /// Resolve a dependency in a nested frame
    pub fn resolve(&self, contract: &Contract) -> Result<Object, ResolutionError> {
        self.container
            .resolve_in(contract, Some(self), self.overrides, self.per_resolve)
    }

    /// Value of an import: override, explicit value, contract resolution or default
    pub(crate) fn import(&self, info: &ImportInfo) -> Result<Option<Object>, ResolutionError> {
        if let Some(found) = overrides::find(self.overrides, info) {
            return self.import_value(info, found.value(), true);
        }
        match &info.value {
            Some(value) => self.import_value(info, value, false),
            None => self.import_contract(info, info.contract(), info.allow_default()),
        }
    }

    fn import_value(
        &self,
        info: &ImportInfo,
        value: &InjectionValue,
        checked: bool,
    ) -> Result<Option<Object>, ResolutionError> {
        match value {
            InjectionValue::Value(object) => {
                // explicit values are checked when the pipeline is built
                if checked && object.key() != info.ty().key() {
                    return Err(self.incompatible(
                        info,
                        format!("a `{}` was supplied", object.type_name()),
                    ));
                }
                Ok(Some(object.clone()))
            }
            InjectionValue::Resolve { ty, name } => {
                let contract = Contract::with_shared_name(
                    ty.clone().unwrap_or_else(|| info.ty().clone()),
                    name.clone(),
                );
                self.import_contract(info, &contract, false)
            }
            InjectionValue::Optional { ty, name } => {
                let contract = Contract::with_shared_name(
                    ty.clone().unwrap_or_else(|| info.ty().clone()),
                    name.clone(),
                );
                self.import_contract(info, &contract, true)
            }
            InjectionValue::Default => Ok(info.default_value()),
        }
    }

    fn import_contract(
        &self,
        info: &ImportInfo,
        contract: &Contract,
        allow_default: bool,
    ) -> Result<Option<Object>, ResolutionError> {
        match self.resolve(contract) {
            Ok(object) if object.key() == info.ty().key() => Ok(Some(object)),
            Ok(object) => contract
                .ty()
                .cast(&object, info.ty())
                .map(Some)
                .ok_or_else(|| {
                    self.incompatible(info, format!("`{}` is not a `{}`", contract.ty(), info.ty()))
                }),
            Err(error) if allow_default && !error.is_circular() => Ok(info.default_value()),
            Err(mut error) => {
                if self.container.options().diagnostics {
                    error.push_frame(format!("for {}", info.description()));
                }
                Err(error)
            }
        }
    }

    fn incompatible(&self, info: &ImportInfo, reason: String) -> ResolutionError {
        ResolutionError::new(
            &self.contract,
            ResolutionErrorKind::IncompatibleInjection {
                member: info.description().to_string(),
                reason,
            },
        )
    }

    /// Path of contracts from the root request to this frame
    pub fn path(&self) -> Vec<Contract> {
        let mut path = Vec::new();
        let mut frame = Some(self);
        while let Some(current) = frame {
            path.push(current.contract.clone());
            frame = current.parent;
        }
        path.reverse();
        path
    }
}

/// Check if resolving `contract` with `manager` below `parent` would loop.
///
/// Returns the looping path, from the first occurrence to the repeated contract.
pub(crate) fn find_cycle(
    parent: Option<&PipelineContext<'_>>,
    contract: &Contract,
    manager: &Arc<RegistrationManager>,
) -> Option<String> {
    let mut frame = parent;
    let mut path = vec![contract.to_string()];
    while let Some(current) = frame {
        path.push(current.contract.to_string());
        let same_registration = current
            .registration
            .as_ref()
            .map(|r| Arc::ptr_eq(r, manager))
            .unwrap_or(false);
        if current.contract == *contract || same_registration {
            path.reverse();
            return Some(path.join(" -> "));
        }
        frame = current.parent;
    }
    None
}

/// Access to the container given to factories.
///
/// Resolutions made through the resolver are nested in the current frame: they share its
/// overrides and take part in cycle detection.
pub struct Resolver<'a> {
    context: &'a PipelineContext<'a>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(context: &'a PipelineContext<'a>) -> Self {
        Self { context }
    }

    pub fn container(&self) -> &Container {
        self.context.container()
    }

    /// Contract being resolved by the factory
    pub fn contract(&self) -> &Contract {
        self.context.contract()
    }

    pub fn resolve(&self, ty: &Type, name: Option<&str>) -> Result<Object, ResolutionError> {
        self.context.resolve(&Contract::new(ty.clone(), name))
    }

    pub fn resolve_as<T: ?Sized + Reflect + Send + Sync>(
        &self,
        name: Option<&str>,
    ) -> Result<Arc<T>, ResolutionError> {
        let contract = Contract::new(T::type_of(), name);
        let object = self.context.resolve(&contract)?;
        object.downcast::<T>().ok_or_else(|| {
            ResolutionError::new(
                &contract,
                ResolutionErrorKind::NotAssignable {
                    from: object.type_name().to_string(),
                    to: std::any::type_name::<T>().to_string(),
                },
            )
        })
    }
}
