//! Registration records stored in the scopes.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::context::Resolver;
use crate::contract::Contract;
use crate::error::{BoxError, ResolutionError};
use crate::injection::InjectionMember;
use crate::lifetime::{ContainerControlled, LifetimeManager, Transient};
use crate::object::Object;
use crate::pipeline::Pipeline;
use crate::types::Type;

/// User factory building instances on demand
pub type Factory = Arc<dyn Fn(&Resolver<'_>) -> Result<Object, BoxError> + Send + Sync>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Category {
    /// Created by the container for an unregistered constructible type
    Uninitialized,
    Type,
    Instance,
    Factory,
    /// Registrations owned by the container itself
    Internal,
}

/// Construction strategy of a registration
#[derive(Clone)]
pub enum RegistrationKind {
    /// Build the requested type itself
    Uninitialized,
    /// Build (or redirect to) the mapped implementation type
    Type(Type),
    /// Hand out the instance held by the lifetime manager
    Instance,
    Factory(Factory),
    /// The resolving container
    Internal,
}

impl fmt::Debug for RegistrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationKind::Uninitialized => f.write_str("Uninitialized"),
            RegistrationKind::Type(ty) => write!(f, "Type({})", ty),
            RegistrationKind::Instance => f.write_str("Instance"),
            RegistrationKind::Factory(_) => f.write_str("Factory"),
            RegistrationKind::Internal => f.write_str("Internal"),
        }
    }
}

/// A registration: what to build, how long to keep it and which members to inject.
///
/// The resolution pipeline is built on first use and cached for the lifetime of the manager.
pub struct RegistrationManager {
    kind: RegistrationKind,
    lifetime: Arc<dyn LifetimeManager>,
    members: Vec<InjectionMember>,
    pipeline: OnceCell<Pipeline>,
}

impl RegistrationManager {
    pub fn new(
        kind: RegistrationKind,
        lifetime: Arc<dyn LifetimeManager>,
        members: Vec<InjectionMember>,
    ) -> Self {
        Self {
            kind,
            lifetime,
            members,
            pipeline: OnceCell::new(),
        }
    }

    /// Transient registration created for an unregistered type
    pub fn implicit() -> Self {
        Self::new(RegistrationKind::Uninitialized, Arc::new(Transient::new()), Vec::new())
    }

    pub(crate) fn internal() -> Self {
        Self::new(RegistrationKind::Internal, Arc::new(Transient::new()), Vec::new())
    }

    pub fn category(&self) -> Category {
        match self.kind {
            RegistrationKind::Uninitialized => Category::Uninitialized,
            RegistrationKind::Type(_) => Category::Type,
            RegistrationKind::Instance => Category::Instance,
            RegistrationKind::Factory(_) => Category::Factory,
            RegistrationKind::Internal => Category::Internal,
        }
    }

    pub fn kind(&self) -> &RegistrationKind {
        &self.kind
    }

    /// Implementation type of a type mapping
    pub fn mapped_type(&self) -> Option<&Type> {
        match &self.kind {
            RegistrationKind::Type(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn lifetime(&self) -> &Arc<dyn LifetimeManager> {
        &self.lifetime
    }

    pub fn members(&self) -> &[InjectionMember] {
        &self.members
    }

    pub fn has_pipeline(&self) -> bool {
        self.pipeline.get().is_some()
    }

    /// Cached pipeline, built by `build` on first use. Failed builds are not cached.
    pub(crate) fn pipeline(
        &self,
        build: impl FnOnce() -> Result<Pipeline, ResolutionError>,
    ) -> Result<&Pipeline, ResolutionError> {
        self.pipeline.get_or_try_init(build)
    }

    /// Copy of an open generic registration specialised for a closed contract.
    ///
    /// The copy gets its own lifetime manager and pipeline. A mapping to an open definition
    /// is closed over the type arguments of the contract.
    pub(crate) fn close(&self, contract: &Contract) -> Self {
        let kind = match &self.kind {
            RegistrationKind::Type(mapped) if mapped.is_generic_definition() => mapped
                .make_generic(contract.ty().generic_arguments())
                .map(RegistrationKind::Type)
                .unwrap_or_else(|| self.kind.clone()),
            other => other.clone(),
        };
        Self::new(kind, self.lifetime.create_for_closed(), self.members.clone())
    }

    pub fn dispose(&self) {
        self.lifetime.dispose();
    }
}

impl fmt::Debug for RegistrationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationManager")
            .field("kind", &self.kind)
            .field("lifetime", &self.lifetime.name())
            .field("members", &self.members.len())
            .finish()
    }
}

/// What a [RegistrationDescriptor] registers
#[derive(Clone)]
pub enum Registration {
    Type(Type),
    Instance(Object),
    Factory(Factory),
}

/// One entry of a batch registration
#[derive(Clone)]
pub struct RegistrationDescriptor {
    pub(crate) registration: Registration,
    pub(crate) register_as: Vec<Type>,
    pub(crate) name: Option<Arc<str>>,
    pub(crate) lifetime: Option<Arc<dyn LifetimeManager>>,
    pub(crate) members: Vec<InjectionMember>,
}

impl RegistrationDescriptor {
    pub(crate) fn new(registration: Registration) -> Self {
        Self {
            registration,
            register_as: Vec::new(),
            name: None,
            lifetime: None,
            members: Vec::new(),
        }
    }

    /// Build `implementation`, registered as itself unless [Self::register_as] is used
    pub fn of_type(implementation: Type) -> Self {
        Self::new(Registration::Type(implementation))
    }

    pub fn instance(instance: Object) -> Self {
        Self::new(Registration::Instance(instance))
    }

    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&Resolver<'_>) -> Result<Object, BoxError> + Send + Sync + 'static,
    {
        Self::new(Registration::Factory(Arc::new(factory)))
    }

    /// Add a type to register as. All types share the same registration and lifetime.
    pub fn register_as(mut self, ty: Type) -> Self {
        self.register_as.push(ty);
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_lifetime(mut self, lifetime: Arc<dyn LifetimeManager>) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn with_member(mut self, member: InjectionMember) -> Self {
        self.members.push(member);
        self
    }

    pub fn with_members(mut self, members: impl IntoIterator<Item = InjectionMember>) -> Self {
        self.members.extend(members);
        self
    }

    pub(crate) fn category(&self) -> Category {
        match self.registration {
            Registration::Type(_) => Category::Type,
            Registration::Instance(_) => Category::Instance,
            Registration::Factory(_) => Category::Factory,
        }
    }

    /// Lifetime used when none is provided: instances are owned by the container,
    /// everything else is transient
    pub(crate) fn lifetime_or_default(&self) -> Arc<dyn LifetimeManager> {
        match (&self.lifetime, &self.registration) {
            (Some(lifetime), _) => lifetime.clone(),
            (None, Registration::Instance(_)) => Arc::new(ContainerControlled::new()),
            (None, _) => Arc::new(Transient::new()),
        }
    }
}

/// Public view of a registration, as listed by [crate::Container::registrations]
#[derive(Clone, Debug)]
pub struct ContainerRegistration {
    pub contract: Contract,
    pub category: Category,
    pub lifetime: &'static str,
    pub mapped_to: Option<Type>,
}
