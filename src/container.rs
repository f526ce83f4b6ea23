//! The container: registration entry points, hierarchy and disposal.
//!
//! The resolution path lives in the `resolve` module.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::context::{PerResolve, Resolver};
use crate::contract::Contract;
use crate::error::{BoxError, RegistrationError};
use crate::injection::InjectionMember;
use crate::lifetime::{ContainerControlled, LifetimeManager, LifetimeScope};
use crate::object::Object;
use crate::options::ContainerOptions;
use crate::registration::{
    ContainerRegistration, Factory, Registration, RegistrationDescriptor, RegistrationKind,
    RegistrationManager,
};
use crate::scope::Scope;
use crate::types::{Reflect, Type, TypeKind};

static NEXT_CONTAINER: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct Snapshot {
    revision: usize,
    list: Weak<Vec<ContainerRegistration>>,
}

struct Inner {
    id: u64,
    scope: Arc<Scope>,
    root: Arc<Scope>,
    parent: Option<Container>,
    options: ContainerOptions,
    children: Mutex<Vec<Weak<Inner>>>,
    disposed: AtomicBool,
    snapshot: Mutex<Snapshot>,
}

/// Dependency injection container.
///
/// Cloning a container gives another handle on the same registrations. Child containers see
/// the registrations of their parents and can shadow them.
///
/// Resolving [Container] hands out such a strong handle. A singleton keeping it forms a
/// reference cycle with the container: store a [WeakContainer] from [Container::downgrade]
/// instead.
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

/// Handle on a container that does not keep it alive
#[derive(Clone)]
pub struct WeakContainer {
    inner: Weak<Inner>,
}

impl WeakContainer {
    pub fn upgrade(&self) -> Option<Container> {
        self.inner.upgrade().map(|inner| Container { inner })
    }
}

impl Reflect for Container {
    fn type_of() -> Type {
        Type::value::<Container>("Container")
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    pub fn with_options(options: ContainerOptions) -> Self {
        let scope = Arc::new(Scope::new(options.capacity));
        scope.register(
            Contract::new(Container::type_of(), None),
            Arc::new(RegistrationManager::internal()),
        );
        let container = Self::from_scope(scope.clone(), scope, None, options);
        debug!(container = container.id(), "container created");
        container
    }

    fn from_scope(
        scope: Arc<Scope>,
        root: Arc<Scope>,
        parent: Option<Container>,
        options: ContainerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_CONTAINER.fetch_add(1, Ordering::Relaxed),
                scope,
                root,
                parent,
                options,
                children: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
                snapshot: Mutex::new(Snapshot::default()),
            }),
        }
    }

    /// New container resolving through this one, with the same options
    pub fn create_child_container(&self) -> Container {
        let scope = self.inner.scope.create_child_scope(self.inner.options.capacity);
        let child = Self::from_scope(
            scope,
            self.inner.root.clone(),
            Some(self.clone()),
            self.inner.options.clone(),
        );
        let mut children = self.inner.children.lock();
        children.retain(|c| c.strong_count() > 0);
        children.push(Arc::downgrade(&child.inner));
        drop(children);
        debug!(container = child.id(), parent = self.id(), "child container created");
        child
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn downgrade(&self) -> WeakContainer {
        WeakContainer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.inner.options
    }

    pub fn parent(&self) -> Option<&Container> {
        self.inner.parent.as_ref()
    }

    /// Registration store of this container level
    pub fn scope(&self) -> &Arc<Scope> {
        &self.inner.scope
    }

    pub(crate) fn root_scope(&self) -> &Arc<Scope> {
        &self.inner.root
    }

    /// Scopes from this container to the root
    pub(crate) fn scopes(&self) -> impl Iterator<Item = &Arc<Scope>> {
        std::iter::successors(Some(&self.inner.scope), |scope| scope.parent())
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Apply a batch of registrations, in order
    pub fn register(
        &self,
        descriptors: &[RegistrationDescriptor],
    ) -> Result<&Self, RegistrationError> {
        if self.is_disposed() {
            return Err(RegistrationError::Disposed);
        }
        for descriptor in descriptors {
            self.register_descriptor(descriptor)?;
        }
        Ok(self)
    }

    fn register_descriptor(&self, descriptor: &RegistrationDescriptor) -> Result<(), RegistrationError> {
        let register_as = match (&descriptor.registration, descriptor.register_as.is_empty()) {
            (Registration::Type(implementation), true) => vec![implementation.clone()],
            (_, true) => return Err(RegistrationError::MissingType),
            (_, false) => descriptor.register_as.clone(),
        };

        let kind = match &descriptor.registration {
            Registration::Type(implementation) => {
                for ty in &register_as {
                    check_mapping(ty, implementation)?;
                }
                RegistrationKind::Type(implementation.clone())
            }
            Registration::Instance(instance) => {
                for ty in &register_as {
                    if ty.is_generic_definition() {
                        return Err(RegistrationError::InstanceForGenericDefinition(
                            ty.name().to_string(),
                        ));
                    }
                    if instance.key() != ty.key() {
                        return Err(RegistrationError::NotAssignable {
                            registered: ty.name().to_string(),
                            mapped: instance.type_name().to_string(),
                        });
                    }
                }
                RegistrationKind::Instance
            }
            Registration::Factory(factory) => RegistrationKind::Factory(factory.clone()),
        };

        let lifetime = descriptor.lifetime_or_default();
        if !lifetime.mark_in_use() {
            return Err(RegistrationError::LifetimeInUse(lifetime.name()));
        }
        if let Registration::Instance(instance) = &descriptor.registration {
            let contract = Contract::with_shared_name(register_as[0].clone(), descriptor.name.clone());
            let per_resolve = PerResolve::default();
            lifetime.set_value(
                instance.clone(),
                &LifetimeScope::new(self.id(), &contract, &per_resolve),
            );
        }

        let manager = Arc::new(RegistrationManager::new(
            kind,
            lifetime,
            descriptor.members.clone(),
        ));
        for ty in register_as {
            let contract = Contract::with_shared_name(ty, descriptor.name.clone());
            debug!(
                %contract,
                category = ?descriptor.category(),
                lifetime = manager.lifetime().name(),
                "register"
            );
            if let Some(previous) = self.inner.scope.register(contract, manager.clone()) {
                self.release(previous);
            }
        }
        Ok(())
    }

    /// Dispose a displaced manager unless another contract still uses it
    fn release(&self, previous: Arc<RegistrationManager>) {
        let in_use = self
            .inner
            .scope
            .managers()
            .iter()
            .any(|m| Arc::ptr_eq(m, &previous));
        if !in_use {
            debug!(registration = ?previous, "disposing replaced registration");
            previous.dispose();
        }
    }

    /// Register a type mapping (or the type itself when `contract` is `None`)
    pub fn register_type(
        &self,
        contract: Option<Type>,
        implementation: Type,
        name: Option<&str>,
        lifetime: Option<Arc<dyn LifetimeManager>>,
        members: Vec<InjectionMember>,
    ) -> Result<&Self, RegistrationError> {
        let mut descriptor = RegistrationDescriptor::of_type(implementation).with_members(members);
        if let Some(contract) = contract {
            descriptor = descriptor.register_as(contract);
        }
        self.register(&[configure(descriptor, name, lifetime)])
    }

    /// Register an existing instance, owned by the container unless another lifetime is given
    pub fn register_instance(
        &self,
        ty: Type,
        name: Option<&str>,
        instance: Object,
        lifetime: Option<Arc<dyn LifetimeManager>>,
    ) -> Result<&Self, RegistrationError> {
        let descriptor = RegistrationDescriptor::instance(instance).register_as(ty);
        self.register(&[configure(descriptor, name, lifetime)])
    }

    pub fn register_factory(
        &self,
        ty: Type,
        name: Option<&str>,
        factory: Factory,
        lifetime: Option<Arc<dyn LifetimeManager>>,
    ) -> Result<&Self, RegistrationError> {
        let descriptor = RegistrationDescriptor::new(Registration::Factory(factory)).register_as(ty);
        self.register(&[configure(descriptor, name, lifetime)])
    }

    /// Map the interface `I` to the implementation `T`
    pub fn register_mapping<I, T>(
        &self,
        name: Option<&str>,
        lifetime: Option<Arc<dyn LifetimeManager>>,
    ) -> Result<&Self, RegistrationError>
    where
        I: ?Sized + Reflect,
        T: Reflect,
    {
        self.register_type(Some(I::type_of()), T::type_of(), name, lifetime, Vec::new())
    }

    /// Register `T` with a container-controlled lifetime
    pub fn register_singleton<T: Reflect>(&self, name: Option<&str>) -> Result<&Self, RegistrationError> {
        self.register_type(
            None,
            T::type_of(),
            name,
            Some(Arc::new(ContainerControlled::new())),
            Vec::new(),
        )
    }

    pub fn register_instance_as<T>(&self, name: Option<&str>, instance: Arc<T>) -> Result<&Self, RegistrationError>
    where
        T: ?Sized + Reflect + Send + Sync,
    {
        self.register_instance(T::type_of(), name, Object::new(instance), None)
    }

    pub fn register_factory_as<T, F>(
        &self,
        name: Option<&str>,
        lifetime: Option<Arc<dyn LifetimeManager>>,
        factory: F,
    ) -> Result<&Self, RegistrationError>
    where
        T: ?Sized + Reflect + Send + Sync,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |resolver| factory(resolver).map(Object::new));
        self.register_factory(T::type_of(), name, factory, lifetime)
    }

    /// Check if a registration exists for the contract in this container or its parents
    pub fn is_registered(&self, ty: &Type, name: Option<&str>) -> bool {
        self.inner.scope.contains(&Contract::new(ty.clone(), name))
    }

    pub fn is_registered_as<T: ?Sized + Reflect>(&self, name: Option<&str>) -> bool {
        self.is_registered(&T::type_of(), name)
    }

    /// Snapshot of the visible registrations, parents first.
    ///
    /// The snapshot is shared until a scope of the hierarchy changes.
    pub fn registrations(&self) -> Arc<Vec<ContainerRegistration>> {
        let revision: usize = self.scopes().map(|s| s.revision()).sum();
        let mut snapshot = self.inner.snapshot.lock();
        if snapshot.revision == revision {
            if let Some(list) = snapshot.list.upgrade() {
                return list;
            }
        }

        let mut scopes: Vec<_> = self.scopes().collect();
        scopes.reverse();
        let mut list: Vec<ContainerRegistration> = Vec::new();
        for scope in scopes {
            for (contract, manager) in scope.entries() {
                let registration = ContainerRegistration {
                    contract,
                    category: manager.category(),
                    lifetime: manager.lifetime().name(),
                    mapped_to: manager.mapped_type().cloned(),
                };
                match list.iter_mut().find(|r| r.contract == registration.contract) {
                    Some(shadowed) => *shadowed = registration,
                    None => list.push(registration),
                }
            }
        }

        let list = Arc::new(list);
        *snapshot = Snapshot {
            revision,
            list: Arc::downgrade(&list),
        };
        list
    }

    /// Dispose the instances held by the lifetime managers of this container and its children.
    ///
    /// Instances built for this container by hierarchical registrations of a parent are
    /// released as well.
    ///
    /// A disposed container rejects further registrations and resolutions.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let children = std::mem::take(&mut *self.inner.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            Container { inner: child }.dispose();
        }

        let mut managers = self.inner.scope.managers();
        managers.reverse();
        let mut released: Vec<Arc<RegistrationManager>> = Vec::new();
        for manager in managers {
            if released.iter().any(|m| Arc::ptr_eq(m, &manager)) {
                continue;
            }
            manager.dispose();
            released.push(manager);
        }
        // instances kept for this container by registrations of its parents
        for scope in self.scopes().skip(1) {
            for manager in scope.managers() {
                manager.lifetime().release(self.id());
            }
        }
        debug!(container = self.id(), registrations = released.len(), "container disposed");
    }
}

fn configure(
    mut descriptor: RegistrationDescriptor,
    name: Option<&str>,
    lifetime: Option<Arc<dyn LifetimeManager>>,
) -> RegistrationDescriptor {
    if let Some(name) = name {
        descriptor = descriptor.named(name);
    }
    if let Some(lifetime) = lifetime {
        descriptor = descriptor.with_lifetime(lifetime);
    }
    descriptor
}

fn check_mapping(registered: &Type, mapped: &Type) -> Result<(), RegistrationError> {
    let not_assignable = || RegistrationError::NotAssignable {
        registered: registered.name().to_string(),
        mapped: mapped.name().to_string(),
    };
    match (registered.kind(), mapped.kind()) {
        (TypeKind::Array, TypeKind::Array) if registered.rank() != mapped.rank() => {
            return Err(RegistrationError::ArrayRankMismatch {
                registered: registered.name().to_string(),
                mapped: mapped.name().to_string(),
            })
        }
        (TypeKind::Array, TypeKind::Array) => {}
        (TypeKind::Array, _) | (_, TypeKind::Array) => return Err(not_assignable()),
        _ => {}
    }
    if registered.is_generic_definition() != mapped.is_generic_definition() {
        return Err(not_assignable());
    }
    if !mapped.is_assignable_to(registered) {
        return Err(not_assignable());
    }
    Ok(())
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("registrations", &self.inner.scope.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
