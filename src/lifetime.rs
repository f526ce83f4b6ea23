//! Lifetime managers decide if and where a built instance is kept for later resolutions.
//!
//! Each registration owns one manager. Managers are handed to the container as shared
//! `Arc<dyn LifetimeManager>` and can not be used by two registrations.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::contract::Contract;
use crate::error::ResolutionError;
use crate::object::{Object, WeakObject};

/// Resolution state visible to lifetime managers
pub struct LifetimeScope<'a> {
    container_id: u64,
    contract: &'a Contract,
    per_resolve: &'a RefCell<FxHashMap<Contract, Object>>,
}

impl<'a> LifetimeScope<'a> {
    pub(crate) fn new(
        container_id: u64,
        contract: &'a Contract,
        per_resolve: &'a RefCell<FxHashMap<Contract, Object>>,
    ) -> Self {
        Self {
            container_id,
            contract,
            per_resolve,
        }
    }

    /// Identifier of the container on which resolve was called
    pub fn container_id(&self) -> u64 {
        self.container_id
    }

    pub fn contract(&self) -> &Contract {
        self.contract
    }
}

/// Policy for the reuse of built instances
pub trait LifetimeManager: Send + Sync {
    /// Short name used in diagnostics and registration listings
    fn name(&self) -> &'static str;

    fn get_value(&self, scope: &LifetimeScope<'_>) -> Option<Object>;

    fn set_value(&self, value: Object, scope: &LifetimeScope<'_>);

    /// Return the stored instance or build, store and return a new one.
    ///
    /// On failure, [LifetimeManager::recover] is called before the error is returned.
    fn get_or_create(
        &self,
        scope: &LifetimeScope<'_>,
        create: &mut dyn FnMut() -> Result<Object, ResolutionError>,
    ) -> Result<Object, ResolutionError> {
        if let Some(value) = self.get_value(scope) {
            return Ok(value);
        }
        match create() {
            Ok(value) => {
                self.set_value(value.clone(), scope);
                Ok(value)
            }
            Err(e) => {
                self.recover();
                Err(e)
            }
        }
    }

    /// Roll back partial state after a failed build
    fn recover(&self) {}

    /// Release and dispose the held instances
    fn dispose(&self) {}

    /// Release and dispose the instances held on behalf of one container, called when that
    /// container is disposed while the registration lives in a parent
    fn release(&self, _container_id: u64) {}

    /// Fresh manager of the same kind, used for closed forms of a generic registration
    fn create_for_closed(&self) -> Arc<dyn LifetimeManager>;

    /// Claim the manager for a registration, returns false if it is already claimed
    fn mark_in_use(&self) -> bool;
}

#[derive(Default)]
struct Usage(AtomicBool);

impl Usage {
    fn acquire(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// A new instance on every resolution
#[derive(Default)]
pub struct Transient {
    usage: Usage,
}

impl Transient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LifetimeManager for Transient {
    fn name(&self) -> &'static str {
        "transient"
    }

    fn get_value(&self, _scope: &LifetimeScope<'_>) -> Option<Object> {
        None
    }

    fn set_value(&self, _value: Object, _scope: &LifetimeScope<'_>) {}

    fn create_for_closed(&self) -> Arc<dyn LifetimeManager> {
        Arc::new(Transient::new())
    }

    fn mark_in_use(&self) -> bool {
        self.usage.acquire()
    }
}

/// A single instance owned by the container (singleton).
///
/// Concurrent first resolutions are serialized: only one thread builds the instance,
/// the others wait for it and receive the same value.
#[derive(Default)]
pub struct ContainerControlled {
    value: Mutex<Option<Object>>,
    usage: Usage,
}

impl ContainerControlled {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager already holding an instance
    pub fn with_value(value: Object) -> Self {
        Self {
            value: Mutex::new(Some(value)),
            usage: Usage::default(),
        }
    }
}

impl LifetimeManager for ContainerControlled {
    fn name(&self) -> &'static str {
        "container-controlled"
    }

    fn get_value(&self, _scope: &LifetimeScope<'_>) -> Option<Object> {
        self.value.lock().clone()
    }

    fn set_value(&self, value: Object, _scope: &LifetimeScope<'_>) {
        *self.value.lock() = Some(value);
    }

    fn get_or_create(
        &self,
        _scope: &LifetimeScope<'_>,
        create: &mut dyn FnMut() -> Result<Object, ResolutionError>,
    ) -> Result<Object, ResolutionError> {
        let mut slot = self.value.lock();
        if let Some(value) = slot.as_ref() {
            return Ok(value.clone());
        }
        match create() {
            Ok(value) => {
                *slot = Some(value.clone());
                Ok(value)
            }
            Err(e) => {
                drop(slot);
                self.recover();
                Err(e)
            }
        }
    }

    fn recover(&self) {
        trace!("singleton build failed, slot left empty");
    }

    fn dispose(&self) {
        if let Some(value) = self.value.lock().take() {
            value.dispose();
        }
    }

    fn create_for_closed(&self) -> Arc<dyn LifetimeManager> {
        Arc::new(ContainerControlled::new())
    }

    fn mark_in_use(&self) -> bool {
        self.usage.acquire()
    }
}

/// One instance per container: child containers resolving a parent registration get their own
#[derive(Default)]
pub struct Hierarchical {
    values: Mutex<FxHashMap<u64, Object>>,
    usage: Usage,
}

impl Hierarchical {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LifetimeManager for Hierarchical {
    fn name(&self) -> &'static str {
        "hierarchical"
    }

    fn get_value(&self, scope: &LifetimeScope<'_>) -> Option<Object> {
        self.values.lock().get(&scope.container_id()).cloned()
    }

    fn set_value(&self, value: Object, scope: &LifetimeScope<'_>) {
        self.values.lock().insert(scope.container_id(), value);
    }

    fn get_or_create(
        &self,
        scope: &LifetimeScope<'_>,
        create: &mut dyn FnMut() -> Result<Object, ResolutionError>,
    ) -> Result<Object, ResolutionError> {
        let mut values = self.values.lock();
        if let Some(value) = values.get(&scope.container_id()) {
            return Ok(value.clone());
        }
        let value = create()?;
        values.insert(scope.container_id(), value.clone());
        Ok(value)
    }

    fn dispose(&self) {
        let values: Vec<_> = self.values.lock().drain().map(|(_, v)| v).collect();
        for value in values {
            value.dispose();
        }
    }

    fn release(&self, container_id: u64) {
        let value = self.values.lock().remove(&container_id);
        if let Some(value) = value {
            trace!(container = container_id, "hierarchical instance released");
            value.dispose();
        }
    }

    fn create_for_closed(&self) -> Arc<dyn LifetimeManager> {
        Arc::new(Hierarchical::new())
    }

    fn mark_in_use(&self) -> bool {
        self.usage.acquire()
    }
}

/// One instance shared by the whole object graph of a single resolve call
#[derive(Default)]
pub struct PerResolve {
    usage: Usage,
}

impl PerResolve {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LifetimeManager for PerResolve {
    fn name(&self) -> &'static str {
        "per-resolve"
    }

    fn get_value(&self, scope: &LifetimeScope<'_>) -> Option<Object> {
        scope.per_resolve.borrow().get(scope.contract()).cloned()
    }

    fn set_value(&self, value: Object, scope: &LifetimeScope<'_>) {
        scope
            .per_resolve
            .borrow_mut()
            .insert(scope.contract().clone(), value);
    }

    fn create_for_closed(&self) -> Arc<dyn LifetimeManager> {
        Arc::new(PerResolve::new())
    }

    fn mark_in_use(&self) -> bool {
        self.usage.acquire()
    }
}

/// One instance per thread
#[derive(Default)]
pub struct PerThread {
    values: Mutex<FxHashMap<ThreadId, Object>>,
    usage: Usage,
}

impl PerThread {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LifetimeManager for PerThread {
    fn name(&self) -> &'static str {
        "per-thread"
    }

    fn get_value(&self, _scope: &LifetimeScope<'_>) -> Option<Object> {
        self.values.lock().get(&thread::current().id()).cloned()
    }

    fn set_value(&self, value: Object, _scope: &LifetimeScope<'_>) {
        self.values.lock().insert(thread::current().id(), value);
    }

    fn create_for_closed(&self) -> Arc<dyn LifetimeManager> {
        Arc::new(PerThread::new())
    }

    fn mark_in_use(&self) -> bool {
        self.usage.acquire()
    }
}

/// Reuse the instance as long as someone else keeps it alive
#[derive(Default)]
pub struct ExternallyControlled {
    value: Mutex<Option<WeakObject>>,
    usage: Usage,
}

impl ExternallyControlled {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LifetimeManager for ExternallyControlled {
    fn name(&self) -> &'static str {
        "externally-controlled"
    }

    fn get_value(&self, _scope: &LifetimeScope<'_>) -> Option<Object> {
        self.value.lock().as_ref().and_then(WeakObject::upgrade)
    }

    fn set_value(&self, value: Object, _scope: &LifetimeScope<'_>) {
        *self.value.lock() = Some(value.downgrade());
    }

    fn create_for_closed(&self) -> Arc<dyn LifetimeManager> {
        Arc::new(ExternallyControlled::new())
    }

    fn mark_in_use(&self) -> bool {
        self.usage.acquire()
    }
}
