//! Contract-keyed registration store of one container level.
//!
//! The table uses separate chaining over two parallel arrays: `meta[bucket].position` is the
//! head of a bucket chain and `meta[position].location` links to the next position of the same
//! bucket. Positions start at 1, 0 terminates a chain. A second link (`Entry::next`) threads all
//! registrations of a type, starting from the unnamed entry of that type which is created as an
//! empty anchor when a named registration comes first.
//!
//! Entries are never removed: registering an existing contract replaces its manager.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::contract::Contract;
use crate::registration::{Category, RegistrationManager};
use crate::types::Type;

const PRIMES: &[usize] = &[
    37, 71, 151, 313, 631, 1277, 2557, 5119, 10243, 20507, 41017, 82037, 164089, 328213, 656459,
    1312933, 2625881, 5251763, 10503529,
];

struct Entry {
    contract: Contract,
    manager: Option<Arc<RegistrationManager>>,
    next: usize,
}

#[derive(Clone, Copy, Default)]
struct Metadata {
    position: usize,
    location: usize,
}

struct Table {
    data: Vec<Entry>,
    meta: Vec<Metadata>,
    capacity: usize,
}

/// Next bucket count: the next listed prime, then odd doublings
fn grown(capacity: usize) -> usize {
    PRIMES
        .iter()
        .copied()
        .find(|p| *p > capacity)
        .unwrap_or(capacity * 2 + 1)
}

impl Table {
    fn with_capacity(capacity: usize) -> Self {
        let capacity = PRIMES
            .iter()
            .copied()
            .find(|p| *p >= capacity)
            .unwrap_or_else(|| capacity | 1);
        Self {
            data: Vec::with_capacity(capacity),
            meta: vec![Metadata::default(); capacity + 1],
            capacity,
        }
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    /// High-water mark: the last used position
    fn index(&self) -> usize {
        self.data.len()
    }

    fn entry(&self, position: usize) -> &Entry {
        &self.data[position - 1]
    }

    fn entry_mut(&mut self, position: usize) -> &mut Entry {
        &mut self.data[position - 1]
    }

    fn bucket(&self, contract: &Contract) -> usize {
        (contract.hash_code() % self.capacity() as u64) as usize
    }

    fn find(&self, contract: &Contract) -> Option<usize> {
        let mut position = self.meta[self.bucket(contract)].position;
        while position > 0 {
            if self.entry(position).contract == *contract {
                return Some(position);
            }
            position = self.meta[position].location;
        }
        None
    }

    fn insert(&mut self, contract: Contract, manager: Option<Arc<RegistrationManager>>) -> usize {
        if self.index() >= self.capacity() {
            self.expand();
        }
        let bucket = self.bucket(&contract);
        self.data.push(Entry {
            contract,
            manager,
            next: 0,
        });
        let position = self.index();
        self.meta[position].location = self.meta[bucket].position;
        self.meta[bucket].position = position;
        position
    }

    /// Grow the bucket array and rehash every entry
    fn expand(&mut self) {
        self.capacity = grown(self.capacity);
        let capacity = self.capacity;
        self.data.reserve(capacity - self.data.len());
        self.meta = vec![Metadata::default(); capacity + 1];
        for position in 1..=self.index() {
            let bucket = self.bucket(&self.entry(position).contract);
            self.meta[position].location = self.meta[bucket].position;
            self.meta[bucket].position = position;
        }
        trace!(capacity, "registration scope expanded");
    }

    /// Position of the unnamed entry of a type, created empty if needed
    fn anchor(&mut self, ty: &Type) -> usize {
        let contract = Contract::new(ty.clone(), None);
        match self.find(&contract) {
            Some(position) => position,
            None => self.insert(contract, None),
        }
    }

    fn link(&mut self, anchor: usize, position: usize) {
        let mut last = anchor;
        while self.entry(last).next > 0 {
            last = self.entry(last).next;
        }
        self.entry_mut(last).next = position;
    }

    fn add(&mut self, contract: Contract, manager: Option<Arc<RegistrationManager>>) -> usize {
        if contract.name().is_none() {
            return self.insert(contract, manager);
        }
        let anchor = self.anchor(contract.ty());
        let position = self.insert(contract, manager);
        self.link(anchor, position);
        position
    }

    fn chain(&self, ty: &Type) -> Vec<(Contract, Arc<RegistrationManager>)> {
        let mut result = Vec::new();
        let mut position = match self.find(&Contract::new(ty.clone(), None)) {
            Some(position) => position,
            None => return result,
        };
        while position > 0 {
            let entry = self.entry(position);
            if let Some(manager) = visible(entry) {
                result.push((entry.contract.clone(), manager.clone()));
            }
            position = entry.next;
        }
        result
    }
}

/// Manager of an entry, unless it is an anchor or an implicit registration
fn visible(entry: &Entry) -> Option<&Arc<RegistrationManager>> {
    entry
        .manager
        .as_ref()
        .filter(|m| m.category() != Category::Uninitialized)
}

/// Registration store of a container, chained to the store of its parent container
pub struct Scope {
    table: RwLock<Table>,
    revision: AtomicUsize,
    next: Option<Arc<Scope>>,
}

impl Scope {
    pub fn new(capacity: usize) -> Self {
        Self {
            table: RwLock::new(Table::with_capacity(capacity)),
            revision: AtomicUsize::new(0),
            next: None,
        }
    }

    /// New scope whose lookups fall back to this one
    pub fn create_child_scope(self: &Arc<Self>, capacity: usize) -> Arc<Scope> {
        Arc::new(Self {
            table: RwLock::new(Table::with_capacity(capacity)),
            revision: AtomicUsize::new(0),
            next: Some(self.clone()),
        })
    }

    pub fn parent(&self) -> Option<&Arc<Scope>> {
        self.next.as_ref()
    }

    /// Number of structural changes applied to this scope
    pub fn revision(&self) -> usize {
        self.revision.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.table.read().index()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    /// Add or replace the registration of a contract, returns the displaced manager
    pub fn register(
        &self,
        contract: Contract,
        manager: Arc<RegistrationManager>,
    ) -> Option<Arc<RegistrationManager>> {
        let mut table = self.table.write();
        let previous = match table.find(&contract) {
            Some(position) => table.entry_mut(position).manager.replace(manager),
            None => {
                table.add(contract, Some(manager));
                None
            }
        };
        self.bump();
        previous
    }

    /// Manager registered for the contract in this scope only
    pub fn get(&self, contract: &Contract) -> Option<Arc<RegistrationManager>> {
        let table = self.table.read();
        table
            .find(contract)
            .and_then(|position| table.entry(position).manager.clone())
    }

    /// Registration of a closed generic contract, created from the registration of its open
    /// definition found in this scope under `generic`.
    pub fn get_bound_generic(
        &self,
        contract: &Contract,
        generic: &Contract,
    ) -> Option<Arc<RegistrationManager>> {
        let factory = {
            let table = self.table.read();
            if let Some(manager) = table
                .find(contract)
                .and_then(|position| visible(table.entry(position)).cloned())
            {
                return Some(manager);
            }
            table
                .find(generic)
                .and_then(|position| visible(table.entry(position)).cloned())?
        };

        let mut table = self.table.write();
        // Another thread may have bound it meanwhile. An implicit record left by an earlier
        // resolution is replaced.
        if let Some(position) = table.find(contract) {
            if let Some(manager) = visible(table.entry(position)) {
                return Some(manager.clone());
            }
        }
        let closed = Arc::new(factory.close(contract));
        match table.find(contract) {
            Some(position) => table.entry_mut(position).manager = Some(closed.clone()),
            None => {
                table.add(contract.clone(), Some(closed.clone()));
            }
        }
        self.bump();
        trace!(%contract, from = %generic, "bound generic registration");
        Some(closed)
    }

    /// Get the manager of a contract, or store the one created by `factory`
    pub fn get_cache(
        &self,
        contract: &Contract,
        factory: impl FnOnce() -> RegistrationManager,
    ) -> Arc<RegistrationManager> {
        let revision = self.revision();
        if let Some(manager) = self.get(contract) {
            return manager;
        }

        let mut table = self.table.write();
        if self.revision() != revision {
            if let Some(manager) = table
                .find(contract)
                .and_then(|position| table.entry(position).manager.clone())
            {
                return manager;
            }
        }
        let manager = Arc::new(factory());
        match table.find(contract) {
            Some(position) => table.entry_mut(position).manager = Some(manager.clone()),
            None => {
                table.add(contract.clone(), Some(manager.clone()));
            }
        }
        self.bump();
        manager
    }

    /// Check if the contract is registered here or in a parent scope
    pub fn contains(&self, contract: &Contract) -> bool {
        let mut scope = Some(self);
        while let Some(current) = scope {
            let table = current.table.read();
            if let Some(position) = table.find(contract) {
                if visible(table.entry(position)).is_some() {
                    return true;
                }
            }
            scope = current.next.as_deref();
        }
        false
    }

    /// Check if any registration of the type exists here or in a parent scope
    pub fn contains_type(&self, ty: &Type) -> bool {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if !current.registrations_of(ty).is_empty() {
                return true;
            }
            scope = current.next.as_deref();
        }
        false
    }

    /// Local registrations of a type: the default one first, then the named ones in
    /// registration order
    pub fn registrations_of(&self, ty: &Type) -> Vec<(Contract, Arc<RegistrationManager>)> {
        self.table.read().chain(ty)
    }

    /// Snapshot of the local registrations, in registration order
    pub fn entries(&self) -> Vec<(Contract, Arc<RegistrationManager>)> {
        let table = self.table.read();
        table
            .data
            .iter()
            .filter_map(|entry| visible(entry).map(|m| (entry.contract.clone(), m.clone())))
            .collect()
    }

    /// Every manager stored locally, including implicit ones
    pub(crate) fn managers(&self) -> Vec<Arc<RegistrationManager>> {
        let table = self.table.read();
        table.data.iter().filter_map(|e| e.manager.clone()).collect()
    }
}
