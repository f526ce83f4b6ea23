use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::types::Type;

const NAME_SENTINEL: u64 = 17;

/// Identity of a resolution target: a type and an optional registration name.
///
/// The hash code is computed once at construction so that the registration store never hashes
/// again on lookup. A contract without name designates the default registration of its type,
/// which is distinct from a registration named with the empty string.
#[derive(Clone)]
pub struct Contract {
    ty: Type,
    name: Option<Arc<str>>,
    hash: u64,
}

impl Contract {
    pub fn new(ty: Type, name: Option<&str>) -> Self {
        Self::with_shared_name(ty, name.map(Arc::from))
    }

    pub(crate) fn with_shared_name(ty: Type, name: Option<Arc<str>>) -> Self {
        let mut hasher = FxHasher::default();
        ty.hash(&mut hasher);
        let type_hash = hasher.finish();
        let name_hash = match &name {
            None => NAME_SENTINEL,
            Some(name) => {
                let mut hasher = FxHasher::default();
                name.hash(&mut hasher);
                hasher.finish()
            }
        };
        Self {
            ty,
            name,
            hash: type_hash.wrapping_add(37) ^ name_hash,
        }
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn hash_code(&self) -> u64 {
        self.hash
    }

    /// Same name, another type
    pub fn with_type(&self, ty: Type) -> Self {
        Self::with_shared_name(ty, self.name.clone())
    }

    /// Default contract of the same type
    pub fn unnamed(&self) -> Self {
        Self::with_shared_name(self.ty.clone(), None)
    }
}

impl PartialEq for Contract {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.ty == other.ty && self.name == other.name
    }
}

impl Eq for Contract {}

impl Hash for Contract {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash)
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            None => write!(f, "{}", self.ty.name()),
            Some(name) => write!(f, "{}[\"{}\"]", self.ty.name(), name),
        }
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
