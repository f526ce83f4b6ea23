use std::any::{type_name, Any};
use std::fmt;
use std::sync::{Arc, Weak};

use crate::types::{Type, TypeKey};

/// Release resources held by a shared component when its owner goes away.
///
/// Lifetime managers call [Disposable::dispose] on the instances they hold when the owning
/// container is disposed or when their registration is replaced.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}

type Disposer = fn(&Object);

pub(crate) fn dispose_as<T: Disposable + 'static>(object: &Object) {
    if let Some(value) = object.downcast::<T>() {
        value.dispose();
    }
}

/// Type-erased shared instance handled by the container.
///
/// An object always wraps an `Arc<T>`, which enables to store trait objects (`Arc<dyn Trait>`)
/// and concrete values the same way and to hand out clones of the original `Arc`.
#[derive(Clone)]
pub struct Object {
    value: Arc<dyn Any + Send + Sync>,
    key: TypeKey,
    type_name: &'static str,
    addr: usize,
    disposer: Option<Disposer>,
    downgrade: fn(&Object) -> Option<Arc<dyn ErasedWeak>>,
}

impl Object {
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        let addr = Arc::as_ptr(&value) as *const () as usize;
        Self {
            value: Arc::new(value),
            key: TypeKey::of::<T>(),
            type_name: type_name::<T>(),
            addr,
            disposer: None,
            downgrade: downgrade_as::<T>,
        }
    }

    /// Wrap a plain value
    pub fn from_value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::new(Arc::new(value))
    }

    /// Wrap a value that must be disposed with its owner
    pub fn disposable<T: Disposable + 'static>(value: Arc<T>) -> Self {
        let mut object = Self::new(value);
        object.disposer = Some(dispose_as::<T> as Disposer);
        object
    }

    /// Build the instance of an enumerable or array type from its items
    pub(crate) fn sequence(ty: &Type, items: Vec<Object>) -> Self {
        let mut object = Self::new(Arc::new(items));
        object.key = ty.key().clone();
        object.type_name = "sequence";
        object
    }

    pub(crate) fn with_disposer(mut self, disposer: Option<Disposer>) -> Self {
        self.disposer = disposer;
        self
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Retrieve the wrapped `Arc<T>` if the object holds this type
    pub fn downcast<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }

    /// Items of an enumerable or array instance
    pub fn items(&self) -> Option<Arc<Vec<Object>>> {
        self.downcast::<Vec<Object>>()
    }

    /// Check if both objects share the same underlying instance
    pub fn ptr_eq(&self, other: &Object) -> bool {
        self.addr == other.addr
    }

    pub fn is_disposable(&self) -> bool {
        self.disposer.is_some()
    }

    pub fn dispose(&self) {
        if let Some(disposer) = self.disposer {
            disposer(self);
        }
    }

    /// Non-owning handle on the underlying instance
    pub(crate) fn downgrade(&self) -> WeakObject {
        WeakObject((self.downgrade)(self))
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object<{}>@{:#x}", self.type_name, self.addr)
    }
}

trait ErasedWeak: Send + Sync {
    fn upgrade(&self) -> Option<Object>;
}

struct TypedWeak<T: ?Sized> {
    value: Weak<T>,
    key: TypeKey,
    disposer: Option<Disposer>,
}

impl<T: ?Sized + Send + Sync + 'static> ErasedWeak for TypedWeak<T> {
    fn upgrade(&self) -> Option<Object> {
        self.value.upgrade().map(|value| {
            let mut object = Object::new(value).with_disposer(self.disposer);
            object.key = self.key.clone();
            object
        })
    }
}

fn downgrade_as<T: ?Sized + Send + Sync + 'static>(object: &Object) -> Option<Arc<dyn ErasedWeak>> {
    let value = object.downcast::<T>()?;
    Some(Arc::new(TypedWeak {
        value: Arc::downgrade(&value),
        key: object.key.clone(),
        disposer: object.disposer,
    }))
}

/// Weak reference to the instance wrapped by an [Object]
#[derive(Clone)]
pub(crate) struct WeakObject(Option<Arc<dyn ErasedWeak>>);

impl WeakObject {
    pub(crate) fn upgrade(&self) -> Option<Object> {
        self.0.as_ref().and_then(|weak| weak.upgrade())
    }
}
