//! Typed glue between plain Rust functions and the type-erased member invokers.
//!
//! Constructors and injection methods are regular functions taking their dependencies as
//! arguments. The [Callable] and [MethodCallable] traits give them a uniform, tuple-based
//! calling convention, and the [Dependencies] trait describes and extracts the matching
//! tuple of parameters from the values resolved by the container.

use std::sync::Arc;

use crate::error::InvokeError;
use crate::object::Object;
use crate::types::{DefaultValue, ParameterInfo, Reflect, TypeRef};

/// A single injectable value.
///
/// Implemented for shared instances (`Arc<T>`, including trait objects), optional instances
/// (`Option<Arc<T>>`, left empty when the dependency can not be resolved) and sequences
/// (`Vec<Arc<T>>` for all registrations, `Box<[Arc<T>]>` for the named ones).
pub trait Dependency: Sized + 'static {
    fn type_ref() -> TypeRef;

    /// Optional dependencies fall back to an empty value instead of failing
    fn optional() -> bool {
        false
    }

    fn extract(value: Option<Object>) -> Result<Self, InvokeError>;
}

fn downcast<T: ?Sized + 'static>(value: Object) -> Result<Arc<T>, InvokeError> {
    value.downcast::<T>().ok_or(InvokeError::Mismatch {
        expected: std::any::type_name::<T>(),
        actual: value.type_name(),
    })
}

fn downcast_items<T: ?Sized + 'static>(value: Option<Object>) -> Result<Vec<Arc<T>>, InvokeError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let items = value.items().ok_or(InvokeError::Mismatch {
        expected: "sequence",
        actual: value.type_name(),
    })?;
    items.iter().cloned().map(downcast::<T>).collect()
}

impl<T: ?Sized + Reflect + Send + Sync> Dependency for Arc<T> {
    fn type_ref() -> TypeRef {
        TypeRef::of::<T>()
    }

    fn extract(value: Option<Object>) -> Result<Self, InvokeError> {
        let value = value.ok_or_else(|| InvokeError::Missing(std::any::type_name::<T>().into()))?;
        downcast(value)
    }
}

impl<T: ?Sized + Reflect + Send + Sync> Dependency for Option<Arc<T>> {
    fn type_ref() -> TypeRef {
        TypeRef::of::<T>()
    }

    fn optional() -> bool {
        true
    }

    fn extract(value: Option<Object>) -> Result<Self, InvokeError> {
        value.map(downcast).transpose()
    }
}

impl<T: ?Sized + Reflect + Send + Sync> Dependency for Vec<Arc<T>> {
    fn type_ref() -> TypeRef {
        TypeRef::Enumerable(T::type_of)
    }

    fn extract(value: Option<Object>) -> Result<Self, InvokeError> {
        downcast_items(value)
    }
}

impl<T: ?Sized + Reflect + Send + Sync> Dependency for Box<[Arc<T>]> {
    fn type_ref() -> TypeRef {
        TypeRef::Array(T::type_of, 1)
    }

    fn extract(value: Option<Object>) -> Result<Self, InvokeError> {
        downcast_items(value).map(Vec::into_boxed_slice)
    }
}

/*
 * The following is used to inject up to 10 parameters into any function
 * inspired by https://nickbryan.co.uk/software/using-a-type-map-for-dependency-injection-in-rust/
 */

/// A Callable has a ```call``` function with a single argument and a single return type.
///
/// This trait is implemented for all functions with up to 10 arguments, using a tuple to
/// wrap them all in a single type.
pub trait Callable<Args, Ret> {
    fn call(&self, args: Args) -> Ret;
}

/// Same as [Callable] for functions taking the target instance as first argument
pub trait MethodCallable<Target, Args> {
    fn call_on(&self, target: &mut Target, args: Args);
}

/// Tuple of dependencies, used as argument list of constructors and methods
pub trait Dependencies: Sized {
    /// Describe the parameters, missing names are replaced by the position
    fn parameters(names: &[&str]) -> Vec<ParameterInfo>;

    fn extract(values: Vec<Option<Object>>) -> Result<Self, InvokeError>;
}

fn parameter<D: Dependency>(names: &[&str], index: usize) -> ParameterInfo {
    let fallback = format!("arg{}", index);
    let name = names.get(index).copied().unwrap_or(fallback.as_str());
    let info = ParameterInfo::new(name, D::type_ref());
    if D::optional() {
        info.with_default(DefaultValue::Null)
    } else {
        info
    }
}

macro_rules! callable_tuple ({ $($param:ident)* } => {
    impl<Func, Ret, $($param,)*> Callable<($($param,)*), Ret> for Func
    where
        Func: Fn($($param),*) -> Ret,
    {
        #[inline]
        #[allow(non_snake_case)]
        fn call(&self, ($($param,)*): ($($param,)*)) -> Ret {
            (self)($($param,)*)
        }
    }

    impl<Func, Target, $($param,)*> MethodCallable<Target, ($($param,)*)> for Func
    where
        Func: Fn(&mut Target, $($param),*),
    {
        #[inline]
        #[allow(non_snake_case)]
        fn call_on(&self, target: &mut Target, ($($param,)*): ($($param,)*)) {
            (self)(target, $($param,)*)
        }
    }

    // Describe and extract such tuples for a list of parameter types
    #[allow(clippy::unused_unit)]
    impl<$($param: Dependency,)*> Dependencies for ($($param,)*) {
        #[allow(unused_mut, unused_variables, unused_assignments)]
        fn parameters(names: &[&str]) -> Vec<ParameterInfo> {
            let mut index = 0;
            let mut parameters = Vec::new();
            $(
                parameters.push(parameter::<$param>(names, index));
                index += 1;
            )*
            parameters
        }

        #[allow(unused_mut, unused_variables)]
        fn extract(values: Vec<Option<Object>>) -> Result<Self, InvokeError> {
            let mut values = values.into_iter();
            Ok(($($param::extract(values.next().flatten())?,)*))
        }
    }
});

callable_tuple! {}
callable_tuple! { A }
callable_tuple! { A B }
callable_tuple! { A B C }
callable_tuple! { A B C D }
callable_tuple! { A B C D E }
callable_tuple! { A B C D E F }
callable_tuple! { A B C D E F G }
callable_tuple! { A B C D E F G H }
callable_tuple! { A B C D E F G H I }
callable_tuple! { A B C D E F G H I J }
