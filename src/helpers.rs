//! Declaration helpers for type descriptors.

use crate::types::{Reflect, Type};

/// Implement [crate::Reflect] for a type, building its descriptor once.
///
/// The descriptor expression is evaluated on first use and the same descriptor is handed out
/// afterwards. This is required for generic definitions, which are identified by descriptor
/// instance rather than by Rust type.
///
/// ```
/// # use wiring::*;
/// struct Clock;
/// reflect_type!(Clock, Type::class::<Clock>("Clock").constructor(&[], || Clock).build());
///
/// assert!(Clock::type_of().is_constructible());
/// ```
#[macro_export]
macro_rules! reflect_type {
    ($target:ty, $descriptor:expr) => {
        impl $crate::Reflect for $target {
            fn type_of() -> $crate::Type {
                static DESCRIPTOR: $crate::__private::Lazy<$crate::Type> =
                    $crate::__private::Lazy::new(|| $descriptor);
                DESCRIPTOR.clone()
            }
        }
    };
}

/// Implement [crate::Reflect] for a trait object, with an interface descriptor
#[macro_export]
macro_rules! reflect_interface {
    ($name:literal, $target:ty) => {
        $crate::reflect_type!($target, $crate::Type::interface::<$target>($name).build());
    };
}

/// Implement [crate::Reflect] for plain values, registered as instances only
macro_rules! reflect_value {
    ($($target:ty),*) => {
        $(
            impl Reflect for $target {
                fn type_of() -> Type {
                    Type::value::<$target>(stringify!($target))
                }
            }
        )*
    };
}

reflect_value!(String, bool, i32, i64, u32, u64, usize, f64);
