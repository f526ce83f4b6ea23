//! Explicit injection configuration attached to a registration.
//!
//! Members listed here are injected in addition to the annotated members of the type, and
//! take precedence over them when both designate the same member.

use std::fmt;
use std::sync::Arc;

use crate::object::Object;
use crate::types::{Reflect, Type};

/// Value supplied to an injected member or parameter
#[derive(Clone)]
pub enum InjectionValue {
    /// Use this instance as is
    Value(Object),
    /// Resolve a contract. The declared type of the member is used when `ty` is `None`.
    Resolve {
        ty: Option<Type>,
        name: Option<Arc<str>>,
    },
    /// Same as [InjectionValue::Resolve], but fall back to the default value on failure
    Optional {
        ty: Option<Type>,
        name: Option<Arc<str>>,
    },
    /// Use the default value of the parameter (or nothing)
    Default,
}

impl InjectionValue {
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        InjectionValue::Value(Object::from_value(value))
    }

    /// Resolve the declared type of the member
    pub fn resolved() -> Self {
        InjectionValue::Resolve { ty: None, name: None }
    }

    /// Resolve the named registration of the declared type
    pub fn named(name: &str) -> Self {
        InjectionValue::Resolve {
            ty: None,
            name: Some(name.into()),
        }
    }

    pub fn resolve<T: ?Sized + Reflect>(name: Option<&str>) -> Self {
        InjectionValue::Resolve {
            ty: Some(T::type_of()),
            name: name.map(Arc::from),
        }
    }

    pub fn optional<T: ?Sized + Reflect>(name: Option<&str>) -> Self {
        InjectionValue::Optional {
            ty: Some(T::type_of()),
            name: name.map(Arc::from),
        }
    }

    /// Check if the value can be used for a member declared with type `declared`
    pub(crate) fn check(&self, declared: &Type) -> Result<(), String> {
        match self {
            InjectionValue::Value(object) if object.key() != declared.key() => Err(format!(
                "a `{}` was supplied where `{}` is expected",
                object.type_name(),
                declared
            )),
            InjectionValue::Resolve { ty: Some(ty), .. }
            | InjectionValue::Optional { ty: Some(ty), .. }
                if !ty.is_assignable_to(declared) =>
            {
                Err(format!("`{}` cannot be assigned to `{}`", ty, declared))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for InjectionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionValue::Value(object) => write!(f, "{:?}", object),
            InjectionValue::Resolve { ty, name } => write!(f, "resolve({:?}, {:?})", ty, name),
            InjectionValue::Optional { ty, name } => write!(f, "optional({:?}, {:?})", ty, name),
            InjectionValue::Default => f.write_str("default"),
        }
    }
}

/// Member of the implementation type to inject
#[derive(Clone, Debug)]
pub enum InjectionMember {
    /// Use the constructor matching these parameter values
    Constructor(Vec<InjectionValue>),
    /// Inject a field, with its declared type when no value is given
    Field(String, Option<InjectionValue>),
    Property(String, Option<InjectionValue>),
    /// Call a method with these parameter values
    Method(String, Vec<InjectionValue>),
}

impl InjectionMember {
    pub fn constructor(values: impl IntoIterator<Item = InjectionValue>) -> Self {
        InjectionMember::Constructor(values.into_iter().collect())
    }

    pub fn field(name: &str) -> Self {
        InjectionMember::Field(name.to_string(), None)
    }

    pub fn field_with(name: &str, value: InjectionValue) -> Self {
        InjectionMember::Field(name.to_string(), Some(value))
    }

    pub fn property(name: &str) -> Self {
        InjectionMember::Property(name.to_string(), None)
    }

    pub fn property_with(name: &str, value: InjectionValue) -> Self {
        InjectionMember::Property(name.to_string(), Some(value))
    }

    pub fn method(name: &str, values: impl IntoIterator<Item = InjectionValue>) -> Self {
        InjectionMember::Method(name.to_string(), values.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Port(u16);

    #[test]
    fn checks_supplied_values() {
        let port = Type::value::<Port>("Port");
        assert!(InjectionValue::Value(Object::from_value(Port(80))).check(&port).is_ok());
        assert!(InjectionValue::value(80u16).check(&port).is_err());
        assert!(InjectionValue::resolved().check(&port).is_ok());
        assert!(InjectionValue::Default.check(&port).is_ok());
        let wrong = InjectionValue::Resolve {
            ty: Some(Type::value::<u8>("u8")),
            name: None,
        };
        assert!(wrong.check(&port).is_err());
    }
}
