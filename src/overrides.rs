//! Values supplied to a single resolve call, replacing the normal resolution of matching
//! parameters, fields, properties or dependencies anywhere in the built graph.

use std::sync::Arc;

use crate::context::{ImportInfo, MemberKind};
use crate::injection::InjectionValue;
use crate::object::Object;
use crate::types::{Reflect, Type};

/// How well an override matches an import
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum MatchRank {
    NoMatch,
    Compatible,
    HigherProspect,
    ExactMatch,
}

#[derive(Clone, Debug)]
enum Target {
    Parameter,
    Field,
    Property,
    /// Any import of a contract
    Dependency,
}

#[derive(Clone, Debug)]
pub struct ResolverOverride {
    target: Target,
    name: Option<Arc<str>>,
    ty: Option<Type>,
    on_type: Option<Type>,
    value: InjectionValue,
    require_rank: MatchRank,
}

impl ResolverOverride {
    fn new(target: Target, name: Option<&str>, ty: Option<Type>, value: InjectionValue) -> Self {
        Self {
            target,
            name: name.map(Arc::from),
            ty,
            on_type: None,
            value,
            require_rank: MatchRank::HigherProspect,
        }
    }

    /// Override constructor and method parameters by name
    pub fn parameter(name: &str, value: InjectionValue) -> Self {
        Self::new(Target::Parameter, Some(name), None, value)
    }

    /// Override parameters of a given type, optionally restricted to a name
    pub fn parameter_of<T: ?Sized + Reflect>(name: Option<&str>, value: InjectionValue) -> Self {
        Self::new(Target::Parameter, name, Some(T::type_of()), value)
    }

    pub fn field(name: &str, value: InjectionValue) -> Self {
        Self::new(Target::Field, Some(name), None, value)
    }

    pub fn property(name: &str, value: InjectionValue) -> Self {
        Self::new(Target::Property, Some(name), None, value)
    }

    /// Override every import of the contract `(T, name)`
    pub fn dependency<T: ?Sized + Reflect>(name: Option<&str>, value: InjectionValue) -> Self {
        Self::new(Target::Dependency, name, Some(T::type_of()), value)
    }

    /// Shortcut for a dependency override with a given instance
    pub fn dependency_value<T: ?Sized + Reflect + Send + Sync>(value: Arc<T>) -> Self {
        Self::dependency::<T>(None, InjectionValue::Value(Object::new(value)))
    }

    /// Only apply to members of `T`
    pub fn on_type<T: ?Sized + Reflect>(mut self) -> Self {
        self.on_type = Some(T::type_of());
        self
    }

    /// Lowest rank accepted when no exact match is found
    pub fn require(mut self, rank: MatchRank) -> Self {
        self.require_rank = rank;
        self
    }

    pub fn value(&self) -> &InjectionValue {
        &self.value
    }

    pub fn rank(&self, import: &ImportInfo) -> MatchRank {
        if let Some(on_type) = &self.on_type {
            if on_type != import.declaring() {
                return MatchRank::NoMatch;
            }
        }
        match self.target {
            Target::Parameter if import.kind() == MemberKind::Parameter => self.rank_member(import),
            Target::Field if import.kind() == MemberKind::Field => self.rank_member(import),
            Target::Property if import.kind() == MemberKind::Property => self.rank_member(import),
            Target::Dependency => self.rank_dependency(import),
            _ => MatchRank::NoMatch,
        }
    }

    fn rank_member(&self, import: &ImportInfo) -> MatchRank {
        match (&self.name, &self.ty) {
            (Some(name), _) if &**name != import.name() => MatchRank::NoMatch,
            (Some(_), Some(ty)) if ty == import.ty() => MatchRank::ExactMatch,
            (Some(_), Some(_)) => MatchRank::NoMatch,
            (Some(_), None) => match &self.value {
                InjectionValue::Value(object) if object.key() == import.ty().key() => {
                    MatchRank::ExactMatch
                }
                _ => MatchRank::HigherProspect,
            },
            (None, Some(ty)) if ty == import.ty() => MatchRank::ExactMatch,
            (None, Some(ty)) if ty.is_assignable_to(import.ty()) => MatchRank::Compatible,
            (None, Some(_)) => MatchRank::NoMatch,
            (None, None) => match &self.value {
                InjectionValue::Value(object) if object.key() == import.ty().key() => {
                    MatchRank::ExactMatch
                }
                _ => MatchRank::Compatible,
            },
        }
    }

    fn rank_dependency(&self, import: &ImportInfo) -> MatchRank {
        let contract = import.contract();
        match &self.ty {
            Some(ty) if ty != contract.ty() => MatchRank::NoMatch,
            _ if self.name.as_deref() == contract.name() => MatchRank::ExactMatch,
            _ if self.name.is_none() => MatchRank::HigherProspect,
            _ => MatchRank::NoMatch,
        }
    }
}

/// Select the override applying to an import.
///
/// Later overrides win: the list is scanned backward and the first exact match is returned.
/// Otherwise the best candidate is used if it reaches its required rank.
pub(crate) fn find<'o>(
    overrides: &'o [ResolverOverride],
    import: &ImportInfo,
) -> Option<&'o ResolverOverride> {
    let mut best: Option<(&ResolverOverride, MatchRank)> = None;
    for candidate in overrides.iter().rev() {
        let rank = candidate.rank(import);
        if rank == MatchRank::ExactMatch {
            return Some(candidate);
        }
        if rank > best.map(|(_, r)| r).unwrap_or(MatchRank::NoMatch) {
            best = Some((candidate, rank));
        }
    }
    best.filter(|(candidate, rank)| *rank >= candidate.require_rank)
        .map(|(candidate, _)| candidate)
}
