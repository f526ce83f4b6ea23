//! Runtime dependency injection container with lifetime management, type mappings, open generic
//! registrations and member injection.
//!
//! # Simple use case
//!
//! ```
//! # use std::sync::Arc;
//! # use wiring::*;
//! // Define traits and implementors
//! trait MyTrait: Send + Sync {
//!     fn cheers(&self) -> &'static str;
//! }
//!
//! struct MyImpl;
//!
//! impl MyTrait for MyImpl {
//!     fn cheers(&self) -> &'static str {
//!         "Hello world"
//!     }
//! }
//!
//! // Describe them to the container
//! reflect_interface!("MyTrait", dyn MyTrait);
//! reflect_type!(
//!     MyImpl,
//!     Type::class::<MyImpl>("MyImpl")
//!         .constructor(&[], || MyImpl)
//!         .implements::<dyn MyTrait, _>(|v| v as Arc<dyn MyTrait>)
//!         .build()
//! );
//!
//! # fn main() -> Result<(), WiringError> {
//! // Register the mapping and resolve it
//! let container = Container::new();
//! container.register_mapping::<dyn MyTrait, MyImpl>(None, Some(Arc::new(ContainerControlled::new())))?;
//! let a: Arc<dyn MyTrait> = container.resolve_as(None)?;
//! assert_eq!(a.cheers(), "Hello world");
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! Rust has no runtime reflection, the types handled by the container are described by a
//! [Type] descriptor obtained through the [Reflect] trait. A descriptor lists the constructors,
//! fields, properties and injection methods of a type and the interfaces it can be cast to.
//! Constructors and methods are plain functions whose arguments are dependencies
//! (`Arc<T>`, `Option<Arc<T>>`, `Vec<Arc<T>>` or `Box<[Arc<T>]>`).
//!
//! * A [Contract] (a type and an optional name) identifies what is requested.
//! * A registration associates a contract to a construction strategy: build a type, hand out
//!   an instance or call a factory. Its [LifetimeManager] decides how long built instances live.
//! * Registrations are stored in a [Scope]. Each container owns a scope and child containers
//!   see the registrations of their parents.
//! * On first resolution, a [Pipeline] is built for the registration, selecting the
//!   constructor and the members to inject, and cached for later requests.
//! * [ResolverOverride]s replace selected dependencies for the duration of a resolve call.
//!
//! # Features
//!
//! * `tokio` (off by default): adds `Container::resolve_async`, which runs a resolution on the
//!   blocking thread pool. Its tests only run with `cargo test --features tokio`.

mod container;
mod context;
mod contract;
mod error;
mod helpers;
mod inject;
mod injection;
mod lifetime;
mod object;
mod options;
mod overrides;
mod pipeline;
mod processors;
mod registration;
mod resolve;
mod scope;
mod types;

pub use container::{Container, WeakContainer};
pub use context::{ImportInfo, MemberKind, PipelineContext, Resolver};
pub use contract::Contract;
pub use error::{BoxError, InvokeError, RegistrationError, ResolutionError, ResolutionErrorKind, WiringError};
pub use inject::{Callable, Dependencies, Dependency, MethodCallable};
pub use injection::{InjectionMember, InjectionValue};
pub use lifetime::{
    ContainerControlled, ExternallyControlled, Hierarchical, LifetimeManager, LifetimeScope, PerResolve,
    PerThread, Transient,
};
pub use object::{Disposable, Object};
pub use options::ContainerOptions;
pub use overrides::{MatchRank, ResolverOverride};
pub use pipeline::{Activated, BuildMode, BuildStage, Compiled, Pipeline, PipelineExecutor, Stage};
pub use registration::{
    Category, ContainerRegistration, Factory, Registration, RegistrationDescriptor, RegistrationKind,
    RegistrationManager,
};
pub use scope::Scope;
pub use types::{
    method_info, Annotation, ConstructorInfo, DefaultValue, DefinitionBuilder, FieldInfo, Invoker, MethodInfo,
    MethodInvoker, ParameterInfo, PropertyInfo, Reflect, Setter, Type, TypeBuilder, TypeKey, TypeKind, TypeRef,
};

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
}

#[cfg(test)]
mod tests;
