//! Error types raised while registering and resolving.
//!
//! Every failure of a resolve call surfaces as one [ResolutionError], whatever its origin
//! (missing registration, cycle, user constructor failure, ...). Registration problems are
//! reported eagerly as [RegistrationError]. [WiringError] wraps both for the public entry points.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::contract::Contract;

/// Boxed error type returned by user factories and fallible constructors
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors triggered during the autowiring process
#[derive(Error, Debug)]
pub enum WiringError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[cfg(feature = "tokio")]
    #[error("background resolution did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors detected when a registration is added to a container
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("lifetime manager `{0}` is already in use by another registration")]
    LifetimeInUse(&'static str),
    #[error("a registration needs at least one type to register as")]
    MissingType,
    #[error("array type `{registered}` cannot be mapped to `{mapped}`: rank mismatch")]
    ArrayRankMismatch { registered: String, mapped: String },
    #[error("type `{mapped}` cannot be assigned to `{registered}`")]
    NotAssignable { registered: String, mapped: String },
    #[error("an instance cannot be registered for the open generic `{0}`")]
    InstanceForGenericDefinition(String),
    #[error("the container has been disposed")]
    Disposed,
}

/// Reason of a failed resolution
#[derive(Error, Debug, Clone)]
pub enum ResolutionErrorKind {
    #[error("the type is not registered and cannot be constructed")]
    NotResolvable,
    #[error("no constructor of `{0}` can be satisfied by the container")]
    NoConstructor(String),
    #[error("circular dependency: {0}")]
    CircularDependency(String),
    #[error("`{member}` cannot receive the injected value: {reason}")]
    IncompatibleInjection { member: String, reason: String },
    #[error("`{ty}` has no injectable member `{member}`")]
    MemberNotFound { ty: String, member: String },
    #[error("an instance of `{from}` cannot be used as `{to}`")]
    NotAssignable { from: String, to: String },
    #[error("arrays of rank {0} are not supported")]
    UnsupportedArrayRank(u32),
    #[error("the open generic `{0}` cannot be resolved, close it first")]
    OpenGeneric(String),
    #[error("construction failed: {0}")]
    Construction(Arc<dyn std::error::Error + Send + Sync>),
    #[error("the container has been disposed")]
    Disposed,
}

/// Failure of a resolve call.
///
/// Carries the contract that was requested when the failure happened and, when the container runs
/// with diagnostics enabled, the chain of members that led to it (innermost first).
#[derive(Debug, Clone)]
pub struct ResolutionError {
    type_name: String,
    name: Option<String>,
    kind: ResolutionErrorKind,
    trace: Option<Vec<String>>,
}

impl ResolutionError {
    pub fn new(contract: &Contract, kind: ResolutionErrorKind) -> Self {
        Self {
            type_name: contract.ty().name().to_string(),
            name: contract.name().map(str::to_string),
            kind,
            trace: None,
        }
    }

    /// Wrap an error raised by user code (factory or constructor)
    pub fn construction(contract: &Contract, source: BoxError) -> Self {
        // A nested resolution failure keeps its own shape
        match source.downcast::<ResolutionError>() {
            Ok(inner) => *inner,
            Err(other) => Self::new(contract, ResolutionErrorKind::Construction(Arc::from(other))),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> &ResolutionErrorKind {
        &self.kind
    }

    pub fn is_circular(&self) -> bool {
        matches!(self.kind, ResolutionErrorKind::CircularDependency(_))
    }

    /// Resolution path, innermost frame first. `None` when diagnostics are disabled.
    pub fn trace(&self) -> Option<&[String]> {
        self.trace.as_deref()
    }

    pub(crate) fn push_frame(&mut self, frame: impl Into<String>) {
        self.trace.get_or_insert_with(Vec::new).push(frame.into());
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resolution of `{}`", self.type_name)?;
        if let Some(name) = &self.name {
            write!(f, " (name: \"{}\")", name)?;
        }
        write!(f, " failed: {}", self.kind)?;
        if let Some(trace) = &self.trace {
            for frame in trace {
                write!(f, "\n  {}", frame)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ResolutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ResolutionErrorKind::Construction(source) => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Failure of a member invoker (constructor, setter or method) on the supplied values
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("no value supplied for `{0}`")]
    Missing(String),
    #[error("expected a `{expected}`, got a `{actual}`")]
    Mismatch {
        expected: &'static str,
        actual: &'static str,
    },
    #[error(transparent)]
    Failed(BoxError),
}
