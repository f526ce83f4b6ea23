//! Runtime type descriptors.
//!
//! The container builds object graphs at runtime, so it needs to know how to construct a type,
//! which members receive dependencies, and which interfaces a concrete type can be used as.
//! This information is provided by [Type] descriptors, usually through the [Reflect] trait:
//!
//! * Concrete types are described with [Type::class], which lists constructors, fields,
//!   properties, methods and the interfaces (trait objects) the type implements.
//! * Trait objects are described with [Type::interface]. They can be resolved once a concrete type
//!   is registered for them.
//! * Open generic definitions ([Type::generic_definition]) stand for a family of types.
//!   A definition can close itself over type arguments, which allows a single registration
//!   to serve every closed form.
//!
//! Descriptors compare by [TypeKey] only: two descriptors of the same Rust type are the same
//! type for the container.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::InvokeError;
use crate::inject::{Callable, Dependencies, Dependency, MethodCallable};
use crate::object::{dispose_as, Disposable, Object};

/// Identity of a runtime type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeKey {
    /// A Rust type, including trait objects
    Native(TypeId),
    /// An open generic definition
    Definition(u64),
    /// Sequence of all registrations of the element type
    Enumerable(Arc<TypeKey>),
    /// Array of the named registrations of the element type
    Array { element: Arc<TypeKey>, rank: u32 },
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        TypeKey::Native(TypeId::of::<T>())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TypeKind {
    Class,
    Interface,
    Value,
    GenericDefinition,
    Enumerable,
    Array,
}

/// Build a new instance from the resolved parameter values
pub type Invoker =
    Arc<dyn Fn(Vec<Option<Object>>) -> Result<Box<dyn Any + Send + Sync>, InvokeError> + Send + Sync>;

/// Assign a value to a member of an instance under construction
pub type Setter =
    Arc<dyn Fn(&mut (dyn Any + Send + Sync), Option<Object>) -> Result<(), InvokeError> + Send + Sync>;

/// Call a method on an instance under construction
pub type MethodInvoker = Arc<
    dyn Fn(&mut (dyn Any + Send + Sync), Vec<Option<Object>>) -> Result<(), InvokeError> + Send + Sync,
>;

type Caster = Arc<dyn Fn(&Object) -> Option<Object> + Send + Sync>;
type Sealer = fn(Box<dyn Any + Send + Sync>) -> Option<Object>;
type Closer = Arc<dyn Fn(&[Type]) -> Option<Type> + Send + Sync>;

/// Types with a runtime descriptor
pub trait Reflect: 'static {
    fn type_of() -> Type;
}

/// Lazy reference to a type descriptor.
///
/// Member metadata refers to other types through this indirection, which enables descriptors
/// of mutually dependent types.
#[derive(Clone)]
pub enum TypeRef {
    Lazy(fn() -> Type),
    Enumerable(fn() -> Type),
    Array(fn() -> Type, u32),
    Resolved(Type),
}

impl TypeRef {
    pub fn of<T: ?Sized + Reflect>() -> Self {
        TypeRef::Lazy(T::type_of)
    }

    pub fn get(&self) -> Type {
        match self {
            TypeRef::Lazy(f) => f(),
            TypeRef::Enumerable(f) => Type::enumerable(f()),
            TypeRef::Array(f, rank) => Type::array(f(), *rank),
            TypeRef::Resolved(ty) => ty.clone(),
        }
    }
}

impl From<Type> for TypeRef {
    fn from(ty: Type) -> Self {
        TypeRef::Resolved(ty)
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get().name())
    }
}

/// Marks a member as a dependency to inject, optionally under a registration name
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Annotation {
    pub name: Option<Arc<str>>,
    pub optional: bool,
}

impl Annotation {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.into()),
            optional: false,
        }
    }

    pub fn optional() -> Self {
        Self {
            name: None,
            optional: true,
        }
    }
}

/// Value used for a parameter that the container can not resolve
#[derive(Clone, Debug)]
pub enum DefaultValue {
    Absent,
    Null,
    Value(Object),
}

#[derive(Clone, Debug)]
pub struct ParameterInfo {
    name: Arc<str>,
    ty: TypeRef,
    default: DefaultValue,
    by_ref: bool,
    annotation: Option<Annotation>,
}

impl ParameterInfo {
    pub fn new(name: &str, ty: impl Into<TypeRef>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            default: DefaultValue::Absent,
            by_ref: false,
            annotation: None,
        }
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = default;
        self
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    pub fn by_ref(mut self) -> Self {
        self.by_ref = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> Type {
        self.ty.get()
    }

    pub fn default(&self) -> &DefaultValue {
        &self.default
    }

    pub fn has_default(&self) -> bool {
        !matches!(self.default, DefaultValue::Absent)
    }

    pub fn is_by_ref(&self) -> bool {
        self.by_ref
    }

    pub fn annotation(&self) -> Option<&Annotation> {
        self.annotation.as_ref()
    }
}

#[derive(Clone)]
pub struct ConstructorInfo {
    parameters: Vec<ParameterInfo>,
    invoke: Invoker,
    preferred: bool,
}

impl ConstructorInfo {
    pub fn new(parameters: Vec<ParameterInfo>, invoke: Invoker) -> Self {
        Self {
            parameters,
            invoke,
            preferred: false,
        }
    }

    /// Select this constructor ahead of the automatic selection
    pub fn preferred(mut self) -> Self {
        self.preferred = true;
        self
    }

    pub fn with_default(self, parameter: &str, value: Object) -> Self {
        self.update(parameter, |p| p.with_default(DefaultValue::Value(value)))
    }

    pub fn with_null_default(self, parameter: &str) -> Self {
        self.update(parameter, |p| p.with_default(DefaultValue::Null))
    }

    pub fn with_annotation(self, parameter: &str, annotation: Annotation) -> Self {
        self.update(parameter, |p| p.with_annotation(annotation))
    }

    pub fn by_ref(self, parameter: &str) -> Self {
        self.update(parameter, ParameterInfo::by_ref)
    }

    fn update(mut self, parameter: &str, f: impl FnOnce(ParameterInfo) -> ParameterInfo) -> Self {
        if let Some(p) = self.parameters.iter_mut().find(|p| p.name() == parameter) {
            *p = f(p.clone());
        }
        self
    }

    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.parameters
    }

    pub fn is_preferred(&self) -> bool {
        self.preferred
    }

    pub(crate) fn invoke(
        &self,
        values: Vec<Option<Object>>,
    ) -> Result<Box<dyn Any + Send + Sync>, InvokeError> {
        (self.invoke)(values)
    }

    pub(crate) fn signature(&self, owner: &str) -> String {
        let params: Vec<_> = self
            .parameters
            .iter()
            .map(|p| format!("{}: {}", p.name(), p.ty().name()))
            .collect();
        format!("{}({})", owner, params.join(", "))
    }
}

impl fmt::Debug for ConstructorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.parameters.iter()).finish()
    }
}

/// A field or property that can receive a dependency
#[derive(Clone)]
pub struct FieldInfo {
    name: Arc<str>,
    ty: TypeRef,
    setter: Setter,
    is_static: bool,
    read_only: bool,
    annotation: Option<Annotation>,
}

/// Properties share the field description, they only differ by their processing stage
pub type PropertyInfo = FieldInfo;

impl FieldInfo {
    /// Describe a member of `T` assigned by `set`
    pub fn new<T, D, F>(name: &str, set: F) -> Self
    where
        T: Send + Sync + 'static,
        D: Dependency,
        F: Fn(&mut T, D) + Send + Sync + 'static,
    {
        let setter: Setter = Arc::new(move |target, value| {
            let target = target
                .downcast_mut::<T>()
                .ok_or_else(|| InvokeError::Mismatch {
                    expected: std::any::type_name::<T>(),
                    actual: "unknown target",
                })?;
            set(target, D::extract(value)?);
            Ok(())
        });
        Self {
            name: name.into(),
            ty: D::type_ref(),
            setter,
            is_static: false,
            read_only: false,
            annotation: None,
        }
    }

    pub fn raw(name: &str, ty: impl Into<TypeRef>, setter: Setter) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            setter,
            is_static: false,
            read_only: false,
            annotation: None,
        }
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn static_member(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> Type {
        self.ty.get()
    }

    /// Only writable instance members take part in injection
    pub fn is_injectable(&self) -> bool {
        !self.is_static && !self.read_only
    }

    pub fn annotation(&self) -> Option<&Annotation> {
        self.annotation.as_ref()
    }

    pub(crate) fn assign(
        &self,
        target: &mut (dyn Any + Send + Sync),
        value: Option<Object>,
    ) -> Result<(), InvokeError> {
        (self.setter)(target, value)
    }
}

impl fmt::Debug for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.name, self.ty)
    }
}

#[derive(Clone)]
pub struct MethodInfo {
    name: Arc<str>,
    parameters: Vec<ParameterInfo>,
    invoke: MethodInvoker,
    injected: bool,
}

impl MethodInfo {
    pub fn new(name: &str, parameters: Vec<ParameterInfo>, invoke: MethodInvoker) -> Self {
        Self {
            name: name.into(),
            parameters,
            invoke,
            injected: false,
        }
    }

    /// Call this method on every built instance
    pub fn injected(mut self) -> Self {
        self.injected = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.parameters
    }

    pub fn is_injected(&self) -> bool {
        self.injected
    }

    pub(crate) fn invoke(
        &self,
        target: &mut (dyn Any + Send + Sync),
        values: Vec<Option<Object>>,
    ) -> Result<(), InvokeError> {
        (self.invoke)(target, values)
    }
}

impl fmt::Debug for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.name, self.parameters)
    }
}

#[derive(Clone)]
struct Implementation {
    interface: TypeRef,
    cast: Caster,
}

#[derive(Clone)]
struct GenericInfo {
    definition: Type,
    arguments: Vec<Type>,
}

struct TypeData {
    key: TypeKey,
    name: Arc<str>,
    kind: TypeKind,
    constructors: Vec<ConstructorInfo>,
    fields: Vec<FieldInfo>,
    properties: Vec<PropertyInfo>,
    methods: Vec<MethodInfo>,
    implementations: Vec<Implementation>,
    seal: Option<Sealer>,
    disposer: Option<fn(&Object)>,
    generic: Option<GenericInfo>,
    arity: usize,
    closer: Option<Closer>,
    element: Option<Type>,
    rank: u32,
}

impl TypeData {
    fn empty(key: TypeKey, name: &str, kind: TypeKind) -> Self {
        Self {
            key,
            name: name.into(),
            kind,
            constructors: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
            implementations: Vec::new(),
            seal: None,
            disposer: None,
            generic: None,
            arity: 0,
            closer: None,
            element: None,
            rank: 0,
        }
    }
}

/// Shared handle on a runtime type descriptor
#[derive(Clone)]
pub struct Type(Arc<TypeData>);

static NEXT_DEFINITION: AtomicU64 = AtomicU64::new(1);

fn seal_as<T: Send + Sync + 'static>(instance: Box<dyn Any + Send + Sync>) -> Option<Object> {
    instance
        .downcast::<T>()
        .ok()
        .map(|v| Object::new(Arc::<T>::from(v)))
}

impl Type {
    /// Describe a concrete type
    pub fn class<T: Send + Sync + 'static>(name: &str) -> TypeBuilder<T> {
        let mut data = TypeData::empty(TypeKey::of::<T>(), name, TypeKind::Class);
        data.seal = Some(seal_as::<T> as Sealer);
        TypeBuilder::new(data)
    }

    /// Describe a trait object or another abstract type
    pub fn interface<T: ?Sized + 'static>(name: &str) -> TypeBuilder<T> {
        TypeBuilder::new(TypeData::empty(TypeKey::of::<T>(), name, TypeKind::Interface))
    }

    /// Describe a plain value type, which can be registered but not constructed
    pub fn value<T: Send + Sync + 'static>(name: &str) -> Type {
        Type(Arc::new(TypeData::empty(TypeKey::of::<T>(), name, TypeKind::Value)))
    }

    /// Describe an open generic definition
    pub fn generic_definition(name: &str, arity: usize) -> DefinitionBuilder {
        let id = NEXT_DEFINITION.fetch_add(1, Ordering::Relaxed);
        let mut data = TypeData::empty(TypeKey::Definition(id), name, TypeKind::GenericDefinition);
        data.arity = arity;
        DefinitionBuilder(data)
    }

    /// Sequence of all instances registered for the element type
    pub fn enumerable(element: Type) -> Type {
        let key = TypeKey::Enumerable(Arc::new(element.key().clone()));
        let name = format!("Vec<{}>", element.name());
        let mut data = TypeData::empty(key, &name, TypeKind::Enumerable);
        data.element = Some(element);
        Type(Arc::new(data))
    }

    /// Array of the named instances registered for the element type
    pub fn array(element: Type, rank: u32) -> Type {
        let key = TypeKey::Array {
            element: Arc::new(element.key().clone()),
            rank,
        };
        let commas = ",".repeat(rank.saturating_sub(1) as usize);
        let name = format!("{}[{}]", element.name(), commas);
        let mut data = TypeData::empty(key, &name, TypeKind::Array);
        data.element = Some(element);
        data.rank = rank;
        Type(Arc::new(data))
    }

    pub fn of<T: ?Sized + Reflect>() -> Type {
        T::type_of()
    }

    pub fn key(&self) -> &TypeKey {
        &self.0.key
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> TypeKind {
        self.0.kind
    }

    /// A type can be built by the container when it declares at least one constructor
    pub fn is_constructible(&self) -> bool {
        self.0.kind == TypeKind::Class && !self.0.constructors.is_empty()
    }

    pub fn is_generic_definition(&self) -> bool {
        self.0.kind == TypeKind::GenericDefinition
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.0.kind, TypeKind::Enumerable | TypeKind::Array)
    }

    pub fn constructors(&self) -> &[ConstructorInfo] {
        &self.0.constructors
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.0.fields
    }

    pub fn properties(&self) -> &[PropertyInfo] {
        &self.0.properties
    }

    pub fn methods(&self) -> &[MethodInfo] {
        &self.0.methods
    }

    pub fn element(&self) -> Option<&Type> {
        self.0.element.as_ref()
    }

    pub fn rank(&self) -> u32 {
        self.0.rank
    }

    pub fn generic_definition_of(&self) -> Option<&Type> {
        self.0.generic.as_ref().map(|g| &g.definition)
    }

    pub fn generic_arguments(&self) -> &[Type] {
        self.0
            .generic
            .as_ref()
            .map(|g| g.arguments.as_slice())
            .unwrap_or(&[])
    }

    /// Close a generic definition over type arguments
    pub fn make_generic(&self, arguments: &[Type]) -> Option<Type> {
        if !self.is_generic_definition() || arguments.len() != self.0.arity {
            return None;
        }
        self.0.closer.as_ref().and_then(|close| close(arguments))
    }

    /// Check if instances of this type can be used where `target` is expected
    pub fn is_assignable_to(&self, target: &Type) -> bool {
        if self == target {
            return true;
        }
        if self.is_generic_definition() && target.is_generic_definition() {
            // Checked once both sides are closed
            return true;
        }
        self.0
            .implementations
            .iter()
            .any(|i| i.interface.get() == *target)
    }

    /// Turn an instance of this type into an instance of `target`
    pub fn cast(&self, object: &Object, target: &Type) -> Option<Object> {
        if object.key() == target.key() {
            return Some(object.clone());
        }
        self.0
            .implementations
            .iter()
            .find(|i| i.interface.get() == *target)
            .and_then(|i| (i.cast)(object))
    }

    pub(crate) fn seal(&self, instance: Box<dyn Any + Send + Sync>) -> Option<Object> {
        let seal = self.0.seal?;
        seal(instance).map(|object| object.with_disposer(self.0.disposer))
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.0.key == other.0.key
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key.hash(state)
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// Incremental construction of a [Type] descriptor
pub struct TypeBuilder<T: ?Sized> {
    data: TypeData,
    _target: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized + 'static> TypeBuilder<T> {
    fn new(data: TypeData) -> Self {
        Self {
            data,
            _target: PhantomData,
        }
    }

    /// Record this type as a closed form of a generic definition
    pub fn generic_of(mut self, definition: &Type, arguments: Vec<Type>) -> Self {
        self.data.generic = Some(GenericInfo {
            definition: definition.clone(),
            arguments,
        });
        self
    }

    pub fn build(self) -> Type {
        Type(Arc::new(self.data))
    }
}

impl<T: Send + Sync + 'static> TypeBuilder<T> {
    /// Add a constructor, the names are used for the parameters in order
    pub fn constructor<Args, F>(self, names: &[&str], f: F) -> Self
    where
        Args: Dependencies,
        F: Callable<Args, T> + Send + Sync + 'static,
    {
        self.constructor_with(names, f, |c| c)
    }

    /// Add a constructor and adjust its metadata (defaults, annotations)
    pub fn constructor_with<Args, F>(
        self,
        names: &[&str],
        f: F,
        configure: impl FnOnce(ConstructorInfo) -> ConstructorInfo,
    ) -> Self
    where
        Args: Dependencies,
        F: Callable<Args, T> + Send + Sync + 'static,
    {
        let invoke: Invoker = Arc::new(move |values| {
            let args = Args::extract(values)?;
            Ok(Box::new(f.call(args)) as Box<dyn Any + Send + Sync>)
        });
        let info = ConstructorInfo::new(Args::parameters(names), invoke);
        self.with_constructor(configure(info))
    }

    /// Add a constructor which can report a failure
    pub fn fallible_constructor<Args, F, E>(self, names: &[&str], f: F) -> Self
    where
        Args: Dependencies,
        E: std::error::Error + Send + Sync + 'static,
        F: Callable<Args, Result<T, E>> + Send + Sync + 'static,
    {
        let invoke: Invoker = Arc::new(move |values| {
            let args = Args::extract(values)?;
            match f.call(args) {
                Ok(v) => Ok(Box::new(v) as Box<dyn Any + Send + Sync>),
                Err(e) => Err(InvokeError::Failed(Box::new(e))),
            }
        });
        self.with_constructor(ConstructorInfo::new(Args::parameters(names), invoke))
    }

    pub fn with_constructor(mut self, constructor: ConstructorInfo) -> Self {
        self.data.constructors.push(constructor);
        self
    }

    /// Add a field injected with its declared type
    pub fn field<D, F>(self, name: &str, set: F) -> Self
    where
        D: Dependency,
        F: Fn(&mut T, D) + Send + Sync + 'static,
    {
        let optional = D::optional();
        self.with_field(FieldInfo::new(name, set).with_annotation(Annotation {
            name: None,
            optional,
        }))
    }

    pub fn with_field(mut self, field: FieldInfo) -> Self {
        self.data.fields.push(field);
        self
    }

    /// Add a property injected with its declared type
    pub fn property<D, F>(self, name: &str, set: F) -> Self
    where
        D: Dependency,
        F: Fn(&mut T, D) + Send + Sync + 'static,
    {
        let optional = D::optional();
        self.with_property(FieldInfo::new(name, set).with_annotation(Annotation {
            name: None,
            optional,
        }))
    }

    pub fn with_property(mut self, property: PropertyInfo) -> Self {
        self.data.properties.push(property);
        self
    }

    /// Add a method called with resolved arguments on every built instance
    pub fn method<Args, F>(self, name: &str, names: &[&str], f: F) -> Self
    where
        Args: Dependencies,
        F: MethodCallable<T, Args> + Send + Sync + 'static,
    {
        self.with_method(method_info(name, names, f).injected())
    }

    pub fn with_method(mut self, method: MethodInfo) -> Self {
        self.data.methods.push(method);
        self
    }

    /// Declare that this type can be used as the interface `I`
    pub fn implements<I, F>(mut self, cast: F) -> Self
    where
        I: ?Sized + Reflect + Send + Sync,
        F: Fn(Arc<T>) -> Arc<I> + Send + Sync + 'static,
    {
        let caster: Caster = Arc::new(move |object| object.downcast::<T>().map(|v| Object::new(cast(v))));
        self.data.implementations.push(Implementation {
            interface: TypeRef::of::<I>(),
            cast: caster,
        });
        self
    }

    /// Built instances are disposed with the lifetime manager holding them
    pub fn disposable(mut self) -> Self
    where
        T: Disposable,
    {
        self.data.disposer = Some(dispose_as::<T> as fn(&Object));
        self
    }
}

/// Describe a method of `T` without marking it for injection
pub fn method_info<T, Args, F>(name: &str, names: &[&str], f: F) -> MethodInfo
where
    T: Send + Sync + 'static,
    Args: Dependencies,
    F: MethodCallable<T, Args> + Send + Sync + 'static,
{
    let invoke: MethodInvoker = Arc::new(move |target, values| {
        let target = target
            .downcast_mut::<T>()
            .ok_or_else(|| InvokeError::Mismatch {
                expected: std::any::type_name::<T>(),
                actual: "unknown target",
            })?;
        let args = Args::extract(values)?;
        f.call_on(target, args);
        Ok(())
    });
    MethodInfo::new(name, Args::parameters(names), invoke)
}

/// Construction of an open generic definition
pub struct DefinitionBuilder(TypeData);

impl DefinitionBuilder {
    /// Provide the closed type for a list of type arguments
    pub fn closing<F>(mut self, close: F) -> Self
    where
        F: Fn(&[Type]) -> Option<Type> + Send + Sync + 'static,
    {
        self.0.closer = Some(Arc::new(close));
        self
    }

    pub fn build(self) -> Type {
        Type(Arc::new(self.0))
    }
}
