use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing_test::traced_test;

use super::*;

trait Plugin: Send + Sync {
    fn id(&self) -> &'static str;
}

struct Alpha;
impl Plugin for Alpha {
    fn id(&self) -> &'static str {
        "alpha"
    }
}

struct Beta;
impl Plugin for Beta {
    fn id(&self) -> &'static str {
        "beta"
    }
}

struct Gamma;
impl Plugin for Gamma {
    fn id(&self) -> &'static str {
        "gamma"
    }
}

reflect_interface!("Plugin", dyn Plugin);
reflect_type!(
    Alpha,
    Type::class::<Alpha>("Alpha")
        .constructor(&[], || Alpha)
        .implements::<dyn Plugin, _>(|p| p as Arc<dyn Plugin>)
        .build()
);
reflect_type!(
    Beta,
    Type::class::<Beta>("Beta")
        .constructor(&[], || Beta)
        .implements::<dyn Plugin, _>(|p| p as Arc<dyn Plugin>)
        .build()
);
reflect_type!(
    Gamma,
    Type::class::<Gamma>("Gamma")
        .constructor(&[], || Gamma)
        .implements::<dyn Plugin, _>(|p| p as Arc<dyn Plugin>)
        .build()
);

trait Missing: Send + Sync {}
reflect_interface!("Missing", dyn Missing);

trait Motor: Send + Sync {}

struct Engine;
impl Motor for Engine {}

reflect_interface!("Motor", dyn Motor);
reflect_type!(
    Engine,
    Type::class::<Engine>("Engine")
        .constructor(&[], || Engine)
        .implements::<dyn Motor, _>(|e| e as Arc<dyn Motor>)
        .build()
);

struct Wheel;
reflect_type!(Wheel, Type::class::<Wheel>("Wheel").constructor(&[], || Wheel).build());

/// Remembers the constructor it was built with
struct Car {
    used: &'static str,
    wheels: Vec<Arc<Wheel>>,
}

reflect_type!(
    Car,
    Type::class::<Car>("Car")
        .constructor(&["engine"], |_: Arc<Engine>| Car {
            used: "engine",
            wheels: Vec::new(),
        })
        .constructor(&["engine", "front"], |_: Arc<Engine>, front: Arc<Wheel>| Car {
            used: "engine+front",
            wheels: vec![front],
        })
        .constructor(
            &["engine", "front", "back"],
            |_: Arc<Engine>, front: Arc<Wheel>, back: Arc<Wheel>| Car {
                used: "engine+front+back",
                wheels: vec![front, back],
            }
        )
        .build()
);

struct Bike {
    used: &'static str,
}

reflect_type!(
    Bike,
    Type::class::<Bike>("Bike")
        .constructor_with(
            &["wheel", "engine"],
            |_: Arc<Wheel>, _: Arc<Engine>| Bike { used: "by-ref" },
            |c| c.by_ref("wheel")
        )
        .constructor(&["front", "back"], |_: Arc<Wheel>, _: Arc<Wheel>| Bike { used: "wheels" })
        .build()
);

struct Chicken;
struct Egg;

reflect_type!(
    Chicken,
    Type::class::<Chicken>("Chicken")
        .constructor(&["egg"], |_: Arc<Egg>| Chicken)
        .build()
);
reflect_type!(
    Egg,
    Type::class::<Egg>("Egg")
        .constructor(&["chicken"], |_: Arc<Chicken>| Egg)
        .build()
);

struct Greeting {
    text: String,
}

reflect_type!(
    Greeting,
    Type::class::<Greeting>("Greeting")
        .constructor(&["name"], |name: Arc<String>| Greeting {
            text: format!("hello {}", name),
        })
        .build()
);

struct Clock {
    ticks: usize,
}

reflect_type!(
    Clock,
    Type::class::<Clock>("Clock")
        .constructor(&[], || Clock { ticks: 0 })
        .build()
);

#[derive(Default)]
struct Dashboard {
    clock: Option<Arc<Clock>>,
    label: Option<Arc<String>>,
    started_with: Option<Arc<Clock>>,
    level: u32,
}

reflect_type!(
    Dashboard,
    Type::class::<Dashboard>("Dashboard")
        .constructor(&[], Dashboard::default)
        .field("clock", |d: &mut Dashboard, clock: Arc<Clock>| d.clock = Some(clock))
        .property("label", |d: &mut Dashboard, label: Option<Arc<String>>| d.label = label)
        .method("start", &["clock"], |d: &mut Dashboard, clock: Arc<Clock>| {
            d.started_with = Some(clock)
        })
        .with_method(method_info("configure", &["level"], |d: &mut Dashboard, level: Arc<u32>| {
            d.level = *level
        }))
        .build()
);

struct Sensor {
    backup: Option<Arc<dyn Missing>>,
}

reflect_type!(
    Sensor,
    Type::class::<Sensor>("Sensor")
        .constructor(&["backup"], |backup: Option<Arc<dyn Missing>>| Sensor { backup })
        .build()
);

#[derive(Debug, thiserror::Error)]
#[error("broken on purpose")]
struct Broken;

struct Fragile;

reflect_type!(
    Fragile,
    Type::class::<Fragile>("Fragile")
        .fallible_constructor(&[], || Err::<Fragile, _>(Broken))
        .build()
);

struct Pool {
    closed: AtomicBool,
}

impl Pool {
    fn new() -> Self {
        Pool {
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Disposable for Pool {
    fn dispose(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

reflect_type!(
    Pool,
    Type::class::<Pool>("Pool")
        .constructor(&[], Pool::new)
        .disposable()
        .build()
);

struct Inspector {
    container: Arc<Container>,
}

reflect_type!(
    Inspector,
    Type::class::<Inspector>("Inspector")
        .constructor(&["container"], |container: Arc<Container>| Inspector { container })
        .build()
);

// Open generic registrations: `Store<>` implemented by `Repo<>`
trait Store<T>: Send + Sync {
    fn describe(&self) -> String;
}

struct Repo<T> {
    _item: std::marker::PhantomData<fn() -> T>,
}

impl<T> Store<T> for Repo<T> {
    fn describe(&self) -> String {
        format!("repo of {}", std::any::type_name::<T>())
    }
}

struct StoreDefinition;
struct RepoDefinition;

reflect_type!(StoreDefinition, Type::generic_definition("Store<>", 1).build());
reflect_type!(
    RepoDefinition,
    Type::generic_definition("Repo<>", 1)
        .closing(|args| (args[0] == Wheel::type_of()).then(<Repo<Wheel>>::type_of))
        .build()
);

impl Reflect for dyn Store<Wheel> {
    fn type_of() -> Type {
        Type::interface::<dyn Store<Wheel>>("Store<Wheel>")
            .generic_of(&StoreDefinition::type_of(), vec![Wheel::type_of()])
            .build()
    }
}

impl Reflect for Repo<Wheel> {
    fn type_of() -> Type {
        Type::class::<Repo<Wheel>>("Repo<Wheel>")
            .constructor(&[], || Repo {
                _item: std::marker::PhantomData,
            })
            .implements::<dyn Store<Wheel>, _>(|r| r as Arc<dyn Store<Wheel>>)
            .generic_of(&RepoDefinition::type_of(), vec![Wheel::type_of()])
            .build()
    }
}

// A second implementation of `Store<>`
struct Archive<T> {
    _item: std::marker::PhantomData<fn() -> T>,
}

impl<T> Store<T> for Archive<T> {
    fn describe(&self) -> String {
        format!("archive of {}", std::any::type_name::<T>())
    }
}

struct ArchiveDefinition;

reflect_type!(
    ArchiveDefinition,
    Type::generic_definition("Archive<>", 1)
        .closing(|args| (args[0] == Wheel::type_of()).then(<Archive<Wheel>>::type_of))
        .build()
);

impl Reflect for Archive<Wheel> {
    fn type_of() -> Type {
        Type::class::<Archive<Wheel>>("Archive<Wheel>")
            .constructor(&[], || Archive {
                _item: std::marker::PhantomData,
            })
            .implements::<dyn Store<Wheel>, _>(|r| r as Arc<dyn Store<Wheel>>)
            .generic_of(&ArchiveDefinition::type_of(), vec![Wheel::type_of()])
            .build()
    }
}

struct Observer {
    container: WeakContainer,
}

reflect_type!(
    Observer,
    Type::class::<Observer>("Observer")
        .constructor(&["container"], |container: Arc<Container>| Observer {
            container: container.downgrade(),
        })
        .build()
);

fn singleton() -> Option<Arc<dyn LifetimeManager>> {
    Some(Arc::new(ContainerControlled::new()))
}

fn ids(plugins: &[Arc<dyn Plugin>]) -> Vec<&'static str> {
    plugins.iter().map(|p| p.id()).collect()
}

#[test]
fn contract_identity() {
    let plain = Contract::new(Alpha::type_of(), None);
    let empty = Contract::new(Alpha::type_of(), Some(""));
    assert_ne!(plain, empty);
    assert_eq!(plain, Contract::new(Alpha::type_of(), None));
    assert_eq!(plain.hash_code(), Contract::new(Alpha::type_of(), None).hash_code());
    assert_ne!(plain, Contract::new(Beta::type_of(), None));
}

// Disable clippy lint on the comparison of fat pointers:
// this is only test code, the issue should not arise in this context
// * https://github.com/rust-lang/rust/pull/80505
#[allow(clippy::vtable_address_comparisons)]
#[test]
fn singleton_and_transient() -> Result<(), WiringError> {
    let container = Container::new();
    container.register_mapping::<dyn Plugin, Alpha>(None, singleton())?;
    container.register_mapping::<dyn Motor, Engine>(None, None)?;

    let p1: Arc<dyn Plugin> = container.resolve_as(None)?;
    let p2: Arc<dyn Plugin> = container.resolve_as(None)?;
    assert!(Arc::ptr_eq(&p1, &p2));
    assert_eq!(p1.id(), "alpha");

    let m1: Arc<dyn Motor> = container.resolve_as(None)?;
    let m2: Arc<dyn Motor> = container.resolve_as(None)?;
    assert!(!Arc::ptr_eq(&m1, &m2));
    Ok(())
}

#[test]
fn named_registrations_are_separate() -> Result<(), WiringError> {
    let container = Container::new();
    container.register_mapping::<dyn Plugin, Alpha>(None, None)?;
    container.register_mapping::<dyn Plugin, Beta>(Some("x"), singleton())?;

    let default: Arc<dyn Plugin> = container.resolve_as(None)?;
    let x1: Arc<dyn Plugin> = container.resolve_as(Some("x"))?;
    let x2: Arc<dyn Plugin> = container.resolve_as(Some("x"))?;
    assert_eq!(default.id(), "alpha");
    assert_eq!(x1.id(), "beta");
    assert!(Arc::ptr_eq(&x1, &x2));

    assert!(container.is_registered_as::<dyn Plugin>(Some("x")));
    assert!(!container.is_registered_as::<dyn Plugin>(Some("y")));
    assert!(!container.is_registered_as::<dyn Plugin>(Some("")));
    Ok(())
}

#[test]
fn later_registration_supersedes() -> Result<(), WiringError> {
    let container = Container::new();
    container.register_mapping::<dyn Plugin, Alpha>(None, None)?;
    container.register_mapping::<dyn Plugin, Beta>(None, None)?;

    let plugin: Arc<dyn Plugin> = container.resolve_as(None)?;
    assert_eq!(plugin.id(), "beta");
    let count = container
        .registrations()
        .iter()
        .filter(|r| r.contract.ty() == &<dyn Plugin>::type_of())
        .count();
    assert_eq!(count, 1);
    Ok(())
}

#[test]
fn child_shadows_parent() -> Result<(), WiringError> {
    let parent = Container::new();
    parent.register_mapping::<dyn Plugin, Alpha>(None, None)?;
    parent.register_mapping::<dyn Plugin, Gamma>(Some("g"), None)?;
    let child = parent.create_child_container();
    child.register_mapping::<dyn Plugin, Beta>(None, None)?;

    assert_eq!(child.resolve_as::<dyn Plugin>(None)?.id(), "beta");
    assert_eq!(parent.resolve_as::<dyn Plugin>(None)?.id(), "alpha");
    // visible through the parent chain
    assert_eq!(child.resolve_as::<dyn Plugin>(Some("g"))?.id(), "gamma");
    assert!(child.is_registered_as::<dyn Plugin>(Some("g")));
    assert!(Arc::ptr_eq(child.parent().map(|p| p.scope()).unwrap(), parent.scope()));
    Ok(())
}

#[test]
fn detects_cycles() {
    let container = Container::new();
    let error = container.resolve_as::<Chicken>(None).err().unwrap();
    match error.kind() {
        ResolutionErrorKind::CircularDependency(path) => {
            assert_eq!(path, "Chicken -> Egg -> Chicken")
        }
        other => panic!("unexpected failure: {:?}", other),
    }
    assert!(error.is_circular());
}

#[test]
fn detects_cycles_through_singletons() -> Result<(), WiringError> {
    let container = Container::new();
    container.register_type(None, Chicken::type_of(), None, singleton(), Vec::new())?;
    container.register_type(None, Egg::type_of(), None, singleton(), Vec::new())?;
    let error = container.resolve_as::<Egg>(None).err().unwrap();
    assert!(error.is_circular());
    Ok(())
}

#[test]
fn picks_the_longest_satisfiable_constructor() -> Result<(), WiringError> {
    let container = Container::new();
    let car = container.resolve_as::<Car>(None)?;
    assert_eq!(car.used, "engine+front+back");
    assert_eq!(car.wheels.len(), 2);
    Ok(())
}

#[test]
fn avoids_by_ref_constructors() -> Result<(), WiringError> {
    let container = Container::new();
    assert_eq!(container.resolve_as::<Bike>(None)?.used, "wheels");
    Ok(())
}

#[test]
fn explicit_constructor_wins() -> Result<(), WiringError> {
    let container = Container::new();
    container.register_type(
        None,
        Car::type_of(),
        None,
        None,
        vec![InjectionMember::constructor([InjectionValue::resolved()])],
    )?;
    assert_eq!(container.resolve_as::<Car>(None)?.used, "engine");
    Ok(())
}

#[test]
fn enumerates_registrations_in_order() -> Result<(), WiringError> {
    let container = Container::new();
    assert!(container.resolve_all::<dyn Plugin>()?.is_empty());

    container.register_mapping::<dyn Plugin, Alpha>(Some("a"), None)?;
    container.register_mapping::<dyn Plugin, Beta>(Some("b"), None)?;
    container.register_mapping::<dyn Plugin, Gamma>(Some("c"), None)?;
    assert_eq!(ids(&container.resolve_all::<dyn Plugin>()?), vec!["alpha", "beta", "gamma"]);

    // the default registration comes first and is left out of arrays
    container.register_mapping::<dyn Plugin, Gamma>(None, None)?;
    assert_eq!(
        ids(&container.resolve_all::<dyn Plugin>()?),
        vec!["gamma", "alpha", "beta", "gamma"]
    );
    let array = container.resolve(&Type::array(<dyn Plugin>::type_of(), 1), None, &[])?;
    assert_eq!(array.items().map(|items| items.len()), Some(3));
    Ok(())
}

#[test]
fn rejects_multi_dimensional_arrays() {
    let container = Container::new();
    let error = container
        .resolve(&Type::array(<dyn Plugin>::type_of(), 2), None, &[])
        .err()
        .unwrap();
    assert!(matches!(error.kind(), ResolutionErrorKind::UnsupportedArrayRank(2)));
}

#[test]
fn child_enumeration_merges_parents() -> Result<(), WiringError> {
    let parent = Container::new();
    parent.register_mapping::<dyn Plugin, Alpha>(Some("a"), None)?;
    parent.register_mapping::<dyn Plugin, Beta>(Some("b"), None)?;
    let child = parent.create_child_container();
    child.register_mapping::<dyn Plugin, Gamma>(Some("a"), None)?;
    assert_eq!(ids(&child.resolve_all::<dyn Plugin>()?), vec!["gamma", "beta"]);
    Ok(())
}

#[test]
fn binds_open_generics() -> Result<(), WiringError> {
    let container = Container::new();
    container.register_type(
        Some(StoreDefinition::type_of()),
        RepoDefinition::type_of(),
        None,
        None,
        Vec::new(),
    )?;
    assert!(!container.is_registered_as::<dyn Store<Wheel>>(None));

    let store = container.resolve_as::<dyn Store<Wheel>>(None)?;
    assert!(store.describe().starts_with("repo of"));
    assert!(container.is_registered_as::<dyn Store<Wheel>>(None));

    let error = container
        .resolve(&StoreDefinition::type_of(), None, &[])
        .err()
        .unwrap();
    assert!(matches!(error.kind(), ResolutionErrorKind::OpenGeneric(_)));
    Ok(())
}

#[test]
fn child_generic_shadows_parent_binding() -> Result<(), WiringError> {
    let parent = Container::new();
    parent.register_type(Some(StoreDefinition::type_of()), RepoDefinition::type_of(), None, None, Vec::new())?;
    let child = parent.create_child_container();
    child.register_type(Some(StoreDefinition::type_of()), ArchiveDefinition::type_of(), None, None, Vec::new())?;

    // the parent binds its closed form first, the child still uses its own definition
    let outer = parent.resolve_as::<dyn Store<Wheel>>(None)?;
    assert!(outer.describe().starts_with("repo of"));
    let inner = child.resolve_as::<dyn Store<Wheel>>(None)?;
    assert!(inner.describe().starts_with("archive of"));
    assert!(parent.resolve_as::<dyn Store<Wheel>>(None)?.describe().starts_with("repo of"));

    let other = parent.create_child_container();
    assert!(other.resolve_as::<dyn Store<Wheel>>(None)?.describe().starts_with("repo of"));
    Ok(())
}

#[test]
fn generic_registered_after_implicit_resolution() -> Result<(), WiringError> {
    let container = Container::new();
    let first = container.resolve_as::<Repo<Wheel>>(None)?;
    assert!(!container.is_registered_as::<Repo<Wheel>>(None));

    container.register_type(None, RepoDefinition::type_of(), None, singleton(), Vec::new())?;
    let a = container.resolve_as::<Repo<Wheel>>(None)?;
    let b = container.resolve_as::<Repo<Wheel>>(None)?;
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &first));
    assert!(container.is_registered_as::<Repo<Wheel>>(None));
    Ok(())
}

#[test]
fn mapping_uses_the_mapped_registration() -> Result<(), WiringError> {
    let container = Container::new();
    container.register_singleton::<Engine>(None)?;
    container.register_mapping::<dyn Motor, Engine>(None, None)?;

    let engine = container.resolve(&Engine::type_of(), None, &[])?;
    let motor = container.resolve(&<dyn Motor>::type_of(), None, &[])?;
    assert!(engine.ptr_eq(&motor));
    assert!(motor.downcast::<dyn Motor>().is_some());
    Ok(())
}

#[test]
fn overrides_apply_to_the_whole_graph() -> Result<(), WiringError> {
    let container = Container::new();
    container.register_instance_as::<String>(None, Arc::new("world".to_string()))?;
    assert_eq!(container.resolve_as::<Greeting>(None)?.text, "hello world");

    let overrides = [ResolverOverride::parameter(
        "name",
        InjectionValue::value("override".to_string()),
    )];
    let greeting = container.resolve_with::<Greeting>(None, &overrides)?;
    assert_eq!(greeting.text, "hello override");

    let clock = Arc::new(Clock { ticks: 42 });
    let overrides = [ResolverOverride::dependency_value(clock.clone())];
    let dashboard = container.resolve_with::<Dashboard>(None, &overrides)?;
    assert!(Arc::ptr_eq(dashboard.clock.as_ref().unwrap(), &clock));
    assert_eq!(dashboard.started_with.as_ref().map(|c| c.ticks), Some(42));
    Ok(())
}

#[test]
fn injects_fields_properties_and_methods() -> Result<(), WiringError> {
    let container = Container::new();
    let dashboard = container.resolve_as::<Dashboard>(None)?;
    assert!(dashboard.clock.is_some());
    assert!(dashboard.started_with.is_some());
    // optional and not registered
    assert!(dashboard.label.is_none());
    assert_eq!(dashboard.level, 0);

    container.register_type(
        None,
        Dashboard::type_of(),
        Some("configured"),
        None,
        vec![
            InjectionMember::property_with("label", InjectionValue::value("main".to_string())),
            InjectionMember::method("configure", [InjectionValue::value(7u32)]),
        ],
    )?;
    let configured = container.resolve_as::<Dashboard>(Some("configured"))?;
    assert_eq!(configured.label.as_deref().map(String::as_str), Some("main"));
    assert_eq!(configured.level, 7);

    let overrides = [ResolverOverride::property(
        "label",
        InjectionValue::value("over".to_string()),
    )];
    let overridden = container.resolve_with::<Dashboard>(Some("configured"), &overrides)?;
    assert_eq!(overridden.label.as_deref().map(String::as_str), Some("over"));
    Ok(())
}

#[test]
fn rejects_bad_injection_members() -> Result<(), WiringError> {
    let container = Container::new();
    container.register_type(
        None,
        Dashboard::type_of(),
        Some("unknown"),
        None,
        vec![InjectionMember::field("nope")],
    )?;
    container.register_type(
        None,
        Dashboard::type_of(),
        Some("mismatch"),
        None,
        vec![InjectionMember::field_with("clock", InjectionValue::value(3u32))],
    )?;

    let error = container.resolve_as::<Dashboard>(Some("unknown")).err().unwrap();
    assert!(matches!(error.kind(), ResolutionErrorKind::MemberNotFound { .. }));
    let error = container.resolve_as::<Dashboard>(Some("mismatch")).err().unwrap();
    assert!(matches!(error.kind(), ResolutionErrorKind::IncompatibleInjection { .. }));
    Ok(())
}

#[test]
fn disabled_stages_skip_members() -> Result<(), WiringError> {
    let container = Container::with_options(ContainerOptions::default().with_stages([BuildStage::Methods]));
    let dashboard = container.resolve_as::<Dashboard>(None)?;
    assert!(dashboard.clock.is_none());
    assert!(dashboard.started_with.is_some());
    Ok(())
}

#[test]
fn optional_dependencies_default_to_none() -> Result<(), WiringError> {
    let container = Container::new();
    assert!(container.resolve_as::<Sensor>(None)?.backup.is_none());
    assert!(container.get_service(&<dyn Missing>::type_of()).is_none());
    assert!(container.get_service(&Wheel::type_of()).is_some());
    Ok(())
}

#[test]
fn factories_resolve_through_the_container() -> Result<(), WiringError> {
    let container = Container::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    container.register_factory_as::<dyn Plugin, _>(Some("f"), None, move |resolver: &Resolver<'_>| {
        counter.fetch_add(1, Ordering::SeqCst);
        let _engine = resolver.resolve_as::<Engine>(None)?;
        Ok(Arc::new(Beta) as Arc<dyn Plugin>)
    })?;
    container.register_factory_as::<dyn Plugin, _>(Some("broken"), None, |_: &Resolver<'_>| {
        Err(Box::new(Broken) as BoxError)
    })?;

    assert_eq!(container.resolve_as::<dyn Plugin>(Some("f"))?.id(), "beta");
    assert_eq!(container.resolve_as::<dyn Plugin>(Some("f"))?.id(), "beta");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let error = container.resolve_as::<dyn Plugin>(Some("broken")).err().unwrap();
    assert!(matches!(error.kind(), ResolutionErrorKind::Construction(_)));
    let error = container.resolve_as::<Fragile>(None).err().unwrap();
    assert!(matches!(error.kind(), ResolutionErrorKind::Construction(_)));
    Ok(())
}

#[test]
fn per_resolve_shares_within_one_call() -> Result<(), WiringError> {
    let container = Container::new();
    container.register_type(None, Wheel::type_of(), None, Some(Arc::new(PerResolve::new())), Vec::new())?;

    let car = container.resolve_as::<Car>(None)?;
    assert!(Arc::ptr_eq(&car.wheels[0], &car.wheels[1]));
    let other = container.resolve_as::<Car>(None)?;
    assert!(!Arc::ptr_eq(&car.wheels[0], &other.wheels[0]));
    Ok(())
}

#[test]
fn hierarchical_instances_per_container() -> Result<(), WiringError> {
    let parent = Container::new();
    parent.register_type(None, Clock::type_of(), None, Some(Arc::new(Hierarchical::new())), Vec::new())?;
    parent.register_singleton::<Wheel>(None)?;
    let child = parent.create_child_container();

    let p1 = parent.resolve_as::<Clock>(None)?;
    let p2 = parent.resolve_as::<Clock>(None)?;
    let c1 = child.resolve_as::<Clock>(None)?;
    assert!(Arc::ptr_eq(&p1, &p2));
    assert!(!Arc::ptr_eq(&p1, &c1));

    // container-controlled instances are shared with children
    assert!(Arc::ptr_eq(&parent.resolve_as::<Wheel>(None)?, &child.resolve_as::<Wheel>(None)?));
    Ok(())
}

#[test]
fn child_dispose_releases_hierarchical_instances() -> Result<(), WiringError> {
    let parent = Container::new();
    parent.register_type(None, Pool::type_of(), None, Some(Arc::new(Hierarchical::new())), Vec::new())?;
    let own = parent.resolve_as::<Pool>(None)?;
    let child = parent.create_child_container();
    let borrowed = child.resolve_as::<Pool>(None)?;
    assert!(!Arc::ptr_eq(&own, &borrowed));

    child.dispose();
    assert!(borrowed.is_closed());
    assert!(!own.is_closed());
    assert!(Arc::ptr_eq(&parent.resolve_as::<Pool>(None)?, &own));

    let next = parent.create_child_container();
    let fresh = next.resolve_as::<Pool>(None)?;
    assert!(!fresh.is_closed());
    assert!(!Arc::ptr_eq(&fresh, &borrowed));
    Ok(())
}

#[test]
fn externally_controlled_instances_are_not_kept() -> Result<(), WiringError> {
    let container = Container::new();
    let pool = Arc::new(Pool::new());
    container.register_instance(
        Pool::type_of(),
        None,
        Object::new(pool.clone()),
        Some(Arc::new(ExternallyControlled::new())),
    )?;
    assert!(Arc::ptr_eq(&container.resolve_as::<Pool>(None)?, &pool));

    drop(pool);
    assert!(container.resolve_as::<Pool>(None).is_err());
    Ok(())
}

#[test]
fn resolves_the_container_itself() -> Result<(), WiringError> {
    let container = Container::new();
    let inspector = container.resolve_as::<Inspector>(None)?;
    assert_eq!(inspector.container.id(), container.id());

    let child = container.create_child_container();
    assert_eq!(child.resolve_as::<Container>(None)?.id(), child.id());
    Ok(())
}

#[test]
fn singletons_can_hold_a_weak_container() -> Result<(), WiringError> {
    let container = Container::new();
    container.register_singleton::<Observer>(None)?;
    let observer = container.resolve_as::<Observer>(None)?;
    assert_eq!(observer.container.upgrade().map(|c| c.id()), Some(container.id()));

    drop(container);
    assert!(observer.container.upgrade().is_none());
    Ok(())
}

#[test]
fn rejects_invalid_registrations() {
    let container = Container::new();
    let shared: Arc<dyn LifetimeManager> = Arc::new(ContainerControlled::new());
    assert!(container
        .register_mapping::<dyn Plugin, Alpha>(None, Some(shared.clone()))
        .is_ok());
    assert_eq!(
        container.register_mapping::<dyn Plugin, Beta>(Some("b"), Some(shared)).err(),
        Some(RegistrationError::LifetimeInUse("container-controlled"))
    );
    assert!(matches!(
        container.register_mapping::<dyn Plugin, Engine>(None, None),
        Err(RegistrationError::NotAssignable { .. })
    ));
    assert!(matches!(
        container.register_type(
            Some(Type::array(<dyn Plugin>::type_of(), 1)),
            Type::array(<dyn Plugin>::type_of(), 2),
            None,
            None,
            Vec::new(),
        ),
        Err(RegistrationError::ArrayRankMismatch { .. })
    ));
    assert!(matches!(
        container.register_instance(
            StoreDefinition::type_of(),
            None,
            Object::from_value(Wheel),
            None,
        ),
        Err(RegistrationError::InstanceForGenericDefinition(_))
    ));
    assert_eq!(
        container.register(&[RegistrationDescriptor::instance(Object::from_value(Wheel))]).err(),
        Some(RegistrationError::MissingType)
    );
}

#[test]
fn batch_registration_shares_one_lifetime() -> Result<(), WiringError> {
    let container = Container::new();
    container.register(&[RegistrationDescriptor::of_type(Engine::type_of())
        .register_as(Engine::type_of())
        .register_as(<dyn Motor>::type_of())
        .with_lifetime(Arc::new(ContainerControlled::new()))])?;

    let engine = container.resolve(&Engine::type_of(), None, &[])?;
    let motor = container.resolve(&<dyn Motor>::type_of(), None, &[])?;
    assert!(engine.ptr_eq(&motor));
    Ok(())
}

#[test]
fn registrations_snapshot_is_shared_until_changed() -> Result<(), WiringError> {
    let container = Container::new();
    container.register_mapping::<dyn Plugin, Alpha>(Some("a"), None)?;

    let first = container.registrations();
    let second = container.registrations();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.iter().any(|r| r.category == Category::Internal));
    let plugin = first
        .iter()
        .find(|r| r.contract.name() == Some("a"))
        .unwrap();
    assert_eq!(plugin.mapped_to, Some(Alpha::type_of()));
    assert_eq!(plugin.lifetime, "transient");

    container.register_mapping::<dyn Plugin, Beta>(Some("b"), None)?;
    let third = container.registrations();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(third.len(), first.len() + 1);
    Ok(())
}

#[test]
fn dispose_releases_owned_instances() -> Result<(), WiringError> {
    let parent = Container::new();
    let child = parent.create_child_container();
    child.register_singleton::<Pool>(None)?;
    let built = child.resolve_as::<Pool>(None)?;

    let first = Arc::new(Pool::new());
    let second = Arc::new(Pool::new());
    parent.register_instance(Pool::type_of(), Some("i"), Object::disposable(first.clone()), None)?;
    parent.register_instance(Pool::type_of(), Some("i"), Object::disposable(second.clone()), None)?;
    // the displaced instance is released on replacement
    assert!(first.is_closed());
    assert!(!second.is_closed());

    parent.dispose();
    assert!(second.is_closed());
    assert!(built.is_closed());
    assert!(child.is_disposed());

    let error = parent.resolve_as::<Wheel>(None).err().unwrap();
    assert!(matches!(error.kind(), ResolutionErrorKind::Disposed));
    assert_eq!(
        parent.register_singleton::<Wheel>(None).err(),
        Some(RegistrationError::Disposed)
    );
    Ok(())
}

#[test]
fn build_modes_agree() -> Result<(), WiringError> {
    for mode in [BuildMode::Activated, BuildMode::Compiled] {
        let container = Container::with_options(ContainerOptions::default().with_build_mode(mode));
        let car = container.resolve_as::<Car>(None)?;
        assert_eq!(car.used, "engine+front+back");
        let dashboard = container.resolve_as::<Dashboard>(None)?;
        assert!(dashboard.clock.is_some() && dashboard.started_with.is_some());
        assert!(container.resolve_as::<Fragile>(None).is_err());
    }
    Ok(())
}

#[test]
fn diagnostics_record_the_path() -> Result<(), WiringError> {
    let container = Container::with_options(ContainerOptions::default().with_diagnostics(true));
    container.register_type(
        None,
        Sensor::type_of(),
        None,
        None,
        vec![InjectionMember::constructor([InjectionValue::resolve::<dyn Missing>(None)])],
    )?;
    let error = container.resolve_as::<Sensor>(None).err().unwrap();
    assert!(matches!(error.kind(), ResolutionErrorKind::NotResolvable));
    assert_eq!(error.type_name(), "Missing");
    let trace = error.trace().unwrap();
    assert_eq!(trace.first().map(String::as_str), Some("while resolving Missing"));
    assert_eq!(trace.last().map(String::as_str), Some("while resolving Sensor"));
    assert!(trace.iter().any(|frame| frame.contains("parameter `backup`")));

    let quiet = Container::with_options(ContainerOptions::default().with_diagnostics(false));
    let error = quiet.resolve(&<dyn Missing>::type_of(), None, &[]).err().unwrap();
    assert!(error.trace().is_none());
    Ok(())
}

#[allow(clippy::vtable_address_comparisons)]
#[test]
fn concurrent_singleton_is_built_once() -> Result<(), WiringError> {
    let container = Container::new();
    container.register_mapping::<dyn Plugin, Gamma>(None, singleton())?;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let container = container.clone();
            std::thread::spawn(move || container.resolve_as::<dyn Plugin>(None))
        })
        .collect();
    let plugins = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect::<Result<Vec<_>, _>>()?;
    assert!(plugins.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    Ok(())
}

#[allow(clippy::vtable_address_comparisons)]
#[test]
fn concurrent_generic_binding_is_shared() -> Result<(), WiringError> {
    let container = Container::new();
    container.register_type(
        Some(StoreDefinition::type_of()),
        RepoDefinition::type_of(),
        None,
        singleton(),
        Vec::new(),
    )?;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let container = container.clone();
            std::thread::spawn(move || container.resolve_as::<dyn Store<Wheel>>(None))
        })
        .collect();
    let stores = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect::<Result<Vec<_>, _>>()?;
    assert!(stores.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));

    let closed = <dyn Store<Wheel>>::type_of();
    let bound = container
        .registrations()
        .iter()
        .filter(|r| *r.contract.ty() == closed)
        .count();
    assert_eq!(bound, 1);
    Ok(())
}

#[traced_test]
#[test]
fn logs_registrations_and_builds() {
    let container = Container::new();
    container
        .register_mapping::<dyn Plugin, Alpha>(Some("logged"), None)
        .unwrap();
    container.resolve_as::<dyn Plugin>(Some("logged")).unwrap();
    assert!(logs_contain("register"));
    assert!(logs_contain("building pipeline"));
}

#[cfg(feature = "tokio")]
#[tokio::test]
async fn resolves_on_the_blocking_pool() -> Result<(), WiringError> {
    let container = Container::new();
    container.register_mapping::<dyn Plugin, Beta>(None, None)?;
    let object = container
        .resolve_async(<dyn Plugin>::type_of(), None, Vec::new())
        .await?;
    assert_eq!(object.downcast::<dyn Plugin>().map(|p| p.id()), Some("beta"));
    Ok(())
}
