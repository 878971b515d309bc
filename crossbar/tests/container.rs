use std::error::Error as _;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use crossbar::{
    ConstructorArgs, Container, DependencyDescriptor, Error, Injectable, Lifecycle, Registration,
    ServiceIdentifier, StdError, Token,
};

fn init_logging() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

#[test]
fn resolves_registered_value() {
    init_logging();
    let token = Token::new("container.value").unwrap();
    let container = Container::new("app");
    container.register(Registration::value(&token, 42i32)).unwrap();

    let value = container.resolve::<i32>(&token).unwrap();

    assert_eq!(*value, 42);
}

#[test]
fn last_registration_wins_and_resolve_all_keeps_order() {
    let token = Token::new("container.multi").unwrap();
    let container = Container::new("app");
    container.register(Registration::value(&token, "first".to_string())).unwrap();
    container.register(Registration::value(&token, "second".to_string())).unwrap();
    container.register(Registration::value(&token, "third".to_string())).unwrap();

    assert_eq!(*container.resolve::<String>(&token).unwrap(), "third");

    let all = container.resolve_all::<String>(&token).unwrap();
    let all: Vec<&str> = all.iter().map(|value| value.as_str()).collect();
    assert_eq!(all, ["first", "second", "third"]);
}

#[test]
fn missing_service_error_is_verbatim() {
    let token = Token::new("container.missing").unwrap();
    let container = Container::new("app");

    let error = container.resolve::<i32>(&token).unwrap_err();

    assert!(matches!(error, Error::ServiceNotFound { .. }));
    assert_eq!(
        error.to_string(),
        "Service identifier \"container.missing\" is not registered in this container. \
         Please register it first or set the \"optional\" option to true if this service \
         is optional."
    );
}

#[test]
fn optional_resolution_tolerates_missing_registrations() {
    let token = Token::new("container.optional").unwrap();
    let container = Container::new("app");

    assert!(container.resolve_optional::<i32>(&token).unwrap().is_none());

    container.register(Registration::value(&token, 7i32)).unwrap();
    let value = container.resolve_optional::<i32>(&token).unwrap().unwrap();
    assert_eq!(*value, 7);
}

#[test]
fn child_resolves_parent_registration() {
    let token = Token::new("container.hierarchy.parent-only").unwrap();
    let parent = Container::new("parent");
    let child = parent.child("child");
    parent.register(Registration::value(&token, 1i32)).unwrap();

    assert_eq!(*child.resolve::<i32>(&token).unwrap(), 1);
    assert!(!child.is_registered(&ServiceIdentifier::from(&token)));
    assert!(child.is_registered_recursive(&ServiceIdentifier::from(&token)));
}

#[test]
fn parent_never_sees_child_registration() {
    let token = Token::new("container.hierarchy.child-only").unwrap();
    let parent = Container::new("parent");
    let child = parent.child("child");
    child.register(Registration::value(&token, 2i32)).unwrap();

    assert!(matches!(
        parent.resolve::<i32>(&token),
        Err(Error::ServiceNotFound { .. })
    ));
}

#[test]
fn local_registration_shadows_parent() {
    let token = Token::new("container.hierarchy.shadow").unwrap();
    let parent = Container::new("parent");
    let child = parent.child("child");
    parent.register(Registration::value(&token, "parent".to_string())).unwrap();
    child.register(Registration::value(&token, "child".to_string())).unwrap();

    assert_eq!(*child.resolve::<String>(&token).unwrap(), "child");
    assert_eq!(*parent.resolve::<String>(&token).unwrap(), "parent");
}

#[test]
fn disposing_parent_leaves_child_alive() {
    let parent_token = Token::new("container.dispose.parent").unwrap();
    let child_token = Token::new("container.dispose.child").unwrap();
    let parent = Container::new("parent");
    let child = parent.child("child");
    parent.register(Registration::value(&parent_token, 1i32)).unwrap();
    child.register(Registration::value(&child_token, 2i32)).unwrap();

    parent.dispose();

    assert!(parent.is_disposed());
    assert!(!child.is_disposed());
    assert_eq!(*child.resolve::<i32>(&child_token).unwrap(), 2);
    assert!(matches!(
        child.resolve::<i32>(&parent_token),
        Err(Error::ServiceNotFound { .. })
    ));
}

struct Fresh {
    sequence: u32,
}

impl Injectable for Fresh {
    fn construct(_args: &mut ConstructorArgs) -> Result<Self, StdError> {
        static SEQUENCE: AtomicU32 = AtomicU32::new(0);
        Ok(Self { sequence: SEQUENCE.fetch_add(1, Ordering::SeqCst) })
    }
}

#[test]
fn auto_registration_constructs_fresh_and_persists_nothing() {
    let container = Container::new("auto");

    let first = container.resolve_type::<Fresh>().unwrap();
    let second = container.resolve_type::<Fresh>().unwrap();

    assert_ne!(first.sequence, second.sequence);
    assert!(!container.is_registered(&ServiceIdentifier::of::<Fresh>()));
    assert!(container.registry().is_empty());
}

#[test]
fn operations_fail_after_dispose() {
    let token = Token::new("container.disposed").unwrap();
    let container = Container::new("app");
    container.register(Registration::value(&token, 1i32)).unwrap();

    container.dispose();
    container.dispose();

    assert!(matches!(
        container.resolve::<i32>(&token),
        Err(Error::ContainerDisposed { .. })
    ));
    assert!(matches!(
        container.register(Registration::value(&token, 2i32)),
        Err(Error::ContainerDisposed { .. })
    ));
    assert!(matches!(
        container.unregister(&token),
        Err(Error::ContainerDisposed { .. })
    ));
    assert!(!container.is_registered(&ServiceIdentifier::from(&token)));
}

#[test]
fn duplicate_token_allocation_fails_fast() {
    let _token = Token::new("container.token.duplicate").unwrap();

    assert!(matches!(
        Token::new("container.token.duplicate"),
        Err(Error::DuplicateToken { .. })
    ));
}

#[test]
fn alias_resolves_its_target() {
    let target = Token::new("container.alias.target").unwrap();
    let alias = Token::new("container.alias.name").unwrap();
    let container = Container::new("app");
    container.register(Registration::value(&target, 7i32)).unwrap();
    container.register(Registration::alias(&alias, &target)).unwrap();

    assert_eq!(*container.resolve::<i32>(&alias).unwrap(), 7);
}

#[test]
fn unregister_is_local_and_forgets_the_cache() {
    let token = Token::new("container.unregister").unwrap();
    let container = Container::new("app");
    container.register(Registration::value(&token, 1i32)).unwrap();
    assert_eq!(*container.resolve::<i32>(&token).unwrap(), 1);

    container.unregister(&token).unwrap();

    assert!(matches!(
        container.resolve::<i32>(&token),
        Err(Error::ServiceNotFound { .. })
    ));
}

#[test]
fn factory_receives_the_resolving_container() {
    let number = Token::new("container.factory.number").unwrap();
    let label = Token::new("container.factory.label").unwrap();
    let container = Container::new("app");
    container.register(Registration::value(&number, 8i32)).unwrap();
    let dependency = number.clone();
    container
        .register(Registration::factory(&label, move |c: &Container| -> Result<String, StdError> {
            let number = c.resolve::<i32>(&dependency)?;
            Ok(format!("n={number}"))
        }))
        .unwrap();

    assert_eq!(*container.resolve::<String>(&label).unwrap(), "n=8");
}

#[test]
fn failing_factory_is_wrapped_with_the_resolution_path() {
    let token = Token::new("container.factory.failing").unwrap();
    let container = Container::new("app");
    container
        .register(Registration::factory(&token, |_: &Container| -> Result<i32, StdError> {
            Err("boom".into())
        }))
        .unwrap();

    let error = container.resolve::<i32>(&token).unwrap_err();

    assert!(matches!(error, Error::ProviderFailure { .. }));
    let message = error.to_string();
    assert!(message.contains("boom"));
    assert!(message.contains("container.factory.failing"));
    // The original error stays reachable through the source chain.
    assert_eq!(error.source().unwrap().to_string(), "boom");
}

#[test]
fn mixed_lifecycles_under_one_identifier_are_rejected() {
    let token = Token::new("container.lifecycle.mixed").unwrap();
    let container = Container::new("app");
    container
        .register(Registration::value(&token, 1i32).with_lifecycle(Lifecycle::Singleton))
        .unwrap();

    assert!(matches!(
        container.register(Registration::value(&token, 2i32).with_lifecycle(Lifecycle::Transient)),
        Err(Error::InvalidRegistration { .. })
    ));
}

#[test]
fn typed_resolution_rejects_wrong_types() {
    let token = Token::new("container.type-mismatch").unwrap();
    let container = Container::new("app");
    container.register(Registration::value(&token, 5i32)).unwrap();

    assert!(matches!(
        container.resolve::<String>(&token),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn deferred_handles_cover_the_full_registration_set() {
    let token = Token::new("container.ref-all").unwrap();
    let container = Container::new("app");
    container.register(Registration::value(&token, 1i32)).unwrap();
    container.register(Registration::value(&token, 2i32)).unwrap();

    let handle = container.resolve_ref_all::<i32>(&token).unwrap();
    let values = handle.current().unwrap();

    let values: Vec<i32> = values.iter().map(|value| **value).collect();
    assert_eq!(values, [1, 2]);
}

fn plugins_token() -> Token {
    static TOKEN: OnceLock<Token> = OnceLock::new();
    TOKEN.get_or_init(|| Token::new("container.descriptor.plugins").unwrap()).clone()
}

fn limit_token() -> Token {
    static TOKEN: OnceLock<Token> = OnceLock::new();
    TOKEN.get_or_init(|| Token::new("container.descriptor.limit").unwrap()).clone()
}

fn banner_token() -> Token {
    static TOKEN: OnceLock<Token> = OnceLock::new();
    TOKEN.get_or_init(|| Token::new("container.descriptor.banner").unwrap()).clone()
}

struct Host {
    plugins: Vec<Arc<String>>,
    limit: Arc<u32>,
    banner: Option<Arc<String>>,
}

impl Injectable for Host {
    fn dependencies() -> Vec<DependencyDescriptor> {
        vec![
            DependencyDescriptor::new(plugins_token()).multiple().optional(),
            DependencyDescriptor::new(limit_token()).or_default(16u32),
            DependencyDescriptor::new(banner_token()).optional(),
        ]
    }

    fn construct(args: &mut ConstructorArgs) -> Result<Self, StdError> {
        Ok(Self {
            plugins: args.next_all::<String>()?,
            limit: args.next::<u32>()?,
            banner: args.next_optional::<String>()?,
        })
    }
}

#[test]
fn optional_descriptors_fall_back_to_defaults() {
    let container = Container::new("app");

    let bare = container.resolve_type::<Host>().unwrap();
    assert!(bare.plugins.is_empty());
    assert_eq!(*bare.limit, 16);
    assert!(bare.banner.is_none());

    container
        .register(Registration::value(plugins_token(), "auth".to_string()))
        .unwrap();
    container
        .register(Registration::value(plugins_token(), "metrics".to_string()))
        .unwrap();
    container.register(Registration::value(limit_token(), 64u32)).unwrap();
    container
        .register(Registration::value(banner_token(), "welcome".to_string()))
        .unwrap();

    let configured = container.resolve_type::<Host>().unwrap();
    let plugins: Vec<&str> = configured.plugins.iter().map(|plugin| plugin.as_str()).collect();
    assert_eq!(plugins, ["auth", "metrics"]);
    assert_eq!(*configured.limit, 64);
    assert_eq!(configured.banner.as_deref().map(String::as_str), Some("welcome"));
}

#[test]
fn global_container_initializes_on_first_use_and_resets() {
    let token = Token::new("container.global").unwrap();
    let container = crossbar::global();
    container.register(Registration::value(&token, 5i32)).unwrap();

    assert_eq!(*crossbar::global().resolve::<i32>(&token).unwrap(), 5);

    crossbar::reset_global();

    assert!(container.is_disposed());
    assert!(!crossbar::global().is_registered(&ServiceIdentifier::from(&token)));
}

#[test]
fn registrations_carry_extra_metadata() {
    let token = Token::new("container.extra").unwrap();
    let container = Container::new("app");
    container.register(Registration::value(&token, 1i32)).unwrap();

    let registration = container.registry().get(&ServiceIdentifier::from(&token)).unwrap();
    assert!(registration.extra("weight").is_none());

    registration.set_extra("weight", 10i32);
    let weight = registration.extra("weight").unwrap().downcast::<i32>().unwrap();
    assert_eq!(*weight, 10);
}
