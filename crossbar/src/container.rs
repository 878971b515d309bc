//! The service container and its resolution algorithm.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::error::{Error, StdError};
use crate::identifier::ServiceIdentifier;
use crate::inject::{
    ConstructorArgs, DependencyDescriptor, Injectable, Resolved, resolved_many, resolved_one,
    resolved_optional,
};
use crate::middleware::{Middleware, ResolveRequest, run_chain};
use crate::records::{OptionShape, ResolveRecord, StateGuard, with_state};
use crate::reference::{DynamicRef, LazyResolve, Ref};
use crate::registry::{Instance, Lifecycle, Provider, Registration, Registry};

/// Options of one resolution request.
///
/// `by_ref` and `dynamic` are mutually exclusive; setting both fails the
/// request with [`Error::InvalidOptions`]. `default_value` is only consulted
/// together with `optional`.
#[derive(Clone, Default)]
pub struct ResolveOptions {
    /// Return a deferred handle resolved on first access.
    pub by_ref: bool,
    /// Return a deferred handle resolved on every access.
    pub dynamic: bool,
    /// Resolve every registration under the identifier, in registration order.
    pub multiple: bool,
    /// Tolerate a missing registration.
    pub optional: bool,
    /// Fallback returned for a missing optional registration.
    pub default_value: Option<Instance>,
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn shape(&self) -> OptionShape {
        OptionShape {
            by_ref: self.by_ref,
            dynamic: self.dynamic,
            multiple: self.multiple,
        }
    }
}

impl fmt::Debug for ResolveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveOptions")
            .field("by_ref", &self.by_ref)
            .field("dynamic", &self.dynamic)
            .field("multiple", &self.multiple)
            .field("optional", &self.optional)
            .field("default_value", &self.default_value.is_some())
            .finish()
    }
}

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

/// A service container: a registry plus the resolution machinery.
///
/// Containers are cheap `Arc`-backed handles; clones share state. A child
/// container holds a weak reference to its parent and delegates resolution of
/// identifiers it does not register itself. Disposing a container never
/// touches its parent or children.
///
/// # Examples
///
/// ```rust
/// use crossbar::{Container, Registration, Token};
///
/// let port = Token::new("docs.server.port").unwrap();
/// let container = Container::new("app");
/// container.register(Registration::value(&port, 8080u16)).unwrap();
///
/// let resolved = container.resolve::<u16>(&port).unwrap();
/// assert_eq!(*resolved, 8080);
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

struct ContainerInner {
    id: u64,
    name: String,
    parent: Option<Weak<ContainerInner>>,
    registry: Registry,
    middlewares: Mutex<Vec<Arc<dyn Middleware>>>,
    disposed: AtomicBool,
}

impl Container {
    /// Creates a root container.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_parent(name.into(), None)
    }

    /// Creates a child container delegating unknown identifiers to `self`.
    pub fn child(&self, name: impl Into<String>) -> Self {
        Self::with_parent(name.into(), Some(Arc::downgrade(&self.inner)))
    }

    fn with_parent(name: String, parent: Option<Weak<ContainerInner>>) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                id: NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed),
                name,
                parent,
                registry: Registry::new(),
                middlewares: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The parent container, if it is still alive.
    pub fn parent(&self) -> Option<Container> {
        self.inner
            .parent
            .as_ref()?
            .upgrade()
            .map(|inner| Container { inner })
    }

    /// The container's registry.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<(), Error> {
        if self.is_disposed() {
            return Err(Error::ContainerDisposed {
                container: self.inner.name.clone(),
            });
        }
        Ok(())
    }

    /// Adds a registration to the local registry.
    pub fn register(&self, registration: Registration) -> Result<(), Error> {
        self.ensure_live()?;
        tracing::debug!(
            container = %self.inner.name,
            identifier = registration.identifier().name(),
            "registering service"
        );
        self.inner.registry.set(registration)?;
        Ok(())
    }

    /// Removes every local registration under the identifier.
    pub fn unregister(&self, identifier: impl Into<ServiceIdentifier>) -> Result<(), Error> {
        self.ensure_live()?;
        self.inner.registry.remove(&identifier.into());
        Ok(())
    }

    /// Whether the identifier is registered locally.
    pub fn is_registered(&self, identifier: &ServiceIdentifier) -> bool {
        !self.is_disposed() && self.inner.registry.contains(identifier)
    }

    /// Whether the identifier is registered locally or anywhere up the
    /// parent chain.
    pub fn is_registered_recursive(&self, identifier: &ServiceIdentifier) -> bool {
        self.is_registered(identifier)
            || self
                .parent()
                .map(|parent| parent.is_registered_recursive(identifier))
                .unwrap_or(false)
    }

    /// Registers a container-local middleware.
    pub fn add_middleware(&self, middleware: Arc<dyn Middleware>) -> Result<(), Error> {
        self.ensure_live()?;
        self.inner.middlewares.lock().unwrap().push(middleware);
        Ok(())
    }

    /// Removes the first matching local middleware instance, if present.
    pub fn remove_middleware(&self, middleware: &Arc<dyn Middleware>) -> bool {
        let mut middlewares = self.inner.middlewares.lock().unwrap();
        match middlewares.iter().position(|m| Arc::ptr_eq(m, middleware)) {
            Some(index) => {
                middlewares.remove(index);
                true
            }
            None => false,
        }
    }

    /// Disposes the container: releases its registrations and notifies the
    /// disposal hooks of its middlewares. Idempotent. Hook failures are
    /// swallowed so teardown stays resilient. Children and parents are not
    /// touched.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(container = %self.inner.name, "disposing container");
        let middlewares = std::mem::take(&mut *self.inner.middlewares.lock().unwrap());
        for middleware in &middlewares {
            if let Err(error) = middleware.on_dispose(self) {
                tracing::warn!(
                    middleware = middleware.name(),
                    error = %error,
                    "middleware disposal hook failed"
                );
            }
        }
        self.inner.registry.clear();
    }

    /// Resolves the last registration under the identifier.
    pub fn resolve<T: Send + Sync + 'static>(
        &self,
        identifier: impl Into<ServiceIdentifier>,
    ) -> Result<Arc<T>, Error> {
        let identifier = identifier.into();
        let resolved = self.resolve_shape(&identifier, ResolveOptions::default())?;
        resolved_one::<T>(resolved, &identifier)
    }

    /// Resolves the constructible type `T` by its own identifier.
    ///
    /// Unregistered constructible types are auto-registered on the fly: the
    /// call constructs a fresh instance without persisting anything in the
    /// registry.
    pub fn resolve_type<T: Injectable>(&self) -> Result<Arc<T>, Error> {
        self.resolve::<T>(ServiceIdentifier::of::<T>())
    }

    /// Resolves every registration under the identifier, in registration
    /// order.
    pub fn resolve_all<T: Send + Sync + 'static>(
        &self,
        identifier: impl Into<ServiceIdentifier>,
    ) -> Result<Vec<Arc<T>>, Error> {
        let identifier = identifier.into();
        let options = ResolveOptions { multiple: true, ..ResolveOptions::default() };
        let resolved = self.resolve_shape(&identifier, options)?;
        resolved_many::<T>(resolved, &identifier)
    }

    /// Resolves the identifier, returning `None` when it is not registered.
    pub fn resolve_optional<T: Send + Sync + 'static>(
        &self,
        identifier: impl Into<ServiceIdentifier>,
    ) -> Result<Option<Arc<T>>, Error> {
        let identifier = identifier.into();
        let options = ResolveOptions { optional: true, ..ResolveOptions::default() };
        let resolved = self.resolve_shape(&identifier, options)?;
        resolved_optional::<T>(resolved, &identifier)
    }

    /// Resolves the identifier without a typed downcast.
    pub fn resolve_instance(
        &self,
        identifier: impl Into<ServiceIdentifier>,
    ) -> Result<Instance, Error> {
        let identifier = identifier.into();
        let resolved = self.resolve_shape(&identifier, ResolveOptions::default())?;
        expect_instance(resolved, &identifier)
    }

    /// Returns a deferred handle resolved on first access.
    ///
    /// Nothing is resolved eagerly; the handle replays the current
    /// resolution path when accessed, which is what breaks dependency
    /// cycles.
    pub fn resolve_ref<T: Send + Sync + 'static>(
        &self,
        identifier: impl Into<ServiceIdentifier>,
    ) -> Result<Ref<Arc<T>>, Error> {
        let identifier = identifier.into();
        let options = ResolveOptions { by_ref: true, ..ResolveOptions::default() };
        match self.resolve_shape(&identifier, options)? {
            Resolved::Deferred(deferred) => Ok(Ref::new(deferred_one::<T>(deferred, identifier))),
            _ => Err(deferred_shape_error(&identifier)),
        }
    }

    /// Returns a deferred handle over the full registration set.
    pub fn resolve_ref_all<T: Send + Sync + 'static>(
        &self,
        identifier: impl Into<ServiceIdentifier>,
    ) -> Result<Ref<Vec<Arc<T>>>, Error> {
        let identifier = identifier.into();
        let options = ResolveOptions {
            by_ref: true,
            multiple: true,
            ..ResolveOptions::default()
        };
        match self.resolve_shape(&identifier, options)? {
            Resolved::Deferred(deferred) => Ok(Ref::new(deferred_many::<T>(deferred, identifier))),
            _ => Err(deferred_shape_error(&identifier)),
        }
    }

    /// Returns a deferred handle re-resolved on every access.
    pub fn resolve_dynamic<T: Send + Sync + 'static>(
        &self,
        identifier: impl Into<ServiceIdentifier>,
    ) -> Result<DynamicRef<Arc<T>>, Error> {
        let identifier = identifier.into();
        let options = ResolveOptions { dynamic: true, ..ResolveOptions::default() };
        match self.resolve_shape(&identifier, options)? {
            Resolved::Deferred(deferred) => {
                Ok(DynamicRef::new(deferred_one::<T>(deferred, identifier)))
            }
            _ => Err(deferred_shape_error(&identifier)),
        }
    }

    /// One resolution request, from option validation to typed-shape result.
    ///
    /// Acquires the call-tree state, runs the frame-tracked algorithm, and
    /// restores the record stack to its prior length whether the request
    /// succeeded or failed.
    pub(crate) fn resolve_shape(
        &self,
        identifier: &ServiceIdentifier,
        options: ResolveOptions,
    ) -> Result<Resolved, Error> {
        self.ensure_live()?;
        if options.by_ref && options.dynamic {
            return Err(Error::InvalidOptions);
        }
        tracing::trace!(
            container = %self.inner.name,
            identifier = identifier.name(),
            "resolving"
        );
        let _guard = StateGuard::acquire();
        let checkpoint = with_state(|state| state.stack.len());
        let result = self.resolve_frames(identifier, options);
        with_state(|state| state.stack.truncate(checkpoint));
        result
    }

    fn resolve_frames(
        &self,
        identifier: &ServiceIdentifier,
        options: ResolveOptions,
    ) -> Result<Resolved, Error> {
        let registrations = self.inner.registry.get_all(identifier);

        // Local registrations always shadow parent ones; otherwise the whole
        // request is delegated to the parent chain.
        if registrations.is_empty()
            && let Some(parent) = self.parent()
            && parent.is_registered_recursive(identifier)
        {
            with_state(|state| {
                state.stack.push(ResolveRecord::Message(format!(
                    "delegating \"{}\" from container \"{}\" to parent \"{}\"",
                    identifier.name(),
                    self.inner.name,
                    parent.name(),
                )))
            });
            return parent.resolve_frames(identifier, options);
        }

        let shape = options.shape();
        with_state(|state| {
            state.stack.push(ResolveRecord::Resolve {
                container_id: self.inner.id,
                identifier: identifier.clone(),
                shape,
            })
        });

        if let Some(path) = with_state(|state| state.stack.find_cycle()) {
            tracing::debug!(identifier = identifier.name(), "circular dependency detected");
            return Err(Error::CircularDependency {
                identifier: identifier.name().to_string(),
                path,
            });
        }

        if shape.breaks_cycles() {
            let marker = if options.dynamic {
                format!("\"{}\" is resolved dynamically on each access", identifier.name())
            } else {
                format!("\"{}\" is waiting for first use", identifier.name())
            };
            let snapshot = with_state(|state| {
                let mut records = state.stack.snapshot();
                records.push(ResolveRecord::Message(marker));
                records
            });
            let dynamic = options.dynamic;
            let mut cleared = options;
            cleared.by_ref = false;
            cleared.dynamic = false;
            return Ok(Resolved::Deferred(Deferred {
                container: self.clone(),
                identifier: identifier.clone(),
                options: cleared,
                snapshot: Arc::new(snapshot),
                dynamic,
            }));
        }

        // An unregistered constructible identifier gets a one-off class
        // registration that is never persisted.
        let registrations = if registrations.is_empty() {
            match identifier {
                ServiceIdentifier::Type(type_ref) => {
                    vec![Arc::new(Registration::auto(type_ref.clone()))]
                }
                ServiceIdentifier::Token(_) => registrations,
            }
        } else {
            registrations
        };

        if registrations.is_empty() {
            if options.optional {
                return Ok(if options.multiple {
                    Resolved::Many(Vec::new())
                } else {
                    Resolved::Missing(options.default_value)
                });
            }
            let path = with_state(|state| (state.stack.len() > 1).then(|| state.stack.render()));
            return Err(Error::ServiceNotFound {
                identifier: identifier.name().to_string(),
                path,
            });
        }

        if options.multiple {
            let mut instances = Vec::with_capacity(registrations.len());
            for registration in &registrations {
                instances.push(self.apply(registration, shape)?);
            }
            Ok(Resolved::Many(instances))
        } else {
            let registration = &registrations[registrations.len() - 1];
            Ok(Resolved::One(self.apply(registration, shape)?))
        }
    }

    /// Lifecycle-aware provider application: cache check, middleware chain,
    /// provider invocation, cache persist.
    fn apply(&self, registration: &Arc<Registration>, shape: OptionShape) -> Result<Instance, Error> {
        match registration.lifecycle() {
            Lifecycle::Singleton => {
                if let Some(cached) = registration.cached() {
                    tracing::trace!(
                        identifier = registration.identifier().name(),
                        "singleton cache hit"
                    );
                    return Ok(cached);
                }
            }
            Lifecycle::ResolutionScoped => {
                let key = (registration.id(), shape);
                if let Some(cached) = with_state(|state| state.context_get(&key)) {
                    tracing::trace!(
                        identifier = registration.identifier().name(),
                        "resolution-scoped cache hit"
                    );
                    return Ok(cached);
                }
            }
            Lifecycle::Transient => {}
        }

        let locals = self.inner.middlewares.lock().unwrap().clone();
        let request = ResolveRequest {
            container: self,
            identifier: registration.identifier(),
            lifecycle: registration.lifecycle(),
        };
        let mut provider = || self.invoke(registration);
        let instance = run_chain(&locals, &request, &mut provider)?;

        let instance = match registration.lifecycle() {
            Lifecycle::Transient => instance,
            Lifecycle::Singleton => registration.store_cached(instance),
            Lifecycle::ResolutionScoped => {
                with_state(|state| {
                    state.context_insert((registration.id(), shape), instance.clone())
                });
                instance
            }
        };
        Ok(instance)
    }

    /// The innermost provider step, wrapped by the middleware chain.
    fn invoke(&self, registration: &Arc<Registration>) -> Result<Instance, Error> {
        match registration.provider() {
            Provider::Value(value) => Ok(value.clone()),
            Provider::Alias(target) => {
                let resolved = self.resolve_shape(target, ResolveOptions::default())?;
                expect_instance(resolved, target)
            }
            Provider::Factory(factory) => {
                factory(self).map_err(|source| self.provider_failure(registration, source))
            }
            Provider::Class(type_ref) => {
                let descriptors = (type_ref.info.dependencies)();
                let mut values = Vec::with_capacity(descriptors.len());
                for descriptor in descriptors {
                    let DependencyDescriptor { identifier, options } = descriptor;
                    let resolved = self.resolve_shape(&identifier, options)?;
                    values.push((identifier, resolved));
                }
                let mut args = ConstructorArgs::new(values);
                (type_ref.info.construct)(&mut args)
                    .map_err(|source| self.provider_failure(registration, source))
            }
        }
    }

    /// Wraps a leaf provider failure with the resolution path. Errors that
    /// are already engine errors keep their own path and propagate as-is.
    fn provider_failure(&self, registration: &Registration, source: StdError) -> Error {
        match source.downcast::<Error>() {
            Ok(engine) => *engine,
            Err(source) => Error::ProviderFailure {
                identifier: registration.identifier().name().to_string(),
                path: Some(with_state(|state| state.stack.render())),
                source,
            },
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.inner.name)
            .field("registered", &self.inner.registry.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

fn expect_instance(resolved: Resolved, identifier: &ServiceIdentifier) -> Result<Instance, Error> {
    match resolved {
        Resolved::One(instance) | Resolved::Missing(Some(instance)) => Ok(instance),
        _ => Err(Error::Injection {
            message: format!(
                "\"{}\" did not resolve to a single instance",
                identifier.name()
            ),
        }),
    }
}

fn deferred_shape_error(identifier: &ServiceIdentifier) -> Error {
    Error::Injection {
        message: format!(
            "deferred resolution of \"{}\" did not produce a deferred handle",
            identifier.name()
        ),
    }
}

/// A deferred resolution recipe: the resolving container, the identifier,
/// the options with `ref`/`dynamic` cleared, and the record-stack snapshot
/// taken when the deferral was requested.
#[derive(Clone)]
pub(crate) struct Deferred {
    container: Container,
    identifier: ServiceIdentifier,
    options: ResolveOptions,
    snapshot: Arc<Vec<ResolveRecord>>,
    dynamic: bool,
}

impl Deferred {
    pub(crate) fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Re-enters the resolution algorithm from the recorded snapshot.
    pub(crate) fn invoke(&self) -> Result<Resolved, Error> {
        self.container.ensure_live()?;
        let _guard = StateGuard::acquire();
        let checkpoint = with_state(|state| state.stack.len());
        with_state(|state| state.stack.extend(self.snapshot.iter().cloned()));
        let result = self
            .container
            .resolve_frames(&self.identifier, self.options.clone());
        with_state(|state| state.stack.truncate(checkpoint));
        result
    }
}

pub(crate) fn deferred_one<T: Send + Sync + 'static>(
    deferred: Deferred,
    identifier: ServiceIdentifier,
) -> LazyResolve<Arc<T>> {
    Arc::new(move || resolved_one::<T>(deferred.invoke()?, &identifier))
}

pub(crate) fn deferred_many<T: Send + Sync + 'static>(
    deferred: Deferred,
    identifier: ServiceIdentifier,
) -> LazyResolve<Vec<Arc<T>>> {
    Arc::new(move || resolved_many::<T>(deferred.invoke()?, &identifier))
}

static GLOBAL_CONTAINER: Mutex<Option<Container>> = Mutex::new(None);

/// The process-wide root container, constructed on first use.
pub fn global() -> Container {
    GLOBAL_CONTAINER
        .lock()
        .unwrap()
        .get_or_insert_with(|| Container::new("global"))
        .clone()
}

/// Disposes and forgets the process-wide root container and clears the
/// global middleware scope. Test-teardown hook.
pub fn reset_global() {
    if let Some(container) = GLOBAL_CONTAINER.lock().unwrap().take() {
        container.dispose();
    }
    crate::middleware::reset_global_middlewares();
}
