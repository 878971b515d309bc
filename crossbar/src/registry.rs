//! Registrations and the identifier-keyed registry.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::container::Container;
use crate::identifier::{ServiceIdentifier, TypeRef};
use crate::inject::Injectable;
use crate::{Error, StdError};

/// A type-erased, shared service instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// A type-erased factory closure.
pub type FactoryFn = Arc<dyn Fn(&Container) -> Result<Instance, StdError> + Send + Sync>;

/// How long a resolved instance lives, and where it is cached.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Lifecycle {
    /// Never cached; the provider runs on every resolution.
    Transient,
    /// Cached on the registration until the container is disposed or the
    /// registration removed.
    Singleton,
    /// Cached for the duration of one root resolve call.
    ResolutionScoped,
}

/// The creation strategy bound to a registration.
///
/// Exactly one strategy per registration, by construction.
#[derive(Clone)]
pub enum Provider {
    /// Construct the referenced type from its dependency descriptors.
    Class(TypeRef),
    /// Invoke a factory closure with the resolving container.
    Factory(FactoryFn),
    /// Return a shared, pre-built value.
    Value(Instance),
    /// Resolve another identifier in its place.
    Alias(ServiceIdentifier),
}

impl Provider {
    /// Wraps a typed factory closure into a provider.
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, StdError> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(move |container| Ok(Arc::new(factory(container)?) as Instance)))
    }

    /// Wraps a pre-built value into a provider.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::Value(Arc::new(value))
    }

    fn default_lifecycle(&self) -> Lifecycle {
        match self {
            // An alias delegates caching to its target.
            Provider::Alias(_) => Lifecycle::Transient,
            _ => Lifecycle::Singleton,
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Class(type_ref) => f.debug_tuple("Class").field(&type_ref.name()).finish(),
            Provider::Factory(_) => f.write_str("Factory(..)"),
            Provider::Value(_) => f.write_str("Value(..)"),
            Provider::Alias(target) => f.debug_tuple("Alias").field(&target.name()).finish(),
        }
    }
}

static NEXT_REGISTRATION_ID: AtomicU64 = AtomicU64::new(1);

/// One creation strategy bound to an identifier, with its lifecycle and
/// per-registration cache.
///
/// Immutable after creation except for the cached instance and the `extra`
/// metadata map. Owned by exactly one [`Registry`].
pub struct Registration {
    id: u64,
    identifier: ServiceIdentifier,
    provider: Provider,
    lifecycle: Lifecycle,
    public: bool,
    cached: Mutex<Option<Instance>>,
    extra: Mutex<HashMap<String, Instance>>,
}

impl Registration {
    /// A registration with the provider's default lifecycle.
    pub fn new(identifier: impl Into<ServiceIdentifier>, provider: Provider) -> Self {
        let lifecycle = provider.default_lifecycle();
        Self {
            id: NEXT_REGISTRATION_ID.fetch_add(1, Ordering::Relaxed),
            identifier: identifier.into(),
            provider,
            lifecycle,
            public: true,
            cached: Mutex::new(None),
            extra: Mutex::new(HashMap::new()),
        }
    }

    /// A class registration identified by the type itself.
    pub fn class<T: Injectable>() -> Self {
        Self::new(ServiceIdentifier::of::<T>(), Provider::Class(TypeRef::of::<T>()))
    }

    /// A class registration under an explicit identifier, typically a token.
    pub fn class_as<T: Injectable>(identifier: impl Into<ServiceIdentifier>) -> Self {
        Self::new(identifier, Provider::Class(TypeRef::of::<T>()))
    }

    /// A pre-built value registration.
    pub fn value<T: Send + Sync + 'static>(identifier: impl Into<ServiceIdentifier>, value: T) -> Self {
        Self::new(identifier, Provider::value(value))
    }

    /// A factory registration.
    pub fn factory<T, F>(identifier: impl Into<ServiceIdentifier>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, StdError> + Send + Sync + 'static,
    {
        Self::new(identifier, Provider::factory(factory))
    }

    /// An alias registration resolving `target` in its place.
    pub fn alias(
        identifier: impl Into<ServiceIdentifier>,
        target: impl Into<ServiceIdentifier>,
    ) -> Self {
        Self::new(identifier, Provider::Alias(target.into()))
    }

    /// The one-off registration synthesized for an unregistered constructible
    /// identifier. Never persisted; each auto-resolution constructs fresh.
    pub(crate) fn auto(type_ref: TypeRef) -> Self {
        Self::new(ServiceIdentifier::Type(type_ref.clone()), Provider::Class(type_ref))
            .with_lifecycle(Lifecycle::Transient)
    }

    /// Overrides the lifecycle.
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Marks the registration private (not part of its owner's public
    /// surface; module assembly uses this for non-exported declarations).
    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn identifier(&self) -> &ServiceIdentifier {
        &self.identifier
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    /// Whether a singleton instance has been resolved and cached.
    pub fn is_resolved(&self) -> bool {
        self.cached.lock().unwrap().is_some()
    }

    pub(crate) fn provider(&self) -> &Provider {
        &self.provider
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn cached(&self) -> Option<Instance> {
        self.cached.lock().unwrap().clone()
    }

    /// Stores the singleton instance, keeping the first value on a race.
    pub(crate) fn store_cached(&self, instance: Instance) -> Instance {
        let mut slot = self.cached.lock().unwrap();
        slot.get_or_insert(instance).clone()
    }

    /// Reads a metadata entry attached by application code or middleware.
    pub fn extra(&self, key: &str) -> Option<Instance> {
        self.extra.lock().unwrap().get(key).cloned()
    }

    /// Attaches a metadata entry.
    pub fn set_extra<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.extra.lock().unwrap().insert(key.into(), Arc::new(value));
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("identifier", &self.identifier.name())
            .field("provider", &self.provider)
            .field("lifecycle", &self.lifecycle)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Identifier-keyed registration storage.
///
/// Keeps the full ordered registration sequence per identifier; the last
/// registration wins for single resolution. Owned by exactly one container.
pub struct Registry {
    entries: DashMap<ServiceIdentifier, Vec<Arc<Registration>>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// The last-registered registration for the identifier, if any.
    pub fn get(&self, identifier: &ServiceIdentifier) -> Option<Arc<Registration>> {
        self.entries
            .get(identifier)
            .and_then(|entry| entry.value().last().cloned())
    }

    /// The full ordered registration sequence for the identifier.
    pub fn get_all(&self, identifier: &ServiceIdentifier) -> Vec<Arc<Registration>> {
        self.entries
            .get(identifier)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Appends a registration, enforcing that all registrations under one
    /// identifier agree on lifecycle and accessibility.
    pub fn set(&self, registration: Registration) -> Result<Arc<Registration>, Error> {
        let identifier = registration.identifier().clone();
        let mut entry = self.entries.entry(identifier).or_default();
        if let Some(existing) = entry.first() {
            if existing.lifecycle() != registration.lifecycle() {
                return Err(Error::InvalidRegistration {
                    message: format!(
                        "Service identifier \"{}\" is already registered with the {:?} \
                         lifecycle; all registrations under one identifier must share a \
                         lifecycle.",
                        registration.identifier().name(),
                        existing.lifecycle(),
                    ),
                });
            }
            if existing.is_public() != registration.is_public() {
                return Err(Error::InvalidRegistration {
                    message: format!(
                        "Service identifier \"{}\" is already registered with a different \
                         accessibility; all registrations under one identifier must agree.",
                        registration.identifier().name(),
                    ),
                });
            }
        }
        let registration = Arc::new(registration);
        entry.push(registration.clone());
        Ok(registration)
    }

    /// Replaces the full registration sequence for one identifier.
    pub fn set_all(
        &self,
        identifier: &ServiceIdentifier,
        registrations: Vec<Registration>,
    ) -> Result<(), Error> {
        self.remove(identifier);
        for registration in registrations {
            if registration.identifier() != identifier {
                return Err(Error::InvalidRegistration {
                    message: format!(
                        "Registration for \"{}\" cannot be stored under \"{}\".",
                        registration.identifier().name(),
                        identifier.name(),
                    ),
                });
            }
            self.set(registration)?;
        }
        Ok(())
    }

    /// Removes every registration under the identifier.
    pub fn remove(&self, identifier: &ServiceIdentifier) -> Vec<Arc<Registration>> {
        self.entries
            .remove(identifier)
            .map(|(_, registrations)| registrations)
            .unwrap_or_default()
    }

    /// Drops every registration.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn contains(&self, identifier: &ServiceIdentifier) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Every registered identifier, in no particular order.
    pub fn keys(&self) -> Vec<ServiceIdentifier> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("registered", &self.len()).finish()
    }
}
