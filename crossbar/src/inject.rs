//! Constructible types and their ordered dependency descriptors.
//!
//! The engine never inspects source metadata. A type becomes constructible by
//! implementing [`Injectable`], which supplies two things: the ordered list of
//! dependency descriptors for its constructor parameters, and the constructor
//! itself, which consumes the already-resolved values in the same order
//! through [`ConstructorArgs`].

use std::any::{TypeId, type_name};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::container::{Deferred, ResolveOptions, deferred_many, deferred_one};
use crate::identifier::ServiceIdentifier;
use crate::reference::{DynamicRef, Ref};
use crate::registry::Instance;
use crate::{Error, StdError};

/// A type that the container can construct.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use crossbar::{ConstructorArgs, Container, DependencyDescriptor, Injectable, StdError};
///
/// struct Settings {
///     retries: u32,
/// }
///
/// impl Injectable for Settings {
///     fn construct(_args: &mut ConstructorArgs) -> Result<Self, StdError> {
///         Ok(Self { retries: 3 })
///     }
/// }
///
/// struct Client {
///     settings: Arc<Settings>,
/// }
///
/// impl Injectable for Client {
///     fn dependencies() -> Vec<DependencyDescriptor> {
///         vec![DependencyDescriptor::of::<Settings>()]
///     }
///
///     fn construct(args: &mut ConstructorArgs) -> Result<Self, StdError> {
///         Ok(Self { settings: args.next::<Settings>()? })
///     }
/// }
///
/// let container = Container::new("docs");
/// let client = container.resolve_type::<Client>().unwrap();
/// assert_eq!(client.settings.retries, 3);
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    /// The ordered dependency descriptors of the constructor parameters.
    ///
    /// Resolved values arrive in [`construct`](Self::construct) in exactly
    /// this order. Descriptors are re-evaluated per construction, so token
    /// identifiers used here must be shared clones, not fresh allocations.
    fn dependencies() -> Vec<DependencyDescriptor> {
        Vec::new()
    }

    /// Builds an instance from the resolved constructor arguments.
    fn construct(args: &mut ConstructorArgs) -> Result<Self, StdError>;
}

/// Erased constructor and descriptor accessors for one constructible type.
pub(crate) struct TypeInfo {
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
    pub(crate) dependencies: fn() -> Vec<DependencyDescriptor>,
    pub(crate) construct: fn(&mut ConstructorArgs) -> Result<Instance, StdError>,
}

impl TypeInfo {
    pub(crate) fn of<T: Injectable>() -> Arc<TypeInfo> {
        Arc::new(TypeInfo {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
            dependencies: T::dependencies,
            construct: construct_erased::<T>,
        })
    }
}

fn construct_erased<T: Injectable>(args: &mut ConstructorArgs) -> Result<Instance, StdError> {
    Ok(Arc::new(T::construct(args)?) as Instance)
}

/// One constructor parameter: an identifier plus its resolution options.
#[derive(Clone)]
pub struct DependencyDescriptor {
    pub(crate) identifier: ServiceIdentifier,
    pub(crate) options: ResolveOptions,
}

impl DependencyDescriptor {
    /// A descriptor resolving the given identifier with default options.
    pub fn new(identifier: impl Into<ServiceIdentifier>) -> Self {
        Self {
            identifier: identifier.into(),
            options: ResolveOptions::default(),
        }
    }

    /// A descriptor resolving the constructible type `T`.
    pub fn of<T: Injectable>() -> Self {
        Self::new(ServiceIdentifier::of::<T>())
    }

    /// A descriptor with explicit resolution options.
    pub fn with_options(
        identifier: impl Into<ServiceIdentifier>,
        options: ResolveOptions,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            options,
        }
    }

    /// Defers resolution to first access; consume with
    /// [`ConstructorArgs::next_ref`].
    pub fn by_ref(mut self) -> Self {
        self.options.by_ref = true;
        self
    }

    /// Defers resolution to every access; consume with
    /// [`ConstructorArgs::next_dynamic`].
    pub fn dynamic(mut self) -> Self {
        self.options.dynamic = true;
        self
    }

    /// Resolves every registration under the identifier; consume with
    /// [`ConstructorArgs::next_all`].
    pub fn multiple(mut self) -> Self {
        self.options.multiple = true;
        self
    }

    /// Tolerates a missing registration; consume with
    /// [`ConstructorArgs::next_optional`].
    pub fn optional(mut self) -> Self {
        self.options.optional = true;
        self
    }

    /// Like [`optional`](Self::optional), with a fallback value.
    pub fn or_default<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.options.optional = true;
        self.options.default_value = Some(Arc::new(value));
        self
    }

    /// The identifier this descriptor resolves.
    pub fn identifier(&self) -> &ServiceIdentifier {
        &self.identifier
    }
}

/// The outcome of one resolution request, before typed extraction.
pub(crate) enum Resolved {
    One(Instance),
    Many(Vec<Instance>),
    Missing(Option<Instance>),
    Deferred(Deferred),
}

/// Ordered resolved constructor arguments.
///
/// Each accessor consumes the next argument; the accessor must match the
/// shape of the corresponding [`DependencyDescriptor`] (plain, `multiple`,
/// `optional`, `ref` or `dynamic`).
pub struct ConstructorArgs {
    values: VecDeque<(ServiceIdentifier, Resolved)>,
}

impl ConstructorArgs {
    pub(crate) fn new(values: Vec<(ServiceIdentifier, Resolved)>) -> Self {
        Self { values: values.into() }
    }

    fn take(&mut self) -> Result<(ServiceIdentifier, Resolved), Error> {
        self.values.pop_front().ok_or_else(|| Error::Injection {
            message: "constructor requested more arguments than its dependency descriptors \
                      declare"
                .into(),
        })
    }

    /// The next argument as a shared instance.
    pub fn next<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>, Error> {
        let (identifier, resolved) = self.take()?;
        resolved_one::<T>(resolved, &identifier)
    }

    /// The next argument cloned out of its shared instance.
    pub fn next_value<T: Clone + Send + Sync + 'static>(&mut self) -> Result<T, Error> {
        Ok(self.next::<T>()?.as_ref().clone())
    }

    /// The next argument as the full registration set, in registration order.
    pub fn next_all<T: Send + Sync + 'static>(&mut self) -> Result<Vec<Arc<T>>, Error> {
        let (identifier, resolved) = self.take()?;
        resolved_many::<T>(resolved, &identifier)
    }

    /// The next argument, tolerating a missing registration.
    pub fn next_optional<T: Send + Sync + 'static>(&mut self) -> Result<Option<Arc<T>>, Error> {
        let (identifier, resolved) = self.take()?;
        resolved_optional::<T>(resolved, &identifier)
    }

    /// The next argument as a memoizing deferred handle.
    pub fn next_ref<T: Send + Sync + 'static>(&mut self) -> Result<Ref<Arc<T>>, Error> {
        let (identifier, resolved) = self.take()?;
        match resolved {
            Resolved::Deferred(deferred) if !deferred.is_dynamic() => {
                Ok(Ref::new(deferred_one::<T>(deferred, identifier)))
            }
            _ => Err(shape_mismatch(&identifier, "ref")),
        }
    }

    /// The next argument as a memoizing deferred handle over the full
    /// registration set.
    pub fn next_ref_all<T: Send + Sync + 'static>(&mut self) -> Result<Ref<Vec<Arc<T>>>, Error> {
        let (identifier, resolved) = self.take()?;
        match resolved {
            Resolved::Deferred(deferred) if !deferred.is_dynamic() => {
                Ok(Ref::new(deferred_many::<T>(deferred, identifier)))
            }
            _ => Err(shape_mismatch(&identifier, "ref")),
        }
    }

    /// The next argument as a deferred handle re-resolved on every access.
    pub fn next_dynamic<T: Send + Sync + 'static>(&mut self) -> Result<DynamicRef<Arc<T>>, Error> {
        let (identifier, resolved) = self.take()?;
        match resolved {
            Resolved::Deferred(deferred) if deferred.is_dynamic() => {
                Ok(DynamicRef::new(deferred_one::<T>(deferred, identifier)))
            }
            _ => Err(shape_mismatch(&identifier, "dynamic")),
        }
    }
}

fn shape_mismatch(identifier: &ServiceIdentifier, option: &str) -> Error {
    Error::Injection {
        message: format!(
            "constructor argument \"{}\" was not resolved with the \"{option}\" option; \
             the accessor must match the dependency descriptor",
            identifier.name()
        ),
    }
}

pub(crate) fn downcast_instance<T: Send + Sync + 'static>(
    instance: Instance,
    identifier: &ServiceIdentifier,
) -> Result<Arc<T>, Error> {
    instance.downcast::<T>().map_err(|_| Error::TypeMismatch {
        identifier: identifier.name().to_string(),
        expected: type_name::<T>(),
    })
}

pub(crate) fn resolved_one<T: Send + Sync + 'static>(
    resolved: Resolved,
    identifier: &ServiceIdentifier,
) -> Result<Arc<T>, Error> {
    match resolved {
        Resolved::One(instance) => downcast_instance::<T>(instance, identifier),
        Resolved::Missing(Some(default)) => downcast_instance::<T>(default, identifier),
        Resolved::Missing(None) => Err(Error::Injection {
            message: format!(
                "\"{}\" resolved to nothing; use an optional accessor for optional dependencies",
                identifier.name()
            ),
        }),
        Resolved::Many(_) | Resolved::Deferred(_) => Err(Error::Injection {
            message: format!(
                "\"{}\" was resolved with the \"multiple\", \"ref\" or \"dynamic\" option; \
                 the accessor must match the dependency descriptor",
                identifier.name()
            ),
        }),
    }
}

pub(crate) fn resolved_many<T: Send + Sync + 'static>(
    resolved: Resolved,
    identifier: &ServiceIdentifier,
) -> Result<Vec<Arc<T>>, Error> {
    match resolved {
        Resolved::Many(instances) => instances
            .into_iter()
            .map(|instance| downcast_instance::<T>(instance, identifier))
            .collect(),
        _ => Err(Error::Injection {
            message: format!(
                "\"{}\" was not resolved with the \"multiple\" option; the accessor must \
                 match the dependency descriptor",
                identifier.name()
            ),
        }),
    }
}

pub(crate) fn resolved_optional<T: Send + Sync + 'static>(
    resolved: Resolved,
    identifier: &ServiceIdentifier,
) -> Result<Option<Arc<T>>, Error> {
    match resolved {
        Resolved::One(instance) => downcast_instance::<T>(instance, identifier).map(Some),
        Resolved::Missing(Some(default)) => downcast_instance::<T>(default, identifier).map(Some),
        Resolved::Missing(None) => Ok(None),
        Resolved::Many(_) | Resolved::Deferred(_) => Err(Error::Injection {
            message: format!(
                "\"{}\" was resolved with the \"multiple\", \"ref\" or \"dynamic\" option; \
                 the accessor must match the dependency descriptor",
                identifier.name()
            ),
        }),
    }
}
