//! Deferred resolution handles.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::Error;

pub(crate) type LazyResolve<T> = Arc<dyn Fn() -> Result<T, Error> + Send + Sync>;

/// A lazily resolved handle that memoizes its first successful value.
///
/// A `Ref` owns a resolution recipe, never the target instance's lifecycle:
/// the instance stays owned by whichever scope cached it. Obtained from
/// [`Container::resolve_ref`](crate::Container::resolve_ref) or
/// [`ConstructorArgs::next_ref`](crate::ConstructorArgs::next_ref), typically
/// to break dependency cycles.
pub struct Ref<T> {
    resolve: LazyResolve<T>,
    cached: OnceLock<T>,
}

impl<T: Clone> Ref<T> {
    pub(crate) fn new(resolve: LazyResolve<T>) -> Self {
        Self { resolve, cached: OnceLock::new() }
    }

    /// Resolves on first access, then returns the memoized value.
    ///
    /// Failed resolutions are not memoized; a later access retries.
    pub fn current(&self) -> Result<T, Error> {
        if let Some(value) = self.cached.get() {
            return Ok(value.clone());
        }
        let value = (self.resolve)()?;
        Ok(self.cached.get_or_init(|| value).clone())
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("resolved", &self.cached.get().is_some())
            .finish()
    }
}

/// A deferred handle that re-resolves on every access.
pub struct DynamicRef<T> {
    resolve: LazyResolve<T>,
}

impl<T> DynamicRef<T> {
    pub(crate) fn new(resolve: LazyResolve<T>) -> Self {
        Self { resolve }
    }

    /// Runs the resolution recipe and returns a fresh result.
    pub fn current(&self) -> Result<T, Error> {
        (self.resolve)()
    }
}

impl<T> fmt::Debug for DynamicRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DynamicRef(..)")
    }
}
