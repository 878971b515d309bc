//! Resolution middleware: an onion of interceptors around the provider step.

use std::sync::{Arc, Mutex};

use crate::Error;
use crate::container::Container;
use crate::identifier::ServiceIdentifier;
use crate::registry::{Instance, Lifecycle};

/// The resolution request passed through the middleware chain.
pub struct ResolveRequest<'a> {
    pub container: &'a Container,
    pub identifier: &'a ServiceIdentifier,
    pub lifecycle: Lifecycle,
}

/// An interceptor wrapping the innermost provider invocation.
///
/// Middlewares compose strictly last-in-first-out within a scope, and the
/// container-local scope wraps the process-wide global scope: the effective
/// order is last local, earlier locals, last global, earlier globals, then
/// the provider. A middleware may transform the result or short-circuit by
/// returning without invoking `next`.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    fn handle(&self, request: &ResolveRequest<'_>, next: Next<'_>) -> Result<Instance, Error>;

    /// Invoked when the owning container is disposed. Failures are swallowed
    /// by the container so teardown stays resilient.
    fn on_dispose(&self, _container: &Container) -> Result<(), crate::StdError> {
        Ok(())
    }
}

/// The remainder of the middleware chain, ending at the provider.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    provider: &'a mut dyn FnMut() -> Result<Instance, Error>,
}

impl Next<'_> {
    /// Invokes the rest of the chain.
    pub fn run(self, request: &ResolveRequest<'_>) -> Result<Instance, Error> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(request, Next { chain: rest, provider: self.provider }),
            None => (self.provider)(),
        }
    }
}

/// Runs the provider through the local and global middleware chains.
pub(crate) fn run_chain(
    locals: &[Arc<dyn Middleware>],
    request: &ResolveRequest<'_>,
    provider: &mut dyn FnMut() -> Result<Instance, Error>,
) -> Result<Instance, Error> {
    let globals = global_snapshot();
    if locals.is_empty() && globals.is_empty() {
        return provider();
    }
    let mut chain: Vec<Arc<dyn Middleware>> = Vec::with_capacity(locals.len() + globals.len());
    chain.extend(locals.iter().rev().cloned());
    chain.extend(globals.into_iter().rev());
    Next { chain: &chain, provider }.run(request)
}

static GLOBAL_MIDDLEWARES: Mutex<Vec<Arc<dyn Middleware>>> = Mutex::new(Vec::new());

/// Registers a middleware in the process-wide global scope.
pub fn add_global_middleware(middleware: Arc<dyn Middleware>) {
    GLOBAL_MIDDLEWARES.lock().unwrap().push(middleware);
}

/// Removes the first matching global middleware instance, if present.
pub fn remove_global_middleware(middleware: &Arc<dyn Middleware>) -> bool {
    let mut globals = GLOBAL_MIDDLEWARES.lock().unwrap();
    match globals.iter().position(|m| Arc::ptr_eq(m, middleware)) {
        Some(index) => {
            globals.remove(index);
            true
        }
        None => false,
    }
}

/// Drops every global middleware. Test-teardown hook.
pub fn reset_global_middlewares() {
    GLOBAL_MIDDLEWARES.lock().unwrap().clear();
}

fn global_snapshot() -> Vec<Arc<dyn Middleware>> {
    GLOBAL_MIDDLEWARES.lock().unwrap().clone()
}
