use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crossbar::{
    Container, Error, Instance, Lifecycle, Middleware, Next, Registration, ResolveRequest,
    StdError, Token, add_global_middleware, remove_global_middleware, reset_global_middlewares,
};

/// Records its name when the watched identifier passes through, then
/// continues the chain.
struct Recorder {
    name: String,
    watched: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn new(name: &str, watched: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Middleware> {
        Arc::new(Self {
            name: name.to_string(),
            watched: watched.to_string(),
            log: log.clone(),
        })
    }
}

impl Middleware for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, request: &ResolveRequest<'_>, next: Next<'_>) -> Result<Instance, Error> {
        if request.identifier.name() == self.watched {
            self.log.lock().unwrap().push(self.name.clone());
        }
        next.run(request)
    }
}

#[test]
fn local_wraps_global_wraps_provider_in_lifo_order() {
    let token = Token::new("middleware.order").unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new("mw");
    {
        let log = log.clone();
        container
            .register(
                Registration::factory(&token, move |_: &Container| {
                    log.lock().unwrap().push("provider".to_string());
                    Ok(0i32)
                })
                .with_lifecycle(Lifecycle::Transient),
            )
            .unwrap();
    }

    reset_global_middlewares();
    let global_1 = Recorder::new("global-1", "middleware.order", &log);
    add_global_middleware(global_1.clone());
    add_global_middleware(Recorder::new("global-2", "middleware.order", &log));
    container
        .add_middleware(Recorder::new("local-1", "middleware.order", &log))
        .unwrap();
    container
        .add_middleware(Recorder::new("local-2", "middleware.order", &log))
        .unwrap();

    container.resolve::<i32>(&token).unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        ["local-2", "local-1", "global-2", "global-1", "provider"]
    );

    // Removal matches the first pointer-equal instance only.
    assert!(remove_global_middleware(&global_1));
    assert!(!remove_global_middleware(&global_1));
    reset_global_middlewares();
}

struct ShortCircuit {
    watched: String,
}

impl Middleware for ShortCircuit {
    fn name(&self) -> &str {
        "short-circuit"
    }

    fn handle(&self, request: &ResolveRequest<'_>, next: Next<'_>) -> Result<Instance, Error> {
        if request.identifier.name() == self.watched {
            return Ok(Arc::new(99i32) as Instance);
        }
        next.run(request)
    }
}

#[test]
fn middleware_may_short_circuit_the_provider() {
    let token = Token::new("middleware.short-circuit").unwrap();
    let container = Container::new("mw");
    let invocations = Arc::new(AtomicU32::new(0));
    {
        let invocations = invocations.clone();
        container
            .register(
                Registration::factory(&token, move |_: &Container| {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    Ok(1i32)
                })
                .with_lifecycle(Lifecycle::Transient),
            )
            .unwrap();
    }
    container
        .add_middleware(Arc::new(ShortCircuit { watched: "middleware.short-circuit".to_string() }))
        .unwrap();

    let value = container.resolve::<i32>(&token).unwrap();

    assert_eq!(*value, 99);
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

struct Increment {
    watched: String,
}

impl Middleware for Increment {
    fn name(&self) -> &str {
        "increment"
    }

    fn handle(&self, request: &ResolveRequest<'_>, next: Next<'_>) -> Result<Instance, Error> {
        let instance = next.run(request)?;
        if request.identifier.name() != self.watched {
            return Ok(instance);
        }
        match instance.downcast::<i32>() {
            Ok(value) => Ok(Arc::new(*value + 1) as Instance),
            Err(instance) => Ok(instance),
        }
    }
}

#[test]
fn middleware_may_transform_the_result() {
    let token = Token::new("middleware.transform").unwrap();
    let container = Container::new("mw");
    container
        .register(Registration::value(&token, 41i32).with_lifecycle(Lifecycle::Transient))
        .unwrap();
    container
        .add_middleware(Arc::new(Increment { watched: "middleware.transform".to_string() }))
        .unwrap();

    assert_eq!(*container.resolve::<i32>(&token).unwrap(), 42);
}

#[test]
fn cached_singletons_do_not_re_enter_the_chain() {
    let token = Token::new("middleware.cached").unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new("mw");
    container
        .register(Registration::value(&token, 1i32).with_lifecycle(Lifecycle::Singleton))
        .unwrap();
    container
        .add_middleware(Recorder::new("observer", "middleware.cached", &log))
        .unwrap();

    container.resolve::<i32>(&token).unwrap();
    container.resolve::<i32>(&token).unwrap();

    assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn removal_takes_out_one_instance_only() {
    let token = Token::new("middleware.removal").unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new("mw");
    container
        .register(Registration::value(&token, 1i32).with_lifecycle(Lifecycle::Transient))
        .unwrap();

    let recorder = Recorder::new("twice", "middleware.removal", &log);
    container.add_middleware(recorder.clone()).unwrap();
    container.add_middleware(recorder.clone()).unwrap();

    assert!(container.remove_middleware(&recorder));
    container.resolve::<i32>(&token).unwrap();
    assert_eq!(log.lock().unwrap().len(), 1);

    assert!(container.remove_middleware(&recorder));
    assert!(!container.remove_middleware(&recorder));
}

struct DisposeProbe {
    disposed: Arc<AtomicBool>,
    fail: bool,
}

impl Middleware for DisposeProbe {
    fn name(&self) -> &str {
        "dispose-probe"
    }

    fn handle(&self, request: &ResolveRequest<'_>, next: Next<'_>) -> Result<Instance, Error> {
        next.run(request)
    }

    fn on_dispose(&self, _container: &Container) -> Result<(), StdError> {
        self.disposed.store(true, Ordering::SeqCst);
        if self.fail {
            return Err("hook failed".into());
        }
        Ok(())
    }
}

#[test]
fn disposal_hooks_run_and_failures_are_swallowed() {
    let container = Container::new("mw");
    let first = Arc::new(AtomicBool::new(false));
    let second = Arc::new(AtomicBool::new(false));
    container
        .add_middleware(Arc::new(DisposeProbe { disposed: first.clone(), fail: true }))
        .unwrap();
    container
        .add_middleware(Arc::new(DisposeProbe { disposed: second.clone(), fail: false }))
        .unwrap();

    container.dispose();

    assert!(first.load(Ordering::SeqCst));
    assert!(second.load(Ordering::SeqCst));
}
