//! # crossbar
//!
//! A synchronous service resolution engine: a graph of named service
//! declarations (classes, factories, values, aliases) is built and cached on
//! demand, with lifecycle rules, cycle detection and composable resolution
//! middleware.
//!
//! ## Core Concepts
//!
//! - **Container**: owns a registry of service registrations and resolves
//!   identifiers through it, delegating to an optional parent container
//! - **ServiceIdentifier**: the lookup key for a service, either a
//!   constructible type or a unique string [`Token`]
//! - **Registration**: one creation strategy (class, factory, value or alias)
//!   bound to an identifier with a [`Lifecycle`]
//! - **Injectable**: the trait a type implements to become constructible,
//!   declaring its ordered dependency descriptors and its constructor
//! - **Ref / DynamicRef**: deferred handles that resolve lazily and break
//!   dependency cycles
//! - **Middleware**: interceptors wrapping the innermost provider step
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use crossbar::{
//!     ConstructorArgs, Container, DependencyDescriptor, Injectable, Lifecycle, Registration,
//!     StdError,
//! };
//!
//! struct Config {
//!     url: String,
//! }
//!
//! impl Injectable for Config {
//!     fn construct(_args: &mut ConstructorArgs) -> Result<Self, StdError> {
//!         Ok(Self { url: "sqlite::memory:".to_string() })
//!     }
//! }
//!
//! struct Database {
//!     config: Arc<Config>,
//! }
//!
//! impl Injectable for Database {
//!     fn dependencies() -> Vec<DependencyDescriptor> {
//!         vec![DependencyDescriptor::of::<Config>()]
//!     }
//!
//!     fn construct(args: &mut ConstructorArgs) -> Result<Self, StdError> {
//!         Ok(Self { config: args.next::<Config>()? })
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let container = Container::new("app");
//!     container.register(Registration::class::<Config>())?;
//!     container.register(Registration::class::<Database>().with_lifecycle(Lifecycle::Singleton))?;
//!
//!     let database = container.resolve_type::<Database>()?;
//!     assert_eq!(database.config.url, "sqlite::memory:");
//!     Ok(())
//! }
//! ```
//!
//! ## Breaking Cycles
//!
//! Two services may depend on each other as long as one side defers its
//! dependency with the `ref` or `dynamic` option:
//!
//! ```rust
//! use std::sync::Arc;
//! use crossbar::{
//!     ConstructorArgs, Container, DependencyDescriptor, Injectable, Ref, StdError,
//! };
//!
//! struct Chicken {
//!     egg: Ref<Arc<Egg>>,
//! }
//!
//! struct Egg {
//!     chicken: Arc<Chicken>,
//! }
//!
//! impl Injectable for Chicken {
//!     fn dependencies() -> Vec<DependencyDescriptor> {
//!         vec![DependencyDescriptor::of::<Egg>().by_ref()]
//!     }
//!
//!     fn construct(args: &mut ConstructorArgs) -> Result<Self, StdError> {
//!         Ok(Self { egg: args.next_ref::<Egg>()? })
//!     }
//! }
//!
//! impl Injectable for Egg {
//!     fn dependencies() -> Vec<DependencyDescriptor> {
//!         vec![DependencyDescriptor::of::<Chicken>()]
//!     }
//!
//!     fn construct(args: &mut ConstructorArgs) -> Result<Self, StdError> {
//!         Ok(Self { chicken: args.next::<Chicken>()? })
//!     }
//! }
//!
//! let container = Container::new("farm");
//! let egg = container.resolve_type::<Egg>().unwrap();
//! assert!(egg.chicken.egg.current().is_ok());
//! ```

mod container;
mod error;
mod identifier;
mod inject;
mod middleware;
mod records;
mod reference;
mod registry;

pub use container::{Container, ResolveOptions, global, reset_global};
pub use error::{Error, StdError};
pub use identifier::{ServiceIdentifier, Token, TypeRef};
pub use inject::{ConstructorArgs, DependencyDescriptor, Injectable};
pub use middleware::{
    Middleware, Next, ResolveRequest, add_global_middleware, remove_global_middleware,
    reset_global_middlewares,
};
pub use reference::{DynamicRef, Ref};
pub use registry::{FactoryFn, Instance, Lifecycle, Provider, Registration, Registry};
