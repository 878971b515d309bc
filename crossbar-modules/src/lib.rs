//! # crossbar-modules
//!
//! The module layer of the crossbar service resolution engine: modules bundle
//! service declarations, import each other's exports (optionally under
//! aliases), and are statically validated and assembled into one resolvable
//! container before any instance is created.
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::sync::OnceLock;
//! use crossbar::{ConstructorArgs, DependencyDescriptor, Injectable, StdError, Token};
//! use crossbar_modules::{Declaration, Module};
//!
//! fn config_token() -> Token {
//!     static TOKEN: OnceLock<Token> = OnceLock::new();
//!     TOKEN.get_or_init(|| Token::new("readme.database.config").unwrap()).clone()
//! }
//!
//! fn database_token() -> Token {
//!     static TOKEN: OnceLock<Token> = OnceLock::new();
//!     TOKEN.get_or_init(|| Token::new("readme.database").unwrap()).clone()
//! }
//!
//! #[derive(Clone, PartialEq, Debug)]
//! struct DatabaseConfig {
//!     url: String,
//! }
//!
//! struct Database {
//!     config: DatabaseConfig,
//! }
//!
//! impl Injectable for Database {
//!     fn dependencies() -> Vec<DependencyDescriptor> {
//!         vec![DependencyDescriptor::new(config_token())]
//!     }
//!
//!     fn construct(args: &mut ConstructorArgs) -> Result<Self, StdError> {
//!         Ok(Self { config: args.next_value::<DatabaseConfig>()? })
//!     }
//! }
//!
//! let module = Module::builder("database")
//!     .declare(Declaration::value(
//!         config_token(),
//!         DatabaseConfig { url: "postgres://localhost".to_string() },
//!     ))
//!     .declare(Declaration::class_as::<Database>(database_token()))
//!     .export(database_token())
//!     .build()
//!     .unwrap();
//!
//! // The config is resolvable from within the module, but not exported.
//! let database = module.resolve::<Database>(database_token()).unwrap();
//! assert_eq!(database.config.url, "postgres://localhost");
//! assert!(module.resolve::<DatabaseConfig>(config_token()).is_err());
//! ```

mod error;
mod module;
mod validate;

pub use error::ModuleError;
pub use module::{AliasRequest, AliasedImport, Declaration, Module, ModuleBuilder};
