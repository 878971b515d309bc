//! Service identifiers: constructible type references and string tokens.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use dashmap::DashSet;

use crate::Error;
use crate::inject::{Injectable, TypeInfo};

/// An opaque string token identifying a service.
///
/// Tokens are allocated through a process-wide authority that enforces
/// uniqueness: creating two tokens with the same name fails fast with
/// [`Error::DuplicateToken`]. Allocate a token once and share clones of it
/// between the registration site and every consumer, typically through a
/// `OnceLock`:
///
/// ```rust
/// use std::sync::OnceLock;
/// use crossbar::Token;
///
/// fn database_url() -> Token {
///     static TOKEN: OnceLock<Token> = OnceLock::new();
///     TOKEN.get_or_init(|| Token::new("database.url").unwrap()).clone()
/// }
///
/// assert_eq!(database_url().name(), "database.url");
/// assert_eq!(database_url(), database_url());
/// ```
#[derive(Clone, Debug)]
pub struct Token {
    name: Arc<str>,
}

impl Token {
    /// Allocates a new token, failing if the name is already taken.
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        if !allocated_tokens().insert(name.clone()) {
            return Err(Error::DuplicateToken { name });
        }
        Ok(Self { name: name.into() })
    }

    /// The token name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn allocated_tokens() -> &'static DashSet<String> {
    static TOKENS: OnceLock<DashSet<String>> = OnceLock::new();
    TOKENS.get_or_init(DashSet::new)
}

/// A reference to a constructible type.
///
/// Carries the type's erased constructor and dependency descriptors, so a
/// `TypeRef` identifier is always resolvable by construction even when no
/// registration exists (see auto-registration on [`Container`]).
///
/// Compared and hashed by the underlying [`TypeId`] only.
///
/// [`Container`]: crate::Container
#[derive(Clone)]
pub struct TypeRef {
    pub(crate) info: Arc<TypeInfo>,
}

impl TypeRef {
    /// Creates a reference to the constructible type `T`.
    pub fn of<T: Injectable>() -> Self {
        Self { info: TypeInfo::of::<T>() }
    }

    /// The type name, as reported by [`std::any::type_name`].
    pub fn name(&self) -> &'static str {
        self.info.name
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.info.type_id
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id() == other.type_id()
    }
}

impl Eq for TypeRef {}

impl Hash for TypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id().hash(state);
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeRef").field(&self.name()).finish()
    }
}

/// The lookup key for a service: a constructible type or an opaque token.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ServiceIdentifier {
    Type(TypeRef),
    Token(Token),
}

impl ServiceIdentifier {
    /// The identifier of the constructible type `T`.
    pub fn of<T: Injectable>() -> Self {
        Self::Type(TypeRef::of::<T>())
    }

    /// The identifier name used in diagnostics and error messages.
    pub fn name(&self) -> &str {
        match self {
            Self::Type(type_ref) => type_ref.name(),
            Self::Token(token) => token.name(),
        }
    }
}

impl fmt::Display for ServiceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Token> for ServiceIdentifier {
    fn from(token: Token) -> Self {
        Self::Token(token)
    }
}

impl From<&Token> for ServiceIdentifier {
    fn from(token: &Token) -> Self {
        Self::Token(token.clone())
    }
}

impl From<TypeRef> for ServiceIdentifier {
    fn from(type_ref: TypeRef) -> Self {
        Self::Type(type_ref)
    }
}

impl From<&ServiceIdentifier> for ServiceIdentifier {
    fn from(identifier: &ServiceIdentifier) -> Self {
        identifier.clone()
    }
}
