use std::fmt;

/// Type alias for boxed errors that can be sent across threads.
///
/// This is the standard error type for user-supplied code: factories and
/// [`Injectable::construct`](crate::Injectable::construct) return it, and the
/// engine wraps it into [`Error::ProviderFailure`] together with the
/// resolution path.
pub type StdError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the resolution engine.
///
/// All engine failures are carried by this single tagged type. Messages are
/// human readable and, where a resolution was in flight, annotated with the
/// recorded resolution path. None of these errors are retried internally.
#[derive(Debug)]
pub enum Error {
    /// A required identifier is not registered anywhere in the container chain.
    ServiceNotFound {
        identifier: String,
        path: Option<String>,
    },
    /// The current resolution frame collided with one of its ancestors.
    CircularDependency { identifier: String, path: String },
    /// The `ref` and `dynamic` options were both set on one request.
    InvalidOptions,
    /// The container was disposed before the operation.
    ContainerDisposed { container: String },
    /// The underlying constructor or factory failed.
    ProviderFailure {
        identifier: String,
        path: Option<String>,
        source: StdError,
    },
    /// A registration conflicts with an existing one under the same identifier.
    InvalidRegistration { message: String },
    /// A token with the same name was already allocated.
    DuplicateToken { name: String },
    /// A resolved instance does not have the requested type.
    TypeMismatch {
        identifier: String,
        expected: &'static str,
    },
    /// Constructor arguments were consumed in the wrong order or shape.
    Injection { message: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ServiceNotFound { identifier, path } => {
                write!(
                    f,
                    "Service identifier \"{identifier}\" is not registered in this container. \
                     Please register it first or set the \"optional\" option to true if this \
                     service is optional."
                )?;
                if let Some(path) = path {
                    write!(f, " Resolution path: {path}")?;
                }
                Ok(())
            }
            Error::CircularDependency { identifier, path } => {
                write!(
                    f,
                    "Circular dependency detected for service identifier \"{identifier}\". \
                     To resolve this, use either the \"ref\" option to defer the resolution \
                     until the instance is first accessed, or the \"dynamic\" option to defer \
                     it to every access. Resolution path: {path}"
                )
            }
            Error::InvalidOptions => {
                write!(
                    f,
                    "The \"ref\" and \"dynamic\" options are mutually exclusive; set at most \
                     one of them."
                )
            }
            Error::ContainerDisposed { container } => {
                write!(f, "Container \"{container}\" is disposed and can no longer be used.")
            }
            Error::ProviderFailure { identifier, path, source } => {
                write!(f, "Service identifier \"{identifier}\" could not be constructed: {source}.")?;
                if let Some(path) = path {
                    write!(f, " Resolution path: {path}")?;
                }
                Ok(())
            }
            Error::InvalidRegistration { message } => write!(f, "{message}"),
            Error::DuplicateToken { name } => {
                write!(f, "Token \"{name}\" is already allocated; service tokens must be unique.")
            }
            Error::TypeMismatch { identifier, expected } => {
                write!(
                    f,
                    "Service identifier \"{identifier}\" did not resolve to an instance of \
                     {expected}."
                )
            }
            Error::Injection { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ProviderFailure { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
