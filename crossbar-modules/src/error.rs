use std::fmt;

use crossbar::Error;

/// Errors raised while validating, assembling or using a module.
///
/// Every validation failure is raised synchronously by
/// [`ModuleBuilder::build`](crate::ModuleBuilder::build) or
/// [`Module::with_aliases`](crate::Module::with_aliases), before any service
/// instance exists.
#[derive(Debug)]
pub enum ModuleError {
    /// The module declares the same identifier more than once.
    DuplicateDeclaration { module: String, identifier: String },
    /// A declaration is invalid, such as an alias pointing nowhere.
    InvalidRegistration { module: String, message: String },
    /// The same module object is imported more than once.
    DuplicateImportModule { module: String, import: String },
    /// The import graph contains a cycle.
    CircularModuleImport { path: String },
    /// Two different imports expose the same identifier.
    ImportNamespaceCollision {
        module: String,
        identifier: String,
        first: String,
        second: String,
    },
    /// An exported identifier is neither declared nor visible via imports.
    ExportNotFound { module: String, identifier: String },
    /// The same identifier is exported more than once.
    DuplicateExport { module: String, identifier: String },
    /// An alias source is not exported by the module it decorates.
    AliasSourceNotExported { module: String, identifier: String },
    /// An alias name collides with a local declaration of the importer.
    AliasConflictsWithLocal { module: String, identifier: String },
    /// Two aliases from the same module share a source identifier.
    DuplicateAliasMapping { module: String, identifier: String },
    /// The identifier is not part of the module's export list.
    NotExported { module: String, identifier: String },
    /// A resolution error from the underlying container.
    Resolution(Error),
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleError::DuplicateDeclaration { module, identifier } => {
                write!(
                    f,
                    "Module \"{module}\" declares service identifier \"{identifier}\" more \
                     than once."
                )
            }
            ModuleError::InvalidRegistration { module, message } => {
                write!(f, "Invalid registration in module \"{module}\": {message}.")
            }
            ModuleError::DuplicateImportModule { module, import } => {
                write!(f, "Module \"{module}\" imports module \"{import}\" more than once.")
            }
            ModuleError::CircularModuleImport { path } => {
                write!(f, "Circular module import detected: {path}.")
            }
            ModuleError::ImportNamespaceCollision { module, identifier, first, second } => {
                write!(
                    f,
                    "Modules \"{first}\" and \"{second}\" both export service identifier \
                     \"{identifier}\" into module \"{module}\"; rename one of them with an \
                     alias."
                )
            }
            ModuleError::ExportNotFound { module, identifier } => {
                write!(
                    f,
                    "Module \"{module}\" exports service identifier \"{identifier}\" which \
                     is neither declared nor imported."
                )
            }
            ModuleError::DuplicateExport { module, identifier } => {
                write!(
                    f,
                    "Module \"{module}\" exports service identifier \"{identifier}\" more \
                     than once."
                )
            }
            ModuleError::AliasSourceNotExported { module, identifier } => {
                write!(
                    f,
                    "Alias source \"{identifier}\" is not exported by module \"{module}\"."
                )
            }
            ModuleError::AliasConflictsWithLocal { module, identifier } => {
                write!(
                    f,
                    "Alias \"{identifier}\" collides with a local declaration of module \
                     \"{module}\"."
                )
            }
            ModuleError::DuplicateAliasMapping { module, identifier } => {
                write!(
                    f,
                    "Module \"{module}\" maps alias source \"{identifier}\" more than once."
                )
            }
            ModuleError::NotExported { module, identifier } => {
                write!(
                    f,
                    "Service identifier \"{identifier}\" is not exported from module \
                     \"{module}\"."
                )
            }
            ModuleError::Resolution(error) => fmt::Display::fmt(error, f),
        }
    }
}

impl std::error::Error for ModuleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModuleError::Resolution(error) => Some(error),
            _ => None,
        }
    }
}

impl From<Error> for ModuleError {
    fn from(error: Error) -> Self {
        Self::Resolution(error)
    }
}
