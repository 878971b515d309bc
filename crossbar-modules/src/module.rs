//! Modules: validated, exportable bundles of service declarations.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbar::{
    Container, Injectable, Lifecycle, Provider, Registration, ServiceIdentifier, StdError, TypeRef,
};

use crate::error::ModuleError;
use crate::validate::{GraphNode, detect_cycles};

/// One service declaration of a module: an identifier, a creation strategy
/// and an optional lifecycle override.
pub struct Declaration {
    identifier: ServiceIdentifier,
    provider: Provider,
    lifecycle: Option<Lifecycle>,
}

impl Declaration {
    /// Declares the constructible type `T` under its own identifier.
    pub fn class<T: Injectable>() -> Self {
        Self {
            identifier: ServiceIdentifier::of::<T>(),
            provider: Provider::Class(TypeRef::of::<T>()),
            lifecycle: None,
        }
    }

    /// Declares the constructible type `T` under an explicit identifier.
    pub fn class_as<T: Injectable>(identifier: impl Into<ServiceIdentifier>) -> Self {
        Self {
            identifier: identifier.into(),
            provider: Provider::Class(TypeRef::of::<T>()),
            lifecycle: None,
        }
    }

    /// Declares a pre-built value.
    pub fn value<T: Send + Sync + 'static>(
        identifier: impl Into<ServiceIdentifier>,
        value: T,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            provider: Provider::value(value),
            lifecycle: None,
        }
    }

    /// Declares a factory.
    pub fn factory<T, F>(identifier: impl Into<ServiceIdentifier>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, StdError> + Send + Sync + 'static,
    {
        Self {
            identifier: identifier.into(),
            provider: Provider::factory(factory),
            lifecycle: None,
        }
    }

    /// Declares an alias for another declared or imported identifier.
    pub fn alias(
        identifier: impl Into<ServiceIdentifier>,
        target: impl Into<ServiceIdentifier>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            provider: Provider::Alias(target.into()),
            lifecycle: None,
        }
    }

    /// Overrides the lifecycle of the declaration.
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn identifier(&self) -> &ServiceIdentifier {
        &self.identifier
    }

    fn into_registration(self, public: bool) -> Registration {
        let mut registration = Registration::new(self.identifier, self.provider);
        if let Some(lifecycle) = self.lifecycle {
            registration = registration.with_lifecycle(lifecycle);
        }
        if !public {
            registration = registration.private();
        }
        registration
    }
}

/// Renames an imported identifier as seen by the importing module only.
#[derive(Clone, Debug)]
pub struct AliasRequest {
    source: ServiceIdentifier,
    exposed_as: ServiceIdentifier,
}

impl AliasRequest {
    pub fn new(
        source: impl Into<ServiceIdentifier>,
        exposed_as: impl Into<ServiceIdentifier>,
    ) -> Self {
        Self {
            source: source.into(),
            exposed_as: exposed_as.into(),
        }
    }
}

/// An import of a module, optionally with alias renames.
#[derive(Clone, Debug)]
pub struct AliasedImport {
    module: Module,
    aliases: Vec<AliasRequest>,
}

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

/// The reserved graph node id of a module still under construction.
const BUILDING: u64 = u64::MAX;

struct ModuleInner {
    id: u64,
    name: String,
    imports: Vec<AliasedImport>,
    exports: Vec<ServiceIdentifier>,
    export_set: HashSet<ServiceIdentifier>,
    container: Container,
}

/// A validated, exportable bundle of service declarations assembled into one
/// container.
///
/// Modules are immutable once constructed and validated eagerly by
/// [`ModuleBuilder::build`]: a failed validation never produces a half-built
/// module. Identifiers outside the export list are resolvable from within
/// the module (as dependencies of its declarations) but inaccessible through
/// [`resolve`](Module::resolve).
///
/// # Examples
///
/// ```rust
/// use std::sync::OnceLock;
/// use crossbar::Token;
/// use crossbar_modules::{Declaration, Module};
///
/// fn greeting() -> Token {
///     static TOKEN: OnceLock<Token> = OnceLock::new();
///     TOKEN.get_or_init(|| Token::new("docs.greeting").unwrap()).clone()
/// }
///
/// let module = Module::builder("greetings")
///     .declare(Declaration::value(greeting(), "hello".to_string()))
///     .export(greeting())
///     .build()
///     .unwrap();
///
/// let resolved = module.resolve::<String>(greeting()).unwrap();
/// assert_eq!(*resolved, "hello");
/// ```
#[derive(Clone)]
pub struct Module {
    inner: Arc<ModuleInner>,
}

impl Module {
    /// Starts building a module.
    pub fn builder(name: impl Into<String>) -> ModuleBuilder {
        ModuleBuilder {
            name: name.into(),
            declarations: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The exported identifiers, in export order.
    pub fn exports(&self) -> &[ServiceIdentifier] {
        &self.inner.exports
    }

    /// Decorates this module for import under renamed identifiers.
    ///
    /// Every alias source must be exported by this module, and no source may
    /// be mapped twice.
    pub fn with_aliases(
        &self,
        aliases: impl IntoIterator<Item = AliasRequest>,
    ) -> Result<AliasedImport, ModuleError> {
        let aliases: Vec<AliasRequest> = aliases.into_iter().collect();
        let mut seen = HashSet::new();
        for alias in &aliases {
            if !self.inner.export_set.contains(&alias.source) {
                return Err(ModuleError::AliasSourceNotExported {
                    module: self.inner.name.clone(),
                    identifier: alias.source.name().to_string(),
                });
            }
            if !seen.insert(alias.source.clone()) {
                return Err(ModuleError::DuplicateAliasMapping {
                    module: self.inner.name.clone(),
                    identifier: alias.source.name().to_string(),
                });
            }
        }
        Ok(AliasedImport { module: self.clone(), aliases })
    }

    /// Resolves an exported identifier.
    ///
    /// Identifiers outside the export list fail with
    /// [`ModuleError::NotExported`], even when they are registered in the
    /// module's container.
    pub fn resolve<T: Send + Sync + 'static>(
        &self,
        identifier: impl Into<ServiceIdentifier>,
    ) -> Result<Arc<T>, ModuleError> {
        let identifier = identifier.into();
        self.guard_export(&identifier)?;
        Ok(self.inner.container.resolve::<T>(identifier)?)
    }

    /// Whether the identifier is exported and registered.
    pub fn is_registered(&self, identifier: &ServiceIdentifier) -> bool {
        self.inner.export_set.contains(identifier)
            && self.inner.container.is_registered(identifier)
    }

    fn guard_export(&self, identifier: &ServiceIdentifier) -> Result<(), ModuleError> {
        if !self.inner.export_set.contains(identifier) {
            return Err(ModuleError::NotExported {
                module: self.inner.name.clone(),
                identifier: identifier.name().to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.inner.name)
            .field("imports", &self.inner.imports.len())
            .field("exports", &self.inner.exports.len())
            .finish()
    }
}

/// Builds and validates a [`Module`].
pub struct ModuleBuilder {
    name: String,
    declarations: Vec<Declaration>,
    imports: Vec<AliasedImport>,
    exports: Vec<ServiceIdentifier>,
}

impl ModuleBuilder {
    /// Adds a service declaration.
    pub fn declare(mut self, declaration: Declaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    /// Imports another module's exports.
    pub fn import(mut self, module: &Module) -> Self {
        self.imports.push(AliasedImport {
            module: module.clone(),
            aliases: Vec::new(),
        });
        self
    }

    /// Imports another module's exports under alias renames; see
    /// [`Module::with_aliases`].
    pub fn import_aliased(mut self, import: AliasedImport) -> Self {
        self.imports.push(import);
        self
    }

    /// Exports an identifier from the module.
    pub fn export(mut self, identifier: impl Into<ServiceIdentifier>) -> Self {
        self.exports.push(identifier.into());
        self
    }

    /// Validates the module and assembles its container.
    ///
    /// Validation covers declarations, imports (duplicates, cycles and
    /// namespace collisions), aliasing and exports; each violation is a
    /// distinct [`ModuleError`]. Runs entirely before any instance is
    /// created.
    pub fn build(self) -> Result<Module, ModuleError> {
        let name = self.name;

        // Declarations must be unique within the module.
        let mut declared = HashSet::new();
        for declaration in &self.declarations {
            if !declared.insert(declaration.identifier().clone()) {
                return Err(ModuleError::DuplicateDeclaration {
                    module: name.clone(),
                    identifier: declaration.identifier().name().to_string(),
                });
            }
        }

        // The same module object may be imported only once.
        let mut imported_modules = HashSet::new();
        for import in &self.imports {
            if !imported_modules.insert(import.module.id()) {
                return Err(ModuleError::DuplicateImportModule {
                    module: name.clone(),
                    import: import.module.name().to_string(),
                });
            }
        }

        detect_cycles(BUILDING, &snapshot_graph(&name, &self.imports))?;

        // Visible names contributed by imports, renamed per alias map.
        let mut visible: HashMap<ServiceIdentifier, (ServiceIdentifier, usize)> = HashMap::new();
        let mut visible_order: Vec<ServiceIdentifier> = Vec::new();
        for (index, import) in self.imports.iter().enumerate() {
            let alias_map: HashMap<&ServiceIdentifier, &ServiceIdentifier> = import
                .aliases
                .iter()
                .map(|alias| (&alias.source, &alias.exposed_as))
                .collect();
            for export in import.module.exports() {
                let aliased = alias_map.contains_key(export);
                let exposed = alias_map
                    .get(export)
                    .map(|exposed| (*exposed).clone())
                    .unwrap_or_else(|| export.clone());
                if aliased && declared.contains(&exposed) {
                    return Err(ModuleError::AliasConflictsWithLocal {
                        module: name.clone(),
                        identifier: exposed.name().to_string(),
                    });
                }
                if let Some((_, first_index)) = visible.get(&exposed) {
                    return Err(ModuleError::ImportNamespaceCollision {
                        module: name.clone(),
                        identifier: exposed.name().to_string(),
                        first: self.imports[*first_index].module.name().to_string(),
                        second: import.module.name().to_string(),
                    });
                }
                visible.insert(exposed.clone(), (export.clone(), index));
                visible_order.push(exposed);
            }
        }

        // An alias declaration must point at something declared or visible.
        for declaration in &self.declarations {
            if let Provider::Alias(target) = &declaration.provider
                && !declared.contains(target)
                && !visible.contains_key(target)
            {
                return Err(ModuleError::InvalidRegistration {
                    module: name.clone(),
                    message: format!(
                        "alias declaration \"{}\" points at \"{}\" which is neither declared \
                         nor imported",
                        declaration.identifier().name(),
                        target.name(),
                    ),
                });
            }
        }

        // Exports must be unique and name something declared or visible.
        // An aliased import is only visible under its alias name, so
        // exporting the original name fails here.
        let mut export_set = HashSet::new();
        for export in &self.exports {
            if !export_set.insert(export.clone()) {
                return Err(ModuleError::DuplicateExport {
                    module: name.clone(),
                    identifier: export.name().to_string(),
                });
            }
            if !declared.contains(export) && !visible.contains_key(export) {
                return Err(ModuleError::ExportNotFound {
                    module: name.clone(),
                    identifier: export.name().to_string(),
                });
            }
        }

        // Assembly: own declarations first, then a delegating registration
        // per visible import name, bound to the exporting module's own
        // container so its caches and internal visibility are preserved.
        let container = Container::new(name.clone());
        for declaration in self.declarations {
            let public = export_set.contains(declaration.identifier());
            container.register(declaration.into_registration(public))?;
        }
        for exposed in visible_order {
            if declared.contains(&exposed) {
                // Local declarations shadow import-provided names.
                tracing::debug!(
                    module = %name,
                    identifier = exposed.name(),
                    "local declaration shadows imported identifier"
                );
                continue;
            }
            let (source, index) = visible
                .get(&exposed)
                .cloned()
                .expect("visible_order entries are inserted into the visible map");
            let source_container = self.imports[index].module.inner.container.clone();
            // The factory returns the already-erased instance from the
            // exporting container, so the provider is built from the raw
            // factory type to avoid a second layer of erasure.
            let delegate = Provider::Factory(Arc::new(move |_: &Container| {
                Ok(source_container.resolve_instance(source.clone())?)
            }));
            let mut registration =
                Registration::new(exposed.clone(), delegate).with_lifecycle(Lifecycle::Transient);
            if !export_set.contains(&exposed) {
                registration = registration.private();
            }
            container.register(registration)?;
        }

        tracing::debug!(
            module = %name,
            registered = container.registry().len(),
            exports = self.exports.len(),
            "module assembled"
        );
        Ok(Module {
            inner: Arc::new(ModuleInner {
                id: NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed),
                name,
                imports: self.imports,
                exports: self.exports,
                export_set,
                container,
            }),
        })
    }
}

fn snapshot_graph(name: &str, imports: &[AliasedImport]) -> HashMap<u64, GraphNode> {
    let mut nodes = HashMap::new();
    nodes.insert(
        BUILDING,
        GraphNode {
            name: name.to_string(),
            imports: imports.iter().map(|import| import.module.id()).collect(),
        },
    );
    let mut stack: Vec<Module> = imports.iter().map(|import| import.module.clone()).collect();
    while let Some(module) = stack.pop() {
        if nodes.contains_key(&module.id()) {
            continue;
        }
        nodes.insert(
            module.id(),
            GraphNode {
                name: module.name().to_string(),
                imports: module
                    .inner
                    .imports
                    .iter()
                    .map(|import| import.module.id())
                    .collect(),
            },
        );
        stack.extend(module.inner.imports.iter().map(|import| import.module.clone()));
    }
    nodes
}
