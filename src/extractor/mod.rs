//! This module contains the definition of the extractor itself.

pub mod state;
pub mod table;

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::{
    constant::{
        DEFAULT_EXTENSION_DENY_LIST,
        DEFAULT_EXTENSION_TAG_THRESHOLD,
        DEFAULT_PERMISSIVE_ERRORS_ENABLED,
    },
    error,
    error::{inspection, Failure, Failures},
    extractor::{
        state::State,
        table::{Entry, TypeTable},
    },
    inspector,
    inspector::Subject,
    metadata::Module,
    schema::{extension::ExtensionPolicy, SchemaGraph},
};

/// Creates a new extractor over the types of `module`, configured by
/// `config`.
#[must_use]
pub fn new(module: Module, config: Config) -> Extractor<state::HasModule> {
    let state = state::HasModule {
        config,
        roots: None,
    };
    Extractor { module, state }
}

/// The core of the schema recovery, the `Extractor` is responsible for
/// ingesting the types of a module and outputting a schema graph.
///
/// # Enforcing Valid State Transitions
///
/// The extractor enforces that only correct state transitions can occur through
/// use of structs that implement the exact state required by it at any given
/// point.
///
/// There is the [`Self::state`] function that provides access to the state data
/// of whichever state the extractor is currently in.
pub struct Extractor<S: State> {
    /// The module whose types are being recovered.
    module: Module,

    /// The internal state of the extractor.
    state: S,
}

/// The operations available in all states.
impl<S: State> Extractor<S> {
    /// Gets a reference to the module being analyzed.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Gets an immutable reference to the current state of the extractor.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Moves the extractor into the state produced by `transform`.
    fn advance<NS: State>(self, transform: impl FnOnce(&Module, S) -> NS) -> Extractor<NS> {
        let state = transform(&self.module, self.state);
        let module = self.module;

        Extractor { module, state }
    }
}

/// A type that allows the user to easily name the initial state of the
/// extractor.
pub type InitialExtractor = Extractor<state::HasModule>;

/// Operations available on a newly-created extractor.
impl Extractor<state::HasModule> {
    /// Restricts decompilation to the types with the CIL full names in
    /// `roots`, and to the types they reference.
    #[must_use]
    pub fn with_roots(mut self, roots: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.state.roots = Some(roots.into_iter().map(Into::into).collect());
        self
    }

    /// Executes the extraction process from beginning to end, performing all
    /// the intermediate steps automatically and returning the schema graph.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if any type failed to decompile or to link, unless the
    /// extractor is configured with permissive errors.
    pub fn analyze(self) -> error::Result<SchemaGraph> {
        self.decompile().link().into_schema()
    }

    /// Decompiles every root type, and every type that they reference in turn,
    /// until no new types are discovered.
    ///
    /// A failure to decompile one type is recorded and never stops the
    /// decompilation of the others.
    #[must_use]
    pub fn decompile(self) -> Extractor<state::Decompiled> {
        self.advance(|module, old_state| {
            let roots = old_state.roots.unwrap_or_else(|| default_roots(module));
            let mut table = TypeTable::new();
            let mut failures = Failures::new();
            let mut queue = VecDeque::new();

            for root in roots {
                let (id, fresh) = table.intern(&root);
                if !fresh {
                    continue;
                }
                if module.get(&root).is_some() {
                    queue.push_back(id);
                } else {
                    table.set(id, Entry::Failed);
                    failures.add(Failure::new(root, inspection::Error::UnknownType));
                }
            }

            while let Some(id) = queue.pop_front() {
                let Some(ty) = table.full_name_of(id).and_then(|name| module.get(name)) else {
                    continue;
                };
                match inspector::inspect(module, ty) {
                    Ok(inspection) => {
                        debug!(type_name = %ty.full_name, "Decompiled type");
                        for reference in inspection.references {
                            let (referenced, fresh) = table.intern(&reference);
                            if !fresh {
                                continue;
                            }
                            match module.get(&reference).map(Subject::classify) {
                                Some(Some(_)) => queue.push_back(referenced),
                                Some(None) => {
                                    warn!(
                                        type_name = %reference,
                                        "Referenced type is not a protobuf type"
                                    );
                                    table.set(referenced, Entry::Failed);
                                }
                                None => {
                                    warn!(
                                        type_name = %reference,
                                        "Referenced type is not defined in the module"
                                    );
                                    table.set(referenced, Entry::Failed);
                                }
                            }
                        }
                        table.set(id, Entry::Decompiled(inspection.descriptor));
                    }
                    Err(error) => {
                        warn!(type_name = %ty.full_name, %error, "Failed to decompile type");
                        table.set(id, Entry::Failed);
                        failures.add(Failure::new(ty.full_name.clone(), error));
                    }
                }
            }

            state::Decompiled {
                config: old_state.config,
                table,
                failures,
            }
        })
    }
}

/// Operations available on an extractor that has decompiled its types.
impl Extractor<state::Decompiled> {
    /// Ties the decompiled types together into a schema graph.
    ///
    /// Enum defaults are resolved to member names, extension fields are moved
    /// into `extend` blocks, and references between types are resolved. A type
    /// whose extensions cannot be placed is removed from the graph and recorded
    /// as a failure.
    #[must_use]
    pub fn link(self) -> Extractor<state::Linked> {
        self.advance(|_, old_state| {
            let state::Decompiled {
                config,
                mut table,
                mut failures,
            } = old_state;
            let mut graph = table.to_graph();
            graph.resolve_enum_defaults();

            let policy = ExtensionPolicy::new(
                config.extension_tag_threshold,
                &config.extension_deny_list,
            );
            for (id, error) in graph.reattach_extensions(&policy) {
                let type_name = table.full_name_of(id).unwrap_or_default().to_string();
                warn!(type_name = %type_name, %error, "Failed to link type");
                graph.remove(id);
                table.set(id, Entry::Failed);
                failures.add(Failure::new(type_name, error));
            }

            let unresolved = graph.resolve_references();
            debug!(types = graph.len(), unresolved, "Linked schema graph");

            state::Linked {
                config,
                table,
                graph,
                failures,
            }
        })
    }
}

/// Operations available on an extractor that has linked its schema graph.
impl Extractor<state::Linked> {
    /// Gets the linked schema graph.
    pub fn schema(&self) -> &SchemaGraph {
        &self.state.graph
    }

    /// Gets the failures that occurred during decompilation and linking.
    pub fn failures(&self) -> &Failures {
        &self.state.failures
    }

    /// Consumes the extractor, returning the schema graph.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] containing every failure if any type failed, unless
    /// the extractor is configured with permissive errors.
    pub fn into_schema(self) -> error::Result<SchemaGraph> {
        let state = self.state;
        if !state.config.permissive_errors && !state.failures.is_empty() {
            return Err(state.failures);
        }

        Ok(state.graph)
    }
}

/// Gets the full names of every top-level type in `module` that the extractor
/// is able to recover.
fn default_roots(module: &Module) -> Vec<String> {
    module
        .types()
        .iter()
        .filter(|ty| !ty.namespace.is_empty() && Subject::classify(ty).is_some())
        .map(|ty| ty.full_name.clone())
        .collect()
}

/// The configuration for the extractor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The smallest tag at which an optional field is treated as an extension.
    ///
    /// Defaults to [`DEFAULT_EXTENSION_TAG_THRESHOLD`].
    pub extension_tag_threshold: u32,

    /// The fully-qualified (`.package.Name`) messages that may never be the
    /// target of an extension.
    ///
    /// Defaults to [`DEFAULT_EXTENSION_DENY_LIST`].
    pub extension_deny_list: Vec<String>,

    /// Whether to return the schema even when some types failed.
    ///
    /// Defaults to [`DEFAULT_PERMISSIVE_ERRORS_ENABLED`].
    pub permissive_errors: bool,
}

impl Config {
    /// Sets the `extension_tag_threshold` config parameter to `value`.
    #[must_use]
    pub fn with_extension_tag_threshold(mut self, value: u32) -> Self {
        self.extension_tag_threshold = value;
        self
    }

    /// Sets the `extension_deny_list` config parameter to `value`.
    #[must_use]
    pub fn with_extension_deny_list(mut self, value: Vec<String>) -> Self {
        self.extension_deny_list = value;
        self
    }

    /// Sets the permissive errors configuration parameter to `value`.
    #[must_use]
    pub fn with_permissive_errors(mut self, value: bool) -> Self {
        self.permissive_errors = value;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extension_tag_threshold: DEFAULT_EXTENSION_TAG_THRESHOLD,
            extension_deny_list:     DEFAULT_EXTENSION_DENY_LIST
                .iter()
                .map(ToString::to_string)
                .collect(),
            permissive_errors:       DEFAULT_PERMISSIVE_ERRORS_ENABLED,
        }
    }
}
