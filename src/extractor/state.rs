//! This module contains the state tracking functionality for the extractor.

use std::fmt::Debug;

use crate::{
    error::Failures,
    extractor::{table::TypeTable, Config},
    schema::SchemaGraph,
};

/// A marker trait that says that the type implementing it is an extractor
/// state.
pub trait State
where
    Self: Clone + Debug + Sized,
{
}

/// The initial state for the extractor.
#[derive(Clone, Debug)]
pub struct HasModule {
    pub config: Config,

    /// The CIL full names of the types to start decompiling from, or [`None`]
    /// to start from every recoverable type in the module.
    pub roots: Option<Vec<String>>,
}
impl State for HasModule {}

/// The extractor has decompiled every type reachable from its roots.
#[derive(Clone, Debug)]
pub struct Decompiled {
    pub config: Config,

    /// Every type encountered, with its decompiled descriptor if it has one.
    pub table: TypeTable,

    /// The types that failed to decompile.
    pub failures: Failures,
}
impl State for Decompiled {}

/// The extractor has linked the decompiled types into a schema graph.
#[derive(Clone, Debug)]
pub struct Linked {
    pub config: Config,
    pub table:  TypeTable,
    pub graph:  SchemaGraph,

    /// The types that failed to decompile or to link.
    pub failures: Failures,
}
impl State for Linked {}
