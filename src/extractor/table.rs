//! This module contains the table that tracks every type the extractor has
//! encountered, and what has become of it.

use bimap::BiMap;

use crate::schema::{SchemaGraph, TypeDescriptor, TypeId};

/// The state of a single type known to the extractor.
#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    /// The type has been discovered but not yet decompiled.
    Pending,

    Decompiled(TypeDescriptor),

    /// The type could not be decompiled, or is not defined in the module.
    Failed,
}

/// A mapping between the CIL full names of types and their [`TypeId`]s, along
/// with the decompilation state of each.
///
/// Every type is interned exactly once, so a type is decompiled at most once
/// however many times it is referenced.
#[derive(Clone, Debug, Default)]
pub struct TypeTable {
    ids:     BiMap<String, TypeId>,
    entries: Vec<Entry>,
}

impl TypeTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the id of the type called `full_name`, adding a [`Entry::Pending`]
    /// entry for it if it is not yet known.
    ///
    /// The returned flag is `true` if the type was not previously known.
    pub fn intern(&mut self, full_name: &str) -> (TypeId, bool) {
        if let Some(&id) = self.ids.get_by_left(full_name) {
            return (id, false);
        }

        let id = TypeId(self.entries.len());
        self.ids.insert(full_name.to_string(), id);
        self.entries.push(Entry::Pending);
        (id, true)
    }

    /// Gets the id of the type called `full_name`, if it is known.
    #[must_use]
    pub fn id_of(&self, full_name: &str) -> Option<TypeId> {
        self.ids.get_by_left(full_name).copied()
    }

    /// Gets the full name of the type at `id`.
    #[must_use]
    pub fn full_name_of(&self, id: TypeId) -> Option<&str> {
        self.ids.get_by_right(&id).map(String::as_str)
    }

    #[must_use]
    pub fn entry(&self, id: TypeId) -> Option<&Entry> {
        self.entries.get(id.0)
    }

    /// Sets the entry for the type at `id`, doing nothing if the id is not
    /// known to the table.
    pub fn set(&mut self, id: TypeId, entry: Entry) {
        if let Some(slot) = self.entries.get_mut(id.0) {
            *slot = entry;
        }
    }

    /// Gets the number of types known to the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the table knows of no types.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts the entries that are still [`Entry::Pending`].
    #[must_use]
    pub fn pending(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Entry::Pending))
            .count()
    }

    /// Builds the schema graph of the decompiled types.
    ///
    /// The [`TypeId`]s of the table are also the ids of the graph, with the
    /// entries that were not decompiled left empty.
    #[must_use]
    pub fn to_graph(&self) -> SchemaGraph {
        let entries = self
            .entries
            .iter()
            .map(|entry| match entry {
                Entry::Decompiled(descriptor) => Some(descriptor.clone()),
                Entry::Pending | Entry::Failed => None,
            })
            .collect();
        SchemaGraph::new(entries)
    }
}
