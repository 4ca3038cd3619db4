//! This module contains the builder for the fields of a message, which
//! accumulates what each pass over the message's methods learns about them.

use std::collections::HashMap;

use tracing::warn;

use crate::{
    error::inspection::{Error, Result},
    schema::{DefaultValue, FieldDescriptor, Label, TypeRef, WireKind},
};

/// A field of a message that is still being recovered.
///
/// A partial field becomes a [`FieldDescriptor`] once the serialize pass has
/// given it a tag, and any default-value pass has run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartialField {
    /// The name of the property in the compiled program that backs the field.
    pub property: String,

    /// The protobuf name of the field.
    pub name: String,

    pub kind:   WireKind,
    pub label:  Label,
    pub tag:    Option<u32>,
    pub packed: bool,

    pub referenced_type: Option<TypeRef>,
}

impl PartialField {
    /// Creates a field backed by `property` that nothing is known about yet.
    #[must_use]
    pub fn new(property: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            property:        property.into(),
            name:            name.into(),
            kind:            WireKind::Invalid,
            label:           Label::Invalid,
            tag:             None,
            packed:          false,
            referenced_type: None,
        }
    }

    /// Completes the field with its `default`, returning [`None`] if the field
    /// was never given a tag.
    #[must_use]
    pub fn finalize(self, default: Option<DefaultValue>) -> Option<FieldDescriptor> {
        let tag = self.tag?;
        Some(FieldDescriptor {
            name: self.name,
            property: self.property,
            kind: self.kind,
            label: self.label,
            tag,
            packed: self.packed,
            default,
            referenced_type: self.referenced_type,
        })
    }
}

/// The fields of a message under recovery, keyed by their backing property.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldTable {
    fields:   Vec<PartialField>,
    defaults: HashMap<String, DefaultValue>,
}

impl FieldTable {
    /// Creates a table over the provided `fields`.
    #[must_use]
    pub fn new(fields: Vec<PartialField>) -> Self {
        let defaults = HashMap::new();
        Self { fields, defaults }
    }

    /// Adds a field to the table.
    pub fn push(&mut self, field: PartialField) {
        self.fields.push(field);
    }

    /// Gets the field backed by `property`.
    #[must_use]
    pub fn get(&self, property: &str) -> Option<&PartialField> {
        self.fields.iter().find(|f| f.property == property)
    }

    /// Gets the field backed by `property` mutably.
    pub fn get_mut(&mut self, property: &str) -> Option<&mut PartialField> {
        self.fields.iter_mut().find(|f| f.property == property)
    }

    /// Records `default` as the default value of the field backed by
    /// `property`.
    pub fn set_default(&mut self, property: impl Into<String>, default: DefaultValue) {
        self.defaults.insert(property.into(), default);
    }

    /// Gets the number of fields in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Checks if the table has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Gets the backing properties of the fields that no write gave a tag.
    pub fn untagged(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.tag.is_none())
            .map(|f| f.property.as_str())
    }

    /// Completes every field that was given a tag, ordering them by tag.
    ///
    /// Fields without a tag are dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if two fields share a tag.
    pub fn finish(mut self) -> Result<Vec<FieldDescriptor>> {
        for property in self.untagged() {
            warn!(property = %property, "Dropping property that was never written");
        }

        let mut finished: Vec<FieldDescriptor> = self
            .fields
            .into_iter()
            .filter_map(|field| {
                let default = self.defaults.remove(&field.property);
                field.finalize(default)
            })
            .collect();
        finished.sort_by_key(|f| f.tag);

        if let Some(pair) = finished.windows(2).find(|pair| pair[0].tag == pair[1].tag) {
            return Err(Error::DuplicateTag {
                tag:    pair[1].tag,
                first:  pair[0].name.clone(),
                second: pair[1].name.clone(),
            });
        }

        Ok(finished)
    }
}
