//! This module contains the passes that tie the types of a schema graph
//! together once all of them have been decompiled.

use std::collections::HashMap;

use tracing::warn;

use crate::schema::{
    DefaultValue,
    FieldDescriptor,
    SchemaGraph,
    TypeDescriptor,
    TypeId,
    TypeRef,
};

impl SchemaGraph {
    /// Replaces the numeric defaults of enum fields with the names of the
    /// matching enum members.
    ///
    /// Defaults whose enum is not in the graph, or that match no member, are
    /// left numeric.
    pub fn resolve_enum_defaults(&mut self) {
        let mut updates = vec![];
        for (id, descriptor) in self.types() {
            let Some(message) = descriptor.as_message() else {
                continue;
            };
            for (index, field) in message.fields.iter().enumerate() {
                let Some(DefaultValue::EnumValue(value)) = field.default else {
                    continue;
                };
                let Some(reference) = &field.referenced_type else {
                    continue;
                };
                let enum_name = reference.name().to_string();
                let member = self
                    .find(&enum_name)
                    .and_then(TypeDescriptor::as_enum)
                    .and_then(|e| e.member_for(value));
                match member {
                    Some(member) => updates.push((id, index, member.to_string())),
                    None => warn!(
                        field = %field.name,
                        value,
                        enum_name = %enum_name,
                        "enum default matches no known member"
                    ),
                }
            }
        }

        for (id, index, member) in updates {
            let field = self
                .get_mut(id)
                .and_then(TypeDescriptor::as_message_mut)
                .and_then(|m| m.fields.get_mut(index));
            if let Some(field) = field {
                field.default = Some(DefaultValue::Literal(member));
            }
        }
    }

    /// Resolves every placeholder reference whose type is in the graph,
    /// returning the number of references that remain placeholders.
    pub fn resolve_references(&mut self) -> usize {
        let by_name = &self.by_name;
        let mut unresolved = 0;
        for descriptor in self.entries.iter_mut().flatten() {
            let TypeDescriptor::Message(message) = descriptor else {
                continue;
            };
            let fields = message
                .fields
                .iter_mut()
                .chain(message.extends.iter_mut().map(|e| &mut e.field));
            for field in fields {
                if !resolve_field(field, by_name) {
                    unresolved += 1;
                }
            }
        }

        unresolved
    }
}

/// Resolves the reference of `field`, returning `false` if it names a type
/// that is not in `by_name`.
fn resolve_field(field: &mut FieldDescriptor, by_name: &HashMap<String, TypeId>) -> bool {
    let Some(TypeRef::Placeholder(name)) = &field.referenced_type else {
        return true;
    };
    match by_name.get(&name.to_string()) {
        Some(&id) => {
            let name = name.clone();
            field.referenced_type = Some(TypeRef::Resolved { id, name });
            true
        }
        None => false,
    }
}
