//! This module contains the recovery of `extend` blocks from the fields that
//! generators emit for extensions.
//!
//! Generated code represents an extension of message `A` declared with type
//! `B` as an ordinary field of `A` with a tag in the extension range. Such
//! fields are moved out of `A` and declared as `extend A { ... }` alongside
//! `B`.

use std::collections::HashSet;

use crate::{
    error::inspection::{Error, Result},
    schema::{
        ExtendDeclaration,
        FieldDescriptor,
        Label,
        MessageDescriptor,
        SchemaGraph,
        TypeDescriptor,
        TypeId,
        TypeRef,
    },
};

/// The rules that decide which fields are extensions, and where they may go.
#[derive(Clone, Copy, Debug)]
pub struct ExtensionPolicy<'a> {
    /// The smallest tag of the extension range.
    pub threshold: u32,

    /// The fully-qualified names of messages that may never host an
    /// extension.
    pub deny_list: &'a [String],
}

impl<'a> ExtensionPolicy<'a> {
    /// Creates a new extension policy.
    #[must_use]
    pub fn new(threshold: u32, deny_list: &'a [String]) -> Self {
        Self {
            threshold,
            deny_list,
        }
    }

    /// Checks whether `field` is an extension field.
    #[must_use]
    pub fn is_extension(&self, field: &FieldDescriptor) -> bool {
        field.label != Label::Required && field.tag >= self.threshold
    }
}

/// The planned move of one extension field out of its declaring message.
#[derive(Clone, Debug)]
struct Placement {
    /// The message that will host the extension.
    host: TypeId,

    /// The position of the field in its declaring message.
    index: usize,

    field:  String,
    target: String,
}

impl SchemaGraph {
    /// Moves every extension field in the graph into an `extend` block on the
    /// message that the field references.
    ///
    /// A message whose extension fields cannot all be placed is left
    /// untouched, and is returned along with the reason. A message that
    /// extends a failing message fails too, so no extension is moved into a
    /// message that is about to be discarded.
    pub fn reattach_extensions(&mut self, policy: &ExtensionPolicy) -> Vec<(TypeId, Error)> {
        let mut failures = vec![];
        let mut plans = vec![];
        for (id, descriptor) in self.types() {
            let Some(message) = descriptor.as_message() else {
                continue;
            };
            match self.plan_extensions(message, policy) {
                Ok(plan) if plan.is_empty() => {}
                Ok(plan) => plans.push((id, plan)),
                Err(error) => failures.push((id, error)),
            }
        }

        loop {
            let failed: HashSet<TypeId> = failures.iter().map(|(id, _)| *id).collect();
            let (broken, sound): (Vec<_>, Vec<_>) = plans.into_iter().partition(|(_, plan)| {
                plan.iter().any(|placement| failed.contains(&placement.host))
            });
            plans = sound;
            if broken.is_empty() {
                break;
            }
            for (id, plan) in broken {
                if let Some(placement) = plan.into_iter().find(|p| failed.contains(&p.host)) {
                    failures.push((id, Error::UnknownExtensionTarget {
                        field:  placement.field,
                        target: placement.target,
                    }));
                }
            }
        }

        for (id, plan) in plans {
            let Some(message) = self.get_mut(id).and_then(TypeDescriptor::as_message_mut) else {
                continue;
            };
            message.accepts_extensions = true;
            let extendee = message.name.clone();
            let mut moved: Vec<_> = plan
                .into_iter()
                .rev()
                .map(|placement| (placement.host, message.fields.remove(placement.index)))
                .collect();
            moved.reverse();

            for (host, field) in moved {
                if let Some(host) = self.get_mut(host).and_then(TypeDescriptor::as_message_mut) {
                    host.extends.push(ExtendDeclaration {
                        extendee: extendee.clone(),
                        field,
                    });
                }
            }
        }

        failures
    }

    /// Works out where each extension field of `message` goes.
    fn plan_extensions(
        &self,
        message: &MessageDescriptor,
        policy: &ExtensionPolicy,
    ) -> Result<Vec<Placement>> {
        let mut plan = vec![];
        let extensions = message
            .fields
            .iter()
            .enumerate()
            .filter(|(_, field)| policy.is_extension(field));
        for (index, field) in extensions {
            let target = field
                .referenced_type
                .as_ref()
                .map(TypeRef::name)
                .filter(|name| !name.package().is_empty())
                .ok_or_else(|| Error::ExtensionWithoutPackage {
                    field: field.name.clone(),
                })?
                .to_string();
            if policy.deny_list.contains(&target) {
                return Err(Error::DeniedExtensionTarget {
                    field: field.name.clone(),
                    target,
                });
            }
            let Some(host) = self
                .id_of(&target)
                .filter(|&id| self.get(id).and_then(TypeDescriptor::as_message).is_some())
            else {
                return Err(Error::UnknownExtensionTarget {
                    field: field.name.clone(),
                    target,
                });
            };
            plan.push(Placement {
                host,
                index,
                field: field.name.clone(),
                target,
            });
        }

        Ok(plan)
    }
}
