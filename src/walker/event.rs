//! This module contains the events that the walker reports to its observer.

use crate::{
    metadata::{FieldRef, MethodRef},
    walker::{condition::Condition, value::SymbolicValue},
};

/// A call, or object construction, reached on some path.
#[derive(Clone, Debug, PartialEq)]
pub struct CallEvent {
    /// The offset of the call instruction.
    pub offset: u32,

    /// The conditions that hold on the path reaching the call.
    pub conditions: Vec<Condition>,

    /// The method being called.
    pub method: MethodRef,

    /// The arguments in call order, starting with the receiver for instance
    /// methods. For constructions, the first argument stands for the object
    /// being constructed.
    pub arguments: Vec<SymbolicValue>,

    /// The rendered call expression.
    pub rendered: String,
}

impl CallEvent {
    /// Gets the argument at `index`, counting the receiver as index zero for
    /// instance methods.
    #[must_use]
    pub fn argument(&self, index: usize) -> Option<&SymbolicValue> {
        self.arguments.get(index)
    }

    /// Gets the declared parameter type name of the argument at `index`,
    /// counting as for [`Self::argument`].
    #[must_use]
    pub fn parameter_type_name(&self, index: usize) -> Option<&str> {
        let receivers = usize::from(self.method.has_this || self.method.is_constructor());
        index
            .checked_sub(receivers)
            .and_then(|i| self.method.parameters.get(i))
            .map(|p| p.parameter_type.name.as_str())
    }
}

/// A field store reached on some path.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreEvent {
    /// The offset of the store instruction.
    pub offset: u32,

    /// The conditions that hold on the path reaching the store.
    pub conditions: Vec<Condition>,

    /// The field being stored to.
    pub field: FieldRef,

    /// The object being stored into, absent for static fields.
    pub receiver: Option<SymbolicValue>,

    /// The value being stored.
    pub value: SymbolicValue,

    /// The rendered value being stored.
    pub rendered: String,
}
