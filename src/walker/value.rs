//! This module contains the symbolic values that the walker places on its
//! stack.
//!
//! A value records how a stack slot was produced, structurally, so that
//! inspectors can match on its shape. Every value also renders to the textual
//! expression it stands for.

use std::{
    cell::RefCell,
    collections::HashMap,
    fmt::{Display, Formatter},
    rc::Rc,
};

use itertools::Itertools;

use crate::metadata::{instruction::ArgumentRef, FieldRef, MethodRef};

/// A literal constant.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Null,
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::String(value) => write!(f, "{value}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// The invocation of a method, or of a constructor.
#[derive(Clone, Debug, PartialEq)]
pub struct CallExpr {
    /// The method being invoked.
    pub method: MethodRef,

    /// The receiver of an instance method.
    pub receiver: Option<SymbolicValue>,

    /// The arguments in call order, not including the receiver.
    pub arguments: Vec<SymbolicValue>,

    /// Whether this is an object construction.
    pub constructor: bool,
}

impl Display for CallExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let arguments = self.arguments.iter().join(", ");
        let declaring = &self.method.declaring_type.name;
        if self.constructor {
            return write!(f, "new {declaring}({arguments})");
        }
        match &self.receiver {
            Some(receiver) => write!(f, "{receiver}.{}({arguments})", self.method.name),
            None => write!(f, "{declaring}.{}({arguments})", self.method.name),
        }
    }
}

/// An array whose length is known, and whose elements are tracked as they are
/// stored.
///
/// The slots are shared between copies of the value in one frame, so that
/// storing through a duplicate of the array reference is seen by the
/// original.
#[derive(Clone, Debug, PartialEq)]
pub struct OpenArray {
    /// The rendered construction expression, e.g. `new String[3]`.
    pub name: String,

    /// The element type of the array.
    pub element_type: String,

    slots: Rc<Slots>,
}

type Slots = RefCell<Vec<Option<SymbolicValue>>>;

/// The copies made while detaching the values of one frame, keyed by the
/// slots that each copy was taken from.
///
/// Detaching every value through the same `Detachments` keeps arrays that
/// were aliased before the copy aliased after it.
#[derive(Debug, Default)]
pub struct Detachments {
    copies: HashMap<*const Slots, Rc<Slots>>,
}

impl Detachments {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl OpenArray {
    /// Creates an array of `length` empty slots holding `element_type`.
    #[must_use]
    pub fn new(element_type: impl Into<String>, length: usize) -> Self {
        let element_type = element_type.into();
        let name = format!("new {element_type}[{length}]");
        let slots = Rc::new(RefCell::new(vec![None; length]));
        Self {
            name,
            element_type,
            slots,
        }
    }

    /// Gets the number of slots in the array.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Checks if the array has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `value` at `index`, returning `false` if the index is out of
    /// bounds.
    pub fn store(&self, index: usize, value: SymbolicValue) -> bool {
        match self.slots.borrow_mut().get_mut(index) {
            Some(slot) => {
                *slot = Some(value);
                true
            }
            None => false,
        }
    }

    /// Gets a snapshot of the slots of the array.
    #[must_use]
    pub fn slots(&self) -> Vec<Option<SymbolicValue>> {
        self.slots.borrow().clone()
    }

    /// Creates a copy of the array that no longer shares its slots with this
    /// one, reusing the copy in `copies` if these slots were already detached.
    #[must_use]
    pub fn detached(&self, copies: &mut Detachments) -> Self {
        let key = Rc::as_ptr(&self.slots);
        let slots = if let Some(slots) = copies.copies.get(&key) {
            Rc::clone(slots)
        } else {
            // Registered before filling so that an array holding itself terminates.
            let slots = Rc::new(RefCell::new(Vec::new()));
            copies.copies.insert(key, Rc::clone(&slots));
            let contents = self
                .slots
                .borrow()
                .iter()
                .map(|slot| slot.as_ref().map(|value| value.deep_clone(copies)))
                .collect();
            *slots.borrow_mut() = contents;
            slots
        };

        Self {
            name: self.name.clone(),
            element_type: self.element_type.clone(),
            slots,
        }
    }
}

/// The symbolic representation of how a stack slot was produced.
#[derive(Clone, Debug, PartialEq)]
pub enum SymbolicValue {
    Literal(Literal),

    /// The contents of a local variable.
    Variable(u16),

    /// The address of a local variable.
    VariableAddress(u16),

    Argument(ArgumentRef),

    /// A field read, from `base` or statically if there is no base.
    FieldAccess {
        base:  Option<Box<SymbolicValue>>,
        field: FieldRef,
    },

    Call(Box<CallExpr>),

    /// An array element read.
    Element {
        array: Box<SymbolicValue>,
        index: Box<SymbolicValue>,
    },

    /// A pointer to a method, as taken by `ldftn`.
    FunctionPointer(MethodRef),

    /// A runtime handle for a metadata token.
    Token(String),

    /// A folded expression that is only known by its rendering.
    Expression(String),

    OpenArray(OpenArray),
}

impl SymbolicValue {
    /// Creates an integer literal.
    #[must_use]
    pub fn int(value: i64) -> Self {
        Self::Literal(Literal::Int(value))
    }

    /// Creates a string literal.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Literal::String(value.into()))
    }

    /// Gets the value as an integer, if it is an integer literal.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Literal(Literal::Int(value)) => Some(*value),
            _ => None,
        }
    }

    /// Gets the value as a string, if it is a string literal.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Literal(Literal::String(value)) => Some(value),
            _ => None,
        }
    }

    /// Gets the call that produced the value, if it was produced by one.
    #[must_use]
    pub fn as_call(&self) -> Option<&CallExpr> {
        match self {
            Self::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Checks whether the value is the result of calling a method called
    /// `name`.
    #[must_use]
    pub fn is_call_to(&self, name: &str) -> bool {
        self.as_call().is_some_and(|c| c.method.name == name)
    }

    /// Gets the name of the member that the value reads: the property of a
    /// getter call (without its `get_` prefix) or the field of a field access.
    #[must_use]
    pub fn accessor_name(&self) -> Option<&str> {
        match self {
            Self::Call(call) => call.method.name.strip_prefix("get_"),
            Self::FieldAccess { field, .. } => Some(&field.name),
            _ => None,
        }
    }

    /// Checks whether any part of the value satisfies `predicate`, including
    /// the value itself.
    pub fn any(&self, predicate: &impl Fn(&SymbolicValue) -> bool) -> bool {
        if predicate(self) {
            return true;
        }
        match self {
            Self::FieldAccess {
                base: Some(base), ..
            } => base.any(predicate),
            Self::Call(call) => {
                call.receiver.as_ref().is_some_and(|r| r.any(predicate))
                    || call.arguments.iter().any(|a| a.any(predicate))
            }
            Self::Element { array, index } => array.any(predicate) || index.any(predicate),
            _ => false,
        }
    }

    /// Checks whether the value involves a call to a method called `name`.
    #[must_use]
    pub fn mentions_call(&self, name: &str) -> bool {
        self.any(&|v| v.is_call_to(name))
    }

    /// Finds the outermost call to a method called `name` within the value,
    /// searching receivers before arguments.
    #[must_use]
    pub fn find_call(&self, name: &str) -> Option<&CallExpr> {
        match self {
            Self::Call(call) if call.method.name == name => Some(call),
            Self::Call(call) => call
                .receiver
                .iter()
                .chain(call.arguments.iter())
                .find_map(|v| v.find_call(name)),
            Self::FieldAccess {
                base: Some(base), ..
            } => base.find_call(name),
            Self::Element { array, index } => {
                array.find_call(name).or_else(|| index.find_call(name))
            }
            _ => None,
        }
    }

    /// Copies the value such that any open arrays in it no longer share slots
    /// with the original.
    #[must_use]
    pub fn deep_clone(&self, copies: &mut Detachments) -> Self {
        match self {
            Self::OpenArray(array) => Self::OpenArray(array.detached(copies)),
            other => other.clone(),
        }
    }
}

impl Display for SymbolicValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(literal) => write!(f, "{literal}"),
            Self::Variable(index) => write!(f, "V_{index}"),
            Self::VariableAddress(index) => write!(f, "&V_{index}"),
            Self::Argument(ArgumentRef::This) => write!(f, "this"),
            Self::Argument(ArgumentRef::Index(index)) => write!(f, "arg{index}"),
            Self::FieldAccess {
                base: Some(base),
                field,
            } => write!(f, "{base}.{}", field.name),
            Self::FieldAccess { base: None, field } => {
                write!(f, "{}::{}", field.declaring_type.full_name, field.name)
            }
            Self::Call(call) => write!(f, "{call}"),
            Self::Element { array, index } => write!(f, "{array}[{index}]"),
            Self::FunctionPointer(method) => write!(f, "&({})", method.full_name()),
            Self::Token(text) | Self::Expression(text) => write!(f, "{text}"),
            Self::OpenArray(array) => write!(f, "{}", array.name),
        }
    }
}
