//! This module contains the descriptors for the fields of recovered messages.

use std::fmt::{Display, Formatter};

use crate::schema::{TypeId, TypeName};

/// The cardinality of a field.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Label {
    Required,
    Optional,
    Repeated,

    /// The cardinality could not be determined.
    Invalid,
}

impl Label {
    /// Gets the keyword for the label in a `.proto` file.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Optional => "optional",
            Self::Repeated => "repeated",
            Self::Invalid => "invalid",
        }
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The protobuf type of a field.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum WireKind {
    Double,
    Float,
    Int32,
    Int64,
    UInt32,
    UInt64,
    SInt32,
    SInt64,
    Fixed32,
    Fixed64,
    SFixed32,
    SFixed64,
    Bool,
    String,
    Bytes,

    /// An enum, named by the field's referenced type.
    Enum,

    /// A message, named by the field's referenced type.
    Message,

    /// The type could not be determined.
    Invalid,
}

impl WireKind {
    /// Gets the scalar type keyword for the kind in a `.proto` file.
    ///
    /// Enums and messages are written using the name of their referenced type
    /// instead.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Float => "float",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::SInt32 => "sint32",
            Self::SInt64 => "sint64",
            Self::Fixed32 => "fixed32",
            Self::Fixed64 => "fixed64",
            Self::SFixed32 => "sfixed32",
            Self::SFixed64 => "sfixed64",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Enum => "enum",
            Self::Message => "message",
            Self::Invalid => "invalid",
        }
    }

    /// Checks whether repeated fields of this kind can use packed encoding.
    #[must_use]
    pub fn is_packable(&self) -> bool {
        !matches!(
            self,
            Self::String | Self::Bytes | Self::Message | Self::Invalid
        )
    }

    /// Checks whether fields of this kind refer to another type.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Enum | Self::Message)
    }
}

impl Display for WireKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The default value of a field.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum DefaultValue {
    /// The default in the textual form it takes in a `.proto` file.
    Literal(String),

    /// The numeric value of an enum default whose member name is not yet
    /// known.
    EnumValue(i64),
}

impl Display for DefaultValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(text) => write!(f, "{text}"),
            Self::EnumValue(value) => write!(f, "{value}"),
        }
    }
}

/// A reference from a field to the message or enum that is its type.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum TypeRef {
    /// The type is known only by name, as it may not have been decompiled yet.
    Placeholder(TypeName),

    /// The type has been decompiled and lives at `id` in the schema graph.
    Resolved { id: TypeId, name: TypeName },
}

impl TypeRef {
    /// Gets the name of the referenced type.
    #[must_use]
    pub fn name(&self) -> &TypeName {
        match self {
            Self::Placeholder(name) | Self::Resolved { name, .. } => name,
        }
    }

    /// Gets the location of the referenced type in the schema graph, if it
    /// has been resolved.
    #[must_use]
    pub fn id(&self) -> Option<TypeId> {
        match self {
            Self::Placeholder(_) => None,
            Self::Resolved { id, .. } => Some(*id),
        }
    }
}

/// A fully-recovered field of a message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldDescriptor {
    /// The protobuf name of the field.
    pub name: String,

    /// The name of the property in the compiled program that backs the field.
    pub property: String,

    pub kind:    WireKind,
    pub label:   Label,
    pub tag:     u32,
    pub packed:  bool,
    pub default: Option<DefaultValue>,

    /// The message or enum that is the field's type, for fields of those
    /// kinds.
    pub referenced_type: Option<TypeRef>,
}

impl FieldDescriptor {
    /// Gets the name of the type of the field as it would be written in a
    /// `.proto` file.
    #[must_use]
    pub fn type_text(&self) -> String {
        match &self.referenced_type {
            Some(reference) if self.kind.is_reference() => reference.name().to_string(),
            _ => self.kind.as_str().to_string(),
        }
    }
}
