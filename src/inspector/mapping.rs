//! This module contains the mappings from the names of types in the compiled
//! program to the protobuf wire kinds they are serialized as.

use crate::schema::WireKind;

/// Maps the name used by a generator for a protobuf scalar type to its wire
/// kind.
///
/// The name may be the suffix of a write method (`WriteSFixed32`) or the simple
/// name of a runtime type (`Single`). Returns [`None`] for names that denote
/// a message or enum reference, including the literal `Enum` and `Message`.
#[must_use]
pub fn literal_kind(name: &str) -> Option<WireKind> {
    let kind = match name {
        "Int32" => WireKind::Int32,
        "Int64" => WireKind::Int64,
        "UInt32" => WireKind::UInt32,
        "UInt64" => WireKind::UInt64,
        "SInt32" => WireKind::SInt32,
        "SInt64" => WireKind::SInt64,
        "Fixed32" => WireKind::Fixed32,
        "Fixed64" => WireKind::Fixed64,
        "SFixed32" => WireKind::SFixed32,
        "SFixed64" => WireKind::SFixed64,
        "Bool" | "Boolean" => WireKind::Bool,
        "String" => WireKind::String,
        "Bytes" | "ByteString" | "Byte[]" => WireKind::Bytes,
        "Double" => WireKind::Double,
        "Float" | "Single" => WireKind::Float,
        _ => return None,
    };

    Some(kind)
}

/// Maps the runtime type of a property written through the varint-based
/// protocol helpers to its wire kind.
#[must_use]
pub fn primitive_kind(name: &str) -> Option<WireKind> {
    let kind = match name {
        "Int32" => WireKind::Int32,
        "Int64" => WireKind::Int64,
        "UInt32" => WireKind::UInt32,
        "UInt64" => WireKind::UInt64,
        "Boolean" => WireKind::Bool,
        "String" => WireKind::String,
        "Byte[]" => WireKind::Bytes,
        _ => return None,
    };

    Some(kind)
}

/// Maps the parameter type of a raw binary writer overload to the fixed-width
/// wire kind it produces.
#[must_use]
pub fn fixed_kind(name: &str) -> Option<WireKind> {
    let kind = match name {
        "Double" => WireKind::Double,
        "Single" => WireKind::Float,
        "UInt32" => WireKind::Fixed32,
        "UInt64" => WireKind::Fixed64,
        _ => return None,
    };

    Some(kind)
}
